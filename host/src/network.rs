//! Host network layer: UDP relay, scoped delivery and the session tick loop

use crate::orchestrator::Orchestrator;
use crate::replication::BufferedLog;
use crate::roster::Roster;
use crate::session::{Outbound, Phase};
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::{Command, Packet, Scope, SessionConfig, MAX_PEERS, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};
use tokio::time::interval;

/// Messages sent from network tasks to the main host loop
#[derive(Debug)]
pub enum HostMessage {
    PacketReceived { packet: Packet, addr: SocketAddr },
    PeerTimeout { peer_id: u32 },
    #[allow(dead_code)]
    Shutdown,
}

/// Messages sent from the host loop to the sender task
#[derive(Debug)]
pub enum OutgoingMessage {
    SendPacket { packet: Packet, addr: SocketAddr },
    BroadcastPacket { packet: Packet },
}

/// Authoritative host coordinating the roster, the orchestrator and delivery
pub struct Host {
    socket: Arc<UdpSocket>,
    roster: Arc<RwLock<Roster>>,
    orchestrator: Orchestrator,
    buffered: BufferedLog,
    tick_duration: Duration,
    /// Roster size that starts the session.
    expected_peers: usize,
    sequence: u32,
    tick: u64,

    // Communication channels
    host_tx: mpsc::UnboundedSender<HostMessage>,
    host_rx: mpsc::UnboundedReceiver<HostMessage>,
    outgoing_tx: mpsc::UnboundedSender<OutgoingMessage>,
    outgoing_rx: mpsc::UnboundedReceiver<OutgoingMessage>,
}

impl Host {
    pub async fn new(
        addr: &str,
        tick_duration: Duration,
        config: SessionConfig,
        expected_peers: usize,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let orchestrator = Orchestrator::from_entropy(config)?;
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("Host listening on {}", socket.local_addr()?);

        let (host_tx, host_rx) = mpsc::unbounded_channel();
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();

        Ok(Host {
            socket,
            roster: Arc::new(RwLock::new(Roster::new(MAX_PEERS))),
            orchestrator,
            buffered: BufferedLog::new(),
            tick_duration,
            expected_peers: expected_peers.clamp(1, MAX_PEERS),
            sequence: 0,
            tick: 0,
            host_tx,
            host_rx,
            outgoing_tx,
            outgoing_rx,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// Spawns task that continuously listens for incoming packets
    async fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let host_tx = self.host_tx.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; 2048];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => {
                        if let Ok(packet) = deserialize::<Packet>(&buffer[0..len]) {
                            if let Err(e) = host_tx.send(HostMessage::PacketReceived { packet, addr })
                            {
                                error!("Failed to send packet to main loop: {}", e);
                                break;
                            }
                        } else {
                            warn!("Failed to deserialize packet from {}", addr);
                        }
                    }
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns task that drains the outgoing packet queue
    async fn spawn_network_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let roster = Arc::clone(&self.roster);
        let mut outgoing_rx =
            std::mem::replace(&mut self.outgoing_rx, mpsc::unbounded_channel().1);

        tokio::spawn(async move {
            while let Some(message) = outgoing_rx.recv().await {
                match message {
                    OutgoingMessage::SendPacket { packet, addr } => {
                        if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                            error!("Failed to send packet to {}: {}", addr, e);
                        }
                    }
                    OutgoingMessage::BroadcastPacket { packet } => {
                        let addrs = {
                            let roster_guard = roster.read().await;
                            roster_guard.addrs()
                        };

                        for addr in addrs {
                            if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                                error!("Failed to send to peer at {}: {}", addr, e);
                            }
                        }
                    }
                }
            }
        });
    }

    /// Spawns task that monitors peer timeouts
    async fn spawn_timeout_checker(&self) {
        let roster = Arc::clone(&self.roster);
        let host_tx = self.host_tx.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));

            loop {
                interval.tick().await;

                let timed_out = {
                    let mut roster_guard = roster.write().await;
                    roster_guard.check_timeouts()
                };

                for peer_id in timed_out {
                    if let Err(e) = host_tx.send(HostMessage::PeerTimeout { peer_id }) {
                        error!("Failed to send timeout message: {}", e);
                        break;
                    }
                }
            }
        });
    }

    async fn send_packet_impl(
        socket: &UdpSocket,
        packet: &Packet,
        addr: SocketAddr,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let data = serialize(packet)?;
        socket.send_to(&data, addr).await?;
        Ok(())
    }

    fn send_packet(&self, packet: Packet, addr: SocketAddr) {
        if let Err(e) = self
            .outgoing_tx
            .send(OutgoingMessage::SendPacket { packet, addr })
        {
            error!("Failed to queue packet for sending: {}", e);
        }
    }

    fn broadcast_packet(&self, packet: Packet) {
        if let Err(e) = self
            .outgoing_tx
            .send(OutgoingMessage::BroadcastPacket { packet })
        {
            error!("Failed to queue broadcast packet: {}", e);
        }
    }

    fn next_replicated(&mut self, command: Command) -> Packet {
        self.sequence = self.sequence.wrapping_add(1);
        Packet::Replicated {
            sequence: self.sequence,
            command,
        }
    }

    /// Delivers one command to its scope. Buffered commands are also kept
    /// for late joiners.
    async fn dispatch(&mut self, scope: Scope, command: Command) {
        debug!("Dispatching {} to {:?}", command, scope);

        match scope {
            Scope::AllPeersBuffered => {
                self.buffered.record(&command);
                let packet = self.next_replicated(command);
                self.broadcast_packet(packet);
            }
            Scope::AllPeers => {
                let packet = self.next_replicated(command);
                self.broadcast_packet(packet);
            }
            Scope::SpecificPeer(slot) => {
                let addr = {
                    let roster = self.roster.read().await;
                    roster.addr_of_slot(slot)
                };
                match addr {
                    Some(addr) => {
                        let packet = self.next_replicated(command);
                        self.send_packet(packet, addr);
                    }
                    None => warn!("No peer in slot {}, dropping {}", slot, command),
                }
            }
            Scope::HostOnly => {
                warn!("{} addressed to the host by the host, dropping", command);
            }
        }
    }

    async fn flush_outbound(&mut self) {
        for Outbound { scope, command } in self.orchestrator.drain_outbound() {
            self.dispatch(scope, command).await;
        }
    }

    async fn sync_roster(&mut self) {
        let slots = {
            let roster = self.roster.read().await;
            roster.slots()
        };
        self.orchestrator.set_roster(slots);
    }

    async fn handle_connect(&mut self, client_version: u32, addr: SocketAddr) {
        info!("Peer connecting from {} (version: {})", addr, client_version);

        if client_version != PROTOCOL_VERSION {
            let reason = format!(
                "Protocol version {} not supported, host speaks {}",
                client_version, PROTOCOL_VERSION
            );
            self.send_packet(Packet::Disconnected { reason }, addr);
            return;
        }

        let admitted = {
            let mut roster = self.roster.write().await;
            if let Some(existing_id) = roster.find_peer_by_addr(addr) {
                info!("Replacing existing peer {} from {}", existing_id, addr);
                roster.remove_peer(&existing_id);
            }
            roster.add_peer(addr)
        };

        let Some((peer_id, slot)) = admitted else {
            let reason = "Session full".to_string();
            self.send_packet(Packet::Disconnected { reason }, addr);
            return;
        };

        self.send_packet(Packet::Connected { peer_id, slot }, addr);

        let replay: Vec<Command> = self.buffered.replay().cloned().collect();
        if !replay.is_empty() {
            debug!("Replaying {} buffered commands to slot {}", replay.len(), slot);
        }
        for command in replay {
            let packet = self.next_replicated(command);
            self.send_packet(packet, addr);
        }

        self.sync_roster().await;

        let connected = self.orchestrator.roster().len();
        if self.orchestrator.phase() == Phase::Lobby {
            if connected >= self.expected_peers {
                self.orchestrator.start();
                self.flush_outbound().await;
            } else {
                info!("Waiting for {} more peers", self.expected_peers - connected);
            }
        }
    }

    /// Validates a peer request and routes it by scope
    async fn handle_request(&mut self, scope: Scope, command: Command, addr: SocketAddr) {
        let sender = {
            let mut roster = self.roster.write().await;
            roster.find_peer_by_addr(addr).and_then(|peer_id| {
                roster.touch(peer_id);
                roster.get(peer_id).map(|peer| peer.slot)
            })
        };

        let Some(slot) = sender else {
            warn!("Request from unknown address {}", addr);
            return;
        };

        if command.peer_scope() != Some(scope) {
            warn!(
                "Slot {} may not send {} to {:?}, dropping",
                slot, command, scope
            );
            return;
        }

        match scope {
            Scope::HostOnly => {
                self.orchestrator.handle_request(slot, command);
                self.flush_outbound().await;
            }
            _ => self.dispatch(scope, command).await,
        }
    }

    /// Processes incoming packets
    async fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        match packet {
            Packet::Connect { client_version } => {
                self.handle_connect(client_version, addr).await;
            }

            Packet::Heartbeat { timestamp } => {
                let known = {
                    let mut roster = self.roster.write().await;
                    roster
                        .find_peer_by_addr(addr)
                        .map(|peer_id| roster.touch(peer_id))
                        .unwrap_or(false)
                };
                if known {
                    self.send_packet(Packet::Heartbeat { timestamp }, addr);
                }
            }

            Packet::Request {
                sequence,
                scope,
                command,
            } => {
                debug!("Request #{} from {}: {} -> {:?}", sequence, addr, command, scope);
                self.handle_request(scope, command, addr).await;
            }

            Packet::Disconnect => {
                let removed = {
                    let mut roster = self.roster.write().await;
                    roster
                        .find_peer_by_addr(addr)
                        .map(|peer_id| roster.remove_peer(&peer_id))
                        .unwrap_or(false)
                };
                if removed {
                    self.sync_roster().await;
                }
            }

            _ => {
                warn!("Unexpected packet type from peer at {}", addr);
            }
        }
    }

    async fn tick(&mut self, dt: f32) {
        self.orchestrator.tick(dt);
        self.flush_outbound().await;
        self.tick += 1;

        if self.tick % 60 == 0 {
            let session = self.orchestrator.session();
            debug!(
                "Tick {}: {:?}, round {}, health {}, battery {:.0}",
                self.tick,
                self.orchestrator.phase(),
                session.round_index,
                session.current_health,
                session.battery_charge
            );
        }
    }

    /// Main host loop coordinating all operations
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.spawn_network_receiver().await;
        self.spawn_network_sender().await;
        self.spawn_timeout_checker().await;

        let mut tick_interval = interval(self.tick_duration);
        let mut last_tick = Instant::now();

        info!(
            "Host started, waiting for {} peers",
            self.expected_peers
        );

        loop {
            tokio::select! {
                message = self.host_rx.recv() => {
                    match message {
                        Some(HostMessage::PacketReceived { packet, addr }) => {
                            self.handle_packet(packet, addr).await;
                        },
                        Some(HostMessage::PeerTimeout { peer_id }) => {
                            info!("Peer {} timed out", peer_id);
                            self.sync_roster().await;
                        },
                        Some(HostMessage::Shutdown) | None => {
                            info!("Host shutting down");
                            break;
                        }
                    }
                },

                _ = tick_interval.tick() => {
                    let now = Instant::now();
                    let dt = now.duration_since(last_tick).as_secs_f32();
                    last_tick = now;

                    self.tick(dt).await;
                },
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{ActionCommand, Role};
    use std::net::{IpAddr, Ipv4Addr};

    fn peer_addr(port: u16) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), port)
    }

    async fn test_host(expected_peers: usize) -> Host {
        Host::new(
            "127.0.0.1:0",
            Duration::from_millis(16),
            SessionConfig::default(),
            expected_peers,
        )
        .await
        .unwrap()
    }

    fn drain(host: &mut Host) -> Vec<OutgoingMessage> {
        let mut messages = Vec::new();
        while let Ok(message) = host.outgoing_rx.try_recv() {
            messages.push(message);
        }
        messages
    }

    fn replicated(message: &OutgoingMessage) -> Option<&Command> {
        match message {
            OutgoingMessage::SendPacket {
                packet: Packet::Replicated { command, .. },
                ..
            }
            | OutgoingMessage::BroadcastPacket {
                packet: Packet::Replicated { command, .. },
            } => Some(command),
            _ => None,
        }
    }

    #[test]
    fn test_channel_communication() {
        let (tx, mut rx) = mpsc::unbounded_channel::<HostMessage>();
        let addr = peer_addr(8080);

        let msg = HostMessage::PacketReceived {
            packet: Packet::Connect { client_version: 1 },
            addr,
        };
        assert!(tx.send(msg).is_ok());

        match rx.try_recv() {
            Ok(HostMessage::PacketReceived { packet, addr: a }) => {
                assert_eq!(a, addr);
                assert!(matches!(packet, Packet::Connect { client_version: 1 }));
            }
            _ => panic!("Unexpected message type"),
        }
    }

    #[tokio::test]
    async fn test_connect_assigns_slot_and_starts() {
        let mut host = test_host(1).await;
        host.handle_packet(Packet::Connect { client_version: 1 }, peer_addr(9000))
            .await;

        let messages = drain(&mut host);
        match &messages[0] {
            OutgoingMessage::SendPacket {
                packet: Packet::Connected { peer_id, slot },
                addr,
            } => {
                assert_eq!(*peer_id, 1);
                assert_eq!(*slot, 0);
                assert_eq!(*addr, peer_addr(9000));
            }
            other => panic!("Expected Connected, got {:?}", other),
        }

        let commands: Vec<&Command> = messages.iter().filter_map(replicated).collect();
        assert!(commands.contains(&&Command::UpdateHealth { health: 5 }));
        assert!(commands.contains(&&Command::SetControls { enabled: false }));
        assert!(matches!(
            host.orchestrator().phase(),
            Phase::Briefing { .. }
        ));
    }

    #[tokio::test]
    async fn test_late_joiner_gets_buffered_state() {
        let mut host = test_host(1).await;
        host.handle_packet(Packet::Connect { client_version: 1 }, peer_addr(9000))
            .await;
        drain(&mut host);

        host.handle_packet(Packet::Connect { client_version: 1 }, peer_addr(9001))
            .await;
        let messages = drain(&mut host);

        let to_late: Vec<&Command> = messages
            .iter()
            .filter_map(|m| match m {
                OutgoingMessage::SendPacket {
                    packet: Packet::Replicated { command, .. },
                    addr,
                } if *addr == peer_addr(9001) => Some(command),
                _ => None,
            })
            .collect();

        assert!(to_late.contains(&&Command::UpdateHealth { health: 5 }));
        assert!(to_late.contains(&&Command::RotateRoles { round: 0 }));
        assert!(to_late.contains(&&Command::SetControls { enabled: false }));
        assert!(!to_late
            .iter()
            .any(|c| matches!(c, Command::UpdateBattery { .. })));
    }

    #[tokio::test]
    async fn test_version_mismatch_rejected() {
        let mut host = test_host(1).await;
        host.handle_packet(Packet::Connect { client_version: 99 }, peer_addr(9000))
            .await;

        let messages = drain(&mut host);
        assert_eq!(messages.len(), 1);
        assert!(matches!(
            &messages[0],
            OutgoingMessage::SendPacket {
                packet: Packet::Disconnected { .. },
                ..
            }
        ));
        assert_eq!(host.orchestrator().phase(), Phase::Lobby);
    }

    #[tokio::test]
    async fn test_action_relayed_to_everyone() {
        let mut host = test_host(2).await;
        host.handle_packet(Packet::Connect { client_version: 1 }, peer_addr(9000))
            .await;
        drain(&mut host);

        let command = Command::SetAction {
            station: Role::Movement,
            action: ActionCommand::Duck { down: true },
        };
        host.handle_packet(
            Packet::Request {
                sequence: 1,
                scope: Scope::AllPeers,
                command: command.clone(),
            },
            peer_addr(9000),
        )
        .await;

        let messages = drain(&mut host);
        assert_eq!(messages.len(), 1);
        match &messages[0] {
            OutgoingMessage::BroadcastPacket {
                packet: Packet::Replicated { command: c, .. },
            } => assert_eq!(c, &command),
            other => panic!("Expected broadcast, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_misrouted_requests_dropped() {
        let mut host = test_host(1).await;
        host.handle_packet(Packet::Connect { client_version: 1 }, peer_addr(9000))
            .await;
        drain(&mut host);

        // Damage must go to the host, not be broadcast.
        host.handle_packet(
            Packet::Request {
                sequence: 1,
                scope: Scope::AllPeers,
                command: Command::TakeDamage,
            },
            peer_addr(9000),
        )
        .await;
        // Peers never decide outcomes.
        host.handle_packet(
            Packet::Request {
                sequence: 2,
                scope: Scope::AllPeersBuffered,
                command: Command::GameOver,
            },
            peer_addr(9000),
        )
        .await;
        // Unknown sender.
        host.handle_packet(
            Packet::Request {
                sequence: 1,
                scope: Scope::HostOnly,
                command: Command::RechargeBattery,
            },
            peer_addr(9999),
        )
        .await;

        assert!(drain(&mut host).is_empty());
        assert_eq!(host.orchestrator().session().current_health, 5);
    }

    #[tokio::test]
    async fn test_heartbeat_echoed_to_known_peers() {
        let mut host = test_host(2).await;
        host.handle_packet(Packet::Heartbeat { timestamp: 42 }, peer_addr(9000))
            .await;
        assert!(drain(&mut host).is_empty());

        host.handle_packet(Packet::Connect { client_version: 1 }, peer_addr(9000))
            .await;
        drain(&mut host);
        host.handle_packet(Packet::Heartbeat { timestamp: 42 }, peer_addr(9000))
            .await;

        let messages = drain(&mut host);
        assert!(matches!(
            &messages[0],
            OutgoingMessage::SendPacket {
                packet: Packet::Heartbeat { timestamp: 42 },
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_disconnect_updates_orchestrator_roster() {
        let mut host = test_host(3).await;
        host.handle_packet(Packet::Connect { client_version: 1 }, peer_addr(9000))
            .await;
        host.handle_packet(Packet::Connect { client_version: 1 }, peer_addr(9001))
            .await;
        assert_eq!(host.orchestrator().roster(), &[0, 1]);

        host.handle_packet(Packet::Disconnect, peer_addr(9000)).await;
        assert_eq!(host.orchestrator().roster(), &[1]);
    }
}
