//! Integration tests for the host orchestrator and its peers
//!
//! These tests wire a host and several peers together, either in memory
//! through the same bincode encoding the sockets use, or over real UDP.

use assert_approx_eq::assert_approx_eq;
use bincode::{deserialize, serialize};
use host::orchestrator::Orchestrator;
use host::replication::BufferedLog;
use host::session::{Outbound, Phase};
use peer::game::{Outcome, PeerState};
use rand::rngs::StdRng;
use rand::SeedableRng;
use shared::{ActionCommand, Command, HazardKind, Packet, Role, Scope, SessionConfig, Zone};

/// A host and its peers connected by an in-memory wire.
struct Crew {
    host: Orchestrator<StdRng>,
    log: BufferedLog,
    /// Indexed by roster slot.
    peers: Vec<PeerState<StdRng>>,
    /// Slots that received an obstacle, in order.
    spawned_for: Vec<u8>,
    sequence: u32,
}

impl Crew {
    fn new(peers: u8, config: SessionConfig) -> Self {
        let mut host = Orchestrator::new(config, StdRng::seed_from_u64(11)).unwrap();
        host.set_roster((0..peers).collect());

        let peers = (0..peers)
            .map(|slot| {
                let mut state = PeerState::new(StdRng::seed_from_u64(100 + slot as u64));
                state.set_slot(slot);
                state
            })
            .collect();

        Crew {
            host,
            log: BufferedLog::new(),
            peers,
            spawned_for: Vec::new(),
            sequence: 0,
        }
    }

    fn started(peers: u8, config: SessionConfig) -> Self {
        let mut crew = Crew::new(peers, config);
        crew.host.start();
        crew.deliver();
        crew
    }

    /// Encodes a command the way the host socket does and decodes it on
    /// the receiving side.
    fn wire(&mut self, command: Command) -> Command {
        self.sequence += 1;
        let packet = Packet::Replicated {
            sequence: self.sequence,
            command,
        };
        let data = serialize(&packet).unwrap();
        match deserialize::<Packet>(&data).unwrap() {
            Packet::Replicated { command, .. } => command,
            other => panic!("Expected Replicated, got {:?}", other),
        }
    }

    fn broadcast(&mut self, command: Command) {
        let command = self.wire(command);
        for peer in &mut self.peers {
            peer.apply(&command);
        }
    }

    fn deliver(&mut self) {
        for Outbound { scope, command } in self.host.drain_outbound() {
            match scope {
                Scope::AllPeersBuffered => {
                    self.log.record(&command);
                    self.broadcast(command);
                }
                Scope::AllPeers => self.broadcast(command),
                Scope::SpecificPeer(slot) => {
                    if let Command::SpawnHazard { kind } = &command {
                        if *kind != HazardKind::Energy {
                            self.spawned_for.push(slot);
                        }
                    }
                    let command = self.wire(command);
                    self.peers[slot as usize].apply(&command);
                }
                Scope::HostOnly => panic!("Host addressed {} to itself", command),
            }
        }
    }

    /// Routes a peer-originated command the way the host network layer does.
    fn request(&mut self, from_slot: u8, command: Command) {
        match command.peer_scope() {
            Some(Scope::HostOnly) => self.host.handle_request(from_slot, command),
            Some(Scope::AllPeers) => self.broadcast(command),
            other => panic!("{} cannot be requested to {:?}", command, other),
        }
        self.deliver();
    }

    fn advance(&mut self, seconds: f32, dt: f32) {
        let mut elapsed = 0.0;
        while elapsed < seconds {
            self.host.tick(dt);
            self.deliver();
            for peer in &mut self.peers {
                peer.tick(dt);
            }
            elapsed += dt;
        }
    }
}

fn quick_config() -> SessionConfig {
    SessionConfig {
        briefing_duration: 0.0,
        round_duration_min: 100.0,
        round_duration_max: 100.0,
        ..SessionConfig::default()
    }
}

/// IN-MEMORY SESSION TESTS
mod session_tests {
    use super::*;

    #[test]
    fn start_reaches_every_peer() {
        let mut crew = Crew::started(3, SessionConfig::default());

        for peer in &crew.peers {
            assert_eq!(peer.replica().health, 5);
            assert!(!peer.replica().controls_enabled);
            assert!(!peer.replica().time_flowing);
        }

        crew.advance(16.5, 0.5);
        for peer in &crew.peers {
            assert!(peer.replica().controls_enabled);
            assert!(peer.replica().time_flowing);
        }
        assert_eq!(crew.host.phase(), Phase::Running);
    }

    #[test]
    fn spawns_land_on_one_peer_at_a_time() {
        let mut crew = Crew::started(3, quick_config());
        crew.advance(30.0, 0.25);

        // Ten spawns at three-second intervals.
        assert_eq!(crew.spawned_for.len(), 10);
        for pair in crew.spawned_for.windows(2) {
            assert_ne!(pair[0], pair[1]);
        }

        let notices: u32 = crew.peers.iter().map(|p| p.turns()).sum();
        assert_eq!(notices as usize, crew.spawned_for.len());
    }

    #[test]
    fn damage_round_trip() {
        let mut crew = Crew::started(2, quick_config());

        crew.peers[0].apply(&Command::SpawnHazard {
            kind: HazardKind::Rock,
        });
        let rock = crew.peers[0].hazards().iter().last().unwrap().id;

        let request = crew.peers[0].on_enter(Zone::Body, rock);
        assert_eq!(request, Some(Command::TakeDamage));
        assert!(crew.peers[0].hazards().get(rock).is_none());

        crew.request(0, request.unwrap());
        assert_eq!(crew.host.session().current_health, 4);
        for peer in &crew.peers {
            assert_eq!(peer.replica().health, 4);
        }
    }

    #[test]
    fn energy_pickup_refills_everyone() {
        let mut crew = Crew::started(5, quick_config());
        crew.advance(4.0, 0.5);
        assert!(crew.host.session().battery_charge < 120.0);

        crew.peers[2].apply(&Command::SpawnHazard {
            kind: HazardKind::Energy,
        });
        let cell = crew.peers[2].hazards().iter().last().unwrap().id;
        let request = crew.peers[2].on_enter(Zone::Collector, cell);
        assert_eq!(request, Some(Command::RechargeBattery));

        crew.request(2, request.unwrap());
        assert_approx_eq!(crew.host.session().battery_charge, 120.0);
        for peer in &crew.peers {
            assert_approx_eq!(peer.replica().battery, 120.0);
        }
    }

    #[test]
    fn game_over_reaches_every_peer_once() {
        let mut crew = Crew::started(2, quick_config());
        for _ in 0..7 {
            crew.request(1, Command::TakeDamage);
        }

        assert_eq!(crew.host.phase(), Phase::GameOver);
        assert_eq!(crew.host.session().current_health, 0);
        for peer in &crew.peers {
            assert_eq!(peer.replica().health, 0);
            assert_eq!(peer.replica().outcome, Some(Outcome::GameOver));
            assert!(!peer.replica().controls_enabled);
        }
    }

    #[test]
    fn victory_after_last_rotation() {
        let config = SessionConfig {
            briefing_duration: 0.0,
            rotation_delay: 0.0,
            round_duration_min: 2.0,
            round_duration_max: 2.0,
            ..SessionConfig::default()
        };
        let mut crew = Crew::started(2, config);
        crew.advance(20.0, 0.5);

        assert_eq!(crew.host.phase(), Phase::Victory);
        for peer in &crew.peers {
            assert_eq!(peer.replica().outcome, Some(Outcome::Victory));
            assert_eq!(peer.replica().round, 4);
            assert!(!peer.replica().time_flowing);
        }
        // Slot 0 started on Movement and moved one station per round.
        assert_eq!(crew.peers[0].station(), Some(Role::Energy));
    }
}

/// REPLICATION TESTS
mod replication_tests {
    use super::*;

    #[test]
    fn late_joiner_catches_up_from_buffer() {
        let mut crew = Crew::started(2, quick_config());
        crew.request(0, Command::TakeDamage);
        crew.request(1, Command::TakeDamage);

        let mut late = PeerState::new(StdRng::seed_from_u64(9));
        late.set_slot(2);
        for command in crew.log.replay() {
            late.apply(command);
        }

        assert_eq!(late.replica().health, 3);
        assert_eq!(late.replica().round, 0);
        assert!(late.replica().controls_enabled);
        assert!(late.replica().time_flowing);
        assert_eq!(late.station(), Some(Role::Weapons));
    }

    #[test]
    fn actions_stay_in_lockstep() {
        let mut crew = Crew::started(5, quick_config());

        let duck = crew.peers[0]
            .request_action(ActionCommand::Duck { down: true })
            .unwrap();
        crew.request(0, duck);

        let shield = crew.peers[3]
            .request_action(ActionCommand::Shield { lane: 1.5 })
            .unwrap();
        crew.request(3, shield);

        crew.advance(0.3, 0.1);

        let reference = crew.peers[0].actions();
        for peer in &crew.peers[1..] {
            assert_eq!(peer.actions().duck().progress(), reference.duck().progress());
            assert_eq!(peer.actions().shield().lane(), reference.shield().lane());
            assert_eq!(peer.actions().shield().phase(), reference.shield().phase());
        }
        assert!(reference.duck().progress() > 0.0);
    }

    #[test]
    fn foreign_station_rejected_locally() {
        let mut crew = Crew::started(2, quick_config());
        assert!(crew.peers[1]
            .request_action(ActionCommand::Duck { down: true })
            .is_err());
        assert!(crew.peers[1]
            .request_action(ActionCommand::Repair { room: 2 })
            .is_ok());
    }

    #[test]
    fn duplicate_delivery_is_harmless() {
        let mut crew = Crew::started(2, quick_config());
        crew.request(0, Command::TakeDamage);

        let before = crew.peers[1].replica().clone();
        for command in crew.log.replay().cloned().collect::<Vec<_>>() {
            crew.peers[1].apply(&command);
        }
        assert_eq!(crew.peers[1].replica(), &before);
    }
}

/// NETWORK PROTOCOL TESTS
mod protocol_tests {
    use super::*;
    use host::network::Host;
    use std::time::Duration;
    use tokio::net::UdpSocket;
    use tokio::time::timeout;

    async fn next_packet(socket: &UdpSocket) -> Packet {
        let mut buf = [0u8; 2048];
        let (len, _) = timeout(Duration::from_secs(2), socket.recv_from(&mut buf))
            .await
            .expect("Timed out waiting for host")
            .unwrap();
        deserialize(&buf[..len]).unwrap()
    }

    async fn wait_for(socket: &UdpSocket, wanted: &Command) {
        for _ in 0..200 {
            if let Packet::Replicated { command, .. } = next_packet(socket).await {
                if &command == wanted {
                    return;
                }
            }
        }
        panic!("Host never replicated {}", wanted);
    }

    /// Tests a peer joining and relaying an action through a real host
    #[tokio::test]
    async fn udp_join_and_relay() {
        let config = SessionConfig {
            briefing_duration: 0.0,
            ..SessionConfig::default()
        };
        let mut host = Host::new("127.0.0.1:0", Duration::from_millis(16), config, 1)
            .await
            .unwrap();
        let host_addr = host.local_addr().unwrap();
        tokio::spawn(async move {
            if let Err(e) = host.run().await {
                eprintln!("Host stopped: {}", e);
            }
        });

        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let connect = serialize(&Packet::Connect { client_version: 1 }).unwrap();
        socket.send_to(&connect, host_addr).await.unwrap();

        match next_packet(&socket).await {
            Packet::Connected { slot, .. } => assert_eq!(slot, 0),
            other => panic!("Expected Connected, got {:?}", other),
        }
        wait_for(&socket, &Command::SetControls { enabled: true }).await;

        let duck = Command::SetAction {
            station: Role::Movement,
            action: ActionCommand::Duck { down: true },
        };
        let request = serialize(&Packet::Request {
            sequence: 1,
            scope: Scope::AllPeers,
            command: duck.clone(),
        })
        .unwrap();
        socket.send_to(&request, host_addr).await.unwrap();
        wait_for(&socket, &duck).await;

        let bye = serialize(&Packet::Disconnect).unwrap();
        socket.send_to(&bye, host_addr).await.unwrap();
    }

    /// Tests malformed packet handling
    #[test]
    fn malformed_packet_handling() {
        let valid = serialize(&Packet::Request {
            sequence: 7,
            scope: Scope::HostOnly,
            command: Command::TakeDamage,
        })
        .unwrap();

        let truncated = &valid[..valid.len() / 2];
        assert!(deserialize::<Packet>(truncated).is_err());

        let mut corrupted = valid.clone();
        corrupted[0] = 0xFF;
        assert!(deserialize::<Packet>(&corrupted).is_err());

        assert!(deserialize::<Packet>(&[]).is_err());
    }
}
