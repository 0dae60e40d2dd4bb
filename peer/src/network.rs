use crate::game::PeerState;
use crate::input::{parse_line, ConsoleInput, HELP};
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::{timestamp_ms, Command, Packet, CONNECTION_TIMEOUT_SECS, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::interval;

pub struct Peer {
    socket: UdpSocket,
    host_addr: SocketAddr,
    peer_id: Option<u32>,
    connected: bool,

    state: PeerState,
    next_sequence: u32,
    frame_duration: Duration,

    ping_ms: u64,
    last_heard: Instant,
    stalled: bool,
}

impl Peer {
    pub async fn new(
        host_addr: &str,
        frame_duration: Duration,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        let host_addr = host_addr.parse()?;

        Ok(Peer {
            socket,
            host_addr,
            peer_id: None,
            connected: false,
            state: PeerState::from_entropy(),
            next_sequence: 1,
            frame_duration,
            ping_ms: 0,
            last_heard: Instant::now(),
            stalled: false,
        })
    }

    async fn connect(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        info!("Connecting to host at {}...", self.host_addr);

        let packet = Packet::Connect {
            client_version: PROTOCOL_VERSION,
        };
        self.send_packet(&packet).await?;

        Ok(())
    }

    async fn send_packet(&self, packet: &Packet) -> Result<(), Box<dyn std::error::Error>> {
        let data = serialize(packet)?;
        self.socket.send_to(&data, self.host_addr).await?;
        Ok(())
    }

    /// Sends a command to the host with the only scope a peer may use for it.
    async fn send_request(&mut self, command: Command) -> Result<(), Box<dyn std::error::Error>> {
        let Some(scope) = command.peer_scope() else {
            warn!("{} cannot be requested by a peer", command);
            return Ok(());
        };
        if !self.connected {
            debug!("Not connected, dropping {}", command);
            return Ok(());
        }

        let sequence = self.next_sequence;
        self.next_sequence = self.next_sequence.wrapping_add(1);

        let packet = Packet::Request {
            sequence,
            scope,
            command,
        };
        self.send_packet(&packet).await
    }

    async fn send_requests(&mut self, commands: Vec<Command>) {
        for command in commands {
            if let Err(e) = self.send_request(command).await {
                error!("Error sending request: {}", e);
            }
        }
    }

    fn handle_packet(&mut self, packet: Packet) {
        self.last_heard = Instant::now();
        if self.stalled {
            info!("Host is responding again");
            self.stalled = false;
        }

        match packet {
            Packet::Connected { peer_id, slot } => {
                info!("Connected! Peer ID: {}", peer_id);
                self.peer_id = Some(peer_id);
                self.connected = true;
                self.state.set_slot(slot);
            }

            Packet::Replicated { sequence, command } => {
                debug!("Replicated #{}: {}", sequence, command);
                self.state.apply(&command);
            }

            Packet::Heartbeat { timestamp } => {
                self.ping_ms = timestamp_ms().saturating_sub(timestamp);
            }

            Packet::Disconnected { reason } => {
                warn!("Disconnected: {}", reason);
                self.connected = false;
                self.peer_id = None;
            }

            _ => {
                warn!("Unexpected packet type");
            }
        }
    }

    /// Handles one console line. Returns false when the user quits.
    async fn handle_line(&mut self, line: &str) -> bool {
        let input = match parse_line(line) {
            Ok(Some(input)) => input,
            Ok(None) => return true,
            Err(message) => {
                println!("{}", message);
                return true;
            }
        };

        match input {
            ConsoleInput::Action(action) => match self.state.request_action(action) {
                Ok(command) => self.send_requests(vec![command]).await,
                Err(e) => println!("Rejected: {}", e),
            },
            ConsoleInput::Enter { zone, hazard } => {
                let requests = self.state.on_enter(zone, hazard).into_iter().collect();
                self.send_requests(requests).await;
            }
            ConsoleInput::Stay {
                zone,
                hazard,
                seconds,
            } => {
                let requests = self.state.hold_contact(zone, hazard, seconds);
                self.send_requests(requests).await;
            }
            ConsoleInput::Status => self.print_status(),
            ConsoleInput::Help => println!("{}", HELP),
            ConsoleInput::Quit => return false,
        }
        true
    }

    fn print_status(&self) {
        println!("{}", self.state.hud().status_line());
        match self.state.station() {
            Some(station) => println!(
                "slot {:?}, station {:?}, controls {}, ping {}ms",
                self.state.slot(),
                station,
                if self.state.replica().controls_enabled { "on" } else { "off" },
                self.ping_ms
            ),
            None => println!("waiting for a slot"),
        }
        for hazard in self.state.hazards().iter() {
            println!(
                "  #{} {:?} at {:.1} ({:.1}s left)",
                hazard.id,
                hazard.tag,
                hazard.x,
                hazard.lifetime - hazard.age
            );
        }
    }

    fn spawn_console_reader() -> mpsc::UnboundedReceiver<String> {
        let (line_tx, line_rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if line_tx.send(line).is_err() {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        error!("Error reading console: {}", e);
                        break;
                    }
                }
            }
        });

        line_rx
    }

    fn check_host(&mut self) {
        let timeout = Duration::from_secs(CONNECTION_TIMEOUT_SECS);
        if !self.stalled && self.last_heard.elapsed() > timeout {
            warn!(
                "Nothing heard from the host for {}s, session is stalled",
                CONNECTION_TIMEOUT_SECS
            );
            self.stalled = true;
        }
    }

    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.connect().await?;

        let mut line_rx = Self::spawn_console_reader();
        let mut frame_interval = interval(self.frame_duration);
        let mut physics_interval = interval(Duration::from_secs_f32(crate::game::PHYSICS_DT));
        let mut heartbeat_interval = interval(Duration::from_secs(1));
        let mut last_frame = Instant::now();

        let mut buffer = [0u8; 2048];

        loop {
            tokio::select! {
                result = self.socket.recv_from(&mut buffer) => {
                    match result {
                        Ok((len, _)) => {
                            if let Ok(packet) = deserialize::<Packet>(&buffer[0..len]) {
                                self.handle_packet(packet);
                            } else {
                                warn!("Failed to deserialize packet from host");
                            }
                        },
                        Err(e) => error!("Error receiving packet: {}", e),
                    }
                },

                line = line_rx.recv() => {
                    match line {
                        Some(line) => {
                            if !self.handle_line(&line).await {
                                break;
                            }
                        },
                        None => break,
                    }
                },

                _ = frame_interval.tick() => {
                    let now = Instant::now();
                    let dt = now.duration_since(last_frame).as_secs_f32();
                    last_frame = now;

                    let requests = self.state.tick(dt);
                    self.send_requests(requests).await;
                },

                _ = physics_interval.tick() => {
                    self.state.physics_step();
                },

                _ = heartbeat_interval.tick() => {
                    if self.connected {
                        let packet = Packet::Heartbeat { timestamp: timestamp_ms() };
                        if let Err(e) = self.send_packet(&packet).await {
                            error!("Error sending heartbeat: {}", e);
                        }
                    }
                    self.check_host();
                },
            }
        }

        if self.connected {
            let _ = self.send_packet(&Packet::Disconnect).await;
        }

        Ok(())
    }
}
