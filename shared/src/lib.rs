use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub mod actions;
pub mod config;

pub use config::{ConfigError, SessionConfig};

pub const PROTOCOL_VERSION: u32 = 1;

pub const STATION_COUNT: usize = 5;
pub const MAX_PEERS: usize = 5;
pub const MAX_HEALTH: u8 = 5;
pub const FULL_CHARGE: f32 = 120.0;
pub const BATTERY_DRAIN: f32 = 5.0;
pub const BATTERY_BANDS: usize = 5;
pub const INITIAL_SPAWN_INTERVAL: f32 = 3.0;
pub const SPAWN_INTERVAL_STEP: f32 = 0.5;
pub const VICTORY_ROUND: u8 = 5;

/// Seconds without any datagram before a connection is considered gone.
pub const CONNECTION_TIMEOUT_SECS: u64 = 5;

/// Colour of each roster slot, shared by HUD icons and spawned hazards.
pub const PEER_COLORS: [&str; MAX_PEERS] = ["blue", "red", "green", "yellow", "cyan"];

/// One physical console of the vehicle.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Movement,
    Repair,
    Weapons,
    Shields,
    Energy,
}

impl Role {
    pub const ALL: [Role; STATION_COUNT] = [
        Role::Movement,
        Role::Repair,
        Role::Weapons,
        Role::Shields,
        Role::Energy,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Role {
        Self::ALL[index % STATION_COUNT]
    }

    /// Station manned by the peer in `slot` during `round`.
    pub fn for_slot(slot: u8, round: u8) -> Role {
        Self::from_index(slot as usize + round as usize)
    }
}

/// What the host decides to spawn on a peer's screen.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HazardKind {
    LogOrVine,
    Overheat,
    Enemy,
    Rock,
    Energy,
    FakeEnergy,
}

impl HazardKind {
    /// Obstacle kinds in station order, used when no explicit list is configured.
    pub const OBSTACLES: [HazardKind; STATION_COUNT] = [
        HazardKind::LogOrVine,
        HazardKind::Overheat,
        HazardKind::Enemy,
        HazardKind::Rock,
        HazardKind::FakeEnergy,
    ];

    /// Overheats sit on the station itself and fake energy has no body to tint.
    pub fn is_tinted(self) -> bool {
        !matches!(self, HazardKind::Overheat | HazardKind::FakeEnergy)
    }

    pub fn label(self) -> &'static str {
        match self {
            HazardKind::LogOrVine => "Log/Vine",
            HazardKind::Overheat => "Overheat",
            HazardKind::Enemy => "Enemy",
            HazardKind::Rock => "Rock",
            HazardKind::Energy => "Energy",
            HazardKind::FakeEnergy => "Fake energy",
        }
    }
}

/// Concrete entity tag carried by a spawned hazard.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HazardTag {
    Log,
    Vine,
    Overheat,
    Enemy,
    EnemyLaser,
    Rock,
    Energy,
}

impl HazardTag {
    /// Projectiles the shield stops. Logs and vines pass under or over it.
    pub fn is_blocked_by_shield(self) -> bool {
        matches!(self, HazardTag::EnemyLaser | HazardTag::Rock)
    }
}

/// Physical region of the vehicle that reports contacts.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Zone {
    Tracks,
    Head,
    Body,
    Shield,
    Collector,
    RepairArm,
    EnergyBeam,
    Laser,
}

impl FromStr for Zone {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tracks" => Ok(Zone::Tracks),
            "head" => Ok(Zone::Head),
            "body" => Ok(Zone::Body),
            "shield" => Ok(Zone::Shield),
            "collector" => Ok(Zone::Collector),
            "repair" | "repairarm" => Ok(Zone::RepairArm),
            "beam" | "energybeam" => Ok(Zone::EnergyBeam),
            "laser" => Ok(Zone::Laser),
            other => Err(format!("unknown zone '{}'", other)),
        }
    }
}

/// Payload of a replicated station action.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub enum ActionCommand {
    Duck { down: bool },
    Hover { on: bool },
    Aim { angle: f32 },
    Repair { room: u8 },
    Shield { lane: f32 },
    Beam { lane: f32 },
}

impl ActionCommand {
    /// Station whose console issues this action.
    pub fn role(&self) -> Role {
        match self {
            ActionCommand::Duck { .. } | ActionCommand::Hover { .. } => Role::Movement,
            ActionCommand::Repair { .. } => Role::Repair,
            ActionCommand::Aim { .. } => Role::Weapons,
            ActionCommand::Shield { .. } => Role::Shields,
            ActionCommand::Beam { .. } => Role::Energy,
        }
    }
}

/// Delivery scope of a replicated command.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    AllPeers,
    /// Like `AllPeers`, and late joiners receive the latest value on connect.
    AllPeersBuffered,
    SpecificPeer(u8),
    HostOnly,
}

/// Buffered commands are replayed per channel, latest value only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferChannel {
    Health,
    Roles,
    Controls,
    TimeFlowing,
    Outcome,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum Command {
    SpawnHazard { kind: HazardKind },
    YourTurn,
    UpdateHealth { health: u8 },
    UpdateBattery { charge: f32 },
    RechargeBattery,
    TakeDamage,
    RotateRoles { round: u8 },
    SetControls { enabled: bool },
    SetTimeFlowing { flowing: bool },
    GameOver,
    Victory,
    SetAction { station: Role, action: ActionCommand },
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::SpawnHazard { .. } => "SpawnHazard",
            Command::YourTurn => "YourTurn",
            Command::UpdateHealth { .. } => "UpdateHealth",
            Command::UpdateBattery { .. } => "UpdateBattery",
            Command::RechargeBattery => "RechargeBattery",
            Command::TakeDamage => "TakeDamage",
            Command::RotateRoles { .. } => "RotateRoles",
            Command::SetControls { .. } => "SetControls",
            Command::SetTimeFlowing { .. } => "SetTimeFlowing",
            Command::GameOver => "GameOver",
            Command::Victory => "Victory",
            Command::SetAction { .. } => "SetAction",
        }
    }

    pub fn buffer_channel(&self) -> Option<BufferChannel> {
        match self {
            Command::UpdateHealth { .. } => Some(BufferChannel::Health),
            Command::RotateRoles { .. } => Some(BufferChannel::Roles),
            Command::SetControls { .. } => Some(BufferChannel::Controls),
            Command::SetTimeFlowing { .. } => Some(BufferChannel::TimeFlowing),
            Command::GameOver | Command::Victory => Some(BufferChannel::Outcome),
            _ => None,
        }
    }

    /// The only scope a peer may originate this command with, if any.
    /// Everything else is decided by the host alone.
    pub fn peer_scope(&self) -> Option<Scope> {
        match self {
            Command::SetAction { .. } => Some(Scope::AllPeers),
            Command::TakeDamage | Command::RechargeBattery => Some(Scope::HostOnly),
            _ => None,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub enum Packet {
    Connect {
        client_version: u32,
    },
    Heartbeat {
        timestamp: u64,
    },
    /// Peer asks the host to deliver `command` to `scope`.
    Request {
        sequence: u32,
        scope: Scope,
        command: Command,
    },
    Disconnect,

    Connected {
        peer_id: u32,
        slot: u8,
    },
    Replicated {
        sequence: u32,
        command: Command,
    },
    Disconnected {
        reason: String,
    },
}

pub fn peer_color(slot: u8) -> &'static str {
    PEER_COLORS[slot as usize % PEER_COLORS.len()]
}

/// Number of battery bands lit at `charge`; band `i` needs `i * 20%` of `full`.
pub fn lit_battery_bands(charge: f32, full: f32) -> usize {
    (0..BATTERY_BANDS)
        .filter(|&i| charge >= i as f32 * full / BATTERY_BANDS as f32)
        .count()
}

/// Current wall-clock time in milliseconds
pub fn timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis() as u64
}
