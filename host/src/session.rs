//! Authoritative session data owned by the host

use shared::{Command, Role, Scope, SessionConfig};

/// Host-owned session values. Peers only ever see these through
/// replicated commands, never by sharing this struct.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub current_health: u8,
    pub battery_charge: f32,
    pub spawn_interval: f32,
    pub round_index: u8,
    /// Station manned by roster slot 0 this round.
    pub current_station: Role,
    /// Roster slot that received the previous obstacle.
    pub last_spawned_player: Option<u8>,
    pub last_obstacle_kind: Option<usize>,
    /// Roster slot that received the previous energy pickup.
    pub last_energy_player: Option<u8>,
    pub controls_enabled: bool,
    pub time_flowing: bool,
}

impl Session {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            current_health: config.max_health,
            battery_charge: config.full_charge,
            spawn_interval: config.initial_spawn_interval,
            round_index: 0,
            current_station: Role::from_index(0),
            last_spawned_player: None,
            last_obstacle_kind: None,
            last_energy_player: None,
            controls_enabled: false,
            time_flowing: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Phase {
    /// Waiting for the roster to fill.
    Lobby,
    /// Controls locked and time frozen while crews read their new station.
    Briefing { remaining: f32 },
    Running,
    /// Round over; spawning is frozen until the rotation.
    Countdown { remaining: f32 },
    GameOver,
    Victory,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::GameOver | Phase::Victory)
    }
}

/// A command the host wants delivered, with its delivery scope.
#[derive(Debug, Clone, PartialEq)]
pub struct Outbound {
    pub scope: Scope,
    pub command: Command,
}
