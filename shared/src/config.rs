//! Session tuning shared by the host orchestrator and its tests.

use crate::{
    HazardKind, BATTERY_DRAIN, FULL_CHARGE, INITIAL_SPAWN_INTERVAL, MAX_HEALTH,
    SPAWN_INTERVAL_STEP, VICTORY_ROUND,
};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("max health must be at least 1")]
    NoHealth,
    #[error("full battery charge must be positive, got {0}")]
    EmptyBattery(f32),
    #[error("battery drain must not be negative, got {0}")]
    NegativeDrain(f32),
    #[error("round duration range {min}..={max} is empty or not positive")]
    RoundDuration { min: f32, max: f32 },
    #[error("spawn interval step must be positive, got {0}")]
    SpawnIntervalStep(f32),
    #[error("spawn interval would reach {0} before the victory round")]
    SpawnIntervalExhausted(f32),
    #[error("victory round must be at least 1")]
    NoRounds,
}

/// Every tunable of a session; `Default` mirrors the shipped game.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub max_health: u8,
    pub full_charge: f32,
    /// Charge lost per second while the energy station is manned.
    pub battery_drain: f32,
    pub initial_spawn_interval: f32,
    pub spawn_interval_step: f32,
    pub victory_round: u8,
    /// In-round time before the rotation countdown starts, drawn per round.
    pub round_duration_min: f32,
    pub round_duration_max: f32,
    /// Countdown between the end of a round and the role rotation.
    pub rotation_delay: f32,
    /// Frozen window after start and after each rotation. Zero skips it.
    pub briefing_duration: f32,
    /// Obstacle spawns between two energy pickups.
    pub energy_spawn_every: u32,
    /// Value the pickup counter takes at start and after each rotation.
    pub energy_counter_reset: u32,
    /// Obstacles in station order; the round offsets into this list.
    pub spawnable: Vec<HazardKind>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_health: MAX_HEALTH,
            full_charge: FULL_CHARGE,
            battery_drain: BATTERY_DRAIN,
            initial_spawn_interval: INITIAL_SPAWN_INTERVAL,
            spawn_interval_step: SPAWN_INTERVAL_STEP,
            victory_round: VICTORY_ROUND,
            round_duration_min: 20.0,
            round_duration_max: 40.0,
            rotation_delay: 12.0,
            briefing_duration: 16.0,
            energy_spawn_every: 5,
            energy_counter_reset: 3,
            spawnable: HazardKind::OBSTACLES.to_vec(),
        }
    }
}

impl SessionConfig {
    /// Rejects settings that would break the session invariants.
    ///
    /// An empty `spawnable` list is deliberately allowed: the orchestrator
    /// logs it and skips spawning instead.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_health == 0 {
            return Err(ConfigError::NoHealth);
        }
        if self.full_charge <= 0.0 {
            return Err(ConfigError::EmptyBattery(self.full_charge));
        }
        if self.battery_drain < 0.0 {
            return Err(ConfigError::NegativeDrain(self.battery_drain));
        }
        if self.round_duration_min <= 0.0 || self.round_duration_min > self.round_duration_max {
            return Err(ConfigError::RoundDuration {
                min: self.round_duration_min,
                max: self.round_duration_max,
            });
        }
        if self.victory_round == 0 {
            return Err(ConfigError::NoRounds);
        }
        if self.spawn_interval_step <= 0.0 {
            return Err(ConfigError::SpawnIntervalStep(self.spawn_interval_step));
        }

        // The last playable round is victory_round - 1.
        let last_interval = self.initial_spawn_interval
            - self.spawn_interval_step * (self.victory_round - 1) as f32;
        if last_interval <= 0.0 {
            return Err(ConfigError::SpawnIntervalExhausted(last_interval));
        }

        Ok(())
    }
}
