//! Peer-side session replica and command application
//!
//! A `PeerState` is everything one station knows. Its session values are a
//! read-only replica: they change only when a replicated command arrives,
//! and every handler writes absolute values so duplicated delivery is
//! harmless. Local input and local contacts only ever *produce* commands,
//! which the network loop sends to the host and, for actions, receives back
//! like every other peer.

use crate::hazards::{FieldEvent, HazardField};
use crate::hud::HudProjector;
use crate::resolvers::{resolve_enter, resolve_stay, ZoneStatus};
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::actions::{ActionEvent, ActionPlayer, RequestError};
use shared::{peer_color, ActionCommand, Command, Role, Zone, FULL_CHARGE, MAX_HEALTH};

/// Fixed physics step used for sustained contacts.
pub const PHYSICS_DT: f32 = 0.02;
/// Longest sustained contact; no hazard outlives it.
pub const MAX_CONTACT: f32 = 30.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    GameOver,
    Victory,
}

/// Last replicated session values seen by this peer.
#[derive(Debug, Clone, PartialEq)]
pub struct Replica {
    pub health: u8,
    pub battery: f32,
    pub round: u8,
    pub controls_enabled: bool,
    pub time_flowing: bool,
    pub outcome: Option<Outcome>,
}

impl Default for Replica {
    fn default() -> Self {
        Self {
            health: MAX_HEALTH,
            battery: FULL_CHARGE,
            round: 0,
            controls_enabled: false,
            time_flowing: false,
            outcome: None,
        }
    }
}

pub struct PeerState<R = StdRng> {
    slot: Option<u8>,
    replica: Replica,
    actions: ActionPlayer,
    field: HazardField,
    hud: HudProjector,
    rng: R,
    turns: u32,
}

impl PeerState<StdRng> {
    pub fn from_entropy() -> Self {
        Self::new(StdRng::from_entropy())
    }
}

impl<R: Rng> PeerState<R> {
    pub fn new(rng: R) -> Self {
        Self {
            slot: None,
            replica: Replica::default(),
            actions: ActionPlayer::new(),
            field: HazardField::new(),
            hud: HudProjector::new(),
            rng,
            turns: 0,
        }
    }

    /// Seats this peer once the host has assigned its roster slot.
    pub fn set_slot(&mut self, slot: u8) {
        info!("Seated in slot {} ({})", slot, peer_color(slot));
        self.slot = Some(slot);
        self.field.set_color(peer_color(slot));
        if let Some(station) = self.station() {
            self.hud.on_role_changed(station);
        }
    }

    pub fn slot(&self) -> Option<u8> {
        self.slot
    }

    /// Station this peer mans in the current replicated round.
    pub fn station(&self) -> Option<Role> {
        self.slot
            .map(|slot| Role::for_slot(slot, self.replica.round))
    }

    pub fn replica(&self) -> &Replica {
        &self.replica
    }

    pub fn actions(&self) -> &ActionPlayer {
        &self.actions
    }

    pub fn hazards(&self) -> &HazardField {
        &self.field
    }

    pub fn hud(&self) -> &HudProjector {
        &self.hud
    }

    /// Spawn notices received so far.
    pub fn turns(&self) -> u32 {
        self.turns
    }

    /// Applies one replicated command. Safe to call twice with the same
    /// command.
    pub fn apply(&mut self, command: &Command) {
        debug!("Applying {}", command);

        match command {
            Command::SpawnHazard { kind } => {
                if self.field.spawn(*kind, &mut self.rng).is_none() {
                    debug!("{} spawned nothing", kind.label());
                }
            }
            Command::YourTurn => {
                self.turns += 1;
                debug!("Host picked this station for a hazard");
            }
            Command::UpdateHealth { health } => {
                self.replica.health = (*health).min(MAX_HEALTH);
                self.hud.on_health_changed(self.replica.health);
            }
            Command::UpdateBattery { charge } => {
                self.replica.battery = charge.clamp(0.0, FULL_CHARGE);
                self.hud.on_battery_changed(self.replica.battery, FULL_CHARGE);
            }
            Command::RotateRoles { round } => {
                if *round != self.replica.round {
                    self.replica.round = *round;
                    self.actions.swap_places();
                    if let Some(station) = self.station() {
                        info!("Round {}: now manning {:?}", round, station);
                        self.hud.on_role_changed(station);
                    }
                }
            }
            Command::SetControls { enabled } => {
                self.replica.controls_enabled = *enabled;
            }
            Command::SetTimeFlowing { flowing } => {
                self.replica.time_flowing = *flowing;
            }
            Command::GameOver => {
                if self.replica.outcome.is_none() {
                    info!("Game over");
                }
                self.replica.outcome = Some(Outcome::GameOver);
                self.hud.on_game_over();
            }
            Command::Victory => {
                if self.replica.outcome.is_none() {
                    info!("Victory!");
                }
                self.replica.outcome = Some(Outcome::Victory);
                self.hud.on_victory();
            }
            Command::SetAction { station, action } => {
                if action.role() != *station {
                    warn!("{:?} does not belong to {:?}, ignoring", action, station);
                    return;
                }
                self.actions.apply(action);
            }
            Command::TakeDamage | Command::RechargeBattery => {
                warn!("{} is host-only and reached a peer, ignoring", command);
            }
        }
    }

    /// Validates local input; the returned command must go through the
    /// host before it changes anything.
    pub fn request_action(&mut self, action: ActionCommand) -> Result<Command, RequestError> {
        let Some(station) = self.station() else {
            return Err(RequestError::ControlsDisabled);
        };
        self.actions
            .request(station, action, self.replica.controls_enabled)
    }

    fn zone_status(&self) -> ZoneStatus {
        ZoneStatus {
            shield_active: self.actions.shield().is_active(),
            beam_active: self.actions.beam().is_active(),
            repair_deployed: self.actions.repair().is_deployed(),
        }
    }

    /// A hazard entered a zone. Returns the host-only request to route.
    pub fn on_enter(&mut self, zone: Zone, hazard_id: u32) -> Option<Command> {
        let status = self.zone_status();
        let Some(hazard) = self.field.get(hazard_id) else {
            warn!("No hazard #{} to enter {:?}", hazard_id, zone);
            return None;
        };

        let resolution = resolve_enter(zone, hazard, status);
        if resolution.destroy {
            self.field.remove(hazard_id);
        }
        resolution.request
    }

    /// A hazard stayed in a zone for one physics step.
    pub fn on_stay(&mut self, zone: Zone, hazard_id: u32, dt: f32) -> Option<Command> {
        let status = self.zone_status();
        let Some(hazard) = self.field.get_mut(hazard_id) else {
            warn!("No hazard #{} inside {:?}", hazard_id, zone);
            return None;
        };

        let resolution = resolve_stay(zone, hazard, dt, status);
        if resolution.destroy {
            self.field.remove(hazard_id);
        }
        resolution.request
    }

    /// Holds a hazard inside a zone for `seconds`, one physics step at a
    /// time. Action slots are not advanced.
    pub fn hold_contact(&mut self, zone: Zone, hazard_id: u32, seconds: f32) -> Vec<Command> {
        let mut requests = Vec::new();
        if !seconds.is_finite() || seconds <= 0.0 {
            warn!("Ignoring contact of {} seconds", seconds);
            return requests;
        }
        if seconds > MAX_CONTACT {
            warn!("Contact of {} seconds capped at {}", seconds, MAX_CONTACT);
        }
        let mut remaining = seconds.min(MAX_CONTACT);

        while remaining > 0.0 && self.field.get(hazard_id).is_some() {
            let dt = remaining.min(PHYSICS_DT);
            requests.extend(self.on_stay(zone, hazard_id, dt));
            self.physics_step();
            remaining -= dt;
        }
        requests
    }

    pub fn physics_step(&mut self) {
        self.field.end_physics_step();
    }

    /// Advances local animations and hazards. Returns host-only requests
    /// produced along the way.
    pub fn tick(&mut self, dt: f32) -> Vec<Command> {
        let mut requests = Vec::new();

        for event in self.actions.tick(dt) {
            match event {
                ActionEvent::LaserFired { angle } => debug!("Laser sweep at {:.1} degrees", angle),
                ActionEvent::RepairArrived { room } => debug!("Repair arm at room {}", room),
                ActionEvent::SwapMidpoint => debug!("Crew swapping seats"),
            }
        }

        self.hud.tick(dt);

        for event in self.field.tick(dt) {
            match event {
                FieldEvent::Overheated { .. } => requests.push(Command::TakeDamage),
                FieldEvent::Expired { id, tag } => debug!("{:?} #{} left the screen", tag, id),
                FieldEvent::EnemyFired { .. } => {}
            }
        }

        requests
    }
}
