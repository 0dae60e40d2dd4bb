//! Station actions as tick-driven state machines
//!
//! Every peer owns one `ActionPlayer` and feeds it the same replicated
//! `SetAction` commands in the same order, so the progress values below stay
//! in lockstep without ever being sent over the wire. Local input never
//! writes to these slots directly: `request` validates and produces the
//! command, and only `apply` (reached through the network loop, even for the
//! sender) changes state.
//!
//! A slot is a small phase machine advanced by `tick(dt)`. Commanding a slot
//! again replaces whatever phase it was in; there is no separate cancel.

use crate::{ActionCommand, Command, Role};
use log::{debug, warn};
use std::ops::RangeInclusive;
use thiserror::Error;

pub const ACTION_DWELL: f32 = 5.0;
pub const WEAPON_COOLDOWN: f32 = 1.0;

pub const DUCK_MAX: f32 = 0.6;
pub const DUCK_TIME: f32 = 0.25;
pub const HOVER_MAX: f32 = 1.7;
pub const HOVER_TIME: f32 = 0.35;
pub const SHIELD_MAX: f32 = 0.8;
pub const SHIELD_TIME: f32 = 0.25;
pub const BEAM_MAX: f32 = 2.5;
pub const BEAM_TIME: f32 = 0.5;
pub const SWAP_MAX: f32 = 0.9;
pub const SWAP_TIME: f32 = 0.5;

/// Arm rotation speed in degrees per second.
pub const AIM_RATE: f32 = 180.0;
pub const AIM_REST: f32 = -7.0;
pub const LASER_RANGE: f32 = 15.0;
pub const LASER_TIME: f32 = 1.0;

pub const REPAIR_MOVE_TIME: f32 = 0.5;
pub const REPAIR_HOLD_TIME: f32 = 2.0;
pub const REPAIR_ROOMS: RangeInclusive<u8> = 1..=5;

#[derive(Debug, Error, PartialEq)]
pub enum RequestError {
    #[error("station controls are disabled")]
    ControlsDisabled,
    #[error("{action:?} belongs to {owner:?}, this console is {station:?}")]
    WrongStation {
        station: Role,
        owner: Role,
        action: ActionCommand,
    },
    #[error("weapon cooling down, {remaining:.2}s left")]
    WeaponCooling { remaining: f32 },
    #[error("room {0} is not a repair target")]
    InvalidRoom(u8),
    #[error("non-finite action value")]
    NonFinite,
}

/// Notable moments produced while ticking, for the embedding peer.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionEvent {
    LaserFired { angle: f32 },
    RepairArrived { room: u8 },
    SwapMidpoint,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TogglePhase {
    Idle,
    Rising,
    Holding { elapsed: f32 },
    Falling,
}

/// Raise-hold-lower slot used by duck and hover.
#[derive(Debug, Clone)]
pub struct Toggle {
    progress: f32,
    max: f32,
    rate: f32,
    phase: TogglePhase,
}

impl Toggle {
    fn new(max: f32, animation_time: f32) -> Self {
        Self {
            progress: 0.0,
            max,
            rate: max / animation_time,
            phase: TogglePhase::Idle,
        }
    }

    fn command(&mut self, on: bool) {
        self.phase = if on {
            TogglePhase::Rising
        } else if self.progress > 0.0 {
            TogglePhase::Falling
        } else {
            TogglePhase::Idle
        };
    }

    /// `blocked` holds a rising slot in place until its exclusive partner is down.
    fn advance(&mut self, dt: f32, blocked: bool) {
        match self.phase {
            TogglePhase::Idle => {}
            TogglePhase::Rising => {
                if blocked {
                    return;
                }
                self.progress = (self.progress + self.rate * dt).min(self.max);
                if self.progress >= self.max {
                    self.phase = TogglePhase::Holding { elapsed: 0.0 };
                }
            }
            TogglePhase::Holding { elapsed } => {
                let elapsed = elapsed + dt;
                self.phase = if elapsed >= ACTION_DWELL {
                    TogglePhase::Falling
                } else {
                    TogglePhase::Holding { elapsed }
                };
            }
            TogglePhase::Falling => {
                self.progress = (self.progress - self.rate * dt).max(0.0);
                if self.progress <= 0.0 {
                    self.phase = TogglePhase::Idle;
                }
            }
        }
    }

    pub fn progress(&self) -> f32 {
        self.progress
    }

    pub fn phase(&self) -> TogglePhase {
        self.phase
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EmitterPhase {
    Idle,
    /// Fading out before moving to another lane.
    Clearing { to: f32 },
    Raising,
    Holding { elapsed: f32 },
    Lowering,
}

/// Lane-positioned field used by shield and beam.
#[derive(Debug, Clone)]
pub struct Emitter {
    progress: f32,
    max: f32,
    rate: f32,
    lane: f32,
    phase: EmitterPhase,
    active: bool,
}

impl Emitter {
    fn new(max: f32, animation_time: f32) -> Self {
        Self {
            progress: 0.0,
            max,
            rate: max / animation_time,
            lane: 0.0,
            phase: EmitterPhase::Idle,
            active: false,
        }
    }

    fn command(&mut self, lane: f32) {
        self.active = true;
        self.phase = if (lane - self.lane).abs() > f32::EPSILON {
            EmitterPhase::Clearing { to: lane }
        } else {
            EmitterPhase::Raising
        };
    }

    fn advance(&mut self, dt: f32) {
        match self.phase {
            EmitterPhase::Idle => {}
            EmitterPhase::Clearing { to } => {
                self.progress = (self.progress - self.rate * dt).max(0.0);
                if self.progress <= 0.0 {
                    self.lane = to;
                    self.phase = EmitterPhase::Raising;
                }
            }
            EmitterPhase::Raising => {
                self.progress = (self.progress + self.rate * dt).min(self.max);
                if self.progress >= self.max {
                    self.phase = EmitterPhase::Holding { elapsed: 0.0 };
                }
            }
            EmitterPhase::Holding { elapsed } => {
                let elapsed = elapsed + dt;
                self.phase = if elapsed >= ACTION_DWELL {
                    EmitterPhase::Lowering
                } else {
                    EmitterPhase::Holding { elapsed }
                };
            }
            EmitterPhase::Lowering => {
                self.progress = (self.progress - self.rate * dt).max(0.0);
                if self.progress <= 0.0 {
                    self.phase = EmitterPhase::Idle;
                    self.active = false;
                }
            }
        }
    }

    pub fn progress(&self) -> f32 {
        self.progress
    }

    pub fn lane(&self) -> f32 {
        self.lane
    }

    pub fn phase(&self) -> EmitterPhase {
        self.phase
    }

    /// Whether the field's zone currently reports contacts.
    pub fn is_active(&self) -> bool {
        self.active
    }
}

/// Weapon arm: turn to the commanded angle, then sweep the laser once.
#[derive(Debug, Clone)]
pub struct Aim {
    angle: f32,
    target: Option<f32>,
    laser: Option<f32>,
}

impl Aim {
    fn new() -> Self {
        Self {
            angle: AIM_REST,
            target: None,
            laser: None,
        }
    }

    fn command(&mut self, angle: f32) {
        self.target = Some(angle);
    }

    /// Returns true on the tick the arm arrives and fires.
    fn advance(&mut self, dt: f32) -> bool {
        if let Some(elapsed) = self.laser {
            let elapsed = elapsed + dt;
            self.laser = (elapsed < LASER_TIME).then_some(elapsed);
        }

        let Some(target) = self.target else {
            return false;
        };

        let step = AIM_RATE * dt;
        if (target - self.angle).abs() <= step {
            self.angle = target;
            self.target = None;
            self.laser = Some(0.0);
            true
        } else {
            self.angle += step * (target - self.angle).signum();
            false
        }
    }

    pub fn angle(&self) -> f32 {
        self.angle
    }

    pub fn is_turning(&self) -> bool {
        self.target.is_some()
    }

    /// Distance travelled by the current shot, if one is in flight.
    pub fn laser_offset(&self) -> Option<f32> {
        self.laser.map(|elapsed| LASER_RANGE * elapsed / LASER_TIME)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RepairPhase {
    Rest,
    Extending { elapsed: f32, from: f32 },
    Holding { elapsed: f32 },
    Retracting { elapsed: f32 },
}

/// Repair arm pose: 0 at rest, 1 at the commanded room.
#[derive(Debug, Clone)]
pub struct RepairArm {
    room: u8,
    pose: f32,
    phase: RepairPhase,
}

impl RepairArm {
    fn new() -> Self {
        Self {
            room: 0,
            pose: 0.0,
            phase: RepairPhase::Rest,
        }
    }

    fn command(&mut self, room: u8) {
        self.room = room;
        self.phase = RepairPhase::Extending {
            elapsed: 0.0,
            from: self.pose,
        };
    }

    /// Returns true on the tick the arm reaches the room.
    fn advance(&mut self, dt: f32) -> bool {
        match self.phase {
            RepairPhase::Rest => false,
            RepairPhase::Extending { elapsed, from } => {
                let elapsed = elapsed + dt;
                if elapsed >= REPAIR_MOVE_TIME {
                    self.pose = 1.0;
                    self.phase = RepairPhase::Holding { elapsed: 0.0 };
                    true
                } else {
                    self.pose = from + (1.0 - from) * elapsed / REPAIR_MOVE_TIME;
                    self.phase = RepairPhase::Extending { elapsed, from };
                    false
                }
            }
            RepairPhase::Holding { elapsed } => {
                let elapsed = elapsed + dt;
                self.phase = if elapsed >= REPAIR_HOLD_TIME {
                    RepairPhase::Retracting { elapsed: 0.0 }
                } else {
                    RepairPhase::Holding { elapsed }
                };
                false
            }
            RepairPhase::Retracting { elapsed } => {
                let elapsed = elapsed + dt;
                if elapsed >= REPAIR_MOVE_TIME {
                    self.pose = 0.0;
                    self.phase = RepairPhase::Rest;
                } else {
                    self.pose = 1.0 - elapsed / REPAIR_MOVE_TIME;
                    self.phase = RepairPhase::Retracting { elapsed };
                }
                false
            }
        }
    }

    pub fn room(&self) -> u8 {
        self.room
    }

    pub fn pose(&self) -> f32 {
        self.pose
    }

    pub fn phase(&self) -> RepairPhase {
        self.phase
    }

    /// The arm touches its room only while holding there.
    pub fn is_deployed(&self) -> bool {
        matches!(self.phase, RepairPhase::Holding { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SwapPhase {
    Settled,
    Closing,
    Opening,
}

/// Crew swap shutter played on every role rotation.
#[derive(Debug, Clone)]
pub struct Swap {
    progress: f32,
    phase: SwapPhase,
}

impl Swap {
    fn new() -> Self {
        Self {
            progress: SWAP_MAX,
            phase: SwapPhase::Settled,
        }
    }

    /// Returns true on the tick the shutter is fully closed.
    fn advance(&mut self, dt: f32) -> bool {
        let rate = SWAP_MAX / SWAP_TIME;
        match self.phase {
            SwapPhase::Settled => false,
            SwapPhase::Closing => {
                self.progress = (self.progress - rate * dt).max(0.0);
                if self.progress <= 0.0 {
                    self.phase = SwapPhase::Opening;
                    true
                } else {
                    false
                }
            }
            SwapPhase::Opening => {
                self.progress = (self.progress + rate * dt).min(SWAP_MAX);
                if self.progress >= SWAP_MAX {
                    self.phase = SwapPhase::Settled;
                }
                false
            }
        }
    }

    pub fn progress(&self) -> f32 {
        self.progress
    }

    pub fn phase(&self) -> SwapPhase {
        self.phase
    }
}

/// All action slots of the shared vehicle as seen by one peer.
#[derive(Debug, Clone)]
pub struct ActionPlayer {
    duck: Toggle,
    hover: Toggle,
    aim: Aim,
    repair: RepairArm,
    shield: Emitter,
    beam: Emitter,
    swap: Swap,
    weapon_timer: f32,
}

impl ActionPlayer {
    pub fn new() -> Self {
        Self {
            duck: Toggle::new(DUCK_MAX, DUCK_TIME),
            hover: Toggle::new(HOVER_MAX, HOVER_TIME),
            aim: Aim::new(),
            repair: RepairArm::new(),
            shield: Emitter::new(SHIELD_MAX, SHIELD_TIME),
            beam: Emitter::new(BEAM_MAX, BEAM_TIME),
            swap: Swap::new(),
            weapon_timer: WEAPON_COOLDOWN,
        }
    }

    /// Validates local input and turns it into the command to replicate.
    ///
    /// Nothing changes here except the weapon cooldown: the action itself
    /// only takes effect when the command comes back through `apply`.
    pub fn request(
        &mut self,
        station: Role,
        action: ActionCommand,
        controls_enabled: bool,
    ) -> Result<Command, RequestError> {
        if !controls_enabled {
            return Err(RequestError::ControlsDisabled);
        }
        if action.role() != station {
            return Err(RequestError::WrongStation {
                station,
                owner: action.role(),
                action,
            });
        }

        match action {
            ActionCommand::Aim { angle } => {
                if !angle.is_finite() {
                    return Err(RequestError::NonFinite);
                }
                if self.weapon_timer < WEAPON_COOLDOWN {
                    return Err(RequestError::WeaponCooling {
                        remaining: WEAPON_COOLDOWN - self.weapon_timer,
                    });
                }
                self.weapon_timer = 0.0;
            }
            ActionCommand::Repair { room } if !REPAIR_ROOMS.contains(&room) => {
                return Err(RequestError::InvalidRoom(room));
            }
            ActionCommand::Shield { lane } | ActionCommand::Beam { lane } if !lane.is_finite() => {
                return Err(RequestError::NonFinite);
            }
            _ => {}
        }

        Ok(Command::SetAction { station, action })
    }

    /// Applies a replicated action. The weapon cooldown is not checked here.
    pub fn apply(&mut self, action: &ActionCommand) {
        debug!("Applying {:?}", action);
        match *action {
            ActionCommand::Duck { down } => {
                if down {
                    self.hover.command(false);
                }
                self.duck.command(down);
            }
            ActionCommand::Hover { on } => {
                if on {
                    self.duck.command(false);
                }
                self.hover.command(on);
            }
            ActionCommand::Aim { angle } => {
                if angle.is_finite() {
                    self.aim.command(angle);
                } else {
                    warn!("Ignoring non-finite aim angle");
                }
            }
            ActionCommand::Repair { room } => {
                if REPAIR_ROOMS.contains(&room) {
                    self.repair.command(room);
                } else {
                    warn!("Ignoring repair of unknown room {}", room);
                }
            }
            ActionCommand::Shield { lane } | ActionCommand::Beam { lane } if !lane.is_finite() => {
                warn!("Ignoring non-finite lane in {:?}", action);
            }
            ActionCommand::Shield { lane } => self.shield.command(lane),
            ActionCommand::Beam { lane } => self.beam.command(lane),
        }
    }

    /// Starts the crew swap animation; driven by role rotation, not input.
    pub fn swap_places(&mut self) {
        self.swap.phase = SwapPhase::Closing;
    }

    pub fn tick(&mut self, dt: f32) -> Vec<ActionEvent> {
        let mut events = Vec::new();

        self.weapon_timer += dt;

        // Duck and hover never hold progress together: a rising slot waits
        // for its partner to settle at zero.
        let hover_up = self.hover.progress() > 0.0;
        self.duck.advance(dt, hover_up);
        let duck_up = self.duck.progress() > 0.0;
        self.hover.advance(dt, duck_up);

        if self.aim.advance(dt) {
            events.push(ActionEvent::LaserFired {
                angle: self.aim.angle(),
            });
        }
        if self.repair.advance(dt) {
            events.push(ActionEvent::RepairArrived {
                room: self.repair.room(),
            });
        }
        self.shield.advance(dt);
        self.beam.advance(dt);
        if self.swap.advance(dt) {
            events.push(ActionEvent::SwapMidpoint);
        }

        events
    }

    pub fn duck(&self) -> &Toggle {
        &self.duck
    }

    pub fn hover(&self) -> &Toggle {
        &self.hover
    }

    pub fn aim(&self) -> &Aim {
        &self.aim
    }

    pub fn repair(&self) -> &RepairArm {
        &self.repair
    }

    pub fn shield(&self) -> &Emitter {
        &self.shield
    }

    pub fn beam(&self) -> &Emitter {
        &self.beam
    }

    pub fn swap(&self) -> &Swap {
        &self.swap
    }

    pub fn weapon_ready(&self) -> bool {
        self.weapon_timer >= WEAPON_COOLDOWN
    }
}

impl Default for ActionPlayer {
    fn default() -> Self {
        Self::new()
    }
}
