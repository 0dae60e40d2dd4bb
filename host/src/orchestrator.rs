use crate::session::{Outbound, Phase, Session};
use log::{debug, error, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::{lit_battery_bands, Command, ConfigError, HazardKind, Role, Scope, SessionConfig};

/// Draws uniformly from `0..population`, bumping the draw by one when it
/// repeats `last`. Never rejects, so a population of two alternates.
///
/// An empty population yields 0; callers check for it first.
pub fn pick_without_repeat<R: Rng + ?Sized>(
    rng: &mut R,
    population: usize,
    last: Option<usize>,
) -> usize {
    if population == 0 {
        return 0;
    }
    let draw = rng.gen_range(0..population);
    if Some(draw) == last {
        (draw + 1) % population
    } else {
        draw
    }
}

/// Picks an occupied slot, never `last_slot` again while anyone else is
/// seated. A `last_slot` that has since left the roster does not count.
fn pick_slot<R: Rng + ?Sized>(rng: &mut R, roster: &[u8], last_slot: Option<u8>) -> u8 {
    let last = last_slot.and_then(|last| roster.iter().position(|&slot| slot == last));
    roster[pick_without_repeat(rng, roster.len(), last)]
}

/// Sole authority over round progression, spawning, the battery and
/// terminal outcomes.
///
/// The orchestrator never touches sockets. Every decision is queued as an
/// [`Outbound`] and the network layer drains the queue after each call.
pub struct Orchestrator<R = StdRng> {
    config: SessionConfig,
    session: Session,
    phase: Phase,
    rng: R,
    /// Occupied roster slots, ascending.
    roster: Vec<u8>,
    spawn_timer: f32,
    round_timer: f32,
    round_duration: f32,
    energy_counter: u32,
    lit_bands: usize,
    outbound: Vec<Outbound>,
}

impl Orchestrator<StdRng> {
    pub fn from_entropy(config: SessionConfig) -> Result<Self, ConfigError> {
        Self::new(config, StdRng::from_entropy())
    }
}

impl<R: Rng> Orchestrator<R> {
    pub fn new(config: SessionConfig, rng: R) -> Result<Self, ConfigError> {
        config.validate()?;

        let session = Session::new(&config);
        let lit_bands = lit_battery_bands(session.battery_charge, config.full_charge);
        let energy_counter = config.energy_counter_reset;
        let round_duration = config.round_duration_max;

        Ok(Self {
            config,
            session,
            phase: Phase::Lobby,
            rng,
            roster: Vec::new(),
            spawn_timer: 0.0,
            round_timer: 0.0,
            round_duration,
            energy_counter,
            lit_bands,
            outbound: Vec::new(),
        })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn round_duration(&self) -> f32 {
        self.round_duration
    }

    pub fn roster(&self) -> &[u8] {
        &self.roster
    }

    /// Replaces the set of occupied roster slots.
    pub fn set_roster(&mut self, mut slots: Vec<u8>) {
        slots.sort_unstable();
        slots.dedup();
        debug!("Roster is now {:?}", slots);
        self.roster = slots;
    }

    /// True while any connected peer sits at the energy console this round.
    pub fn energy_manned(&self) -> bool {
        self.roster
            .iter()
            .any(|&slot| Role::for_slot(slot, self.session.round_index) == Role::Energy)
    }

    /// Takes everything decided since the last call, in decision order.
    pub fn drain_outbound(&mut self) -> Vec<Outbound> {
        std::mem::take(&mut self.outbound)
    }

    /// Leaves the lobby. Publishes the opening values and enters the
    /// first briefing.
    pub fn start(&mut self) {
        if self.phase != Phase::Lobby {
            warn!("Ignoring start request, session already in {:?}", self.phase);
            return;
        }

        info!("Session starting with {} peers", self.roster.len());

        let health = self.session.current_health;
        self.send(Scope::AllPeersBuffered, Command::UpdateHealth { health });
        self.send(Scope::AllPeersBuffered, Command::RotateRoles { round: 0 });
        self.broadcast_battery(true);
        self.round_duration = self.draw_round_duration();
        self.enter_briefing();
    }

    pub fn tick(&mut self, dt: f32) {
        if !dt.is_finite() || dt <= 0.0 {
            return;
        }

        match self.phase {
            Phase::Lobby | Phase::GameOver | Phase::Victory => {}
            Phase::Briefing { remaining } => {
                let remaining = remaining - dt;
                if remaining <= 0.0 {
                    self.resume();
                } else {
                    self.phase = Phase::Briefing { remaining };
                }
            }
            Phase::Countdown { remaining } => {
                let remaining = remaining - dt;
                if remaining <= 0.0 {
                    self.advance_round();
                } else {
                    self.phase = Phase::Countdown { remaining };
                }
            }
            Phase::Running => self.run(dt),
        }
    }

    fn run(&mut self, dt: f32) {
        self.spawn_timer += dt;
        if self.spawn_timer >= self.session.spawn_interval {
            self.spawn_timer -= self.session.spawn_interval;
            if self.spawn_obstacle() {
                self.energy_counter += 1;
            }
        }

        self.drain_battery(dt);
        if self.phase.is_terminal() {
            return;
        }

        if self.energy_counter >= self.config.energy_spawn_every && self.energy_manned() {
            self.spawn_energy();
            self.energy_counter = 0;
        }

        self.round_timer += dt;
        if self.round_timer >= self.round_duration {
            self.begin_countdown();
        }
    }

    /// Removes one point of health. Returns whether the hit counted.
    ///
    /// Hits are ignored before the session starts, once it has ended and
    /// at zero health, so game over fires exactly once.
    pub fn take_damage(&mut self) -> bool {
        if self.phase == Phase::Lobby || self.phase.is_terminal() {
            debug!("Ignoring damage in {:?}", self.phase);
            return false;
        }
        if self.session.current_health == 0 {
            return false;
        }

        self.session.current_health -= 1;
        let health = self.session.current_health;
        info!("Vehicle hit, health now {}", health);
        self.send(Scope::AllPeersBuffered, Command::UpdateHealth { health });

        if health == 0 {
            info!("Game over");
            self.finish(Command::GameOver);
        }
        true
    }

    pub fn recharge_battery(&mut self) {
        if self.phase == Phase::Lobby || self.phase.is_terminal() {
            debug!("Ignoring recharge in {:?}", self.phase);
            return;
        }

        self.session.battery_charge = self.config.full_charge;
        debug!("Battery recharged");
        self.broadcast_battery(true);
    }

    /// Entry point for host-only commands a peer routed to us.
    pub fn handle_request(&mut self, from_slot: u8, command: Command) {
        match command {
            Command::TakeDamage => {
                debug!("Slot {} reports damage", from_slot);
                self.take_damage();
            }
            Command::RechargeBattery => {
                debug!("Slot {} collected energy", from_slot);
                self.recharge_battery();
            }
            other => {
                warn!(
                    "Slot {} sent {} to the host, which only accepts damage and recharge",
                    from_slot, other
                );
            }
        }
    }

    fn send(&mut self, scope: Scope, command: Command) {
        self.outbound.push(Outbound { scope, command });
    }

    fn spawn_obstacle(&mut self) -> bool {
        let population = self.roster.len();
        if population == 0 {
            warn!("No peers connected, skipping spawn");
            return false;
        }
        if self.config.spawnable.is_empty() {
            error!("No spawnable hazards configured, skipping spawn");
            return false;
        }

        let slot = pick_slot(&mut self.rng, &self.roster, self.session.last_spawned_player);
        self.session.last_spawned_player = Some(slot);

        // Kinds follow the stations manned this round.
        let draw = pick_without_repeat(&mut self.rng, population, self.session.last_obstacle_kind);
        self.session.last_obstacle_kind = Some(draw);
        let offset = (draw + self.session.round_index as usize) % self.config.spawnable.len();
        let kind = self.config.spawnable[offset];

        debug!("Spawning {} for slot {}", kind.label(), slot);
        self.send(Scope::SpecificPeer(slot), Command::YourTurn);
        self.send(Scope::SpecificPeer(slot), Command::SpawnHazard { kind });
        true
    }

    fn spawn_energy(&mut self) {
        if self.roster.is_empty() {
            return;
        }

        let slot = pick_slot(&mut self.rng, &self.roster, self.session.last_energy_player);
        self.session.last_energy_player = Some(slot);

        debug!("Spawning energy for slot {}", slot);
        self.send(
            Scope::SpecificPeer(slot),
            Command::SpawnHazard {
                kind: HazardKind::Energy,
            },
        );
    }

    fn drain_battery(&mut self, dt: f32) {
        if !self.energy_manned() || self.config.battery_drain == 0.0 {
            return;
        }

        self.session.battery_charge -= dt * self.config.battery_drain;
        if self.session.battery_charge <= 0.0 {
            info!("Battery depleted, backup battery kicks in");
            self.session.battery_charge = self.config.full_charge;
            self.broadcast_battery(true);
            self.take_damage();
        } else {
            self.broadcast_battery(false);
        }
    }

    fn broadcast_battery(&mut self, force: bool) {
        let bands = lit_battery_bands(self.session.battery_charge, self.config.full_charge);
        if force || bands != self.lit_bands {
            self.lit_bands = bands;
            let charge = self.session.battery_charge;
            self.send(Scope::AllPeers, Command::UpdateBattery { charge });
        }
    }

    fn begin_countdown(&mut self) {
        info!(
            "Round {} over, rotating in {:.0}s",
            self.session.round_index, self.config.rotation_delay
        );
        self.set_time_flowing(false);
        if self.config.rotation_delay <= 0.0 {
            self.advance_round();
        } else {
            self.phase = Phase::Countdown {
                remaining: self.config.rotation_delay,
            };
        }
    }

    fn advance_round(&mut self) {
        self.session.round_index += 1;
        let round = self.session.round_index;

        if round >= self.config.victory_round {
            info!("Victory after {} rounds", round);
            self.finish(Command::Victory);
            return;
        }

        info!("Rotating stations for round {}", round);
        self.send(Scope::AllPeersBuffered, Command::RotateRoles { round });
        self.session.current_station = Role::from_index(round as usize);

        self.session.spawn_interval -= self.config.spawn_interval_step;
        self.round_timer = 0.0;
        self.energy_counter = self.config.energy_counter_reset;
        self.session.battery_charge = self.config.full_charge;
        self.broadcast_battery(true);

        let health = (self.session.current_health + 1).min(self.config.max_health);
        self.session.current_health = health;
        self.send(Scope::AllPeersBuffered, Command::UpdateHealth { health });

        self.round_duration = self.draw_round_duration();
        self.enter_briefing();
    }

    fn finish(&mut self, outcome: Command) {
        self.phase = if outcome == Command::Victory {
            Phase::Victory
        } else {
            Phase::GameOver
        };
        self.set_time_flowing(false);
        self.send(Scope::AllPeersBuffered, outcome);
        self.set_controls(false);
    }

    fn enter_briefing(&mut self) {
        if self.config.briefing_duration <= 0.0 {
            self.resume();
            return;
        }

        self.phase = Phase::Briefing {
            remaining: self.config.briefing_duration,
        };
        self.set_controls(false);
        self.set_time_flowing(false);
    }

    fn resume(&mut self) {
        debug!("Round {} running", self.session.round_index);
        self.phase = Phase::Running;
        self.set_controls(true);
        self.set_time_flowing(true);
    }

    fn set_controls(&mut self, enabled: bool) {
        self.session.controls_enabled = enabled;
        self.send(Scope::AllPeersBuffered, Command::SetControls { enabled });
    }

    fn set_time_flowing(&mut self, flowing: bool) {
        self.session.time_flowing = flowing;
        self.send(Scope::AllPeersBuffered, Command::SetTimeFlowing { flowing });
    }

    fn draw_round_duration(&mut self) -> f32 {
        let (min, max) = (self.config.round_duration_min, self.config.round_duration_max);
        if min >= max {
            min
        } else {
            self.rng.gen_range(min..=max)
        }
    }
}
