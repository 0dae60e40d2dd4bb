//! Hazard entities living on one peer's screen
//!
//! The host only says *what* to spawn and *for whom*. Everything after that
//! is local: position, speed, expiry and enemy fire never leave this peer,
//! and only their consequences (damage, recharge) travel back to the host.

use log::{debug, info};
use rand::Rng;
use shared::{HazardKind, HazardTag};

/// Seconds a hazard survives at unit speed.
pub const HAZARD_LIFETIME: f32 = 24.0;
pub const BASE_SPEED: f32 = 1.0;
/// Speed of an energy pickup inside an active beam.
pub const BEAM_SPEED: f32 = 4.0;
/// Horizontal position where moving hazards enter.
pub const SPAWN_X: f32 = 30.0;

pub const ENEMY_PRESENCE: f32 = 10.0;
pub const ENEMY_ENTRANCE: f32 = 1.0;
pub const ENEMY_FIRE_INTERVAL: f32 = 5.0;

/// Overheats burn out into damage unless repaired first.
pub const OVERHEAT_FUSE: f32 = 10.0;
pub const REPAIR_TIME: f32 = 2.0;

#[derive(Debug, Clone, PartialEq)]
pub struct Hazard {
    pub id: u32,
    pub tag: HazardTag,
    pub x: f32,
    pub speed: f32,
    pub age: f32,
    pub lifetime: f32,
    /// Colour of the peer it was spawned for; overheats stay untinted.
    pub color: Option<&'static str>,
    /// Continuous repair-arm contact so far.
    pub repair_contact: f32,
    repair_touched: bool,
    in_beam: bool,
    fire_timer: f32,
}

impl Hazard {
    fn new(id: u32, tag: HazardTag, color: Option<&'static str>) -> Self {
        let (x, speed, lifetime) = match tag {
            HazardTag::Overheat => (0.0, 0.0, OVERHEAT_FUSE),
            HazardTag::Enemy => (SPAWN_X, 0.0, ENEMY_PRESENCE),
            _ => (SPAWN_X, BASE_SPEED, HAZARD_LIFETIME / BASE_SPEED),
        };

        Self {
            id,
            tag,
            x,
            speed,
            age: 0.0,
            lifetime,
            color,
            repair_contact: 0.0,
            repair_touched: false,
            in_beam: false,
            fire_timer: 0.0,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.age >= self.lifetime
    }

    /// Counts one physics step of repair contact. Returns true once the
    /// contact has lasted long enough to fix the overheat.
    pub fn add_repair_contact(&mut self, dt: f32) -> bool {
        self.repair_touched = true;
        self.repair_contact += dt;
        self.repair_contact >= REPAIR_TIME
    }

    /// Re-arms the beam flag for the current physics step.
    pub fn mark_in_beam(&mut self) {
        self.in_beam = true;
    }
}

/// What happened to the field during a frame.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldEvent {
    Expired { id: u32, tag: HazardTag },
    /// An unrepaired overheat burnt out and damages the vehicle.
    Overheated { id: u32 },
    EnemyFired { enemy: u32, laser: u32 },
}

#[derive(Debug)]
pub struct HazardField {
    hazards: Vec<Hazard>,
    next_id: u32,
    color: Option<&'static str>,
}

impl HazardField {
    pub fn new() -> Self {
        Self {
            hazards: Vec::new(),
            next_id: 1,
            color: None,
        }
    }

    /// Tint for hazards spawned from now on.
    pub fn set_color(&mut self, color: &'static str) {
        self.color = Some(color);
    }

    /// Spawns the entity a host decision stands for. Fake energy is a
    /// decoy decision and spawns nothing.
    pub fn spawn<R: Rng + ?Sized>(&mut self, kind: HazardKind, rng: &mut R) -> Option<u32> {
        let tag = match kind {
            HazardKind::LogOrVine => {
                if rng.gen_bool(0.5) {
                    HazardTag::Log
                } else {
                    HazardTag::Vine
                }
            }
            HazardKind::Overheat => HazardTag::Overheat,
            HazardKind::Enemy => HazardTag::Enemy,
            HazardKind::Rock => HazardTag::Rock,
            HazardKind::Energy => HazardTag::Energy,
            HazardKind::FakeEnergy => {
                debug!("Fake energy, nothing to spawn");
                return None;
            }
        };

        let color = if kind.is_tinted() { self.color } else { None };
        let id = self.insert(tag, color);
        info!("Spawned {:?} #{}", tag, id);
        Some(id)
    }

    fn insert(&mut self, tag: HazardTag, color: Option<&'static str>) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        self.hazards.push(Hazard::new(id, tag, color));
        id
    }

    pub fn get(&self, id: u32) -> Option<&Hazard> {
        self.hazards.iter().find(|h| h.id == id)
    }

    pub fn get_mut(&mut self, id: u32) -> Option<&mut Hazard> {
        self.hazards.iter_mut().find(|h| h.id == id)
    }

    pub fn remove(&mut self, id: u32) -> Option<Hazard> {
        let index = self.hazards.iter().position(|h| h.id == id)?;
        Some(self.hazards.remove(index))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Hazard> {
        self.hazards.iter()
    }

    pub fn len(&self) -> usize {
        self.hazards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hazards.is_empty()
    }

    /// Moves and ages every hazard, fires enemy lasers and drops expired
    /// hazards.
    pub fn tick(&mut self, dt: f32) -> Vec<FieldEvent> {
        let mut events = Vec::new();
        let mut shots = Vec::new();

        for hazard in &mut self.hazards {
            hazard.age += dt;
            hazard.x -= hazard.speed * dt;

            if hazard.tag == HazardTag::Enemy && hazard.age >= ENEMY_ENTRANCE {
                hazard.fire_timer += dt;
                if hazard.fire_timer >= ENEMY_FIRE_INTERVAL {
                    hazard.fire_timer = 0.0;
                    shots.push((hazard.id, hazard.color));
                }
            }
        }

        for (enemy, color) in shots {
            let laser = self.insert(HazardTag::EnemyLaser, color);
            debug!("Enemy #{} fired laser #{}", enemy, laser);
            events.push(FieldEvent::EnemyFired { enemy, laser });
        }

        self.hazards.retain(|hazard| {
            if !hazard.is_expired() {
                return true;
            }
            if hazard.tag == HazardTag::Overheat {
                info!("Overheat #{} burnt out", hazard.id);
                events.push(FieldEvent::Overheated { id: hazard.id });
            } else {
                events.push(FieldEvent::Expired {
                    id: hazard.id,
                    tag: hazard.tag,
                });
            }
            false
        });

        events
    }

    /// Closes a physics step: beam speed follows this step's contacts and
    /// repair progress resets on hazards the arm did not touch.
    pub fn end_physics_step(&mut self) {
        for hazard in &mut self.hazards {
            if hazard.tag == HazardTag::Energy {
                hazard.speed = if hazard.in_beam { BEAM_SPEED } else { BASE_SPEED };
            }
            hazard.in_beam = false;

            if !hazard.repair_touched {
                hazard.repair_contact = 0.0;
            }
            hazard.repair_touched = false;
        }
    }
}

impl Default for HazardField {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn field() -> (HazardField, StdRng) {
        let mut field = HazardField::new();
        field.set_color("red");
        (field, StdRng::seed_from_u64(5))
    }

    #[test]
    fn test_fake_energy_spawns_nothing() {
        let (mut field, mut rng) = field();
        assert!(field.spawn(HazardKind::FakeEnergy, &mut rng).is_none());
        assert!(field.is_empty());
    }

    #[test]
    fn test_log_or_vine_resolves_to_one() {
        let (mut field, mut rng) = field();
        for _ in 0..20 {
            let id = field.spawn(HazardKind::LogOrVine, &mut rng).unwrap();
            let tag = field.get(id).unwrap().tag;
            assert!(tag == HazardTag::Log || tag == HazardTag::Vine);
        }
    }

    #[test]
    fn test_tinting() {
        let (mut field, mut rng) = field();
        let rock = field.spawn(HazardKind::Rock, &mut rng).unwrap();
        let overheat = field.spawn(HazardKind::Overheat, &mut rng).unwrap();
        assert_eq!(field.get(rock).unwrap().color, Some("red"));
        assert_eq!(field.get(overheat).unwrap().color, None);
    }

    #[test]
    fn test_hazard_moves_and_expires() {
        let (mut field, mut rng) = field();
        let id = field.spawn(HazardKind::Rock, &mut rng).unwrap();

        field.tick(1.0);
        assert_approx_eq!(field.get(id).unwrap().x, SPAWN_X - 1.0);

        let mut events = Vec::new();
        for _ in 0..23 {
            events.extend(field.tick(1.0));
        }
        assert!(field.is_empty());
        assert_eq!(
            events,
            vec![FieldEvent::Expired {
                id,
                tag: HazardTag::Rock
            }]
        );
    }

    #[test]
    fn test_overheat_burns_out() {
        let (mut field, mut rng) = field();
        let id = field.spawn(HazardKind::Overheat, &mut rng).unwrap();

        let mut events = Vec::new();
        for _ in 0..20 {
            events.extend(field.tick(0.5));
        }
        assert_eq!(events, vec![FieldEvent::Overheated { id }]);
    }

    #[test]
    fn test_enemy_fires_after_entrance() {
        let (mut field, mut rng) = field();
        let enemy = field.spawn(HazardKind::Enemy, &mut rng).unwrap();

        let mut shots = 0;
        let mut lasers = Vec::new();
        for _ in 0..20 {
            for event in field.tick(0.5) {
                if let FieldEvent::EnemyFired { enemy: e, laser } = event {
                    assert_eq!(e, enemy);
                    lasers.push(laser);
                    shots += 1;
                }
            }
        }

        // One shot five seconds into its stay; gone at 10s before a second.
        assert_eq!(shots, 1);
        assert!(field.get(enemy).is_none());
        let laser = field.get(lasers[0]).unwrap();
        assert_eq!(laser.tag, HazardTag::EnemyLaser);
        assert_eq!(laser.color, Some("red"));
    }

    #[test]
    fn test_beam_speed_rearmed_each_step() {
        let (mut field, mut rng) = field();
        let id = field.spawn(HazardKind::Energy, &mut rng).unwrap();

        field.get_mut(id).unwrap().mark_in_beam();
        field.end_physics_step();
        assert_approx_eq!(field.get(id).unwrap().speed, BEAM_SPEED);

        // No stay event this step.
        field.end_physics_step();
        assert_approx_eq!(field.get(id).unwrap().speed, BASE_SPEED);
    }

    #[test]
    fn test_repair_contact_resets_when_broken() {
        let (mut field, mut rng) = field();
        let id = field.spawn(HazardKind::Overheat, &mut rng).unwrap();

        assert!(!field.get_mut(id).unwrap().add_repair_contact(1.5));
        field.end_physics_step();
        assert_approx_eq!(field.get(id).unwrap().repair_contact, 1.5);

        field.end_physics_step();
        assert_approx_eq!(field.get(id).unwrap().repair_contact, 0.0);
    }
}
