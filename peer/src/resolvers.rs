//! Contact rules between hazards and the vehicle's zones
//!
//! Resolvers decide, never mutate session state. A damaging or collecting
//! contact yields the host-only request to route; the host applies it and
//! replicates the outcome to everyone, this peer included.

use crate::hazards::Hazard;
use log::debug;
use shared::{Command, HazardTag, Zone};

/// Which action-driven zones exist right now.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ZoneStatus {
    pub shield_active: bool,
    pub beam_active: bool,
    pub repair_deployed: bool,
}

/// Outcome of one contact.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resolution {
    pub destroy: bool,
    /// Host-only request this contact produces, if any.
    pub request: Option<Command>,
}

impl Resolution {
    fn nothing() -> Self {
        Self::default()
    }

    fn destroy() -> Self {
        Self {
            destroy: true,
            request: None,
        }
    }

    fn destroy_with(command: Command) -> Self {
        Self {
            destroy: true,
            request: Some(command),
        }
    }
}

/// A hazard entering a zone.
pub fn resolve_enter(zone: Zone, hazard: &Hazard, status: ZoneStatus) -> Resolution {
    let resolution = match (zone, hazard.tag) {
        (Zone::Tracks, HazardTag::Log)
        | (Zone::Head, HazardTag::Vine)
        | (Zone::Body, HazardTag::EnemyLaser)
        | (Zone::Body, HazardTag::Rock) => Resolution::destroy_with(Command::TakeDamage),

        (Zone::Shield, tag) if tag.is_blocked_by_shield() && status.shield_active => {
            Resolution::destroy()
        }

        (Zone::Collector, HazardTag::Energy) => Resolution::destroy_with(Command::RechargeBattery),

        (Zone::Laser, HazardTag::Enemy) => Resolution::destroy(),

        _ => Resolution::nothing(),
    };

    if resolution != Resolution::nothing() {
        debug!("{:?} entered {:?}: {:?}", hazard.tag, zone, resolution);
    }
    resolution
}

/// A hazard staying inside a zone for one physics step of `dt` seconds.
pub fn resolve_stay(zone: Zone, hazard: &mut Hazard, dt: f32, status: ZoneStatus) -> Resolution {
    match (zone, hazard.tag) {
        (Zone::RepairArm, HazardTag::Overheat) if status.repair_deployed => {
            if hazard.add_repair_contact(dt) {
                debug!("Overheat #{} repaired", hazard.id);
                Resolution::destroy()
            } else {
                Resolution::nothing()
            }
        }
        (Zone::EnergyBeam, HazardTag::Energy) if status.beam_active => {
            hazard.mark_in_beam();
            Resolution::nothing()
        }
        _ => Resolution::nothing(),
    }
}
