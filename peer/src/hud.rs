//! Passive projection of replicated state onto the HUD

use shared::{lit_battery_bands, Role, MAX_HEALTH};
use std::f32::consts::PI;

/// Length of the emphasis pulse played on a role change.
pub const PULSE_TIME: f32 = 0.75;
pub const PULSE_SCALE: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthIcon {
    Shield,
    NoShield,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Overlay {
    None,
    GameOver,
    Victory,
}

/// HUD model. It reacts to replicated updates and never feeds back into
/// the session.
#[derive(Debug, Clone)]
pub struct HudProjector {
    health: [HealthIcon; MAX_HEALTH as usize],
    lit_bands: usize,
    role: Option<Role>,
    /// Elapsed pulse time while the role icon is pulsing.
    pulse: Option<f32>,
    overlay: Overlay,
}

impl HudProjector {
    pub fn new() -> Self {
        Self {
            health: [HealthIcon::Shield; MAX_HEALTH as usize],
            lit_bands: shared::BATTERY_BANDS,
            role: None,
            pulse: None,
            overlay: Overlay::None,
        }
    }

    pub fn on_health_changed(&mut self, health: u8) {
        for (slot, icon) in self.health.iter_mut().enumerate() {
            *icon = if (health as usize) > slot {
                HealthIcon::Shield
            } else {
                HealthIcon::NoShield
            };
        }
    }

    pub fn on_battery_changed(&mut self, charge: f32, full: f32) {
        self.lit_bands = lit_battery_bands(charge, full);
    }

    /// Swaps the role icon and restarts the pulse.
    pub fn on_role_changed(&mut self, role: Role) {
        self.role = Some(role);
        self.pulse = Some(0.0);
    }

    pub fn on_game_over(&mut self) {
        self.overlay = Overlay::GameOver;
    }

    pub fn on_victory(&mut self) {
        self.overlay = Overlay::Victory;
    }

    pub fn tick(&mut self, dt: f32) {
        if let Some(elapsed) = self.pulse {
            let elapsed = elapsed + dt;
            self.pulse = if elapsed < PULSE_TIME { Some(elapsed) } else { None };
        }
    }

    /// Current scale of the role icon, 1.0 at rest.
    pub fn role_icon_scale(&self) -> f32 {
        match self.pulse {
            Some(elapsed) => 1.0 + PULSE_SCALE * (elapsed * PI / PULSE_TIME).sin(),
            None => 1.0,
        }
    }

    pub fn health_icons(&self) -> &[HealthIcon] {
        &self.health
    }

    pub fn lit_bands(&self) -> usize {
        self.lit_bands
    }

    pub fn role(&self) -> Option<Role> {
        self.role
    }

    pub fn overlay(&self) -> Overlay {
        self.overlay
    }

    /// One-line text rendering for the console.
    pub fn status_line(&self) -> String {
        let health: String = self
            .health
            .iter()
            .map(|icon| match icon {
                HealthIcon::Shield => '#',
                HealthIcon::NoShield => '.',
            })
            .collect();
        let battery: String = (0..shared::BATTERY_BANDS)
            .map(|band| if band < self.lit_bands { '|' } else { ' ' })
            .collect();
        let role = self
            .role
            .map(|role| format!("{:?}", role))
            .unwrap_or_else(|| "-".to_string());

        let mut line = format!("[{}] battery [{}] station {}", health, battery, role);
        match self.overlay {
            Overlay::GameOver => line.push_str("  GAME OVER"),
            Overlay::Victory => line.push_str("  VICTORY"),
            Overlay::None => {}
        }
        line
    }
}

impl Default for HudProjector {
    fn default() -> Self {
        Self::new()
    }
}
