//! Plinko Board - chat emotes falling through a pegged board
//!
//! Core modules:
//! - `sim`: Fixed-step simulation (board layout, token pool, collision policy, peg states)
//! - `market`: Buy/sell marketplace and the score ledger fed by despawned tokens
//! - `settings`: Data-driven board and physics tuning

pub mod market;
pub mod settings;
pub mod sim;

pub use market::{ExitSide, Impact, Ledger, MarketCommand, MarketInbox, Marketplace};
pub use settings::{BoardPreset, Settings, SettingsError};

use glam::Vec2;

/// Simulation configuration constants
pub mod consts {
    /// Fixed simulation timestep (120 Hz, independent of render rate)
    pub const SIM_DT: f32 = 1.0 / 120.0;
    /// Maximum substeps per frame to prevent spiral of death
    pub const MAX_SUBSTEPS: u32 = 8;
    /// Largest frame delta fed to the accumulator
    pub const MAX_FRAME_DT: f32 = 0.1;
    /// Frame gap (seconds) after which the host is considered stalled
    pub const STALL_THRESHOLD: f32 = 1.0;

    /// World gravity (units/s², downward)
    pub const GRAVITY: f32 = -15.0;

    /// Peg and token radii
    pub const PEG_RADIUS: f32 = 0.25;
    pub const TOKEN_RADIUS: f32 = 0.25;
    /// Visual scale of a knocked-down peg
    pub const DISABLED_PEG_SCALE: f32 = 0.25;

    /// Token spawn band
    pub const SPAWN_HEIGHT: f32 = 12.0;
    pub const SPAWN_HALF_WIDTH: f32 = 15.0;
    /// Tokens below this height have left the board
    pub const EXIT_Y: f32 = -15.0;
    pub const TOKEN_MASS: f32 = 1.0;
    pub const TOKEN_ANGULAR_DAMPING: f32 = 100.0;

    /// Impulse applied when a token bounces off a peg
    pub const BASE_IMPULSE: f32 = 1.0;
    pub const SUPERBOUNCE_MULTIPLIER: f32 = 3.0;

    /// Peg cooldown and watchdog timing (seconds)
    pub const PEG_COOLDOWN: f32 = 1.5;
    pub const WATCHDOG_INTERVAL: f32 = 1.0;
    pub const WATCHDOG_MAX_RESET_INTERVAL: f32 = 30.0;
    pub const WATCHDOG_RESET_FRACTION: f32 = 0.6;

    /// Value chart
    pub const CHART_RESOLUTION: usize = 30;
    pub const CHART_INTERVAL: f32 = 1.0;
    pub const CHART_MAX: f32 = 250.0;
}

/// Heading of a velocity vector in radians (0 when at rest)
#[inline]
pub fn heading_angle(vel: Vec2) -> f32 {
    if vel.length_squared() <= f32::EPSILON {
        0.0
    } else {
        vel.y.atan2(vel.x)
    }
}

/// Replace NaN/infinite values with zero
#[inline]
pub fn finite_or_zero(value: f32) -> f32 {
    if value.is_finite() { value } else { 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heading_angle() {
        assert_eq!(heading_angle(Vec2::ZERO), 0.0);
        assert!((heading_angle(Vec2::new(0.0, -3.0)) + std::f32::consts::FRAC_PI_2).abs() < 1e-6);
        assert!(heading_angle(Vec2::new(2.0, 0.0)).abs() < 1e-6);
    }

    #[test]
    fn test_finite_or_zero() {
        assert_eq!(finite_or_zero(f32::NAN), 0.0);
        assert_eq!(finite_or_zero(f32::INFINITY), 0.0);
        assert_eq!(finite_or_zero(4.5), 4.5);
    }
}
