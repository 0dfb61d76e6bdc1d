//! Board and simulation settings
//!
//! Loaded from JSON; every field has a default so partial files work.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::consts::*;

/// Errors raised while loading settings
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse settings: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Board layout presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum BoardPreset {
    /// Sparse grid, coarse arc of 12 pegs
    Compact,
    /// Dense grid, fine arc of 24 pegs
    #[default]
    Wide,
}

impl BoardPreset {
    pub fn as_str(&self) -> &'static str {
        match self {
            BoardPreset::Compact => "Compact",
            BoardPreset::Wide => "Wide",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "compact" | "small" => Some(BoardPreset::Compact),
            "wide" | "large" => Some(BoardPreset::Wide),
            _ => None,
        }
    }

    /// Integer column span of the grid region (inclusive)
    pub fn grid_columns(&self) -> (i32, i32) {
        match self {
            BoardPreset::Compact => (-2, 2),
            BoardPreset::Wide => (-4, 4),
        }
    }

    /// Horizontal distance between grid columns
    pub fn grid_spacing_x(&self) -> f32 {
        match self {
            BoardPreset::Compact => 2.0,
            BoardPreset::Wide => 1.5,
        }
    }

    /// Arc index range `-n..n`
    pub fn arc_half_count(&self) -> i32 {
        match self {
            BoardPreset::Compact => 6,
            BoardPreset::Wide => 12,
        }
    }

    /// Horizontal step, x offset and sine amplitude of the arc row
    pub fn arc_shape(&self) -> (f32, f32, f32) {
        match self {
            BoardPreset::Compact => (1.0, 0.0, 1.5),
            BoardPreset::Wide => (0.5, 0.5, 1.0),
        }
    }
}

/// Board layout settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BoardSettings {
    pub preset: BoardPreset,
    /// Vertical distance between grid rows
    pub row_spacing: f32,
    /// Denominator of the arc's sine phase
    pub board_length: f32,
    /// Build the decorative walls left of the board
    pub idle_walls: bool,
}

impl Default for BoardSettings {
    fn default() -> Self {
        Self {
            preset: BoardPreset::Wide,
            row_spacing: 1.5,
            board_length: 8.0,
            idle_walls: true,
        }
    }
}

/// Backend integration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsSettings {
    pub gravity: f32,
    /// Frame gap treated as a stall (spawns dropped)
    pub stall_threshold: f32,
    pub max_frame_dt: f32,
    pub max_substeps: u32,
}

impl Default for PhysicsSettings {
    fn default() -> Self {
        Self {
            gravity: GRAVITY,
            stall_threshold: STALL_THRESHOLD,
            max_frame_dt: MAX_FRAME_DT,
            max_substeps: MAX_SUBSTEPS,
        }
    }
}

/// Token body settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenSettings {
    pub radius: f32,
    pub mass: f32,
    pub angular_damping: f32,
    pub spawn_height: f32,
    pub spawn_half_width: f32,
    pub exit_y: f32,
    pub base_impulse: f32,
    pub superbounce_multiplier: f32,
}

impl Default for TokenSettings {
    fn default() -> Self {
        Self {
            radius: TOKEN_RADIUS,
            mass: TOKEN_MASS,
            angular_damping: TOKEN_ANGULAR_DAMPING,
            spawn_height: SPAWN_HEIGHT,
            spawn_half_width: SPAWN_HALF_WIDTH,
            exit_y: EXIT_Y,
            base_impulse: BASE_IMPULSE,
            superbounce_multiplier: SUPERBOUNCE_MULTIPLIER,
        }
    }
}

/// Peg state machine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PegSettings {
    pub radius: f32,
    pub cooldown: f32,
    /// Arc pegs stay down until a global reset
    pub latch_togglable: bool,
    pub watchdog_interval: f32,
    pub max_reset_interval: f32,
    pub reset_fraction: f32,
}

impl Default for PegSettings {
    fn default() -> Self {
        Self {
            radius: PEG_RADIUS,
            cooldown: PEG_COOLDOWN,
            latch_togglable: false,
            watchdog_interval: WATCHDOG_INTERVAL,
            max_reset_interval: WATCHDOG_MAX_RESET_INTERVAL,
            reset_fraction: WATCHDOG_RESET_FRACTION,
        }
    }
}

/// Chart and marketplace settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketSettings {
    pub chart_resolution: usize,
    pub chart_interval: f32,
    pub chart_max: f32,
    /// How often queued chat commands are applied
    pub inbox_interval: f32,
}

impl Default for MarketSettings {
    fn default() -> Self {
        Self {
            chart_resolution: CHART_RESOLUTION,
            chart_interval: CHART_INTERVAL,
            chart_max: CHART_MAX,
            inbox_interval: 0.25,
        }
    }
}

/// All simulation settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub board: BoardSettings,
    pub physics: PhysicsSettings,
    pub tokens: TokenSettings,
    pub pegs: PegSettings,
    pub market: MarketSettings,
}

impl Settings {
    /// Create settings from a board preset (other values default)
    pub fn from_preset(preset: BoardPreset) -> Self {
        let mut settings = Self::default();
        settings.board.preset = preset;
        settings
    }

    /// Parse settings from a JSON document
    pub fn from_json_str(json: &str) -> Result<Self, SettingsError> {
        let settings: Settings = serde_json::from_str(json)?;
        Ok(settings.sanitized())
    }

    /// Load settings from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)?;
        let settings = Self::from_json_str(&json)?;
        log::info!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    /// Clamp values the simulation cannot run with
    pub fn sanitized(mut self) -> Self {
        let defaults = Settings::default();

        if self.physics.max_substeps == 0 {
            log::warn!("max_substeps must be at least 1, using {}", defaults.physics.max_substeps);
            self.physics.max_substeps = defaults.physics.max_substeps;
        }
        if !(self.physics.max_frame_dt > 0.0) {
            log::warn!("max_frame_dt must be positive, using {}", defaults.physics.max_frame_dt);
            self.physics.max_frame_dt = defaults.physics.max_frame_dt;
        }
        if !(self.tokens.radius > 0.0) {
            log::warn!("token radius must be positive, using {}", defaults.tokens.radius);
            self.tokens.radius = defaults.tokens.radius;
        }
        if !(self.tokens.mass > 0.0) {
            log::warn!("token mass must be positive, using {}", defaults.tokens.mass);
            self.tokens.mass = defaults.tokens.mass;
        }
        if !(self.pegs.radius > 0.0) {
            log::warn!("peg radius must be positive, using {}", defaults.pegs.radius);
            self.pegs.radius = defaults.pegs.radius;
        }
        if !(self.pegs.watchdog_interval > 0.0) {
            log::warn!(
                "watchdog_interval must be positive, using {}",
                defaults.pegs.watchdog_interval
            );
            self.pegs.watchdog_interval = defaults.pegs.watchdog_interval;
        }
        self.pegs.reset_fraction = self.pegs.reset_fraction.clamp(0.0, 1.0);
        if self.market.chart_resolution == 0 {
            log::warn!("chart_resolution must be at least 1, using {}", defaults.market.chart_resolution);
            self.market.chart_resolution = defaults.market.chart_resolution;
        }
        if !(self.market.chart_interval > 0.0) {
            self.market.chart_interval = defaults.market.chart_interval;
        }
        if !(self.market.inbox_interval > 0.0) {
            self.market.inbox_interval = defaults.market.inbox_interval;
        }
        if !(self.board.board_length.abs() > 0.0) {
            self.board.board_length = defaults.board.board_length;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preset_round_trip_names() {
        assert_eq!(BoardPreset::from_str("WIDE"), Some(BoardPreset::Wide));
        assert_eq!(BoardPreset::from_str("small"), Some(BoardPreset::Compact));
        assert_eq!(BoardPreset::from_str("huge"), None);
        assert_eq!(BoardPreset::Compact.as_str(), "Compact");
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = r#"{ "pegs": { "cooldown": 2.5 }, "board": { "preset": "Compact" } }"#;
        let settings = Settings::from_json_str(json).unwrap();
        assert_eq!(settings.pegs.cooldown, 2.5);
        assert_eq!(settings.pegs.reset_fraction, WATCHDOG_RESET_FRACTION);
        assert_eq!(settings.board.preset, BoardPreset::Compact);
        assert_eq!(settings.tokens.exit_y, EXIT_Y);
    }

    #[test]
    fn test_invalid_json_is_parse_error() {
        let err = Settings::from_json_str("{ not json").unwrap_err();
        assert!(matches!(err, SettingsError::Parse(_)));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = Settings::load("/definitely/not/here/plinko.json").unwrap_err();
        assert!(matches!(err, SettingsError::Io(_)));
    }

    #[test]
    fn test_sanitized_clamps_bad_values() {
        let mut settings = Settings::default();
        settings.physics.max_substeps = 0;
        settings.tokens.mass = -1.0;
        settings.pegs.reset_fraction = 3.0;
        settings.market.chart_resolution = 0;
        let settings = settings.sanitized();
        assert_eq!(settings.physics.max_substeps, MAX_SUBSTEPS);
        assert_eq!(settings.tokens.mass, TOKEN_MASS);
        assert_eq!(settings.pegs.reset_fraction, 1.0);
        assert_eq!(settings.market.chart_resolution, CHART_RESOLUTION);
    }
}
