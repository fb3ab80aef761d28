// src/config.rs

//! Configuration structures for the virtual display subsystem.
//!
//! Every section derives `Deserialize` with `#[serde(default)]`, so a JSON file only
//! needs to mention the values it overrides. The defaults reproduce the cadences and
//! limits the guest display driver expects.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::ConfigError;

/// Root configuration for a [`crate::VirtualDisplay`].
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct DisplayConfig {
    /// Capacity limits.
    pub limits: LimitsConfig,
    /// Timer cadences.
    pub timing: TimingConfig,
    /// Display thread startup handshake.
    pub startup: StartupConfig,
    /// Screen geometry bounds.
    pub geometry: GeometryConfig,
}

impl DisplayConfig {
    /// Parse a configuration from a JSON document.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.geometry.validate()?;
        Ok(config)
    }

    /// Load a configuration from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }
}

// --- Limits ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum number of virtual screens.
    pub max_screens: usize,
    /// Maximum number of host backlight devices exposed to the guest.
    pub max_backlights: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        LimitsConfig {
            max_screens: 2,
            max_backlights: 4,
        }
    }
}

// --- Timing ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TimingConfig {
    /// Delay before the first UI refresh tick.
    pub ui_initial_delay_ms: u64,
    /// UI refresh period (~30 fps).
    pub ui_refresh_interval_ms: u64,
    /// Software vblank period (~60.24 Hz).
    pub vblank_interval_us: u64,
    /// A screen updated more recently than this is skipped by the refresh task.
    pub min_refresh_interval_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        TimingConfig {
            ui_initial_delay_ms: 5000,
            ui_refresh_interval_ms: 33,
            vblank_interval_us: 16_600,
            min_refresh_interval_ms: 10,
        }
    }
}

impl TimingConfig {
    pub fn ui_initial_delay(&self) -> Duration {
        Duration::from_millis(self.ui_initial_delay_ms)
    }

    pub fn ui_refresh_interval(&self) -> Duration {
        Duration::from_millis(self.ui_refresh_interval_ms)
    }

    pub fn vblank_interval(&self) -> Duration {
        Duration::from_micros(self.vblank_interval_us)
    }

    pub fn min_refresh_interval(&self) -> Duration {
        Duration::from_millis(self.min_refresh_interval_ms)
    }
}

// --- Startup ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StartupConfig {
    /// How many times `init` checks whether the display thread is running.
    pub poll_attempts: u32,
    /// Sleep between two readiness checks.
    pub poll_interval_ms: u64,
}

impl Default for StartupConfig {
    fn default() -> Self {
        StartupConfig {
            poll_attempts: 50,
            poll_interval_ms: 10,
        }
    }
}

impl StartupConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

// --- Geometry ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GeometryConfig {
    pub default_width: u32,
    pub default_height: u32,
    pub min_width: u32,
    pub min_height: u32,
    pub max_width: u32,
    pub max_height: u32,
}

impl Default for GeometryConfig {
    fn default() -> Self {
        GeometryConfig {
            default_width: 1920,
            default_height: 1080,
            min_width: 640,
            min_height: 480,
            max_width: 3840,
            max_height: 2160,
        }
    }
}

impl GeometryConfig {
    /// Minimums must not exceed maximums, and the default size must lie between them.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let axes = [
            ("width", self.min_width, self.default_width, self.max_width),
            ("height", self.min_height, self.default_height, self.max_height),
        ];
        for (axis, min, default, max) in axes {
            if min > max {
                return Err(ConfigError::GeometryBounds(format!(
                    "min {} {} exceeds max {}",
                    axis, min, max
                )));
            }
            if !(min..=max).contains(&default) {
                return Err(ConfigError::GeometryBounds(format!(
                    "default {} {} outside [{}, {}]",
                    axis, default, min, max
                )));
            }
        }
        Ok(())
    }
}
