// src/backlight.rs
//! Host backlight devices exposed to the guest.
//!
//! Devices live under a sysfs class directory (`/sys/class/backlight/<name>/`), each
//! property in its own file holding a decimal integer or a keyword.

use std::fs;
use std::path::{Path, PathBuf};

use log::*;
use serde::Serialize;

use crate::error::BacklightError;

pub const SYSFS_BACKLIGHT_ROOT: &str = "/sys/class/backlight";

const DEFAULT_MAX_BRIGHTNESS: i32 = 100;

/// Serialized with the sysfs keywords.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
#[repr(u32)]
pub enum BacklightType {
    #[default]
    Raw = 1,
    Platform = 2,
    Firmware = 3,
}

impl BacklightType {
    fn parse(text: &str) -> Self {
        if text.starts_with("firmware") {
            BacklightType::Firmware
        } else if text.starts_with("platform") {
            BacklightType::Platform
        } else {
            BacklightType::Raw
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
#[repr(u32)]
pub enum BacklightScale {
    #[default]
    Unknown = 0,
    Linear = 1,
    NonLinear = 2,
}

impl BacklightScale {
    fn parse(text: &str) -> Self {
        if text.starts_with("linear") {
            BacklightScale::Linear
        } else if text.starts_with("non-linear") {
            BacklightScale::NonLinear
        } else {
            BacklightScale::Unknown
        }
    }
}

/// Values the guest writes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BacklightProperties {
    pub brightness: i32,
    pub power: i32,
}

/// Snapshot the guest reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BacklightInfo {
    pub brightness: i32,
    pub max_brightness: i32,
    pub power: i32,
    pub kind: BacklightType,
    pub scale: BacklightScale,
}

impl Default for BacklightInfo {
    fn default() -> Self {
        Self {
            brightness: 0,
            max_brightness: DEFAULT_MAX_BRIGHTNESS,
            power: 0,
            kind: BacklightType::Raw,
            scale: BacklightScale::Unknown,
        }
    }
}

/// Access to named host backlight devices.
pub trait BacklightControl: Send + Sync {
    fn exists(&self, name: &str) -> bool;

    fn set_brightness(&self, name: &str, brightness: i32) -> Result<(), BacklightError>;

    fn set_power(&self, name: &str, power: i32) -> Result<(), BacklightError>;

    /// Brightness as currently applied by the hardware.
    fn brightness(&self, name: &str) -> Result<i32, BacklightError>;

    /// Best effort: unreadable properties keep their defaults.
    fn info(&self, name: &str) -> BacklightInfo;
}

/// sysfs-backed backlight access.
#[derive(Debug, Clone)]
pub struct SysfsBacklight {
    root: PathBuf,
}

impl Default for SysfsBacklight {
    fn default() -> Self {
        Self::new(SYSFS_BACKLIGHT_ROOT)
    }
}

impl SysfsBacklight {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn property(&self, name: &str, property: &str) -> PathBuf {
        self.root.join(name).join(property)
    }

    fn read_text(path: &Path) -> Result<String, BacklightError> {
        fs::read_to_string(path).map_err(|source| {
            debug!("SysfsBacklight: read {} failed: {}", path.display(), source);
            BacklightError::Io {
                path: path.display().to_string(),
                source,
            }
        })
    }

    fn read_int(path: &Path) -> Result<i32, BacklightError> {
        let text = Self::read_text(path)?;
        text.trim().parse().map_err(|_| BacklightError::Parse {
            path: path.display().to_string(),
            value: text.trim().to_string(),
        })
    }

    fn write_int(path: &Path, value: i32) -> Result<(), BacklightError> {
        fs::write(path, format!("{}\n", value)).map_err(|source| {
            error!("SysfsBacklight: write {} failed: {}", path.display(), source);
            BacklightError::Io {
                path: path.display().to_string(),
                source,
            }
        })
    }
}

impl BacklightControl for SysfsBacklight {
    fn exists(&self, name: &str) -> bool {
        !name.is_empty() && self.root.join(name).exists()
    }

    fn set_brightness(&self, name: &str, brightness: i32) -> Result<(), BacklightError> {
        Self::write_int(&self.property(name, "brightness"), brightness)
    }

    fn set_power(&self, name: &str, power: i32) -> Result<(), BacklightError> {
        Self::write_int(&self.property(name, "bl_power"), power)
    }

    fn brightness(&self, name: &str) -> Result<i32, BacklightError> {
        Self::read_int(&self.property(name, "actual_brightness"))
    }

    fn info(&self, name: &str) -> BacklightInfo {
        let defaults = BacklightInfo::default();
        let int_or = |property: &str, fallback: i32| {
            Self::read_int(&self.property(name, property)).unwrap_or(fallback)
        };
        let text = |property: &str| {
            Self::read_text(&self.property(name, property)).unwrap_or_default()
        };

        BacklightInfo {
            brightness: int_or("brightness", defaults.brightness),
            max_brightness: int_or("max_brightness", defaults.max_brightness),
            power: int_or("bl_power", defaults.power),
            kind: BacklightType::parse(&text("type")),
            scale: BacklightScale::parse(&text("scale")),
        }
    }
}
