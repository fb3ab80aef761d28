// src/error.rs
//! Error types surfaced at the public API boundary.

use std::io;

use thiserror::Error;

/// Errors raised while parsing the display option string or loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{max} virtual displays are too many, extra screens ignored")]
    TooManyScreens { max: usize },
    #[error("no display backend named '{0}'")]
    UnknownBackend(String),
    #[error("incorrect geometry option '{0}', expected WxH+x+y or fullscreen:N")]
    InvalidGeometry(String),
    #[error("geometry bounds rejected: {0}")]
    GeometryBounds(String),
    #[error("backlight device '{0}' rejected")]
    InvalidBacklight(String),
    #[error("failed to parse config: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to read config: {0}")]
    Io(#[from] io::Error),
}

/// Errors raised by the display controller lifecycle and handle-gated calls.
#[derive(Error, Debug)]
pub enum DisplayError {
    #[error("handle {0} does not match the active connection")]
    WrongHandle(u32),
    #[error("display is not active")]
    Inactive,
    #[error("failed to spawn display thread: {0}")]
    ThreadSpawn(#[source] io::Error),
    #[error("display thread not ready after {attempts} attempts")]
    StartupTimeout { attempts: u32 },
    #[error("display backend failed: {0:#}")]
    Backend(#[from] anyhow::Error),
    #[error("backlight {0} out of range")]
    NoSuchBacklight(usize),
    #[error(transparent)]
    Backlight(#[from] BacklightError),
}

/// Errors from host backlight device access.
#[derive(Error, Debug)]
pub enum BacklightError {
    #[error("backlight property {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("backlight property {path}: '{value}' is not an integer")]
    Parse { path: String, value: String },
}
