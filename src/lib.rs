// src/lib.rs
//! Virtual display subsystem for a VM device model.
//!
//! - `backend`: rendering backend and per-screen operation traits, plus the registry
//! - `edid`: EDID 1.4 base block and CEA-861 extension encoder
//! - `display`: the controller, its dedicated display thread and the bottom-half queue
//! - `timer`: periodic monotonic timers used for UI refresh and software vblank
//! - `backlight`: host backlight device access

pub mod backend;
pub mod backlight;
pub mod config;
pub mod display;
pub mod edid;
pub mod error;
pub mod timer;

pub use backend::{
    BackendRegistry, Cursor, DisplayBackend, DisplayInfo, HeadlessBackend, ScalingRect,
    ScreenOps, Surface, SurfaceData, VblankCallback, LEASE_BACKEND_NAME, WINDOW_BACKEND_NAME,
};
pub use backlight::{BacklightControl, BacklightInfo, BacklightProperties, SysfsBacklight};
pub use config::DisplayConfig;
pub use display::{
    BottomHalf, Completion, Connection, DisplayContext, DisplaySetup, Handle, TaskStatus,
    ThreadState, VirtualDisplay,
};
pub use edid::{generate_edid, EdidInfo, EDID_BLOCK_SIZE, EDID_WITH_EXTENSION_SIZE};
pub use error::{BacklightError, ConfigError, DisplayError};
