// src/backend/mod.rs
//! Rendering backend abstraction.
//!
//! - `DisplayBackend`: one registered backend (windowing toolkit, leased plane, headless)
//! - `ScreenOps`: per-screen operations produced by a backend
//! - `BackendRegistry`: startup-time registration table, looked up by name
//!
//! ## Threading Model
//! Lifecycle hooks (`init`, `deinit`, `parse_cmd`, `create_res`) run on the caller's
//! thread. `init_thread`/`deinit_thread` run on the display thread, as do the
//! surface-mutating screen operations. Both traits are `Send + Sync` and take `&self`;
//! implementations keep their own interior state.

pub mod geometry;
pub mod headless;
pub mod registry;

use std::os::fd::RawFd;
use std::sync::Arc;

use anyhow::Result;

use crate::error::ConfigError;

pub use geometry::{parse_geometry, GeometrySpec};
pub use headless::{HeadlessBackend, HeadlessScreen, HeadlessScreenState};
pub use registry::BackendRegistry;

/// Backend bound to `geometry=` screens.
pub const WINDOW_BACKEND_NAME: &str = "sdl";
/// Backend bound to `lease=` screens.
pub const LEASE_BACKEND_NAME: &str = "lease";

/// Guest vblank injection: `(frame_counter, pipe_id)`.
pub type VblankCallback = Arc<dyn Fn(u32, u32) + Send + Sync>;

/// Shareable buffer descriptor broadcast to backends (a dmabuf fd).
pub type ResourceId = RawFd;

/// Geometry of one screen as reported to the guest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DisplayInfo {
    pub xoff: u32,
    pub yoff: u32,
    pub width: u32,
    pub height: u32,
}

/// Pixel source of a guest surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceData {
    /// CPU-visible pixels, `stride * height` bytes.
    Pixels(Vec<u8>),
    /// GPU buffer shared through a dmabuf.
    Dmabuf {
        fd: RawFd,
        fourcc: u32,
        offset: u32,
        modifier: u64,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Surface {
    pub width: u32,
    pub height: u32,
    pub stride: u32,
    pub bpp: u32,
    pub data: SurfaceData,
}

impl Surface {
    /// A 32bpp CPU surface filled with zeroes.
    pub fn blank(width: u32, height: u32) -> Self {
        let stride = width * 4;
        Self {
            width,
            height,
            stride,
            bpp: 32,
            data: SurfaceData::Pixels(vec![0; (stride * height) as usize]),
        }
    }
}

/// Hardware cursor image, ARGB8888.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor {
    pub width: u32,
    pub height: u32,
    pub hot_x: u32,
    pub hot_y: u32,
    pub pixels: Vec<u32>,
}

/// Destination rectangle of a scaled scanout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScalingRect {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

/// Operations on one virtual screen.
///
/// Only `display_info` is mandatory; every other hook defaults to a no-op.
pub trait ScreenOps: Send + Sync {
    fn display_info(&self) -> DisplayInfo;

    fn surface_set(&self, _surface: &Surface) {}

    fn surface_update(&self, _surface: &Surface) {}

    fn surface_set_vga(&self, _surface: &Surface) {}

    fn surface_update_vga(&self, _surface: &Surface) {}

    fn cursor_define(&self, _cursor: &Cursor) {}

    fn cursor_move(&self, _x: u32, _y: u32) {}

    /// Re-present the current surface and cursor. Called by the periodic UI refresh.
    fn cursor_refresh(&self) {}

    /// Install the guest vblank callback. Returns `false` when the screen has no
    /// hardware vblank source.
    fn vblank_init(&self, _callback: VblankCallback) -> bool {
        false
    }

    fn enable_vblank(&self) {}

    fn set_modifier(&self, _modifier: u64) {}

    fn set_scaling(&self, _rect: ScalingRect) {}
}

/// One registered rendering backend.
///
/// `name` and `init_screen` are mandatory; the remaining hooks are optional
/// capabilities and default to no-ops.
pub trait DisplayBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Bring-up on UI realization. Runs for every registered backend, used or not.
    fn init(&self) -> Result<()> {
        Ok(())
    }

    fn deinit(&self) {}

    /// Bring-up on the display thread (toolkit contexts, windows).
    fn init_thread(&self) -> Result<()> {
        Ok(())
    }

    fn deinit_thread(&self) {}

    /// Produce the operations of the next screen bound to this backend.
    ///
    /// `pipe` is the vblank pipe the controller allotted to the screen, if any.
    fn init_screen(&self, pipe: Option<u32>) -> Result<Arc<dyn ScreenOps>>;

    fn create_res(&self, _id: ResourceId) {}

    fn destroy_res(&self, _id: ResourceId) {}

    /// Accept one screen token of the display option string.
    fn parse_cmd(&self, _token: &str) -> Result<(), ConfigError> {
        Ok(())
    }
}
