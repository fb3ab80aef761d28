// src/backend/headless.rs
//! Headless display backend.
//!
//! Parses the same screen tokens as the windowing and lease backends but renders
//! nothing. Every screen records what it was asked to show, so the controller's
//! dispatch can be observed without a display server.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{bail, Result};
use log::*;

use super::geometry::{self, GeometrySpec};
use super::{
    Cursor, DisplayBackend, DisplayInfo, ResourceId, ScalingRect, ScreenOps, Surface,
    SurfaceData, VblankCallback, LEASE_BACKEND_NAME, WINDOW_BACKEND_NAME,
};
use crate::config::GeometryConfig;
use crate::error::ConfigError;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Observable state of one headless screen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeadlessScreenState {
    /// Geometry of the last surface, `(width, height)`.
    pub surface: Option<(u32, u32)>,
    /// Whether the last surface was a dmabuf.
    pub dmabuf: bool,
    /// Whether the last surface came through the VGA path.
    pub vga: bool,
    pub cursor: Option<Cursor>,
    pub cursor_pos: (u32, u32),
    pub modifier: u64,
    pub scaling: Option<ScalingRect>,
    pub surface_sets: u64,
    pub frames_presented: u64,
    pub cursor_refreshes: u64,
    pub vblank_enabled: bool,
    pub vblank_frame: u32,
}

pub struct HeadlessScreen {
    requested: DisplayInfo,
    /// Vblank pipe allotted by the controller when the screen is handed out.
    pipe: Mutex<Option<u32>>,
    hardware_vblank: bool,
    info: Mutex<DisplayInfo>,
    state: Mutex<HeadlessScreenState>,
    vblank: Mutex<Option<VblankCallback>>,
}

impl HeadlessScreen {
    fn new(requested: DisplayInfo, hardware_vblank: bool) -> Self {
        Self {
            requested,
            pipe: Mutex::new(None),
            hardware_vblank,
            info: Mutex::new(DisplayInfo::default()),
            state: Mutex::new(HeadlessScreenState::default()),
            vblank: Mutex::new(None),
        }
    }

    /// Geometry asked for on the option string, before calibration.
    pub fn requested(&self) -> DisplayInfo {
        self.requested
    }

    pub fn snapshot(&self) -> HeadlessScreenState {
        lock(&self.state).clone()
    }

    pub fn pipe(&self) -> Option<u32> {
        *lock(&self.pipe)
    }

    fn publish(&self, info: DisplayInfo) {
        *lock(&self.info) = info;
    }

    fn release(&self) {
        let mut state = lock(&self.state);
        state.surface = None;
        state.cursor = None;
    }

    fn record_surface(&self, surface: &Surface, vga: bool) {
        let mut state = lock(&self.state);
        state.surface = Some((surface.width, surface.height));
        state.dmabuf = matches!(surface.data, SurfaceData::Dmabuf { .. });
        state.vga = vga;
        state.surface_sets += 1;
    }

    fn present(&self, surface: &Surface, vga: bool) {
        let frame = {
            let mut state = lock(&self.state);
            state.surface = Some((surface.width, surface.height));
            state.vga = vga;
            state.frames_presented += 1;
            if !state.vblank_enabled {
                return;
            }
            state.vblank_frame = state.vblank_frame.wrapping_add(1);
            state.vblank_frame
        };
        // Flip completion doubles as the hardware vblank event.
        let (Some(callback), Some(pipe)) = (lock(&self.vblank).clone(), self.pipe()) else {
            return;
        };
        trace!("HeadlessScreen: vblank frame {} on pipe {}", frame, pipe);
        callback(frame, pipe);
    }
}

impl ScreenOps for HeadlessScreen {
    fn display_info(&self) -> DisplayInfo {
        *lock(&self.info)
    }

    fn surface_set(&self, surface: &Surface) {
        self.record_surface(surface, false);
    }

    fn surface_update(&self, surface: &Surface) {
        self.present(surface, false);
    }

    fn surface_set_vga(&self, surface: &Surface) {
        self.record_surface(surface, true);
    }

    fn surface_update_vga(&self, surface: &Surface) {
        self.present(surface, true);
    }

    fn cursor_define(&self, cursor: &Cursor) {
        lock(&self.state).cursor = Some(cursor.clone());
    }

    fn cursor_move(&self, x: u32, y: u32) {
        lock(&self.state).cursor_pos = (x, y);
    }

    fn cursor_refresh(&self) {
        let mut state = lock(&self.state);
        // Nothing to re-present before the first surface.
        if state.surface.is_none() {
            return;
        }
        state.cursor_refreshes += 1;
    }

    fn vblank_init(&self, callback: VblankCallback) -> bool {
        // No pipe, no way to tell the guest which output flipped.
        if !self.hardware_vblank || self.pipe().is_none() {
            return false;
        }
        *lock(&self.vblank) = Some(callback);
        true
    }

    fn enable_vblank(&self) {
        if self.hardware_vblank {
            info!("HeadlessScreen: enable vblank on pipe {:?}", self.pipe());
            lock(&self.state).vblank_enabled = true;
        }
    }

    fn set_modifier(&self, modifier: u64) {
        lock(&self.state).modifier = modifier;
    }

    fn set_scaling(&self, rect: ScalingRect) {
        lock(&self.state).scaling = Some(rect);
    }
}

#[derive(Default)]
struct BackendState {
    requests: Vec<GeometrySpec>,
    screens: Vec<Arc<HeadlessScreen>>,
    next_screen: usize,
    resources: Vec<ResourceId>,
}

pub struct HeadlessBackend {
    name: String,
    option_key: String,
    bounds: GeometryConfig,
    monitors: Vec<(u32, u32)>,
    hardware_vblank: bool,
    state: Mutex<BackendState>,
}

impl HeadlessBackend {
    /// Backend named `name` that accepts `option_key=` tokens.
    pub fn new(name: impl Into<String>, option_key: impl Into<String>) -> Self {
        let bounds = GeometryConfig::default();
        Self {
            name: name.into(),
            option_key: option_key.into(),
            monitors: vec![(bounds.max_width, bounds.max_height)],
            bounds,
            hardware_vblank: false,
            state: Mutex::new(BackendState::default()),
        }
    }

    /// Stand-in for the windowing backend: `geometry=` tokens.
    pub fn window() -> Self {
        Self::new(WINDOW_BACKEND_NAME, "geometry")
    }

    /// Stand-in for the leased-plane backend: `lease=` tokens, hardware vblank.
    pub fn lease() -> Self {
        Self::new(LEASE_BACKEND_NAME, "lease").with_hardware_vblank()
    }

    pub fn with_geometry(mut self, bounds: GeometryConfig) -> Result<Self, ConfigError> {
        bounds.validate()?;
        self.bounds = bounds;
        Ok(self)
    }

    /// Physical monitor sizes used by `fullscreen:N`.
    pub fn with_monitors(mut self, monitors: Vec<(u32, u32)>) -> Self {
        self.monitors = monitors;
        self
    }

    pub fn with_hardware_vblank(mut self) -> Self {
        self.hardware_vblank = true;
        self
    }

    pub fn screens(&self) -> Vec<Arc<HeadlessScreen>> {
        lock(&self.state).screens.clone()
    }

    /// Resources currently claimed through `create_res`.
    pub fn resources(&self) -> Vec<ResourceId> {
        lock(&self.state).resources.clone()
    }

    fn is_lease(&self) -> bool {
        self.option_key.eq_ignore_ascii_case("lease")
    }

    fn requested_info(&self, request: GeometrySpec) -> Result<DisplayInfo> {
        match request {
            GeometrySpec::Window { width, height, x, y } => Ok(DisplayInfo {
                xoff: x,
                yoff: y,
                width,
                height,
            }),
            GeometrySpec::Fullscreen { monitor } => {
                let Some(&(width, height)) = self.monitors.get(monitor as usize) else {
                    bail!(
                        "monitor id {} is out of available range [0~{}]",
                        monitor,
                        self.monitors.len()
                    );
                };
                if width < self.bounds.min_width || height < self.bounds.min_height {
                    bail!("monitor {} resolution {}x{} is too small", monitor, width, height);
                }
                Ok(DisplayInfo {
                    xoff: 0,
                    yoff: 0,
                    width,
                    height,
                })
            }
        }
    }
}

impl DisplayBackend for HeadlessBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn parse_cmd(&self, token: &str) -> Result<(), ConfigError> {
        let request = geometry::parse_geometry(token, &self.option_key)?;
        if self.is_lease() {
            match request {
                GeometrySpec::Window { width, height, .. } if width > 0 && height > 0 => {}
                _ => return Err(ConfigError::InvalidGeometry(token.to_string())),
            }
        }
        debug!("HeadlessBackend '{}': screen request {:?}", self.name, request);
        lock(&self.state).requests.push(request);
        Ok(())
    }

    fn init(&self) -> Result<()> {
        let mut state = lock(&self.state);
        let mut screens = Vec::with_capacity(state.requests.len());
        for request in &state.requests {
            let requested = self.requested_info(*request)?;
            screens.push(Arc::new(HeadlessScreen::new(requested, self.hardware_vblank)));
        }
        if !screens.is_empty() {
            info!("HeadlessBackend '{}': {} screen(s)", self.name, screens.len());
        }
        state.screens = screens;
        state.next_screen = 0;
        Ok(())
    }

    fn deinit(&self) {
        let mut state = lock(&self.state);
        state.screens.clear();
        state.next_screen = 0;
    }

    fn init_thread(&self) -> Result<()> {
        for screen in lock(&self.state).screens.iter() {
            let info = geometry::calibrate(screen.requested, &self.bounds);
            debug!("HeadlessBackend '{}': screen geometry {:?}", self.name, info);
            screen.publish(info);
        }
        Ok(())
    }

    fn deinit_thread(&self) {
        for screen in lock(&self.state).screens.iter() {
            screen.release();
        }
    }

    fn init_screen(&self, pipe: Option<u32>) -> Result<Arc<dyn ScreenOps>> {
        let mut state = lock(&self.state);
        let Some(screen) = state.screens.get(state.next_screen).cloned() else {
            bail!("invalid {} screen config", self.name);
        };
        state.next_screen += 1;
        *lock(&screen.pipe) = pipe;
        Ok(screen)
    }

    fn create_res(&self, id: ResourceId) {
        lock(&self.state).resources.push(id);
    }

    fn destroy_res(&self, id: ResourceId) {
        lock(&self.state).resources.retain(|&r| r != id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn realized(backend: &HeadlessBackend, tokens: &[&str]) -> Vec<Arc<dyn ScreenOps>> {
        for token in tokens {
            backend.parse_cmd(token).unwrap();
        }
        backend.init().unwrap();
        let screens = (0..tokens.len() as u32)
            .map(|index| backend.init_screen(Some(7 + index)).unwrap())
            .collect();
        backend.init_thread().unwrap();
        screens
    }

    #[test_log::test]
    fn geometry_is_calibrated_on_the_display_thread() {
        let backend = HeadlessBackend::window();
        let screens = realized(&backend, &["geometry=320x200+4+8", "geometry=0x0+0+0"]);

        assert_eq!(
            screens[0].display_info(),
            DisplayInfo { xoff: 4, yoff: 8, width: 640, height: 480 }
        );
        assert_eq!(
            screens[1].display_info(),
            DisplayInfo { xoff: 0xFFFF, yoff: 0xFFFF, width: 1920, height: 1080 }
        );
    }

    #[test_log::test]
    fn fullscreen_follows_monitor_size() {
        let backend = HeadlessBackend::window().with_monitors(vec![(1280, 1024), (2560, 1440)]);
        let screens = realized(&backend, &["geometry=fullscreen:1"]);
        assert_eq!(
            screens[0].display_info(),
            DisplayInfo { xoff: 0, yoff: 0, width: 2560, height: 1440 }
        );
    }

    #[test_log::test]
    fn fullscreen_on_missing_monitor_fails_init() {
        let backend = HeadlessBackend::window();
        backend.parse_cmd("geometry=fullscreen:3").unwrap();
        assert!(backend.init().is_err());
    }

    #[test_log::test]
    fn lease_rejects_fullscreen_and_empty_size() {
        let backend = HeadlessBackend::lease();
        assert!(backend.parse_cmd("lease=fullscreen:0").is_err());
        assert!(backend.parse_cmd("lease=0x600+0+0").is_err());
        assert!(backend.parse_cmd("lease=800x600+0+0").is_ok());
    }

    #[test_log::test]
    fn init_screen_beyond_configured_count_fails() {
        let backend = HeadlessBackend::window();
        realized(&backend, &["geometry=800x600+0+0"]);
        assert!(backend.init_screen(None).is_err());
    }

    #[test_log::test]
    fn cursor_refresh_needs_a_surface() {
        let backend = HeadlessBackend::window();
        let screens = realized(&backend, &["geometry=800x600+0+0"]);
        let screen = &backend.screens()[0];

        screens[0].cursor_refresh();
        assert_eq!(screen.snapshot().cursor_refreshes, 0);

        screens[0].surface_set(&Surface::blank(800, 600));
        screens[0].cursor_refresh();
        assert_eq!(screen.snapshot().cursor_refreshes, 1);
        assert_eq!(screen.snapshot().surface, Some((800, 600)));
    }

    #[test_log::test]
    fn hardware_vblank_fires_on_flip() {
        let backend = HeadlessBackend::lease();
        let screens = realized(&backend, &["lease=800x600+0+0"]);
        let last = Arc::new(AtomicU32::new(0));
        let seen = last.clone();

        assert!(screens[0].vblank_init(Arc::new(move |frame: u32, pipe: u32| {
            assert_eq!(pipe, 7);
            seen.store(frame, Ordering::SeqCst);
        })));

        // Not enabled yet: flips do not signal.
        screens[0].surface_update(&Surface::blank(800, 600));
        assert_eq!(last.load(Ordering::SeqCst), 0);

        screens[0].enable_vblank();
        screens[0].surface_update(&Surface::blank(800, 600));
        screens[0].surface_update(&Surface::blank(800, 600));
        assert_eq!(last.load(Ordering::SeqCst), 2);
    }

    #[test_log::test]
    fn hardware_vblank_needs_an_allotted_pipe() {
        let backend = HeadlessBackend::lease();
        backend.parse_cmd("lease=800x600+0+0").unwrap();
        backend.init().unwrap();
        let screen = backend.init_screen(None).unwrap();
        assert!(!screen.vblank_init(Arc::new(|_: u32, _: u32| {})));
        assert_eq!(backend.screens()[0].pipe(), None);
    }

    #[test_log::test]
    fn inverted_bounds_are_refused() {
        let bounds = GeometryConfig {
            max_height: 400,
            ..GeometryConfig::default()
        };
        assert!(matches!(
            HeadlessBackend::window().with_geometry(bounds),
            Err(ConfigError::GeometryBounds(_))
        ));
    }

    #[test_log::test]
    fn window_screens_have_no_hardware_vblank() {
        let backend = HeadlessBackend::window();
        let screens = realized(&backend, &["geometry=800x600+0+0"]);
        assert!(!screens[0].vblank_init(Arc::new(|_: u32, _: u32| {})));
    }

    #[test_log::test]
    fn resources_are_claimed_and_released() {
        let backend = HeadlessBackend::window();
        backend.create_res(3);
        backend.create_res(4);
        backend.destroy_res(3);
        assert_eq!(backend.resources(), vec![4]);
    }
}
