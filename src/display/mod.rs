// src/display/mod.rs
//! Virtual display controller.
//!
//! `DisplaySetup` collects screens and backlight devices from the option string and
//! realizes the backends. The resulting `VirtualDisplay` owns a dedicated display
//! thread that serializes every surface mutation through a bottom-half queue.
//!
//! ## Threading Model
//! - Any thread may call the `VirtualDisplay` API.
//! - Surface set/update and cursor definition only run on the display thread, through
//!   [`DisplayContext`]. The public methods of the same name forward through the queue.
//! - The UI refresh timer and software vblank timers run on their own timer threads.
//!
//! ## Connection protocol
//! At most one connection exists. `init` grants it and returns its [`Handle`];
//! handle-gated calls with another handle, or with an out-of-range screen, are silent
//! no-ops returning defaults.

pub mod queue;

mod options;
mod screen;
mod thread;


use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;

use log::*;

use crate::backend::{
    BackendRegistry, Cursor, DisplayInfo, ResourceId, ScalingRect, Surface, VblankCallback,
};
use crate::backlight::{BacklightControl, BacklightInfo, BacklightProperties};
use crate::config::DisplayConfig;
use crate::edid::{self, EdidInfo};
use crate::error::{ConfigError, DisplayError};

use options::OptionToken;
use queue::TaskQueue;
use screen::{Screen, ScreenConfig};

pub use queue::{Completion, TaskStatus};
pub use thread::ThreadState;

/// Reusable deferred callback run on the display thread.
pub type BottomHalf = queue::BottomHalf<DisplayContext>;

/// Vblank pipe ids handed out at configuration start here.
const FIRST_PIPE: u32 = 2;

/// Token identifying the active connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle(u32);

impl Handle {
    pub const fn from_raw(raw: u32) -> Self {
        Handle(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }
}

/// What `init` reports to the device model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Connection {
    pub handle: Handle,
    pub scanouts: usize,
    pub pipes: u32,
    pub backlights: usize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// --- Configuration ---

/// Pre-realization builder: parses the option string and binds screens to backends.
pub struct DisplaySetup {
    config: DisplayConfig,
    registry: BackendRegistry,
    backlight: Arc<dyn BacklightControl>,
    screens: Vec<ScreenConfig>,
    backlights: Vec<String>,
    pipe_count: u32,
}

impl DisplaySetup {
    pub fn new(
        config: DisplayConfig,
        registry: BackendRegistry,
        backlight: Arc<dyn BacklightControl>,
    ) -> Self {
        Self {
            config,
            registry,
            backlight,
            screens: Vec::new(),
            backlights: Vec::new(),
            pipe_count: 0,
        }
    }

    /// Apply a comma-separated option string.
    ///
    /// Configuration is best effort: a rejected token is logged and skipped, and the
    /// first error is returned once the whole string has been processed. Exceeding
    /// the screen limit stops processing.
    pub fn configure(&mut self, opts: &str) -> Result<(), ConfigError> {
        let mut first_err = None;

        for token in options::tokenize(opts) {
            let result = match token {
                OptionToken::Backlight(device) => self.add_backlight(device),
                OptionToken::Screen {
                    backend,
                    token,
                    lease,
                    timer_vblank,
                } => {
                    let max = self.config.limits.max_screens;
                    if self.screens.len() >= max {
                        let err = ConfigError::TooManyScreens { max };
                        error!("DisplaySetup: {}", err);
                        first_err.get_or_insert(err);
                        break;
                    }
                    self.add_screen(backend, token, lease, timer_vblank)
                }
                OptionToken::Ignored(token) => {
                    debug!("DisplaySetup: ignoring option '{}'", token);
                    Ok(())
                }
            };
            if let Err(e) = result {
                warn!("DisplaySetup: {}", e);
                first_err.get_or_insert(e);
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn add_backlight(&mut self, device: &str) -> Result<(), ConfigError> {
        if device.is_empty()
            || self.backlights.len() >= self.config.limits.max_backlights
            || !self.backlight.exists(device)
        {
            return Err(ConfigError::InvalidBacklight(device.to_string()));
        }
        info!("DisplaySetup: backlight device '{}'", device);
        self.backlights.push(device.to_string());
        Ok(())
    }

    fn add_screen(
        &mut self,
        backend: &str,
        token: &str,
        lease: bool,
        timer_vblank: bool,
    ) -> Result<(), ConfigError> {
        self.registry
            .find(backend)
            .ok_or_else(|| ConfigError::UnknownBackend(backend.to_string()))?
            .parse_cmd(token)?;

        let soft_vblank_pipe = timer_vblank.then(|| self.next_pipe());
        let hardware_pipe = lease.then(|| self.next_pipe());

        debug!(
            "DisplaySetup: screen {} on backend '{}' (soft vblank pipe {:?}, hardware pipe {:?})",
            self.screens.len(),
            backend,
            soft_vblank_pipe,
            hardware_pipe
        );
        self.screens.push(ScreenConfig {
            backend: backend.to_string(),
            soft_vblank_pipe,
            hardware_pipe,
        });
        Ok(())
    }

    fn next_pipe(&mut self) -> u32 {
        let pipe = FIRST_PIPE + self.pipe_count;
        self.pipe_count += 1;
        pipe
    }

    pub fn screen_count(&self) -> usize {
        self.screens.len()
    }

    pub fn pipe_count(&self) -> u32 {
        self.pipe_count
    }

    pub fn backlight_count(&self) -> usize {
        self.backlights.len()
    }

    /// Bring up every registered backend and obtain the ops of each configured screen.
    pub fn realize(self) -> Result<VirtualDisplay, DisplayError> {
        if let Err(e) = self.registry.init_all() {
            self.registry.deinit_all();
            return Err(e.into());
        }

        let mut screens = Vec::with_capacity(self.screens.len());
        for config in &self.screens {
            match self.registry.init_screen(&config.backend, config.hardware_pipe) {
                Ok(ops) => screens.push(Screen::new(config, ops)),
                Err(e) => {
                    self.registry.deinit_all();
                    return Err(e.into());
                }
            }
        }
        info!(
            "DisplaySetup: realized {} screen(s), {} pipe(s), {} backlight(s)",
            screens.len(),
            self.pipe_count,
            self.backlights.len()
        );

        Ok(VirtualDisplay {
            inner: Arc::new(Inner {
                config: self.config,
                registry: self.registry,
                backlight: self.backlight,
                screens,
                backlights: self.backlights,
                pipe_count: self.pipe_count,
                queue: TaskQueue::new(),
                connections: AtomicU32::new(0),
                active: AtomicBool::new(false),
                state: Mutex::new(ThreadState::NotStarted),
            }),
            thread: Mutex::new(None),
        })
    }
}

// --- Controller ---

/// State shared between the controller and its display thread.
struct Inner {
    config: DisplayConfig,
    registry: BackendRegistry,
    backlight: Arc<dyn BacklightControl>,
    screens: Vec<Screen>,
    backlights: Vec<String>,
    pipe_count: u32,
    queue: TaskQueue<DisplayContext>,
    /// 0 or 1.
    connections: AtomicU32,
    active: AtomicBool,
    state: Mutex<ThreadState>,
}

impl Inner {
    fn thread_state(&self) -> ThreadState {
        *lock(&self.state)
    }

    fn set_state(&self, state: ThreadState) {
        *lock(&self.state) = state;
    }

    /// Starting -> Running. Fails if a stop was requested before the thread got here.
    fn begin_running(&self) -> bool {
        let mut state = lock(&self.state);
        if *state != ThreadState::Starting {
            return false;
        }
        self.queue.open();
        self.active.store(true, Ordering::Release);
        *state = ThreadState::Running;
        true
    }

    fn request_stop(&self) {
        let mut state = lock(&self.state);
        if matches!(*state, ThreadState::Starting | ThreadState::Running) {
            *state = ThreadState::Stopping;
        }
        self.active.store(false, Ordering::Release);
        self.queue.close();
    }
}

/// Virtual display controller. One per device-model instance.
pub struct VirtualDisplay {
    inner: Arc<Inner>,
    thread: Mutex<Option<JoinHandle<anyhow::Result<()>>>>,
}

impl VirtualDisplay {
    /// Start the display thread and grant the connection.
    ///
    /// A second call while connected returns the existing connection. `vblank` is
    /// installed on every screen.
    pub fn init(&self, vblank: Option<VblankCallback>) -> Result<Connection, DisplayError> {
        let mut slot = lock(&self.thread);

        if self.inner.connections.load(Ordering::Acquire) != 0 {
            debug!("VirtualDisplay: already connected");
            return Ok(self.connection());
        }

        if let Some(stale) = slot.take() {
            if !stale.is_finished() {
                *slot = Some(stale);
                return Err(DisplayError::Inactive);
            }
            Self::join(stale);
        }

        let handle = thread::spawn(Arc::clone(&self.inner))?;

        let startup = &self.inner.config.startup;
        let mut attempts = 0;
        let state = loop {
            let state = self.inner.thread_state();
            if matches!(state, ThreadState::Running | ThreadState::Stopped)
                || attempts >= startup.poll_attempts
            {
                break state;
            }
            std::thread::sleep(startup.poll_interval());
            attempts += 1;
        };

        match state {
            ThreadState::Running => {}
            ThreadState::Stopped => {
                let err = match handle.join() {
                    Ok(Err(e)) => e,
                    Ok(Ok(())) => anyhow::anyhow!("display thread exited during startup"),
                    Err(_) => anyhow::anyhow!("display thread panicked during startup"),
                };
                error!("VirtualDisplay: display thread failed: {:#}", err);
                return Err(DisplayError::Backend(err));
            }
            _ => {
                error!("VirtualDisplay: display thread is not ready");
                self.inner.request_stop();
                *slot = Some(handle);
                return Err(DisplayError::StartupTimeout { attempts });
            }
        }

        *slot = Some(handle);
        self.inner.connections.store(1, Ordering::Release);

        if let Some(callback) = vblank {
            for screen in &self.inner.screens {
                screen.vblank_init(Arc::clone(&callback));
            }
        }

        let connection = self.connection();
        info!("VirtualDisplay: connected {:?}", connection);
        Ok(connection)
    }

    /// Drop the connection and stop the display thread.
    pub fn deinit(&self, handle: Handle) -> Result<(), DisplayError> {
        let mut slot = lock(&self.thread);
        if !self.is_connected(handle) {
            return Err(DisplayError::WrongHandle(handle.raw()));
        }
        self.inner.connections.store(0, Ordering::Release);

        if !self.inner.active.load(Ordering::Acquire) {
            return Err(DisplayError::Inactive);
        }
        self.shutdown(&mut slot);
        Ok(())
    }

    fn shutdown(&self, slot: &mut Option<JoinHandle<anyhow::Result<()>>>) {
        self.inner.request_stop();
        if let Some(handle) = slot.take() {
            Self::join(handle);
        }
        for screen in &self.inner.screens {
            screen.disable_vblank();
        }
        info!("VirtualDisplay: display thread exited");
    }

    fn join(handle: JoinHandle<anyhow::Result<()>>) {
        match handle.join() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("VirtualDisplay: display thread failed: {:#}", e),
            Err(e) => error!("VirtualDisplay: display thread panicked: {:?}", e),
        }
    }

    fn connection(&self) -> Connection {
        Connection {
            handle: Handle(self.inner.connections.load(Ordering::Acquire)),
            scanouts: self.inner.screens.len(),
            pipes: self.inner.pipe_count,
            backlights: self.inner.backlights.len(),
        }
    }

    fn is_connected(&self, handle: Handle) -> bool {
        handle.0 != 0 && self.inner.connections.load(Ordering::Acquire) == handle.0
    }

    fn screen(&self, handle: Handle, index: usize) -> Option<&Screen> {
        if !self.is_connected(handle) {
            return None;
        }
        self.inner.screens.get(index)
    }

    pub fn thread_state(&self) -> ThreadState {
        self.inner.thread_state()
    }

    pub fn is_active(&self) -> bool {
        self.inner.active.load(Ordering::Acquire)
    }

    pub fn screen_count(&self) -> usize {
        self.inner.screens.len()
    }

    pub fn pipe_count(&self) -> u32 {
        self.inner.pipe_count
    }

    pub fn backlight_count(&self) -> usize {
        self.inner.backlights.len()
    }

    // --- Queries ---

    /// Geometry of a screen; all zeroes for a foreign handle or unknown screen.
    pub fn display_info(&self, handle: Handle, screen: usize) -> DisplayInfo {
        self.screen(handle, screen)
            .map(|s| s.ops().display_info())
            .unwrap_or_default()
    }

    /// Fill `buf` with the EDID of a screen. A foreign handle gets the default mode;
    /// an unknown screen leaves `buf` untouched.
    pub fn get_edid(&self, handle: Handle, screen: usize, buf: &mut [u8]) {
        let Some(target) = self.inner.screens.get(screen) else {
            return;
        };
        let info = if self.is_connected(handle) {
            let display = target.ops().display_info();
            EdidInfo::new(display.width, display.height)
        } else {
            let geometry = &self.inner.config.geometry;
            EdidInfo::new(geometry.default_width, geometry.default_height)
        };
        edid::generate_edid(&info, buf);
    }

    // --- Inline screen operations ---

    pub fn surface_set_vga(&self, handle: Handle, screen: usize, surface: &Surface) {
        if let Some(s) = self.screen(handle, screen) {
            s.ops().surface_set_vga(surface);
        }
    }

    pub fn surface_update_vga(&self, handle: Handle, screen: usize, surface: &Surface) {
        if let Some(s) = self.screen(handle, screen) {
            s.ops().surface_update_vga(surface);
        }
    }

    pub fn cursor_move(&self, handle: Handle, screen: usize, x: u32, y: u32) {
        if let Some(s) = self.screen(handle, screen) {
            s.ops().cursor_move(x, y);
        }
    }

    pub fn set_modifier(&self, handle: Handle, screen: usize, modifier: u64) {
        if let Some(s) = self.screen(handle, screen) {
            s.ops().set_modifier(modifier);
        }
    }

    pub fn set_scaling(&self, handle: Handle, screen: usize, rect: ScalingRect) {
        if let Some(s) = self.screen(handle, screen) {
            s.ops().set_scaling(rect);
        }
    }

    // --- Display-thread operations ---

    /// Queue a reusable bottom half. `false` when inactive, for a foreign handle, or
    /// when `bh` is still pending.
    pub fn submit_bottom_half(&self, handle: Handle, bh: &BottomHalf) -> bool {
        if !self.is_connected(handle) || !self.is_active() {
            return false;
        }
        self.inner.queue.submit(bh)
    }

    /// Queue a one-shot task for the display thread.
    pub fn submit_task<F>(&self, handle: Handle, task: F) -> Option<Completion>
    where
        F: FnOnce(&DisplayContext) + Send + 'static,
    {
        if !self.is_connected(handle) || !self.is_active() {
            return None;
        }
        self.inner.queue.submit_once(task)
    }

    pub fn surface_set(&self, handle: Handle, screen: usize, surface: Surface) -> Option<Completion> {
        self.submit_task(handle, move |ctx| ctx.surface_set(screen, &surface))
    }

    pub fn surface_update(
        &self,
        handle: Handle,
        screen: usize,
        surface: Surface,
    ) -> Option<Completion> {
        self.submit_task(handle, move |ctx| ctx.surface_update(screen, &surface))
    }

    pub fn cursor_define(&self, handle: Handle, screen: usize, cursor: Cursor) -> Option<Completion> {
        self.submit_task(handle, move |ctx| ctx.cursor_define(screen, &cursor))
    }

    // --- Vblank ---

    /// Install a vblank callback on one screen. Returns whether a vblank source accepted it.
    pub fn vblank_init(&self, screen: usize, callback: VblankCallback) -> bool {
        match self.inner.screens.get(screen) {
            Some(s) => s.vblank_init(callback),
            None => false,
        }
    }

    pub fn enable_vblank(&self, screen: usize) -> Result<(), DisplayError> {
        let Some(s) = self.inner.screens.get(screen) else {
            warn!("VirtualDisplay: enable_vblank on unknown screen {}", screen);
            return Ok(());
        };
        s.enable_vblank(self.inner.config.timing.vblank_interval())?;
        Ok(())
    }

    // --- Resources ---

    pub fn create_res(&self, id: ResourceId) {
        self.inner.registry.create_res(id);
    }

    pub fn destroy_res(&self, id: ResourceId) {
        self.inner.registry.destroy_res(id);
    }

    // --- Backlight ---

    fn backlight_device(&self, handle: Handle, id: usize) -> Result<&str, DisplayError> {
        if !self.is_connected(handle) {
            return Err(DisplayError::WrongHandle(handle.raw()));
        }
        self.inner
            .backlights
            .get(id)
            .map(String::as_str)
            .ok_or(DisplayError::NoSuchBacklight(id))
    }

    pub fn backlight_update_status(
        &self,
        handle: Handle,
        id: usize,
        props: BacklightProperties,
    ) -> Result<(), DisplayError> {
        let device = self.backlight_device(handle, id)?;
        self.inner.backlight.set_brightness(device, props.brightness)?;
        self.inner.backlight.set_power(device, props.power)?;
        Ok(())
    }

    pub fn backlight_get(&self, handle: Handle, id: usize) -> Result<i32, DisplayError> {
        let device = self.backlight_device(handle, id)?;
        Ok(self.inner.backlight.brightness(device)?)
    }

    pub fn backlight_info(&self, handle: Handle, id: usize) -> Result<BacklightInfo, DisplayError> {
        let device = self.backlight_device(handle, id)?;
        Ok(self.inner.backlight.info(device))
    }
}

impl Drop for VirtualDisplay {
    fn drop(&mut self) {
        debug!("VirtualDisplay dropped");
        let mut slot = lock(&self.thread);
        if slot.is_some() {
            self.shutdown(&mut slot);
        }
        self.inner.connections.store(0, Ordering::Release);
        self.inner.registry.deinit_all();
    }
}

// --- Display thread context ---

/// Access to screen surfaces, only available to callbacks on the display thread.
///
/// Not `Send`: it cannot leave the thread it was created on. It exposes no way to
/// submit work, since callbacks run under the queue lock.
pub struct DisplayContext {
    inner: Arc<Inner>,
    _not_send: PhantomData<*const ()>,
}

impl DisplayContext {
    fn new(inner: Arc<Inner>) -> Self {
        Self {
            inner,
            _not_send: PhantomData,
        }
    }

    pub fn screen_count(&self) -> usize {
        self.inner.screens.len()
    }

    pub fn display_info(&self, screen: usize) -> DisplayInfo {
        self.inner
            .screens
            .get(screen)
            .map(|s| s.ops().display_info())
            .unwrap_or_default()
    }

    pub fn surface_set(&self, screen: usize, surface: &Surface) {
        if let Some(s) = self.inner.screens.get(screen) {
            s.ops().surface_set(surface);
        }
    }

    pub fn surface_update(&self, screen: usize, surface: &Surface) {
        if let Some(s) = self.inner.screens.get(screen) {
            s.ops().surface_update(surface);
            s.mark_refreshed();
        }
    }

    pub fn cursor_define(&self, screen: usize, cursor: &Cursor) {
        if let Some(s) = self.inner.screens.get(screen) {
            s.ops().cursor_define(cursor);
        }
    }

    /// Periodic UI refresh: re-present every screen not updated within the minimum interval.
    fn refresh_screens(&self) {
        let min_interval = self.inner.config.timing.min_refresh_interval();
        for (index, screen) in self.inner.screens.iter().enumerate() {
            if screen.since_refresh() < min_interval {
                trace!("DisplayContext: screen {} updated recently, skipping refresh", index);
                continue;
            }
            screen.ops().cursor_refresh();
        }
    }
}
