// src/display/thread.rs
//! The dedicated display thread.
//!
//! Brings up backend thread state, arms the UI refresh timer, then drains the
//! bottom-half queue until the controller closes it.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::Result;
use log::*;

use super::{BottomHalf, DisplayContext, Inner};
use crate::error::DisplayError;
use crate::timer::PeriodicTimer;

const DISPLAY_THREAD_NAME: &str = "vdisplay";
const UI_TIMER_NAME: &str = "vdisplay-ui";

/// Display thread lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    NotStarted,
    Starting,
    Running,
    Stopping,
    Stopped,
}

pub(super) fn spawn(inner: Arc<Inner>) -> Result<JoinHandle<Result<()>>, DisplayError> {
    inner.set_state(ThreadState::Starting);
    let thread_inner = Arc::clone(&inner);
    thread::Builder::new()
        .name(DISPLAY_THREAD_NAME.to_string())
        .spawn(move || run(thread_inner))
        .map_err(|e| {
            error!("Display thread: failed to spawn: {}", e);
            inner.set_state(ThreadState::Stopped);
            DisplayError::ThreadSpawn(e)
        })
}

/// Marks the thread stopped if it unwinds, so `init` stops polling.
struct UnwindGuard<'a>(&'a Inner);

impl Drop for UnwindGuard<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            error!("Display thread: panicked, marking stopped");
            self.0.request_stop();
            self.0.set_state(ThreadState::Stopped);
        }
    }
}

fn run(inner: Arc<Inner>) -> Result<()> {
    let _unwind = UnwindGuard(inner.as_ref());
    if let Err(e) = inner.registry.init_thread_all() {
        error!("Display thread: backend start failed: {:#}", e);
        inner.registry.deinit_thread_all();
        inner.set_state(ThreadState::Stopped);
        return Err(e);
    }

    for screen in &inner.screens {
        screen.mark_refreshed();
    }

    let refresh = BottomHalf::new(|ctx: &DisplayContext| ctx.refresh_screens());
    let timing = &inner.config.timing;
    let ui_timer = {
        let inner = Arc::clone(&inner);
        let refresh = refresh.clone();
        // Frame dropping: a tick that finds the queue busy or the refresh still
        // pending is skipped.
        PeriodicTimer::spawn(
            UI_TIMER_NAME,
            timing.ui_initial_delay(),
            timing.ui_refresh_interval(),
            move |_expirations| {
                inner.queue.submit_or_drop(&refresh);
            },
        )
    };
    let mut ui_timer = match ui_timer {
        Ok(timer) => timer,
        Err(e) => {
            inner.registry.deinit_thread_all();
            inner.set_state(ThreadState::Stopped);
            return Err(e);
        }
    };

    if inner.begin_running() {
        info!("Display thread: running with {} screen(s)", inner.screens.len());
        let ctx = DisplayContext::new(Arc::clone(&inner));
        while inner.queue.wait_and_drain(&ctx) {}
        info!("Display thread: exiting");
    } else {
        warn!("Display thread: stop requested during startup");
    }

    ui_timer.stop();
    inner.queue.cancel_pending();
    inner.registry.deinit_thread_all();
    inner.set_state(ThreadState::Stopped);
    Ok(())
}
