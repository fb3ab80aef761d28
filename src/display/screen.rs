// src/display/screen.rs
//! One virtual output and its vblank source.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use anyhow::Result;
use log::*;

use crate::backend::{ScreenOps, VblankCallback};
use crate::timer::PeriodicTimer;

/// Configuration-time description of a screen, before its backend is realized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ScreenConfig {
    pub backend: String,
    /// Pipe id of the software vblank, when `timer-vblank` was requested.
    pub soft_vblank_pipe: Option<u32>,
    /// Pipe id handed to the backend for its own vblank events (`lease=` screens).
    pub hardware_pipe: Option<u32>,
}

/// Software vblank emulation: a periodic timer invoking the guest callback directly.
struct SoftVblank {
    pipe: u32,
    callback: Option<VblankCallback>,
    timer: Option<PeriodicTimer>,
}

pub(crate) struct Screen {
    backend: String,
    ops: Arc<dyn ScreenOps>,
    last_refresh: Mutex<Instant>,
    soft_vblank: Option<Mutex<SoftVblank>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Screen {
    pub fn new(config: &ScreenConfig, ops: Arc<dyn ScreenOps>) -> Self {
        Self {
            backend: config.backend.clone(),
            ops,
            last_refresh: Mutex::new(Instant::now()),
            soft_vblank: config.soft_vblank_pipe.map(|pipe| {
                Mutex::new(SoftVblank {
                    pipe,
                    callback: None,
                    timer: None,
                })
            }),
        }
    }

    pub fn ops(&self) -> &dyn ScreenOps {
        self.ops.as_ref()
    }

    pub fn mark_refreshed(&self) {
        *lock(&self.last_refresh) = Instant::now();
    }

    pub fn since_refresh(&self) -> Duration {
        lock(&self.last_refresh).elapsed()
    }

    /// Install the guest vblank callback on the software slot, or hand it to the backend.
    pub fn vblank_init(&self, callback: VblankCallback) -> bool {
        match &self.soft_vblank {
            Some(slot) => {
                lock(slot).callback = Some(callback);
                true
            }
            None => self.ops.vblank_init(callback),
        }
    }

    /// Start vblank delivery. A software slot without a callback stays idle.
    pub fn enable_vblank(&self, interval: Duration) -> Result<()> {
        let Some(slot) = &self.soft_vblank else {
            self.ops.enable_vblank();
            return Ok(());
        };

        let mut slot = lock(slot);
        let Some(callback) = slot.callback.clone() else {
            warn!("Screen '{}': vblank enabled before a callback was installed", self.backend);
            return Ok(());
        };
        if slot.timer.is_some() {
            return Ok(());
        }

        let pipe = slot.pipe;
        let frame = AtomicU32::new(0);
        let timer = PeriodicTimer::spawn(
            &format!("vblank-{}", pipe),
            Duration::ZERO,
            interval,
            move |_expirations| {
                let n = frame.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
                callback(n, pipe);
            },
        )?;
        info!("Screen '{}': software vblank on pipe {} every {:?}", self.backend, pipe, interval);
        slot.timer = Some(timer);
        Ok(())
    }

    /// Stop the software vblank timer, if running.
    pub fn disable_vblank(&self) {
        if let Some(slot) = &self.soft_vblank {
            // Join outside the slot lock.
            let timer = lock(slot).timer.take();
            drop(timer);
        }
    }
}
