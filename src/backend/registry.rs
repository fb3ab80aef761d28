// src/backend/registry.rs
//! Startup-time backend registration table.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use log::*;

use super::{DisplayBackend, ResourceId, ScreenOps};

/// Backends in registration order. Lookup by name returns the first match.
#[derive(Default)]
pub struct BackendRegistry {
    backends: Vec<Arc<dyn DisplayBackend>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, backend: Arc<dyn DisplayBackend>) -> &mut Self {
        debug!("BackendRegistry: Registering backend '{}'", backend.name());
        self.backends.push(backend);
        self
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, backend: Arc<dyn DisplayBackend>) -> Self {
        self.register(backend);
        self
    }

    pub fn find(&self, name: &str) -> Option<&dyn DisplayBackend> {
        self.backends
            .iter()
            .find(|backend| backend.name() == name)
            .map(|backend| backend.as_ref())
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    pub fn init_screen(&self, name: &str, pipe: Option<u32>) -> Result<Arc<dyn ScreenOps>> {
        let backend = self
            .find(name)
            .ok_or_else(|| anyhow!("no display backend named '{}'", name))?;
        backend.init_screen(pipe)
    }

    /// Run `init` on every backend. All of them run even if one fails; the first
    /// failure is returned.
    pub fn init_all(&self) -> Result<()> {
        Self::run_all(&self.backends, "init", |backend| backend.init())
    }

    pub fn deinit_all(&self) {
        for backend in &self.backends {
            backend.deinit();
        }
    }

    pub fn init_thread_all(&self) -> Result<()> {
        Self::run_all(&self.backends, "init_thread", |backend| backend.init_thread())
    }

    pub fn deinit_thread_all(&self) {
        for backend in &self.backends {
            backend.deinit_thread();
        }
    }

    /// Offer a resource to every backend; the one owning its consumer claims it.
    pub fn create_res(&self, id: ResourceId) {
        for backend in &self.backends {
            backend.create_res(id);
        }
    }

    pub fn destroy_res(&self, id: ResourceId) {
        for backend in &self.backends {
            backend.destroy_res(id);
        }
    }

    fn run_all(
        backends: &[Arc<dyn DisplayBackend>],
        hook: &str,
        mut f: impl FnMut(&dyn DisplayBackend) -> Result<()>,
    ) -> Result<()> {
        let mut first_err = None;
        for backend in backends {
            if let Err(e) = f(backend.as_ref()) {
                error!(
                    "BackendRegistry: {} failed for backend '{}': {:#}",
                    hook,
                    backend.name(),
                    e
                );
                first_err.get_or_insert(e.context(format!("backend '{}'", backend.name())));
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
