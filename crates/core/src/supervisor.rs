//! Top-level owner of every unit and the shared track cache.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};

use crate::cache::TrackCache;
use crate::command::{Command, Reply, ReplyValue, Request, Router};
use crate::config::Config;
use crate::unit::UnitEngine;
use crate::unit::worker::UnitWorker;
use crate::DeviceError;

/// Owns the unit registry and the cache every unit shares, and is the single entry point
/// embedders dispatch requests through.
pub struct DeviceSupervisor {
    cache: Arc<TrackCache>,
    config: Config,
    units: HashMap<u32, UnitWorker>,
}

impl std::fmt::Debug for DeviceSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceSupervisor")
            .field("unit_count", &self.units.len())
            .finish_non_exhaustive()
    }
}

impl DeviceSupervisor {
    /// Builds a supervisor with no units registered yet.
    #[must_use]
    pub fn new(config: Config) -> Self {
        let cache = Arc::new(TrackCache::new(config.cache.max_bytes));
        Self {
            cache,
            config,
            units: HashMap::new(),
        }
    }

    /// The shared cache, for an embedder's memory-pressure callback to drive
    /// [`Self::try_reclaim`] against, or to call [`TrackCache::resize`] directly.
    #[must_use]
    pub fn cache(&self) -> &Arc<TrackCache> {
        &self.cache
    }

    /// Creates and starts a new unit with `id`, using the supervisor's configured per-unit
    /// defaults.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::UnitAlreadyExists`] if `id` is already registered.
    pub fn create_unit(&mut self, id: u32) -> Result<(), DeviceError> {
        if self.units.contains_key(&id) {
            return Err(DeviceError::UnitAlreadyExists);
        }
        let engine = UnitEngine::new(id, self.config.unit.clone(), Arc::clone(&self.cache));
        let worker = UnitWorker::spawn(engine, self.config.unit.motor_timeout());
        self.units.insert(id, worker);
        info!(unit = id, "unit created");
        Ok(())
    }

    /// Stops unit `id`'s worker and unconditionally invalidates its cache entries, regardless of
    /// whatever state the medium was left in — this implementation never skips that
    /// invalidation.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::NoCommand`] if `id` is not registered.
    pub fn destroy_unit(&mut self, id: u32) -> Result<(), DeviceError> {
        let worker = self.units.remove(&id).ok_or(DeviceError::NoCommand)?;
        let _engine = worker.teardown();
        self.cache.invalidate_unit(id);
        info!(unit = id, "unit destroyed");
        Ok(())
    }

    /// Inserts `backend` as unit `id`'s medium, running the insertion directly under the unit's
    /// lock rather than through the worker queue — media insert is a control action, not an I/O
    /// command, so it takes the same always-immediate path `dispatch` uses for read-only queries.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::NoCommand`] if `id` is not registered, or whatever
    /// [`UnitEngine::insert_medium`] itself returns (a rejected image size, for instance).
    pub fn insert_medium(
        &self,
        id: u32,
        backend: Box<dyn crate::backend::ImageBackend>,
        write_protected: bool,
    ) -> Result<(), DeviceError> {
        let worker = self.units.get(&id).ok_or(DeviceError::NoCommand)?;
        #[allow(clippy::unwrap_used)]
        let mut engine = worker.engine().lock().unwrap();
        engine.insert_medium(backend, write_protected)
    }

    /// Dispatches `request` to unit `id`.
    ///
    /// `Start`/`Stop` are intercepted here rather than reaching the router at all: only the
    /// supervisor holds the worker handle needed to spawn or join its thread. Every other
    /// always-immediate command (and quick-mode requests for commands that support it) runs
    /// synchronously on the caller's thread, under the same lock the worker itself uses; a
    /// stopped unit's worker falls back to that same inline path so a request never hangs waiting
    /// on a thread that isn't running. Everything else is handed to the unit's worker.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::NoCommand`] if `id` is not registered.
    pub fn dispatch(&self, id: u32, request: Request) -> Reply {
        let worker = self.units.get(&id).ok_or(DeviceError::NoCommand)?;
        match request.command {
            Command::Start => return worker.start().map(|()| ReplyValue::Ok),
            Command::Stop => return worker.stop_if_idle().map(|()| ReplyValue::Ok),
            _ => {}
        }
        if request.command.is_always_immediate() || request.quick || !worker.is_running() {
            #[allow(clippy::unwrap_used)]
            let mut engine = worker.engine().lock().unwrap();
            Router::dispatch(&mut engine, request)
        } else {
            worker.submit(request)
        }
    }

    /// Forwards to [`TrackCache::try_reclaim`] on the shared cache.
    pub fn try_reclaim(&self, bytes: usize) -> usize {
        self.cache.try_reclaim(bytes)
    }

    /// Destroys every registered unit, in id order, then drops the cache.
    pub fn shutdown(&mut self) {
        let mut ids: Vec<u32> = self.units.keys().copied().collect();
        ids.sort_unstable();
        for id in ids {
            let _ = self.destroy_unit(id);
        }
        debug!("supervisor shut down");
    }
}

impl Drop for DeviceSupervisor {
    fn drop(&mut self) {
        self.shutdown();
    }
}
