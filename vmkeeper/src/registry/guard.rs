//! RAII reservation of an instance name during start.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use chrono::Utc;
use uuid::Uuid;
use vmkeeper_shared::errors::{VmkeeperError, VmkeeperResult};

use super::instance::{Entry, Instance, spawn_exit_watcher};
use super::manager::RegistryInner;
use crate::vmm::VmmHandler;

/// Holds a `Reserved` entry for `name`.
///
/// Dropping the guard without [`commit`](Self::commit) releases the name,
/// whether the start failed, panicked or its future was dropped.
pub(super) struct ReservationGuard {
    registry: Arc<RegistryInner>,
    name: String,
    committed: bool,
}

impl ReservationGuard {
    /// Claim `name`. Fails with `AlreadyRunning` if any entry exists.
    pub(super) fn reserve(registry: &Arc<RegistryInner>, name: &str) -> VmkeeperResult<Self> {
        let mut entries = registry.entries.lock();
        if registry.closed.load(Ordering::Acquire) {
            return Err(VmkeeperError::Internal("registry is shut down".into()));
        }
        if entries.contains_key(name) {
            return Err(VmkeeperError::AlreadyRunning(name.to_string()));
        }
        entries.insert(name.to_string(), Entry::Reserved);
        tracing::trace!(vm = %name, "Reserved instance name");

        Ok(Self {
            registry: Arc::clone(registry),
            name: name.to_string(),
            committed: false,
        })
    }

    /// Replace the reservation with a live instance and start its watcher.
    ///
    /// The watcher is spawned while the map lock is held, so it cannot reap
    /// before the entry exists. If the registry was shut down during the
    /// launch, nothing is inserted and the process follows the shutdown's
    /// kill policy.
    pub(super) fn commit(
        mut self,
        uuid: Uuid,
        handler: Box<dyn VmmHandler>,
    ) -> VmkeeperResult<Arc<Instance>> {
        let handler: Arc<dyn VmmHandler> = Arc::from(handler);
        let instance = {
            let mut entries = self.registry.entries.lock();
            if self.registry.closed.load(Ordering::Acquire) {
                let force = self.registry.kill_on_close.load(Ordering::Acquire);
                drop(entries);
                tracing::warn!(
                    vm = %self.name,
                    pid = handler.pid(),
                    force,
                    "Registry shut down during launch, discarding instance"
                );
                if force && let Err(e) = handler.kill() {
                    tracing::warn!(vm = %self.name, error = %e, "Failed to kill instance");
                }
                return Err(VmkeeperError::Internal("registry is shut down".into()));
            }
            let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
            let watcher = spawn_exit_watcher(
                Arc::downgrade(&self.registry),
                self.name.clone(),
                id,
                Arc::clone(&handler),
            );
            let instance = Arc::new(Instance {
                id,
                name: self.name.clone(),
                uuid,
                handler,
                started_at: Utc::now(),
                watcher,
            });
            entries.insert(self.name.clone(), Entry::Active(Arc::clone(&instance)));
            instance
        };
        self.committed = true;
        Ok(instance)
    }
}

impl Drop for ReservationGuard {
    fn drop(&mut self) {
        if self.committed {
            return;
        }

        let mut entries = self.registry.entries.lock();
        if matches!(entries.get(&self.name), Some(Entry::Reserved)) {
            entries.remove(&self.name);
            tracing::debug!(vm = %self.name, "Released reservation after unsuccessful start");
        }
    }
}
