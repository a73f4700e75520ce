//! Thread-safe instance registry.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use vmkeeper_shared::errors::{VmkeeperError, VmkeeperResult};

use super::guard::ReservationGuard;
use super::instance::{Entry, Instance};
use super::types::{DefinitionStatus, InstanceInfo, InstanceStatus};
use crate::definition::DefinitionStore;
use crate::qmp::RunState;
use crate::vmm::VmmController;

/// Tracks which definitions have a live hypervisor process.
///
/// Cloning is cheap and every clone sees the same map. All per-name
/// mutations (reserve, commit, reap) run under one map-level lock; control
/// commands run after the lock is released.
#[derive(Clone)]
pub struct InstanceRegistry {
    inner: Arc<RegistryInner>,
}

pub(super) struct RegistryInner {
    store: Arc<dyn DefinitionStore>,
    controller: Arc<dyn VmmController>,
    pub(super) entries: Mutex<HashMap<String, Entry>>,
    pub(super) next_id: AtomicU64,
    pub(super) closed: AtomicBool,
    /// Kill policy of the shutdown, for launches that finish after it.
    pub(super) kill_on_close: AtomicBool,
}

impl RegistryInner {
    /// Remove `name` if it still maps to instance `id`. Returns whether an
    /// entry was removed, so a second reap of the same exit is a no-op.
    pub(super) fn reap(&self, name: &str, id: u64) -> bool {
        let mut entries = self.entries.lock();
        match entries.get(name) {
            Some(Entry::Active(instance)) if instance.id == id => {
                entries.remove(name);
                tracing::debug!(vm = %name, id, "Reaped instance");
                true
            }
            _ => false,
        }
    }
}

impl std::fmt::Debug for InstanceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceRegistry")
            .field("entries", &self.inner.entries.lock().len())
            .finish()
    }
}

impl InstanceRegistry {
    pub fn new(store: Arc<dyn DefinitionStore>, controller: Arc<dyn VmmController>) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                store,
                controller,
                entries: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                closed: AtomicBool::new(false),
                kill_on_close: AtomicBool::new(false),
            }),
        }
    }

    /// Launch the hypervisor for definition `name`.
    ///
    /// # Errors
    ///
    /// `NotFound` if the store has no such definition, `AlreadyRunning` if the
    /// name is running or being started, `LaunchFailed` if the process could
    /// not be spawned. A failed start leaves no entry behind.
    pub async fn start(&self, name: &str) -> VmkeeperResult<()> {
        self.start_with_cancel(name, &CancellationToken::new()).await
    }

    /// [`start`](Self::start) with a token that aborts the launch if it fires
    /// before the process is spawned.
    pub async fn start_with_cancel(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> VmkeeperResult<()> {
        let definition = self
            .inner
            .store
            .get(name)?
            .ok_or_else(|| VmkeeperError::NotFound(name.to_string()))?;

        let guard = ReservationGuard::reserve(&self.inner, name)?;

        let handler = match self.inner.controller.launch(&definition, cancel).await {
            Ok(handler) => handler,
            Err(e) => {
                tracing::warn!(vm = %name, error = %e, "Failed to start instance");
                return Err(e);
            }
        };

        let instance = guard.commit(definition.uuid, handler)?;
        tracing::info!(
            vm = %name,
            pid = instance.handler.pid(),
            display_port = instance.handler.display_port(),
            "Instance running"
        );
        Ok(())
    }

    /// Request a graceful power-down.
    ///
    /// The entry stays until the process actually exits, so `status` may
    /// still report running right after this returns.
    pub async fn stop(&self, name: &str) -> VmkeeperResult<()> {
        let instance = self.active(name)?;
        tracing::info!(vm = %name, pid = instance.handler.pid(), "Stopping instance");
        instance.handler.power_down().await
    }

    pub async fn pause(&self, name: &str) -> VmkeeperResult<()> {
        self.active(name)?.handler.pause().await
    }

    pub async fn resume(&self, name: &str) -> VmkeeperResult<()> {
        self.active(name)?.handler.resume().await
    }

    pub async fn create_snapshot(&self, name: &str, tag: &str) -> VmkeeperResult<()> {
        self.active(name)?.handler.create_snapshot(tag).await
    }

    pub async fn restore_snapshot(&self, name: &str, tag: &str) -> VmkeeperResult<()> {
        self.active(name)?.handler.restore_snapshot(tag).await
    }

    pub async fn delete_snapshot(&self, name: &str, tag: &str) -> VmkeeperResult<()> {
        self.active(name)?.handler.delete_snapshot(tag).await
    }

    /// Run state as reported by the hypervisor itself.
    pub async fn run_state(&self, name: &str) -> VmkeeperResult<RunState> {
        self.active(name)?.handler.query_status().await
    }

    /// `Running` iff a committed entry exists. No I/O.
    pub fn status(&self, name: &str) -> InstanceStatus {
        match self.inner.entries.lock().get(name) {
            Some(Entry::Active(_)) => InstanceStatus::Running,
            _ => InstanceStatus::Stopped,
        }
    }

    /// Display port of a running instance; 0 when it has none or is not
    /// running.
    pub fn display_port(&self, name: &str) -> u16 {
        match self.inner.entries.lock().get(name) {
            Some(Entry::Active(instance)) => instance.handler.display_port(),
            _ => 0,
        }
    }

    pub fn info(&self, name: &str) -> Option<InstanceInfo> {
        match self.inner.entries.lock().get(name) {
            Some(Entry::Active(instance)) => Some(instance.info()),
            _ => None,
        }
    }

    /// Running instances, sorted by name.
    pub fn list(&self) -> Vec<InstanceInfo> {
        let mut infos: Vec<InstanceInfo> = self
            .inner
            .entries
            .lock()
            .values()
            .filter_map(|entry| match entry {
                Entry::Active(instance) => Some(instance.info()),
                Entry::Reserved => None,
            })
            .collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }

    /// Every stored definition with its current status.
    pub fn list_definitions(&self) -> VmkeeperResult<Vec<DefinitionStatus>> {
        let definitions = self.inner.store.list()?;
        Ok(definitions
            .into_iter()
            .map(|definition| {
                let status = self.status(&definition.name);
                DefinitionStatus { definition, status }
            })
            .collect())
    }

    /// Detach from every running instance and refuse further starts.
    ///
    /// Exit watchers are aborted so no task outlives the registry. With
    /// `force` each process is also sent SIGKILL; otherwise they keep
    /// running. Starts still launching are dropped the same way when their
    /// launch returns.
    pub fn shutdown(&self, force: bool) {
        let drained: Vec<Arc<Instance>> = {
            let mut entries = self.inner.entries.lock();
            // Set under the map lock so a concurrent commit sees both flags.
            self.inner.kill_on_close.store(force, Ordering::Release);
            self.inner.closed.store(true, Ordering::Release);
            entries
                .drain()
                .filter_map(|(_, entry)| match entry {
                    Entry::Active(instance) => Some(instance),
                    Entry::Reserved => None,
                })
                .collect()
        };

        for instance in drained {
            instance.watcher.abort();
            if force && let Err(e) = instance.handler.kill() {
                tracing::warn!(vm = %instance.name, error = %e, "Failed to kill instance");
            }
        }
        tracing::info!(force, "Instance registry shut down");
    }

    fn active(&self, name: &str) -> VmkeeperResult<Arc<Instance>> {
        match self.inner.entries.lock().get(name) {
            Some(Entry::Active(instance)) => Ok(Arc::clone(instance)),
            _ => Err(VmkeeperError::NotRunning(name.to_string())),
        }
    }
}
