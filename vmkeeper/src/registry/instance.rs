//! Registry entries and the per-instance exit watcher.

use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::manager::RegistryInner;
use super::types::InstanceInfo;
use crate::vmm::VmmHandler;

pub(super) enum Entry {
    /// Name claimed by a start whose launch has not finished.
    Reserved,
    Active(Arc<Instance>),
}

/// One running hypervisor as tracked by the registry.
pub(super) struct Instance {
    /// Distinguishes successive instances of the same name.
    pub(super) id: u64,
    pub(super) name: String,
    pub(super) uuid: Uuid,
    pub(super) handler: Arc<dyn VmmHandler>,
    pub(super) started_at: DateTime<Utc>,
    pub(super) watcher: JoinHandle<()>,
}

impl Instance {
    pub(super) fn info(&self) -> InstanceInfo {
        InstanceInfo {
            name: self.name.clone(),
            uuid: self.uuid,
            pid: self.handler.pid(),
            display_port: self.handler.display_port(),
            control_socket: self.handler.control_transport().socket_path().to_path_buf(),
            started_at: self.started_at,
        }
    }
}

/// Wait for the process to exit, then remove the entry if it still belongs
/// to instance `id`.
pub(super) fn spawn_exit_watcher(
    registry: Weak<RegistryInner>,
    name: String,
    id: u64,
    handler: Arc<dyn VmmHandler>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let exit = handler.wait().await;
        tracing::info!(vm = %name, pid = handler.pid(), exit = %exit, "Instance exited");

        match registry.upgrade() {
            Some(registry) => {
                if !registry.reap(&name, id) {
                    tracing::debug!(vm = %name, id, "Entry already reaped or replaced");
                }
            }
            None => tracing::debug!(vm = %name, "Registry dropped before reaping"),
        }
    })
}
