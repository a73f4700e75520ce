//! Filesystem layout under the runtime home directory.
//!
//! ```text
//! <home>/
//!   machines/          VM definitions (*.yaml)
//!   sockets/<uuid>.qmp control endpoints, one per instance identity
//!   logs/vmkeeper.log  runtime log (daily rolling)
//!   logs/<name>.log    hypervisor stdout/stderr
//! ```

use std::path::{Path, PathBuf};
use uuid::Uuid;
use vmkeeper_shared::errors::{VmkeeperError, VmkeeperResult};

#[derive(Debug, Clone)]
pub struct FilesystemLayout {
    home_dir: PathBuf,
}

impl FilesystemLayout {
    pub fn new(home_dir: PathBuf) -> Self {
        Self { home_dir }
    }

    pub fn home_dir(&self) -> &Path {
        &self.home_dir
    }

    pub fn machines_dir(&self) -> PathBuf {
        self.home_dir.join("machines")
    }

    pub fn sockets_dir(&self) -> PathBuf {
        self.home_dir.join("sockets")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.home_dir.join("logs")
    }

    /// Control endpoint for the instance with identity `uuid`.
    ///
    /// Derived only from the identity, so two definitions never share a socket.
    pub fn control_socket_path(&self, uuid: &Uuid) -> PathBuf {
        self.sockets_dir().join(format!("{}.qmp", uuid))
    }

    /// File receiving the hypervisor's stdout and stderr.
    pub fn instance_log_path(&self, name: &str) -> PathBuf {
        self.logs_dir().join(format!("{}.log", name))
    }

    /// Create all directories.
    pub fn prepare(&self) -> VmkeeperResult<()> {
        for dir in [self.machines_dir(), self.sockets_dir(), self.logs_dir()] {
            std::fs::create_dir_all(&dir).map_err(|e| {
                VmkeeperError::Storage(format!("Failed to create {}: {}", dir.display(), e))
            })?;
        }
        Ok(())
    }
}
