//! Controller/handler split for hypervisor processes.
//!
//! - **VmmController**: spawning (creates a VmmHandler)
//! - **VmmHandler**: runtime operations on a spawned process
//!
//! The registry only talks to these traits, so tests and alternative
//! hypervisors can plug in their own implementations.

mod handler;
mod qemu;
mod spawn;

pub use handler::{VmmExit, VmmHandler};
pub use qemu::{QemuController, QemuHandler};

use crate::definition::VmDefinition;
use tokio_util::sync::CancellationToken;
use vmkeeper_shared::errors::VmkeeperResult;

/// Trait for spawning hypervisor processes.
#[async_trait::async_trait]
pub trait VmmController: Send + Sync {
    /// Spawn a hypervisor for `definition` and return its handler.
    ///
    /// Returns once the process exists, not once its control channel accepts
    /// connections. If `cancel` fires before the spawn, nothing is started;
    /// after the spawn it has no effect on the process.
    async fn launch(
        &self,
        definition: &VmDefinition,
        cancel: &CancellationToken,
    ) -> VmkeeperResult<Box<dyn VmmHandler>>;
}
