//! vmkeeper supervises hypervisor processes for named VM definitions.
//!
//! [`VmkeeperRuntime`] ties together the [`InstanceRegistry`] (name to
//! running process), the process supervisor in [`vmm`], the QMP client in
//! [`qmp`] and the [`DisplayBridge`] that relays a client byte stream to an
//! instance's VNC port.

pub mod definition;
pub mod display;
pub mod logging;
pub mod qmp;
pub mod registry;
pub mod runtime;
pub mod util;
pub mod vmm;

pub use definition::{
    DefinitionStore, DirectoryDefinitionStore, MemoryDefinitionStore, VmDefinition,
};
pub use display::{DisplayBridge, DisplaySession, RelayOutcome};
pub use registry::{DefinitionStatus, InstanceInfo, InstanceRegistry, InstanceStatus};
pub use runtime::{FilesystemLayout, VmkeeperOptions, VmkeeperRuntime};
pub use vmkeeper_shared::{Transport, VmkeeperError, VmkeeperResult};
pub use vmm::{ArgumentBuilder, QemuArgBuilder, VmmController, VmmExit, VmmHandler};
