//! VmmHandler - runtime operations on a running hypervisor.

use crate::qmp::RunState;
use vmkeeper_shared::Transport;
use vmkeeper_shared::errors::VmkeeperResult;

/// How a supervised process ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VmmExit {
    Exited(i32),
    Signaled(i32),
    /// The exit status could not be collected.
    Unknown(String),
}

impl From<std::process::ExitStatus> for VmmExit {
    fn from(status: std::process::ExitStatus) -> Self {
        use std::os::unix::process::ExitStatusExt;

        if let Some(code) = status.code() {
            VmmExit::Exited(code)
        } else if let Some(signal) = status.signal() {
            VmmExit::Signaled(signal)
        } else {
            VmmExit::Unknown(format!("{:?}", status))
        }
    }
}

impl std::fmt::Display for VmmExit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VmmExit::Exited(code) => write!(f, "exited with code {}", code),
            VmmExit::Signaled(signal) => write!(f, "killed by signal {}", signal),
            VmmExit::Unknown(reason) => write!(f, "unknown exit ({})", reason),
        }
    }
}

/// Runtime operations on one hypervisor process.
///
/// Lifecycle commands go through the control protocol; the only local
/// fallback is signalling the process when a graceful power-down fails.
#[async_trait::async_trait]
pub trait VmmHandler: Send + Sync {
    fn pid(&self) -> u32;

    /// Display port from the launch-time definition, 0 when disabled.
    fn display_port(&self) -> u16;

    /// Control-channel endpoint of this instance.
    fn control_transport(&self) -> &Transport;

    /// Whether the process has not been observed to exit yet.
    fn is_running(&self) -> bool;

    /// Graceful shutdown, falling back to SIGTERM if the control channel fails.
    async fn power_down(&self) -> VmkeeperResult<()>;

    async fn pause(&self) -> VmkeeperResult<()>;

    async fn resume(&self) -> VmkeeperResult<()>;

    async fn create_snapshot(&self, tag: &str) -> VmkeeperResult<()>;

    async fn restore_snapshot(&self, tag: &str) -> VmkeeperResult<()>;

    async fn delete_snapshot(&self, tag: &str) -> VmkeeperResult<()>;

    async fn query_status(&self) -> VmkeeperResult<RunState>;

    /// SIGKILL, bypassing the control channel.
    fn kill(&self) -> VmkeeperResult<()>;

    /// Resolve once the process has exited. Safe to await from many tasks.
    async fn wait(&self) -> VmmExit;
}
