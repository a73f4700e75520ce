//! Subprocess spawning for the hypervisor binary.

use std::fs::OpenOptions;
use std::path::Path;
use std::process::Stdio;

use tokio::process::{Child, Command};
use vmkeeper_shared::errors::{VmkeeperError, VmkeeperResult};

/// Spawn `binary` with `args`, detached from our terminal.
///
/// stdin is null so the hypervisor never competes for interactive input;
/// stdout and stderr are appended to `log_path`. The child gets its own
/// process group so terminal signals aimed at us do not reach it, and it is
/// not killed when the handle is dropped.
pub(crate) fn spawn_hypervisor(
    binary: &Path,
    args: &[String],
    log_path: &Path,
) -> VmkeeperResult<Child> {
    let log = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .map_err(|e| {
            VmkeeperError::LaunchFailed(format!(
                "Failed to open hypervisor log {}: {}",
                log_path.display(),
                e
            ))
        })?;
    let log_err = log.try_clone().map_err(|e| {
        VmkeeperError::LaunchFailed(format!("Failed to duplicate log handle: {}", e))
    })?;

    let mut cmd = Command::new(binary);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::from(log))
        .stderr(Stdio::from(log_err))
        .process_group(0)
        .kill_on_drop(false);

    cmd.spawn().map_err(|e| {
        let err_msg = format!("Failed to spawn {}: {}", binary.display(), e);
        tracing::error!("{}", err_msg);
        VmkeeperError::LaunchFailed(err_msg)
    })
}
