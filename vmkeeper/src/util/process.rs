//! Signal helpers for supervised processes.

use vmkeeper_shared::errors::{VmkeeperError, VmkeeperResult};

/// Send `signal` to `pid`.
///
/// A process that no longer exists counts as success: the caller wanted it
/// gone and it is.
pub fn send_signal(pid: u32, signal: libc::c_int) -> VmkeeperResult<()> {
    let pid = pid_t(pid)?;
    let rc = unsafe { libc::kill(pid, signal) };
    if rc == 0 {
        return Ok(());
    }

    let err = std::io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::ESRCH) {
        return Ok(());
    }
    Err(VmkeeperError::Internal(format!(
        "Failed to send signal {} to pid {}: {}",
        signal, pid, err
    )))
}

/// Check if a process with the given PID exists.
///
/// Uses `libc::kill(pid, 0)` which sends a null signal to check existence.
pub fn is_process_alive(pid: u32) -> bool {
    match pid_t(pid) {
        Ok(pid) => unsafe { libc::kill(pid, 0) == 0 },
        Err(_) => false,
    }
}

/// Reject pids that `kill()` would interpret as a process group.
fn pid_t(pid: u32) -> VmkeeperResult<libc::pid_t> {
    match libc::pid_t::try_from(pid) {
        Ok(p) if p > 0 => Ok(p),
        _ => Err(VmkeeperError::Internal(format!("invalid pid {}", pid))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_process_alive_current() {
        assert!(is_process_alive(std::process::id()));
    }

    #[test]
    fn test_is_process_alive_invalid() {
        assert!(!is_process_alive(999999999));
        assert!(!is_process_alive(0));
        assert!(!is_process_alive(u32::MAX));
    }

    #[test]
    fn test_signal_zero_to_self() {
        send_signal(std::process::id(), 0).unwrap();
    }

    #[test]
    fn test_signal_rejects_group_pids() {
        assert!(send_signal(0, libc::SIGTERM).is_err());
        assert!(send_signal(u32::MAX, libc::SIGTERM).is_err());
    }

    #[test]
    fn test_signal_to_missing_process_is_ok() {
        send_signal(999999999, libc::SIGTERM).unwrap();
    }
}
