//! Error taxonomy for vmkeeper.
//!
//! Every lifecycle operation reports one of these variants so front ends can
//! map them onto their own status codes without parsing messages.

use thiserror::Error;

/// Result alias used across vmkeeper crates.
pub type VmkeeperResult<T> = Result<T, VmkeeperError>;

#[derive(Debug, Error)]
pub enum VmkeeperError {
    /// The name is unknown to the definition store.
    #[error("VM {0} not found")]
    NotFound(String),

    /// A start was requested while the name is claimed or running.
    #[error("VM {0} is already running")]
    AlreadyRunning(String),

    /// The operation needs a running instance and there is none.
    #[error("VM {0} is not running")]
    NotRunning(String),

    /// The control channel could not be reached.
    #[error("control channel unreachable: {0}")]
    Connection(String),

    /// The control channel answered with something other than the protocol.
    #[error("control protocol error: {0}")]
    Protocol(String),

    /// The hypervisor rejected a command. `class` and `desc` are verbatim.
    #[error("command '{command}' failed: {class}: {desc}")]
    Command {
        command: String,
        class: String,
        desc: String,
    },

    /// The hypervisor process could not be spawned.
    #[error("launch failed: {0}")]
    LaunchFailed(String),

    /// The instance has no display port configured.
    #[error("no display available for VM {0}")]
    DisplayUnavailable(String),

    /// Display relay I/O failure.
    #[error("display relay failed: {0}")]
    RelayFailed(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_error_keeps_server_text() {
        let err = VmkeeperError::Command {
            command: "savevm".into(),
            class: "GenericError".into(),
            desc: "snapshot 'base' exists".into(),
        };
        assert_eq!(
            err.to_string(),
            "command 'savevm' failed: GenericError: snapshot 'base' exists"
        );
    }

    #[test]
    fn test_io_error_converts() {
        fn open() -> VmkeeperResult<()> {
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"))?;
            Ok(())
        }
        assert!(matches!(open(), Err(VmkeeperError::Io(_))));
    }
}
