//! Control-channel endpoint addresses.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Where a hypervisor listens for control-protocol connections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Transport {
    Unix { socket_path: PathBuf },
}

impl Transport {
    pub fn unix(socket_path: impl Into<PathBuf>) -> Self {
        Transport::Unix {
            socket_path: socket_path.into(),
        }
    }

    pub fn socket_path(&self) -> &Path {
        match self {
            Transport::Unix { socket_path } => socket_path,
        }
    }

    /// Render as a hypervisor chardev address (`unix:<path>`).
    pub fn to_uri(&self) -> String {
        match self {
            Transport::Unix { socket_path } => format!("unix:{}", socket_path.display()),
        }
    }
}

impl std::fmt::Display for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_uri())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unix_uri() {
        let t = Transport::unix("/tmp/vm.qmp");
        assert_eq!(t.to_uri(), "unix:/tmp/vm.qmp");
        assert_eq!(t.socket_path(), Path::new("/tmp/vm.qmp"));
    }

    #[test]
    fn test_serde_shape() {
        let t = Transport::unix("/run/a.qmp");
        let json = serde_json::to_string(&t).unwrap();
        assert_eq!(json, r#"{"type":"unix","socket_path":"/run/a.qmp"}"#);
    }
}
