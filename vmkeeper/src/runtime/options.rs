//! Runtime configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use vmkeeper_shared::errors::{VmkeeperError, VmkeeperResult};

/// Environment variable that overrides the home directory.
pub const HOME_ENV: &str = "VMKEEPER_HOME";

const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 2_000;

/// Options for a [`VmkeeperRuntime`](crate::VmkeeperRuntime).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VmkeeperOptions {
    /// Root of every file the runtime touches. Must be absolute.
    pub home_dir: PathBuf,
    /// Hypervisor executable to use instead of `qemu-system-<arch>`.
    pub hypervisor_binary: Option<PathBuf>,
    /// Bound on connecting to an instance's control socket.
    pub control_connect_timeout_ms: u64,
    /// Bound on connecting to an instance's display port.
    pub display_connect_timeout_ms: u64,
    /// Host the display ports are reachable on.
    pub display_host: String,
}

impl Default for VmkeeperOptions {
    fn default() -> Self {
        Self {
            home_dir: default_home_dir(),
            hypervisor_binary: None,
            control_connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            display_connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            display_host: "127.0.0.1".to_string(),
        }
    }
}

impl VmkeeperOptions {
    /// Options rooted at `home_dir`, defaults elsewhere.
    pub fn with_home(home_dir: impl Into<PathBuf>) -> Self {
        Self {
            home_dir: home_dir.into(),
            ..Default::default()
        }
    }

    /// Load options from a YAML file. Missing keys keep their defaults and
    /// `VMKEEPER_HOME` wins over the file's `home_dir`.
    pub fn from_file(path: &Path) -> VmkeeperResult<Self> {
        let data = std::fs::read_to_string(path).map_err(|e| {
            VmkeeperError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let mut options: Self = serde_yaml::from_str(&data)
            .map_err(|e| VmkeeperError::Config(format!("{}: {}", path.display(), e)))?;

        if let Some(home) = std::env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
            options.home_dir = PathBuf::from(home);
        }
        Ok(options)
    }

    pub fn control_connect_timeout(&self) -> Duration {
        Duration::from_millis(self.control_connect_timeout_ms)
    }

    pub fn display_connect_timeout(&self) -> Duration {
        Duration::from_millis(self.display_connect_timeout_ms)
    }

    /// Validate before any filesystem work.
    pub fn sanitize(&self) -> VmkeeperResult<()> {
        if !self.home_dir.is_absolute() {
            return Err(VmkeeperError::Config(format!(
                "home_dir must be absolute path, got: {}",
                self.home_dir.display()
            )));
        }
        if self.control_connect_timeout_ms == 0 || self.display_connect_timeout_ms == 0 {
            return Err(VmkeeperError::Config(
                "connect timeouts must be greater than zero".into(),
            ));
        }
        if self.display_host.is_empty() {
            return Err(VmkeeperError::Config("display_host must not be empty".into()));
        }
        Ok(())
    }
}

fn default_home_dir() -> PathBuf {
    if let Some(home) = std::env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
        return PathBuf::from(home);
    }
    dirs::data_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(std::env::temp_dir)
        .join("vmkeeper")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_sanitize_rejects_relative_home() {
        let options = VmkeeperOptions::with_home("relative/home");
        assert!(matches!(options.sanitize(), Err(VmkeeperError::Config(_))));
    }

    #[test]
    fn test_sanitize_rejects_zero_timeout() {
        let mut options = VmkeeperOptions::with_home("/var/lib/vmkeeper");
        options.control_connect_timeout_ms = 0;
        assert!(options.sanitize().is_err());
    }

    #[test]
    fn test_from_file_keeps_defaults_for_missing_keys() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            "display_host: 10.0.0.5\ncontrol_connect_timeout_ms: 500\n",
        )
        .unwrap();

        let options = VmkeeperOptions::from_file(&path).unwrap();
        assert_eq!(options.display_host, "10.0.0.5");
        assert_eq!(options.control_connect_timeout(), Duration::from_millis(500));
        assert_eq!(options.display_connect_timeout(), Duration::from_secs(2));
        assert!(options.hypervisor_binary.is_none());
    }

    #[test]
    fn test_from_file_missing_is_config_error() {
        let err = VmkeeperOptions::from_file(Path::new("/nonexistent/vmkeeper.yaml")).unwrap_err();
        assert!(matches!(err, VmkeeperError::Config(_)));
    }
}
