//! VM definitions as read from the definition store.
//!
//! A definition is immutable from the engine's point of view: it is read at
//! start time and never written back.

mod store;

pub use store::{DefinitionStore, DirectoryDefinitionStore, MemoryDefinitionStore};

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use vmkeeper_shared::errors::{VmkeeperError, VmkeeperResult};

/// First TCP port of the VNC display range. Display `N` listens on `5900 + N`.
pub const VNC_BASE_PORT: u16 = 5900;

/// Static description of one virtual machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VmDefinition {
    /// Unique key in the store.
    pub name: String,
    /// Identity used to derive the control endpoint path.
    pub uuid: Uuid,
    #[serde(default)]
    pub system: SystemConfig,
    #[serde(default)]
    pub drives: Vec<DriveConfig>,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    /// Appended verbatim after all generated arguments.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_args: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    /// e.g. `x86_64`, `aarch64`. Empty means `x86_64`.
    pub architecture: String,
    /// Machine type, e.g. `q35` or `virt`.
    pub machine: Option<String>,
    /// CPU model, e.g. `host`.
    pub cpu: Option<String>,
    pub memory_mib: u32,
    pub cpus: u32,
    /// `kvm`, `hvf`, `whpx` or `tcg`. Detected from the host when unset.
    pub accelerator: Option<String>,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            architecture: "x86_64".to_string(),
            machine: None,
            cpu: None,
            memory_mib: 2048,
            cpus: 2,
            accelerator: None,
        }
    }
}

impl SystemConfig {
    pub fn architecture(&self) -> &str {
        if self.architecture.is_empty() {
            "x86_64"
        } else {
            &self.architecture
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriveInterface {
    #[default]
    Ide,
    Scsi,
    Virtio,
    Nvme,
    Usb,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageKind {
    #[default]
    Disk,
    Cdrom,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriveConfig {
    pub id: u32,
    #[serde(default)]
    pub interface: DriveInterface,
    pub image_path: String,
    #[serde(default)]
    pub image_kind: ImageKind,
    #[serde(default)]
    pub read_only: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Only user-mode networking is generated today.
    pub mode: String,
    /// NIC model. Defaults to `virtio-net-pci`.
    pub hardware: Option<String>,
    pub port_forwards: Vec<PortForward>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            mode: "user".to_string(),
            hardware: None,
            port_forwards: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortForward {
    #[serde(default = "default_protocol")]
    pub protocol: String,
    pub host_port: u16,
    pub guest_port: u16,
}

fn default_protocol() -> String {
    "tcp".to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub enabled: bool,
    /// TCP port of the VNC server on the host. Must be >= 5900.
    pub vnc_port: Option<u16>,
}

impl VmDefinition {
    /// Minimal definition with defaults for everything but identity.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            uuid: Uuid::new_v4(),
            system: SystemConfig::default(),
            drives: Vec::new(),
            network: NetworkConfig::default(),
            display: DisplayConfig::default(),
            extra_args: Vec::new(),
        }
    }

    /// Enable the VNC display on `port`.
    pub fn with_display(mut self, port: u16) -> Self {
        self.display = DisplayConfig {
            enabled: true,
            vnc_port: Some(port),
        };
        self
    }

    /// Display port the instance will listen on, or 0 when there is none.
    ///
    /// An enabled display without a port yields 0 as well: no port is guessed.
    pub fn display_port(&self) -> u16 {
        if !self.display.enabled {
            return 0;
        }
        self.display.vnc_port.unwrap_or(0)
    }

    /// Reject definitions that cannot be turned into a launch command.
    pub fn sanitize(&self) -> VmkeeperResult<()> {
        if self.name.trim().is_empty() {
            return Err(VmkeeperError::Config("VM name must not be empty".into()));
        }
        // The name becomes a file name under logs/.
        if self.name.contains(['/', '\\', '\0']) || self.name == "." || self.name == ".." {
            return Err(VmkeeperError::Config(format!(
                "VM name {:?} must be a plain file name",
                self.name
            )));
        }
        if self.system.memory_mib == 0 || self.system.cpus == 0 {
            return Err(VmkeeperError::Config(format!(
                "VM {} needs non-zero memory and CPU count",
                self.name
            )));
        }
        if let Some(port) = self.display.vnc_port
            && self.display.enabled
            && port < VNC_BASE_PORT
        {
            return Err(VmkeeperError::Config(format!(
                "VM {}: VNC port {} is below {}",
                self.name, port, VNC_BASE_PORT
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_port_disabled_is_zero() {
        let mut def = VmDefinition::new("alpha");
        def.display.vnc_port = Some(5901);
        assert_eq!(def.display_port(), 0);
    }

    #[test]
    fn test_display_port_enabled_without_port_is_zero() {
        let mut def = VmDefinition::new("alpha");
        def.display.enabled = true;
        assert_eq!(def.display_port(), 0);
    }

    #[test]
    fn test_display_port_enabled() {
        let def = VmDefinition::new("alpha").with_display(5905);
        assert_eq!(def.display_port(), 5905);
    }

    #[test]
    fn test_sanitize_rejects_low_vnc_port() {
        let def = VmDefinition::new("alpha").with_display(80);
        let err = def.sanitize().unwrap_err();
        assert!(err.to_string().contains("below 5900"));
    }

    #[test]
    fn test_sanitize_rejects_empty_name() {
        assert!(VmDefinition::new("  ").sanitize().is_err());
    }

    #[test]
    fn test_sanitize_rejects_path_like_names() {
        for name in ["../escape", "a/b", "a\\b", ".", ".."] {
            let err = VmDefinition::new(name).sanitize().unwrap_err();
            assert!(matches!(err, VmkeeperError::Config(_)), "{name}");
        }
        VmDefinition::new("web-01.prod").sanitize().unwrap();
    }

    #[test]
    fn test_yaml_defaults() {
        let yaml = r#"
name: beta
uuid: 6f1c1c2e-8a3b-4d55-9a57-0c6f8f7f2f10
system:
  architecture: aarch64
  memory_mib: 1024
display:
  enabled: true
  vnc_port: 5902
drives:
  - id: 0
    interface: virtio
    image_path: /images/beta.qcow2
"#;
        let def: VmDefinition = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(def.system.architecture(), "aarch64");
        assert_eq!(def.system.cpus, 2);
        assert_eq!(def.display_port(), 5902);
        assert_eq!(def.drives[0].interface, DriveInterface::Virtio);
        assert_eq!(def.drives[0].image_kind, ImageKind::Disk);
        assert_eq!(def.network.mode, "user");
    }
}
