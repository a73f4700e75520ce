//! Public views of registry state.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::definition::VmDefinition;

/// Lifecycle status as seen by the registry.
///
/// A pending start reports `Stopped` until its launch commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceStatus {
    Running,
    Stopped,
}

impl InstanceStatus {
    pub fn is_running(&self) -> bool {
        matches!(self, InstanceStatus::Running)
    }
}

impl std::fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InstanceStatus::Running => write!(f, "running"),
            InstanceStatus::Stopped => write!(f, "stopped"),
        }
    }
}

/// Snapshot of one running instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceInfo {
    pub name: String,
    pub uuid: Uuid,
    pub pid: u32,
    /// 0 when the instance has no display.
    pub display_port: u16,
    pub control_socket: PathBuf,
    pub started_at: DateTime<Utc>,
}

/// A stored definition paired with its current status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefinitionStatus {
    pub definition: VmDefinition,
    pub status: InstanceStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_display_and_serde() {
        assert_eq!(InstanceStatus::Running.to_string(), "running");
        assert_eq!(
            serde_json::to_string(&InstanceStatus::Stopped).unwrap(),
            "\"stopped\""
        );
        assert!(InstanceStatus::Running.is_running());
        assert!(!InstanceStatus::Stopped.is_running());
    }
}
