//! Instance registry: the name -> running instance map.

mod guard;
mod instance;
mod manager;
mod types;

pub use manager::InstanceRegistry;
pub use types::{DefinitionStatus, InstanceInfo, InstanceStatus};
