//! Hypervisor process management.
//!
//! - [`ArgumentBuilder`]: definition → command line
//! - [`VmmController`]: spawns a hypervisor and hands back a handler
//! - [`VmmHandler`]: runtime operations on one running hypervisor

pub mod args;
mod binary;
pub mod controller;

pub use args::{ArgumentBuilder, QemuArgBuilder};
pub use binary::resolve_hypervisor;
pub use controller::{QemuController, QemuHandler, VmmController, VmmExit, VmmHandler};
