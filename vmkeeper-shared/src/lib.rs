//! Types shared between the vmkeeper library and its front ends.

pub mod errors;
pub mod transport;

pub use errors::{VmkeeperError, VmkeeperResult};
pub use transport::Transport;
