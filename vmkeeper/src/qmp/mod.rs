//! QMP control-protocol client.
//!
//! Each command runs in its own session:
//!
//! ```text
//! connect ─▶ greeting ─▶ qmp_capabilities ─▶ command ─▶ response ─▶ close
//! ```
//!
//! No state survives between commands and nothing is retried here.

mod client;
mod messages;

pub use client::QmpClient;
pub use messages::RunState;
