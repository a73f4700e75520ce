//! Display bridge: relays a client byte stream to an instance's VNC port.

mod bridge;
mod relay;

pub use bridge::{DisplayBridge, DisplaySession};
pub use relay::{RelayDirection, RelayEnd, RelayOutcome};
