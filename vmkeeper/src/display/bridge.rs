//! Resolving and dialing an instance's display.

use std::time::Duration;

use bytes::Bytes;
use futures::{Sink, Stream};
use tokio::net::TcpStream;
use vmkeeper_shared::errors::{VmkeeperError, VmkeeperResult};

use super::relay::{RelayOutcome, run_relay};
use crate::registry::InstanceRegistry;
use crate::runtime::options::VmkeeperOptions;

/// Opens display sessions for running instances.
#[derive(Clone, Debug)]
pub struct DisplayBridge {
    registry: InstanceRegistry,
    host: String,
    connect_timeout: Duration,
}

impl DisplayBridge {
    pub fn new(registry: InstanceRegistry, options: &VmkeeperOptions) -> Self {
        Self {
            registry,
            host: options.display_host.clone(),
            connect_timeout: options.display_connect_timeout(),
        }
    }

    /// Dial the display of instance `name`.
    ///
    /// # Errors
    ///
    /// `DisplayUnavailable` when the instance is not running or has no
    /// display. Nothing is dialed in that case. `Connection` when the port
    /// cannot be reached within the display timeout.
    pub async fn connect(&self, name: &str) -> VmkeeperResult<DisplaySession> {
        let port = self.registry.display_port(name);
        if port == 0 {
            return Err(VmkeeperError::DisplayUnavailable(name.to_string()));
        }

        // Host and port stay separate so IPv6 literals need no brackets.
        let addr = if self.host.contains(':') {
            format!("[{}]:{}", self.host, port)
        } else {
            format!("{}:{}", self.host, port)
        };
        let target = tokio::time::timeout(
            self.connect_timeout,
            TcpStream::connect((self.host.as_str(), port)),
        )
            .await
            .map_err(|_| {
                VmkeeperError::Connection(format!(
                    "timed out connecting to display of {} at {}",
                    name, addr
                ))
            })?
            .map_err(|e| {
                VmkeeperError::Connection(format!(
                    "failed to connect to display of {} at {}: {}",
                    name, addr, e
                ))
            })?;
        if let Err(e) = target.set_nodelay(true) {
            tracing::debug!(vm = %name, error = %e, "Failed to set TCP_NODELAY on display connection");
        }

        tracing::debug!(vm = %name, addr = %addr, "Connected to display");
        Ok(DisplaySession::new(name, target))
    }
}

/// An open connection to one instance's display, ready to be relayed.
#[derive(Debug)]
pub struct DisplaySession {
    name: String,
    target: TcpStream,
}

impl DisplaySession {
    pub(crate) fn new(name: impl Into<String>, target: TcpStream) -> Self {
        Self {
            name: name.into(),
            target,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Relay bytes between the client and the display until either side
    /// closes or fails. Both connections are released before this returns.
    ///
    /// Inbound client messages are written to the display as raw bytes;
    /// display reads go out as one message per chunk. Message boundaries are
    /// not preserved.
    pub async fn relay<S, K, E>(self, client_rx: S, client_tx: K) -> RelayOutcome
    where
        S: Stream<Item = Result<Bytes, E>> + Unpin + Send + 'static,
        E: std::fmt::Display + Send + 'static,
        K: Sink<Bytes> + Unpin + Send + 'static,
        K::Error: std::fmt::Display + Send,
    {
        let outcome = run_relay(self.target, client_rx, client_tx).await;

        match &outcome.end {
            super::RelayEnd::Closed => tracing::info!(
                vm = %self.name,
                ended_by = %outcome.direction,
                bytes_to_display = outcome.bytes_to_target,
                bytes_to_client = outcome.bytes_to_client,
                "Display session closed"
            ),
            super::RelayEnd::Failed(reason) => tracing::warn!(
                vm = %self.name,
                ended_by = %outcome.direction,
                error = %VmkeeperError::RelayFailed(reason.clone()),
                bytes_to_display = outcome.bytes_to_target,
                bytes_to_client = outcome.bytes_to_client,
                "Display session failed"
            ),
        }
        outcome
    }
}
