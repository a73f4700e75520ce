//! One-shot QMP sessions over a Unix socket.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::UnixStream;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use vmkeeper_shared::errors::{VmkeeperError, VmkeeperResult};

use super::messages::{ErrorPayload, QmpCommand, RunState, ServerMessage};

/// Client for one instance's control socket.
///
/// Holds only the endpoint; every call opens, uses and closes its own
/// connection.
#[derive(Debug, Clone)]
pub struct QmpClient {
    socket_path: PathBuf,
    connect_timeout: Duration,
}

impl QmpClient {
    pub fn new(socket_path: impl Into<PathBuf>, connect_timeout: Duration) -> Self {
        Self {
            socket_path: socket_path.into(),
            connect_timeout,
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Pause guest execution.
    pub async fn pause(&self) -> VmkeeperResult<()> {
        self.execute("stop", None).await.map(drop)
    }

    /// Resume guest execution.
    pub async fn resume(&self) -> VmkeeperResult<()> {
        self.execute("cont", None).await.map(drop)
    }

    /// Ask the guest to power off (ACPI power button).
    pub async fn power_down(&self) -> VmkeeperResult<()> {
        self.execute("system_powerdown", None).await.map(drop)
    }

    pub async fn query_status(&self) -> VmkeeperResult<RunState> {
        let value = self.execute("query-status", None).await?;
        serde_json::from_value(value)
            .map_err(|e| VmkeeperError::Protocol(format!("malformed query-status reply: {}", e)))
    }

    /// Save an internal snapshot named `tag`.
    pub async fn save_snapshot(&self, tag: &str) -> VmkeeperResult<()> {
        self.human_monitor("savevm", tag).await
    }

    /// Revert the guest to snapshot `tag`.
    pub async fn load_snapshot(&self, tag: &str) -> VmkeeperResult<()> {
        self.human_monitor("loadvm", tag).await
    }

    pub async fn delete_snapshot(&self, tag: &str) -> VmkeeperResult<()> {
        self.human_monitor("delvm", tag).await
    }

    /// Run `command` with optional `arguments` and return its `return` value.
    ///
    /// The connection is closed before returning, on success and on error.
    pub async fn execute(&self, command: &str, arguments: Option<Value>) -> VmkeeperResult<Value> {
        let stream = self.connect().await?;
        let (read_half, write_half) = stream.into_split();
        let mut session = Session {
            lines: BufReader::new(read_half).lines(),
            writer: write_half,
        };

        let result = session.run(command, arguments).await;
        session.close().await;

        match &result {
            Ok(_) => tracing::debug!(
                socket = %self.socket_path.display(),
                command,
                "QMP command completed"
            ),
            Err(e) => tracing::debug!(
                socket = %self.socket_path.display(),
                command,
                error = %e,
                "QMP command failed"
            ),
        }
        result
    }

    async fn connect(&self) -> VmkeeperResult<UnixStream> {
        match tokio::time::timeout(self.connect_timeout, UnixStream::connect(&self.socket_path))
            .await
        {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(e)) => Err(VmkeeperError::Connection(format!(
                "{}: {}",
                self.socket_path.display(),
                e
            ))),
            Err(_) => Err(VmkeeperError::Connection(format!(
                "{}: timed out after {:?}",
                self.socket_path.display(),
                self.connect_timeout
            ))),
        }
    }

    /// Internal snapshots are only reachable through the human monitor, which
    /// reports failure as non-empty text instead of an error object.
    async fn human_monitor(&self, verb: &str, tag: &str) -> VmkeeperResult<()> {
        validate_tag(tag)?;
        let output = self
            .execute(
                "human-monitor-command",
                Some(json!({ "command-line": format!("{} {}", verb, tag) })),
            )
            .await?;

        let text = output.as_str().unwrap_or_default().trim();
        if text.is_empty() {
            Ok(())
        } else {
            Err(VmkeeperError::Command {
                command: verb.to_string(),
                class: "HumanMonitorError".to_string(),
                desc: text.to_string(),
            })
        }
    }
}

fn validate_tag(tag: &str) -> VmkeeperResult<()> {
    if tag.is_empty() || tag.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(VmkeeperError::Config(format!(
            "invalid snapshot name {:?}",
            tag
        )));
    }
    Ok(())
}

struct Session {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl Session {
    async fn run(&mut self, command: &str, arguments: Option<Value>) -> VmkeeperResult<Value> {
        self.expect_greeting().await?;

        self.send("qmp_capabilities", None).await?;
        // Only a non-empty error fails negotiation.
        if let Err(error) = self.read_response().await?
            && let Some(payload) = ErrorPayload::from_value(&error)
        {
            return Err(VmkeeperError::Protocol(format!(
                "capability negotiation rejected: {}: {}",
                payload.class, payload.desc
            )));
        }

        self.send(command, arguments).await?;
        self.read_response().await?.map_err(|error| {
            let payload = ErrorPayload::from_error_field(&error);
            VmkeeperError::Command {
                command: command.to_string(),
                class: payload.class,
                desc: payload.desc,
            }
        })
    }

    async fn expect_greeting(&mut self) -> VmkeeperResult<()> {
        match self.read_message().await? {
            Some(ServerMessage::Greeting { banner }) if banner.is_object() => Ok(()),
            Some(other) => Err(VmkeeperError::Protocol(format!(
                "expected greeting, got {:?}",
                other
            ))),
            None => Err(VmkeeperError::Protocol(
                "connection closed before greeting".into(),
            )),
        }
    }

    /// Next command response, skipping asynchronous events.
    ///
    /// The outer error is a transport/protocol failure; the inner `Err` is the
    /// raw `error` field reported by the server, empty or not.
    async fn read_response(&mut self) -> VmkeeperResult<Result<Value, Value>> {
        loop {
            match self.read_message().await? {
                Some(ServerMessage::Return { value }) => return Ok(Ok(value)),
                Some(ServerMessage::Error { error }) => return Ok(Err(error)),
                Some(ServerMessage::Event { event, data }) => {
                    tracing::debug!(event = %event, data = ?data, "Skipping QMP event");
                }
                Some(ServerMessage::Greeting { .. }) => {
                    return Err(VmkeeperError::Protocol("unexpected second greeting".into()));
                }
                None => {
                    return Err(VmkeeperError::Protocol(
                        "connection closed before response".into(),
                    ));
                }
            }
        }
    }

    async fn read_message(&mut self) -> VmkeeperResult<Option<ServerMessage>> {
        loop {
            let line = self
                .lines
                .next_line()
                .await
                .map_err(|e| VmkeeperError::Connection(format!("read failed: {}", e)))?;
            let Some(line) = line else {
                return Ok(None);
            };
            if line.trim().is_empty() {
                continue;
            }
            return serde_json::from_str(&line).map(Some).map_err(|e| {
                VmkeeperError::Protocol(format!("malformed message {:?}: {}", line, e))
            });
        }
    }

    async fn send(&mut self, execute: &str, arguments: Option<Value>) -> VmkeeperResult<()> {
        let mut buf = serde_json::to_vec(&QmpCommand { execute, arguments })
            .map_err(|e| VmkeeperError::Internal(format!("encode {}: {}", execute, e)))?;
        buf.push(b'\n');
        self.writer
            .write_all(&buf)
            .await
            .map_err(|e| VmkeeperError::Connection(format!("write failed: {}", e)))
    }

    async fn close(mut self) {
        let _ = self.writer.shutdown().await;
    }
}
