//! Two-task byte relay between a client stream and a TCP target.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};

const READ_BUFFER_SIZE: usize = 4096;

/// Which relay loop ended the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayDirection {
    ClientToTarget,
    TargetToClient,
}

impl std::fmt::Display for RelayDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RelayDirection::ClientToTarget => write!(f, "client"),
            RelayDirection::TargetToClient => write!(f, "display"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayEnd {
    /// The reading side reached a clean end of stream.
    Closed,
    Failed(String),
}

/// How a display session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayOutcome {
    pub direction: RelayDirection,
    pub end: RelayEnd,
    pub bytes_to_target: u64,
    pub bytes_to_client: u64,
}

/// Aborts both relay tasks when dropped, closing the connection halves
/// they own.
struct RelayTasks {
    upstream: JoinHandle<()>,
    downstream: JoinHandle<()>,
}

impl Drop for RelayTasks {
    fn drop(&mut self) {
        self.upstream.abort();
        self.downstream.abort();
    }
}

/// End of a task that finished without reporting, i.e. it panicked.
fn unreported(joined: Result<(), JoinError>) -> RelayEnd {
    match joined {
        Ok(()) => RelayEnd::Failed("relay task ended without reporting".into()),
        Err(e) if e.is_panic() => RelayEnd::Failed("relay task panicked".into()),
        Err(e) => RelayEnd::Failed(e.to_string()),
    }
}

pub(super) async fn run_relay<S, K, E>(target: TcpStream, mut client_rx: S, mut client_tx: K) -> RelayOutcome
where
    S: Stream<Item = Result<Bytes, E>> + Unpin + Send + 'static,
    E: std::fmt::Display + Send + 'static,
    K: Sink<Bytes> + Unpin + Send + 'static,
    K::Error: std::fmt::Display + Send,
{
    let (mut target_rx, mut target_tx) = target.into_split();
    // Single slot: the first report wins, later ones are dropped.
    let (done_tx, mut done_rx) = mpsc::channel::<(RelayDirection, RelayEnd)>(1);
    let to_target = Arc::new(AtomicU64::new(0));
    let to_client = Arc::new(AtomicU64::new(0));

    let upstream = {
        let done_tx = done_tx.clone();
        let counter = Arc::clone(&to_target);
        tokio::spawn(async move {
            let end = loop {
                match client_rx.next().await {
                    Some(Ok(chunk)) => {
                        if let Err(e) = target_tx.write_all(&chunk).await {
                            break RelayEnd::Failed(format!("write to display: {}", e));
                        }
                        counter.fetch_add(chunk.len() as u64, Ordering::Relaxed);
                    }
                    Some(Err(e)) => break RelayEnd::Failed(format!("read from client: {}", e)),
                    None => break RelayEnd::Closed,
                }
            };
            let _ = done_tx.try_send((RelayDirection::ClientToTarget, end));
        })
    };

    let downstream = {
        let counter = Arc::clone(&to_client);
        tokio::spawn(async move {
            let mut buf = vec![0u8; READ_BUFFER_SIZE];
            let end = loop {
                match target_rx.read(&mut buf).await {
                    Ok(0) => break RelayEnd::Closed,
                    Ok(n) => {
                        if let Err(e) = client_tx.send(Bytes::copy_from_slice(&buf[..n])).await {
                            break RelayEnd::Failed(format!("write to client: {}", e));
                        }
                        counter.fetch_add(n as u64, Ordering::Relaxed);
                    }
                    Err(e) => break RelayEnd::Failed(format!("read from display: {}", e)),
                }
            };
            let _ = done_tx.try_send((RelayDirection::TargetToClient, end));
        })
    };

    let mut tasks = RelayTasks {
        upstream,
        downstream,
    };
    // Reports come first; a finished task without one has panicked.
    let (direction, end) = tokio::select! {
        biased;
        Some(report) = done_rx.recv() => report,
        joined = &mut tasks.upstream => (RelayDirection::ClientToTarget, unreported(joined)),
        joined = &mut tasks.downstream => (RelayDirection::TargetToClient, unreported(joined)),
    };
    drop(tasks);

    RelayOutcome {
        direction,
        end,
        bytes_to_target: to_target.load(Ordering::Relaxed),
        bytes_to_client: to_client.load(Ordering::Relaxed),
    }
}
