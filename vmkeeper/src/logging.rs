//! Tracing setup for processes embedding the runtime.

use std::sync::OnceLock;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use vmkeeper_shared::errors::VmkeeperResult;

use crate::runtime::layout::FilesystemLayout;

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Install the global subscriber: stderr plus a daily log file in `logs/`.
///
/// Filter comes from `RUST_LOG` (default `info`). Only the first call has an
/// effect; later calls, or an already-installed subscriber, are left alone.
pub fn init_logging(layout: &FilesystemLayout) -> VmkeeperResult<()> {
    if LOG_GUARD.get().is_some() {
        return Ok(());
    }

    std::fs::create_dir_all(layout.logs_dir())?;
    let file_appender = tracing_appender::rolling::daily(layout.logs_dir(), "vmkeeper.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(fmt::layer().with_ansi(false).with_writer(non_blocking))
        .try_init()
        .is_ok();

    if installed {
        let _ = LOG_GUARD.set(guard);
    }
    Ok(())
}
