//! Tracing setup for the server process.
//!
//! Two sinks: a compact stdout layer for interactive use, and an optional
//! append-only file sink behind a non-blocking writer so pipeline hot paths
//! never wait on disk. `RUST_LOG` controls filtering and defaults to `info`.
//! `PAGESCOUT_LOG_FILE` points the file sink at an explicit path; otherwise
//! it lands at `logs/pagescout.log`. If neither location is writable the
//! process logs to stdout only.

use std::sync::OnceLock;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

// Keeps the non-blocking writer flushing for the process lifetime.
static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Install the global tracing subscriber. Call once, before any spans open.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stdout = fmt::layer().with_target(false).compact();
    let registry = tracing_subscriber::registry().with(filter).with(stdout);

    match open_log_file() {
        Some(writer) => {
            let file = fmt::layer()
                .with_writer(writer)
                .with_target(true)
                .with_ansi(false)
                .compact();
            registry.with(file).init();
        }
        None => registry.init(),
    }
}

fn open_log_file() -> Option<NonBlocking> {
    let (non_blocking, guard) = match std::env::var("PAGESCOUT_LOG_FILE") {
        Ok(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .map_err(|err| eprintln!("Cannot open log file {path}: {err}"))
                .ok()?;
            tracing_appender::non_blocking(file)
        }
        Err(_) => {
            std::fs::create_dir_all("logs")
                .map_err(|err| eprintln!("Cannot create logs directory: {err}"))
                .ok()?;
            tracing_appender::non_blocking(tracing_appender::rolling::never(
                "logs",
                "pagescout.log",
            ))
        }
    };
    let _ = LOG_GUARD.set(guard);
    Some(non_blocking)
}
