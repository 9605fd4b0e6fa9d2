//! Structured logging setup.
//!
//! A single entry point that installs a `tracing-subscriber` global
//! subscriber, honoring `RUST_LOG` for filtering. Simplified relative to the
//! teacher's `OperationLogger`-port indirection (`mcb-infrastructure/src/logging.rs`)
//! since this crate has no competing logging framework to bridge — every
//! call site here already uses `tracing` macros directly.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry};

/// Output format for the installed subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable, for interactive use.
    Pretty,
    /// Newline-delimited JSON, for machine-consumed log pipelines.
    Json,
}

/// Install a global `tracing` subscriber.
///
/// Filtering defaults to `info` and can be overridden with `RUST_LOG`. Logs
/// are written to stderr, never stdout — a stdio-transport MCP server's
/// stdout carries the JSON-RPC stream, and log lines interleaved with it
/// corrupt the protocol. Safe to call once per process; a second call is a
/// no-op (the underlying `set_global_default` error is ignored, matching the
/// teacher's fire-and-forget initialization convention for CLI entry points).
pub fn init_logging(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = Registry::default().with(filter);
    let result = match format {
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_target(true).with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_target(true).with_writer(std::io::stderr))
            .try_init(),
    };
    if result.is_err() {
        tracing::debug!("tracing subscriber already initialized, skipping");
    }
}
