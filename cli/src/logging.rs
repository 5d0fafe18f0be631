//! Diagnostics on stderr.
//!
//! Stdout carries what `vvc` reports (balances, wallet listings, the JSON of
//! `debug events`) and is often piped, so every `tracing` event goes to
//! stderr instead. How much is shown comes from, in order of precedence:
//!
//! 1. `RUST_LOG`, taken verbatim as an `EnvFilter`;
//! 2. the `-v` count: warnings only, then `info`, then `debug` for the two
//!    vvcoin crates, then `trace` for everything including the WebSocket
//!    stack.

use clap::ValueEnum;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, util::TryInitError, EnvFilter, Layer,
};

/// How log lines are rendered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Compact single-line records for a terminal.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

/// Filter directives for a given number of `-v` flags.
pub fn directives(verbose: u8) -> String {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => return "trace".to_string(),
    };
    format!("vvcoin_cli={level},vvcoin_protocol={level},warn")
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init(format: LogFormat, verbose: u8) -> Result<(), TryInitError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(directives(verbose)));

    let layer = match format {
        LogFormat::Text => fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .with_target(verbose > 1)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_current_span(false)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(layer.with_filter(filter))
        .try_init()
}
