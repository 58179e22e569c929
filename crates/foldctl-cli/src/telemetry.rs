//! Structured diagnostics initialisation.
//!
//! Diagnostics go to stderr through `tracing`; stdout carries command
//! output only. Installation happens once per process and repeated calls
//! are idempotent.

use std::io::{self, IsTerminal};

use once_cell::sync::OnceCell;
use tracing::subscriber::SetGlobalDefaultError;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;

/// Environment variable consulted for the default filter expression.
pub const LOG_FILTER_ENV: &str = "FOLDCTL_LOG";

/// Filter used when neither the environment nor the flags say otherwise.
pub const DEFAULT_LOG_FILTER: &str = "info";

static TELEMETRY_GUARD: OnceCell<()> = OnceCell::new();

/// Errors encountered while configuring diagnostics.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// The filter expression failed to parse.
    #[error("invalid log filter: {0}")]
    Filter(String),
    /// Installing the tracing subscriber failed.
    #[error("failed to install telemetry subscriber: {0}")]
    Subscriber(#[from] SetGlobalDefaultError),
}

/// Resolves the filter expression from the flag, the environment, and the
/// verbose toggle, in that order.
#[must_use]
pub fn resolve_filter(flag: Option<&str>, verbose: bool) -> String {
    if let Some(filter) = flag {
        return filter.to_owned();
    }
    if let Ok(filter) = std::env::var(LOG_FILTER_ENV)
        && !filter.is_empty()
    {
        return filter;
    }
    if verbose {
        return "debug".to_owned();
    }
    DEFAULT_LOG_FILTER.to_owned()
}

/// Installs the global tracing subscriber on first call.
///
/// # Errors
///
/// Returns [`TelemetryError`] when the filter does not parse or the
/// subscriber cannot be installed.
pub fn initialise(filter: &str) -> Result<(), TelemetryError> {
    TELEMETRY_GUARD
        .get_or_try_init(|| install_subscriber(filter))
        .map(|_| ())
}

fn install_subscriber(filter: &str) -> Result<(), TelemetryError> {
    let filter =
        EnvFilter::try_new(filter).map_err(|error| TelemetryError::Filter(error.to_string()))?;
    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .with_writer(io::stderr)
        // Avoid stray colour codes in non-TTY sinks while keeping colour on
        // interactive terminals.
        .with_ansi(io::stderr().is_terminal())
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}
