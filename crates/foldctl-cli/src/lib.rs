//! Command-line runtime for the compute-client controller.
//!
//! The module owns argument parsing, diagnostics bootstrapping, and the
//! thin wiring from subcommands into the session-engine flows. The
//! interface is designed to be exercised both from the binary entrypoint
//! and from tests where IO streams can be substituted.

use std::ffi::OsString;
use std::io::{self, Write};
use std::process::ExitCode;

use clap::Parser;
use serde_json::{Map, Value};
use thiserror::Error;

use foldctl_client::{Client, ClientError, SessionOptions, Target, TargetError};

mod cli;
mod signals;
mod telemetry;

use cli::{Cli, CliCommand};
use signals::SignalError;
use telemetry::TelemetryError;

/// Runs the CLI using the provided arguments and IO handles.
#[must_use]
pub fn run<I, W, E>(args: I, stdout: &mut W, stderr: &mut E) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
{
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        // Help and version renderings are successful outcomes on stdout;
        // everything else is a usage error on stderr.
        Err(error) if error.use_stderr() => {
            let _ = write!(stderr, "{}", error.render());
            return ExitCode::FAILURE;
        }
        Err(error) => {
            let _ = write!(stdout, "{}", error.render());
            return ExitCode::SUCCESS;
        }
    };

    match execute(cli.command, stdout) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            let _ = writeln!(stderr, "{error}");
            ExitCode::FAILURE
        }
    }
}

fn execute<W: Write>(command: CliCommand, stdout: &mut W) -> Result<(), AppError> {
    let options = command.options();
    telemetry::initialise(&telemetry::resolve_filter(
        options.log_filter.as_deref(),
        options.verbose,
    ))?;

    let target = Target::new(options.host.clone(), options.port, options.peer.clone())?;
    let client = Client::new(target, SessionOptions::default());
    signals::install(client.event_sender())?;

    match command {
        CliCommand::Pause { .. } => client.run_verb("pause").map_err(AppError::from),
        CliCommand::Unpause { .. } => client.run_verb("unpause").map_err(AppError::from),
        CliCommand::Finish { .. } => client.run_verb("finish").map_err(AppError::from),
        CliCommand::Status { .. } => {
            let answer = client.run_status()?;
            writeln!(stdout, "{answer}").map_err(AppError::Output)?;
            stdout.flush().map_err(AppError::Output)
        }
        CliCommand::Log { .. } => client
            .run_log(|line| {
                // Best effort: a vanished reader must not abort the stream.
                let _ = writeln!(stdout, "{line}");
                let _ = stdout.flush();
            })
            .map_err(AppError::from),
        CliCommand::Config { key, value, .. } => {
            let mut pairs = Map::new();
            pairs.insert(key, parse_config_value(&value));
            client.run_config(pairs).map_err(AppError::from)
        }
    }
}

/// Interprets a raw config value as JSON when possible, else as a string.
/// Key semantics are validated by the daemon, not here.
fn parse_config_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_owned()))
}

#[derive(Debug, Error)]
enum AppError {
    #[error("invalid connection target: {0}")]
    Target(#[from] TargetError),
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
    #[error(transparent)]
    Signals(#[from] SignalError),
    #[error("failed to write output: {0}")]
    Output(#[source] io::Error),
}
