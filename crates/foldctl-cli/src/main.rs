//! Entrypoint for the `foldctl` binary.
//!
//! The binary delegates to [`foldctl_cli::run`], which parses arguments,
//! bootstraps diagnostics, and drives one session-engine flow against the
//! configured compute client.

use std::io::{self, StderrLock, StdoutLock};
use std::process::ExitCode;

fn main() -> ExitCode {
    let mut stdout: StdoutLock<'_> = io::stdout().lock();
    let mut stderr: StderrLock<'_> = io::stderr().lock();
    foldctl_cli::run(std::env::args_os(), &mut stdout, &mut stderr)
}
