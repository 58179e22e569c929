//! Command-line surface.
//!
//! Argument parsing stays deliberately thin: it validates syntax, builds a
//! [`Target`](foldctl_client::Target), and hands off to the session engine.
//! Key semantics for `config` are the daemon's business and pass through
//! unmodified.

use clap::{Args, Parser, Subcommand};

use foldctl_client::{DEFAULT_HOST, DEFAULT_PORT};

/// Utility for controlling a Folding@home v8 compute client.
#[derive(Debug, Parser)]
#[command(name = "foldctl", version, disable_help_subcommand = true)]
pub struct Cli {
    /// Structured subcommands.
    #[command(subcommand)]
    pub command: CliCommand,
}

/// Options shared by every remote command.
#[derive(Debug, Clone, Args)]
pub struct RemoteOptions {
    /// The host running a client.
    #[arg(long, default_value = DEFAULT_HOST)]
    pub host: String,

    /// The client websocket port.
    #[arg(short, long, default_value_t = DEFAULT_PORT,
          value_parser = clap::value_parser!(u16).range(1..))]
    pub port: u16,

    /// Scope the connection to a named group (must start with '/').
    #[arg(long)]
    pub peer: Option<String>,

    /// Enable verbose diagnostics.
    #[arg(short, long)]
    pub verbose: bool,

    /// Tracing filter expression; overrides --verbose.
    #[arg(long)]
    pub log_filter: Option<String>,
}

/// Subcommands mapped onto session-engine flows.
#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Send pause to client.
    Pause {
        #[command(flatten)]
        options: RemoteOptions,
    },
    /// Send unpause to client.
    Unpause {
        #[command(flatten)]
        options: RemoteOptions,
    },
    /// Send finish to client; cleared by pause/unpause.
    Finish {
        #[command(flatten)]
        options: RemoteOptions,
    },
    /// Show client units, config, info as raw JSON.
    Status {
        #[command(flatten)]
        options: RemoteOptions,
    },
    /// Stream the client log until interrupted.
    Log {
        #[command(flatten)]
        options: RemoteOptions,
    },
    /// Set a client config value.
    Config {
        #[command(flatten)]
        options: RemoteOptions,
        /// Configuration key, passed through to the daemon.
        key: String,
        /// New value; parsed as JSON when possible, else sent as a string.
        value: String,
    },
}

impl CliCommand {
    /// The connection options of whichever subcommand was parsed.
    #[must_use]
    pub const fn options(&self) -> &RemoteOptions {
        match self {
            Self::Pause { options }
            | Self::Unpause { options }
            | Self::Finish { options }
            | Self::Status { options }
            | Self::Log { options }
            | Self::Config { options, .. } => options,
        }
    }
}
