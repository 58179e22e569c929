//! Outbound command envelopes.
//!
//! Every mutating interaction with the daemon is one of three envelope
//! shapes: a bare verb (`{"cmd": "pause"}`), a configuration update
//! (`{"cmd": "config", "config": {..}}`), or a log-stream toggle
//! (`{"cmd": "log", "enable": true}`). Serialisation uses `serde_json`'s
//! default sorted map so the frames written to the wire are byte-stable.

use serde::Serialize;
use serde_json::{Map, Value};
use strum::{Display, EnumString};

/// Verbs the daemon accepts as bare commands.
///
/// Parsing doubles as the allow-list: any verb outside this set fails with
/// [`VerbParseError`] before a connection is attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, EnumString, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Verb {
    /// Suspend work on all units.
    Pause,
    /// Resume work after a pause.
    Unpause,
    /// Finish in-flight units, then stop fetching new ones.
    Finish,
}

/// Error raised when a requested verb is not in the allow-list.
pub type VerbParseError = strum::ParseError;

/// Envelope for a bare verb command.
#[derive(Debug, Serialize)]
pub struct VerbEnvelope {
    cmd: Verb,
}

impl VerbEnvelope {
    /// Wraps a verb for transmission.
    #[must_use]
    pub const fn new(cmd: Verb) -> Self {
        Self { cmd }
    }
}

/// Envelope for a configuration update.
#[derive(Debug, Serialize)]
pub struct ConfigEnvelope {
    cmd: &'static str,
    config: Map<String, Value>,
}

impl ConfigEnvelope {
    /// Wraps a set of configuration key/value pairs for transmission.
    ///
    /// Key semantics are the daemon's business; this layer passes them
    /// through unmodified.
    #[must_use]
    pub const fn new(config: Map<String, Value>) -> Self {
        Self {
            cmd: "config",
            config,
        }
    }

    /// Read access to the wrapped pairs.
    #[must_use]
    pub const fn config(&self) -> &Map<String, Value> {
        &self.config
    }
}

/// Envelope toggling the daemon's log stream.
#[derive(Debug, Serialize)]
pub struct LogEnvelope {
    cmd: &'static str,
    enable: bool,
}

impl LogEnvelope {
    /// Builds a log-stream toggle.
    #[must_use]
    pub const fn new(enable: bool) -> Self {
        Self { cmd: "log", enable }
    }
}
