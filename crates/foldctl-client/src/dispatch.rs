//! Command dispatcher.
//!
//! Translates verbs and configuration pairs into protocol envelopes and
//! hands them to the transport session. The verb allow-list lives in the
//! protocol crate's [`Verb`] type; parsing a verb is the gate, and it is
//! checked by the flows before any network activity happens.

use serde_json::{Map, Value};
use tracing::warn;

use foldctl_protocol::{ConfigEnvelope, LogEnvelope, Verb, VerbEnvelope};

use crate::session::Session;

/// Configuration key whose value is clamped to the remote-reported maximum.
const CPUS_KEY: &str = "cpus";

/// Sends protocol envelopes over one session.
#[derive(Debug)]
pub struct Dispatcher<'a> {
    session: &'a Session,
}

impl<'a> Dispatcher<'a> {
    /// Wraps a session.
    #[must_use]
    pub const fn new(session: &'a Session) -> Self {
        Self { session }
    }

    /// Transmits a bare verb command.
    pub fn send_verb(&self, verb: Verb) {
        self.transmit(&VerbEnvelope::new(verb));
    }

    /// Wraps configuration pairs in the update envelope and transmits them.
    ///
    /// When the remote has reported a CPU maximum, a numeric `cpus` value is
    /// clamped to it first. This is best-effort: the maximum is read from
    /// the snapshot at send time with no atomicity against remote changes.
    pub fn send_config(&self, pairs: Map<String, Value>, max_cpus: Option<u64>) {
        self.transmit(&ConfigEnvelope::new(clamp_cpus(pairs, max_cpus)));
    }

    /// Asks the remote to start streaming log lines.
    pub fn enable_log(&self) {
        self.transmit(&LogEnvelope::new(true));
    }

    fn transmit(&self, envelope: &impl serde::Serialize) {
        match serde_json::to_value(envelope) {
            Ok(message) => self.session.send(&message),
            Err(error) => warn!(%error, "dropping envelope that failed to serialise"),
        }
    }
}

fn clamp_cpus(mut pairs: Map<String, Value>, max_cpus: Option<u64>) -> Map<String, Value> {
    if let Some(max) = max_cpus
        && let Some(requested) = pairs.get(CPUS_KEY).and_then(Value::as_u64)
        && requested > max
    {
        warn!(requested, max, "clamping cpus to the remote-reported maximum");
        pairs.insert(CPUS_KEY.to_owned(), Value::from(max));
    }
    pairs
}
