//! Wire-message modelling for the compute-client WebSocket protocol.
//!
//! The daemon speaks UTF-8 JSON text frames in both directions. Outbound
//! messages are small command envelopes; inbound messages are either a full
//! state snapshot (a JSON object), an incremental patch (a JSON array), or a
//! shape this client does not consume. This crate models both directions so
//! the CLI and the session engine share one vocabulary without either owning
//! transport concerns.

mod command;
mod inbound;

pub use command::{ConfigEnvelope, LogEnvelope, Verb, VerbEnvelope, VerbParseError};
pub use inbound::{Inbound, Patch, Segment, log_line};
