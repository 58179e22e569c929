//! Error taxonomy for the session engine.

use thiserror::Error;

/// Fatal conditions a command flow can end with.
///
/// Transport failures surface exactly once and are never retried: each
/// invocation is a single-attempt interaction, so there is deliberately no
/// reconnect or backoff path. Malformed outbound values are not represented
/// here; they are logged and skipped without aborting the flow.
#[derive(Debug, Error)]
pub enum ClientError {
    /// No `Connected` event arrived within the grace period.
    #[error("timed out connecting to {url}")]
    ConnectTimeout {
        /// Connection URL the handshake was attempted against.
        url: String,
    },
    /// The underlying socket or WebSocket protocol failed.
    #[error("websocket transport error: {message}")]
    Transport {
        /// Description of the underlying failure.
        message: String,
    },
    /// A verb outside the allow-list was requested; no connection was made.
    #[error("unknown command: \"{name}\"")]
    UnknownCommand {
        /// The rejected verb.
        name: String,
    },
    /// The connection closed before the command completed.
    ///
    /// The command may or may not have reached the remote; callers must
    /// treat this as an uncertain outcome rather than a confirmed failure.
    #[error("connection closed before the command completed")]
    ClosedBeforeCompletion,
    /// An operator interrupt stopped the flow before completion.
    #[error("interrupted before the command completed")]
    Interrupted,
}
