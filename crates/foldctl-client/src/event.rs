//! Events consumed by the run loop.
//!
//! The transport session, the liveness timers, and the process signal
//! listener all feed one channel; the run loop is the single consumer.
//! Timer events carry the generation token minted when the timer was armed
//! so consumers can discard fires from timers that have since been
//! cancelled.

/// One occurrence on the transport session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The WebSocket handshake completed.
    Connected,
    /// The remote closed the connection.
    Disconnected {
        /// Close reason supplied by the remote, possibly empty.
        reason: String,
        /// Close status code.
        code: u16,
    },
    /// A text frame arrived.
    Text(String),
    /// A binary frame arrived. The protocol never sends these; they are
    /// surfaced for completeness and ignored downstream.
    Binary(Vec<u8>),
    /// A protocol ping arrived.
    Ping,
    /// A protocol pong arrived.
    Pong,
    /// The transport failed. Emitted at most once per session.
    Error(String),
    /// The session was torn down locally.
    Cancelled,
}

/// One item on the run loop channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// An occurrence on the transport session.
    Session(SessionEvent),
    /// The connect-timeout timer fired.
    ConnectTimeout {
        /// Token minted when the timer was armed.
        generation: u64,
    },
    /// The keepalive timer ticked.
    KeepaliveTick {
        /// Token minted when the timer was armed.
        generation: u64,
    },
    /// The post-send settle delay elapsed.
    SettleElapsed {
        /// Token minted when the timer was armed.
        generation: u64,
    },
    /// The operator requested termination.
    Interrupt,
}
