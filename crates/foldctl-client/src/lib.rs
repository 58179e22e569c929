//! Session engine for controlling a remote compute client over its
//! WebSocket API.
//!
//! The engine establishes one connection per invocation, enforces
//! connect/liveness timeouts, folds the inbound JSON event stream into a
//! local snapshot of remote state, and exposes request/response-shaped
//! flows over the inherently event-driven transport. The CLI layer on top
//! of it is deliberately thin: it parses arguments, builds a [`Target`],
//! and hands control to one of the [`Client`] flows.
//!
//! Control flows single-threaded through the run loop; the socket reader,
//! the timers, and the signal listener are the only producers and they all
//! post into one channel.

pub mod dispatch;
pub mod error;
pub mod event;
pub mod flows;
pub mod liveness;
pub mod runloop;
pub mod session;
pub mod state;
pub mod target;

pub use dispatch::Dispatcher;
pub use error::ClientError;
pub use event::{Event, SessionEvent};
pub use flows::{Client, SessionOptions};
pub use liveness::LivenessSupervisor;
pub use runloop::{EventLoop, Flow};
pub use session::{ConnectionState, Session};
pub use state::ClientState;
pub use target::{DEFAULT_HOST, DEFAULT_PORT, Target, TargetError};
