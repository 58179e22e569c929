//! WebSocket transport session.
//!
//! One session owns one duplex text-frame connection to one remote
//! endpoint. A reader thread performs the TCP connect and WebSocket
//! handshake, then turns every inbound occurrence into exactly one
//! [`SessionEvent`] on the run loop channel, in arrival order. Writes go
//! through a separate half of the cloned stream so the run loop thread can
//! transmit without blocking on the reader.
//!
//! Connection state is mutated only from transport callbacks (the reader
//! thread) and from the teardown path; external collaborators observe it
//! through accessors. There is no reconnect logic: a failed session stays
//! failed, and each process invocation builds exactly one session. Timers
//! are owned by the liveness supervisor, which is cancelled together with
//! this session by the flow driving them.

use std::io;
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};
use tungstenite::protocol::frame::coding::CloseCode;
use tungstenite::protocol::{Role, WebSocket};
use tungstenite::{Error as WsError, Message};

use crate::event::{Event, SessionEvent};
use crate::target::Target;

/// Lifecycle of one transport session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection attempt has been made yet.
    Idle,
    /// The handshake is in flight.
    Connecting,
    /// The connection is established.
    Open,
    /// The connection was closed, locally or by the remote.
    Closed,
    /// The transport failed; the session is not reusable.
    Failed,
}

/// One duplex message-stream connection to a remote compute client.
#[derive(Debug)]
pub struct Session {
    target: Target,
    connect_timeout: Duration,
    events: Sender<Event>,
    inner: Arc<SessionInner>,
}

#[derive(Debug)]
struct SessionInner {
    state: Mutex<ConnectionState>,
    last_error: Mutex<Option<String>>,
    writer: Mutex<Option<WebSocket<TcpStream>>>,
    closing: AtomicBool,
}

impl Session {
    /// Builds a session for the given target. No connection is attempted
    /// until [`Session::connect`] is called.
    #[must_use]
    pub fn new(target: Target, connect_timeout: Duration, events: Sender<Event>) -> Self {
        Self {
            target,
            connect_timeout,
            events,
            inner: Arc::new(SessionInner {
                state: Mutex::new(ConnectionState::Idle),
                last_error: Mutex::new(None),
                writer: Mutex::new(None),
                closing: AtomicBool::new(false),
            }),
        }
    }

    /// Target this session was constructed for.
    #[must_use]
    pub const fn target(&self) -> &Target {
        &self.target
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *lock(&self.inner.state)
    }

    /// Description of the most recent transport failure, if any.
    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        lock(&self.inner.last_error).clone()
    }

    /// Initiates the asynchronous handshake. Idempotent while a connection
    /// is in flight or open; a fresh call after a close starts over.
    pub fn connect(&self) {
        {
            let mut state = lock(&self.inner.state);
            if matches!(
                *state,
                ConnectionState::Connecting | ConnectionState::Open
            ) {
                return;
            }
            *state = ConnectionState::Connecting;
        }
        self.inner.closing.store(false, Ordering::SeqCst);
        *lock(&self.inner.last_error) = None;

        let inner = Arc::clone(&self.inner);
        let events = self.events.clone();
        let target = self.target.clone();
        let connect_timeout = self.connect_timeout;
        thread::spawn(move || run_connection(&inner, &events, &target, connect_timeout));
    }

    /// Serialises `message` with deterministic key order and writes it as a
    /// single text frame.
    ///
    /// Values that are not JSON objects are logged and dropped rather than
    /// raised: the wire protocol only ever carries object envelopes, and a
    /// malformed outbound value is a caller bug the flow should survive.
    /// Returning means the local write completed; delivery remains the
    /// transport's business.
    pub fn send(&self, message: &Value) {
        if !message.is_object() {
            warn!("dropping outbound message that is not a JSON object");
            return;
        }
        let frame = match serde_json::to_string(message) {
            Ok(frame) => frame,
            Err(error) => {
                warn!(%error, "dropping outbound message that failed to serialise");
                return;
            }
        };
        match lock(&self.inner.writer).as_mut() {
            Some(socket) => {
                if let Err(error) = socket.send(Message::Text(frame)) {
                    warn!(%error, "failed to write text frame");
                }
            }
            None => debug!("no open connection; outbound frame dropped"),
        }
    }

    /// Writes a protocol ping frame when the session is open.
    pub fn ping(&self) {
        if self.state() != ConnectionState::Open {
            return;
        }
        if let Some(socket) = lock(&self.inner.writer).as_mut()
            && let Err(error) = socket.send(Message::Ping(Vec::new()))
        {
            warn!(%error, "failed to write ping frame");
        }
    }

    /// Closes the connection and releases the write half. Safe to call any
    /// number of times; the reader thread observes the shutdown and winds
    /// itself down with a `Cancelled` event.
    pub fn disconnect(&self) {
        self.inner.closing.store(true, Ordering::SeqCst);
        if let Some(mut socket) = lock(&self.inner.writer).take() {
            let _ = socket.close(None);
            let _ = socket.flush();
            let _ = socket.get_ref().shutdown(Shutdown::Both);
        }
        let mut state = lock(&self.inner.state);
        if *state != ConnectionState::Failed {
            *state = ConnectionState::Closed;
        }
    }
}

/// Locks ignoring poisoning: all guarded state stays valid across panics.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn set_state(inner: &SessionInner, state: ConnectionState) {
    *lock(&inner.state) = state;
}

fn emit(events: &Sender<Event>, event: SessionEvent) {
    let _ = events.send(Event::Session(event));
}

fn run_connection(
    inner: &SessionInner,
    events: &Sender<Event>,
    target: &Target,
    connect_timeout: Duration,
) {
    let stream = match open_stream(target, connect_timeout) {
        Ok(stream) => stream,
        Err(error) => {
            fail(inner, events, format!("connect to {target}: {error}"));
            return;
        }
    };
    let (mut reader, writer) = match split_handshake(stream, target.url().as_str()) {
        Ok(halves) => halves,
        Err(message) => {
            fail(inner, events, message);
            return;
        }
    };

    *lock(&inner.writer) = Some(writer);
    set_state(inner, ConnectionState::Open);
    emit(events, SessionEvent::Connected);

    read_frames(inner, events, &mut reader);
    drop(lock(&inner.writer).take());
}

fn read_frames(inner: &SessionInner, events: &Sender<Event>, reader: &mut WebSocket<TcpStream>) {
    let mut disconnected = false;
    loop {
        match reader.read() {
            Ok(Message::Text(text)) => emit(events, SessionEvent::Text(text)),
            Ok(Message::Binary(bytes)) => {
                debug!(len = bytes.len(), "ignoring unexpected binary frame");
                emit(events, SessionEvent::Binary(bytes));
            }
            Ok(Message::Ping(_)) => emit(events, SessionEvent::Ping),
            Ok(Message::Pong(_)) => emit(events, SessionEvent::Pong),
            Ok(Message::Close(frame)) => {
                if inner.closing.load(Ordering::SeqCst) {
                    set_state(inner, ConnectionState::Closed);
                    emit(events, SessionEvent::Cancelled);
                    return;
                }
                if !disconnected {
                    disconnected = true;
                    set_state(inner, ConnectionState::Closed);
                    let (reason, code) = frame
                        .map(|frame| (frame.reason.into_owned(), u16::from(frame.code)))
                        .unwrap_or_else(|| (String::new(), u16::from(CloseCode::Abnormal)));
                    emit(events, SessionEvent::Disconnected { reason, code });
                }
                // Keep reading so the close handshake drains.
            }
            Ok(Message::Frame(_)) => {}
            Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => {
                if inner.closing.load(Ordering::SeqCst) {
                    set_state(inner, ConnectionState::Closed);
                    emit(events, SessionEvent::Cancelled);
                } else if !disconnected {
                    set_state(inner, ConnectionState::Closed);
                    emit(
                        events,
                        SessionEvent::Disconnected {
                            reason: String::new(),
                            code: u16::from(CloseCode::Abnormal),
                        },
                    );
                }
                return;
            }
            Err(error) => {
                if inner.closing.load(Ordering::SeqCst) {
                    set_state(inner, ConnectionState::Closed);
                    emit(events, SessionEvent::Cancelled);
                } else if !disconnected {
                    fail(inner, events, error.to_string());
                }
                return;
            }
        }
    }
}

/// Marks the session failed and surfaces the cause exactly once.
fn fail(inner: &SessionInner, events: &Sender<Event>, message: String) {
    debug!(%message, "transport session failed");
    *lock(&inner.last_error) = Some(message.clone());
    set_state(inner, ConnectionState::Failed);
    emit(events, SessionEvent::Error(message));
}

fn open_stream(target: &Target, connect_timeout: Duration) -> io::Result<TcpStream> {
    let address = resolve_address(target.host(), target.port())?;
    let stream = TcpStream::connect_timeout(&address, connect_timeout)?;
    // Bound the handshake read so a silent remote cannot pin the reader
    // thread forever. Kept strictly longer than the connect grace so the
    // liveness timer, not this backstop, is what reports the timeout.
    stream.set_read_timeout(Some(connect_timeout.saturating_mul(2)))?;
    Ok(stream)
}

fn resolve_address(host: &str, port: u16) -> io::Result<SocketAddr> {
    let mut addrs = (host, port).to_socket_addrs()?;
    addrs
        .find(|addr| matches!(addr, SocketAddr::V4(_) | SocketAddr::V6(_)))
        .ok_or_else(|| io::Error::new(io::ErrorKind::AddrNotAvailable, "no resolved addresses"))
}

/// Performs the client handshake and splits the stream into a read half and
/// a write half over cloned descriptors, so reads and writes proceed
/// independently.
fn split_handshake(
    stream: TcpStream,
    url: &str,
) -> Result<(WebSocket<TcpStream>, WebSocket<TcpStream>), String> {
    let (reader, _response) = tungstenite::client::client(url, stream)
        .map_err(|error| format!("websocket handshake with {url}: {error}"))?;
    reader
        .get_ref()
        .set_read_timeout(None)
        .map_err(|error| format!("clear handshake read timeout: {error}"))?;
    let write_stream = reader
        .get_ref()
        .try_clone()
        .map_err(|error| format!("clone connection stream: {error}"))?;
    let writer = WebSocket::from_raw_socket(write_stream, Role::Client, None);
    Ok((reader, writer))
}
