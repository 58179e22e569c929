//! Command interaction flows.
//!
//! A [`Client`] bundles one session, its liveness supervisor, and the run
//! loop, and drives one of four interaction patterns per invocation:
//! one-shot verbs, configuration updates, a single status read, or log
//! streaming. Each flow consumes the client: sessions are never pooled or
//! reused across commands.

use std::str::FromStr;
use std::sync::mpsc::Sender;
use std::time::Duration;

use serde_json::{Map, Value};

use foldctl_protocol::{Verb, log_line};

use crate::dispatch::Dispatcher;
use crate::error::ClientError;
use crate::event::{Event, SessionEvent};
use crate::liveness::{CONNECT_GRACE, LivenessSupervisor, Timer};
use crate::runloop::{EventLoop, Flow};
use crate::session::Session;
use crate::state::ClientState;
use crate::target::Target;

/// Pause between the local write completing and the loop stopping, giving
/// the remote time to process before the connection is torn down.
pub const SETTLE_DELAY: Duration = Duration::from_millis(500);

/// Tunables for one session. The defaults are the production values; tests
/// shrink them.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Grace period for the handshake to complete.
    pub connect_timeout: Duration,
    /// Keepalive ping interval, typically
    /// [`KEEPALIVE_INTERVAL`](crate::liveness::KEEPALIVE_INTERVAL). Off by
    /// default: the remote end is the one expected to probe liveness.
    pub keepalive: Option<Duration>,
    /// Post-send settle delay for mutating commands.
    pub settle_delay: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            connect_timeout: CONNECT_GRACE,
            keepalive: None,
            settle_delay: SETTLE_DELAY,
        }
    }
}

/// One command invocation against one remote compute client.
#[derive(Debug)]
pub struct Client {
    session: Session,
    supervisor: LivenessSupervisor,
    events: Sender<Event>,
    event_loop: EventLoop,
    settle_delay: Duration,
}

impl Client {
    /// Builds a client for the target with the given tunables.
    #[must_use]
    pub fn new(target: Target, options: SessionOptions) -> Self {
        let (events, event_loop) = EventLoop::channel();
        let session = Session::new(target, options.connect_timeout, events.clone());
        let supervisor =
            LivenessSupervisor::new(events.clone(), options.connect_timeout, options.keepalive);
        Self {
            session,
            supervisor,
            events,
            event_loop,
            settle_delay: options.settle_delay,
        }
    }

    /// A sender external producers (the signal listener) can use to post
    /// events into this client's run loop.
    #[must_use]
    pub fn event_sender(&self) -> Sender<Event> {
        self.events.clone()
    }

    /// One-shot verb flow: connect, transmit on `Connected`, settle, stop.
    ///
    /// The verb is checked against the allow-list before any connection is
    /// attempted.
    ///
    /// # Errors
    ///
    /// [`ClientError::UnknownCommand`] for verbs outside the allow-list;
    /// otherwise the terminal condition of the run loop when it is not
    /// successful completion.
    pub fn run_verb(self, name: &str) -> Result<(), ClientError> {
        let verb = Verb::from_str(name).map_err(|_| ClientError::UnknownCommand {
            name: name.to_owned(),
        })?;
        let Self {
            session,
            mut supervisor,
            events,
            event_loop,
            settle_delay,
        } = self;
        let url = session.target().url().to_string();
        let dispatcher = Dispatcher::new(&session);
        let mut settle: Option<Timer> = None;
        let mut outcome: Result<(), ClientError> = Err(ClientError::ClosedBeforeCompletion);

        session.connect();
        supervisor.arm_connect_timeout();
        event_loop.run(|event| match event {
            Event::Session(SessionEvent::Connected) => {
                supervisor.on_connected();
                dispatcher.send_verb(verb);
                settle = Some(Timer::once(settle_delay, events.clone(), |generation| {
                    Event::SettleElapsed { generation }
                }));
                Flow::Continue
            }
            Event::SettleElapsed { generation }
                if settle
                    .as_ref()
                    .is_some_and(|timer| timer.generation() == generation) =>
            {
                outcome = Ok(());
                Flow::Stop
            }
            other => match terminal(&mut supervisor, &session, &url, other) {
                Some(result) => {
                    outcome = result;
                    Flow::Stop
                }
                None => Flow::Continue,
            },
        });

        supervisor.cancel_all();
        session.disconnect();
        outcome
    }

    /// Configuration flow: connect, fold inbound state until the remote's
    /// info block is known, clamp, transmit, settle, stop.
    ///
    /// # Errors
    ///
    /// The terminal condition of the run loop when it is not successful
    /// completion.
    pub fn run_config(self, pairs: Map<String, Value>) -> Result<(), ClientError> {
        let Self {
            session,
            mut supervisor,
            events,
            event_loop,
            settle_delay,
        } = self;
        let url = session.target().url().to_string();
        let dispatcher = Dispatcher::new(&session);
        let mut state = ClientState::new();
        let mut sent = false;
        let mut settle: Option<Timer> = None;
        let mut outcome: Result<(), ClientError> = Err(ClientError::ClosedBeforeCompletion);

        session.connect();
        supervisor.arm_connect_timeout();
        event_loop.run(|event| match event {
            Event::Session(SessionEvent::Connected) => {
                supervisor.on_connected();
                Flow::Continue
            }
            Event::Session(SessionEvent::Text(text)) => {
                if !sent {
                    state.absorb_text(&text);
                    if state.has_info() {
                        dispatcher.send_config(pairs.clone(), state.max_cpus());
                        sent = true;
                        settle = Some(Timer::once(settle_delay, events.clone(), |generation| {
                            Event::SettleElapsed { generation }
                        }));
                    }
                }
                Flow::Continue
            }
            Event::SettleElapsed { generation }
                if settle
                    .as_ref()
                    .is_some_and(|timer| timer.generation() == generation) =>
            {
                outcome = Ok(());
                Flow::Stop
            }
            other => match terminal(&mut supervisor, &session, &url, other) {
                Some(result) => {
                    outcome = result;
                    Flow::Stop
                }
                None => Flow::Continue,
            },
        });

        supervisor.cancel_all();
        session.disconnect();
        outcome
    }

    /// Status flow: the first text message is the complete answer and is
    /// returned raw, without any patch folding.
    ///
    /// # Errors
    ///
    /// The terminal condition of the run loop when no text message arrived.
    pub fn run_status(self) -> Result<String, ClientError> {
        let Self {
            session,
            mut supervisor,
            events: _events,
            event_loop,
            ..
        } = self;
        let url = session.target().url().to_string();
        let mut outcome: Result<String, ClientError> = Err(ClientError::ClosedBeforeCompletion);

        session.connect();
        supervisor.arm_connect_timeout();
        event_loop.run(|event| match event {
            Event::Session(SessionEvent::Connected) => {
                supervisor.on_connected();
                Flow::Continue
            }
            Event::Session(SessionEvent::Text(text)) => {
                outcome = Ok(text);
                Flow::Stop
            }
            other => match terminal(&mut supervisor, &session, &url, other) {
                Some(result) => {
                    outcome = result.map(|()| String::new());
                    Flow::Stop
                }
                None => Flow::Continue,
            },
        });

        supervisor.cancel_all();
        session.disconnect();
        outcome
    }

    /// Log flow: enable the remote log stream on connect, hand each
    /// streamed line to `on_line`, and keep running until the stream ends
    /// or the operator interrupts.
    ///
    /// # Errors
    ///
    /// [`ClientError::ConnectTimeout`] or [`ClientError::Transport`]; a
    /// clean close or an interrupt ends the stream without error.
    pub fn run_log(self, mut on_line: impl FnMut(&str)) -> Result<(), ClientError> {
        let Self {
            session,
            mut supervisor,
            events: _events,
            event_loop,
            ..
        } = self;
        let url = session.target().url().to_string();
        let dispatcher = Dispatcher::new(&session);
        let mut outcome: Result<(), ClientError> = Ok(());

        session.connect();
        supervisor.arm_connect_timeout();
        event_loop.run(|event| match event {
            Event::Session(SessionEvent::Connected) => {
                supervisor.on_connected();
                dispatcher.enable_log();
                Flow::Continue
            }
            Event::Session(SessionEvent::Text(text)) => {
                if let Ok(value) = serde_json::from_str::<Value>(&text)
                    && let Some(line) = log_line(&value)
                {
                    on_line(line);
                }
                Flow::Continue
            }
            Event::Session(SessionEvent::Disconnected { .. } | SessionEvent::Cancelled)
            | Event::Interrupt => Flow::Stop,
            other => match terminal(&mut supervisor, &session, &url, other) {
                Some(result) => {
                    outcome = result;
                    Flow::Stop
                }
                None => Flow::Continue,
            },
        });

        supervisor.cancel_all();
        session.disconnect();
        outcome
    }
}

/// Shared handling for the terminal and housekeeping events of one-shot
/// flows. Returns `Some` when the loop must stop.
fn terminal(
    supervisor: &mut LivenessSupervisor,
    session: &Session,
    url: &str,
    event: Event,
) -> Option<Result<(), ClientError>> {
    match event {
        Event::ConnectTimeout { generation }
            if supervisor.connect_timeout_is_live(generation) =>
        {
            Some(Err(ClientError::ConnectTimeout {
                url: url.to_owned(),
            }))
        }
        Event::KeepaliveTick { generation } if supervisor.keepalive_is_live(generation) => {
            session.ping();
            None
        }
        Event::Session(SessionEvent::Error(message)) => {
            Some(Err(ClientError::Transport { message }))
        }
        Event::Session(SessionEvent::Disconnected { .. } | SessionEvent::Cancelled) => {
            Some(Err(ClientError::ClosedBeforeCompletion))
        }
        Event::Interrupt => Some(Err(ClientError::Interrupted)),
        _ => None,
    }
}
