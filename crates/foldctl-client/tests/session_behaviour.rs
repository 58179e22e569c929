//! Behavioural tests for the session engine against an in-process fake
//! compute client speaking real WebSocket frames.

use std::io;
use std::net::{TcpListener, TcpStream};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use serde_json::json;
use tungstenite::{Error as WsError, Message};

use foldctl_client::{Client, ClientError, Event, SessionOptions, Target};

/// Options shrunk so the suite runs quickly.
fn test_options() -> SessionOptions {
    SessionOptions {
        connect_timeout: Duration::from_millis(500),
        keepalive: None,
        settle_delay: Duration::from_millis(50),
    }
}

fn target_for(port: u16) -> Target {
    Target::new("127.0.0.1", port, None).expect("valid target")
}

/// What the fake daemon does with its single connection.
#[derive(Default)]
struct Script {
    /// Frames pushed immediately after the handshake.
    greeting: Vec<String>,
    /// Frames pushed after the first inbound text frame.
    on_first_frame: Vec<String>,
    /// Close the connection from the server side after replying.
    close_after_reply: bool,
}

/// A fake daemon accepting one WebSocket connection and recording every
/// inbound text frame.
struct FakeDaemon {
    port: u16,
    received: Arc<Mutex<Vec<String>>>,
    outcome: Arc<Mutex<Option<Result<()>>>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl FakeDaemon {
    fn spawn(script: Script) -> Result<Self> {
        let listener = TcpListener::bind(("127.0.0.1", 0)).context("bind fake daemon")?;
        listener
            .set_nonblocking(true)
            .context("fake daemon nonblocking")?;
        let port = listener.local_addr().context("local addr")?.port();
        let received: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let outcome: Arc<Mutex<Option<Result<()>>>> = Arc::new(Mutex::new(None));
        let received_clone = Arc::clone(&received);
        let outcome_clone = Arc::clone(&outcome);
        let handle = thread::spawn(move || {
            let result = serve(&listener, &script, &received_clone);
            if let Ok(mut guard) = outcome_clone.lock() {
                *guard = Some(result);
            }
        });
        Ok(Self {
            port,
            received,
            outcome,
            handle: Some(handle),
        })
    }

    fn port(&self) -> u16 {
        self.port
    }

    /// Joins the daemon thread and returns the recorded inbound frames.
    fn finish(&mut self) -> Result<Vec<String>> {
        if let Some(handle) = self.handle.take() {
            handle
                .join()
                .map_err(|_| anyhow!("fake daemon thread panicked"))?;
        }
        if let Some(result) = self
            .outcome
            .lock()
            .map_err(|error| anyhow!("lock outcome: {error}"))?
            .take()
        {
            result.context("fake daemon failed")?;
        }
        let received = self
            .received
            .lock()
            .map_err(|error| anyhow!("lock received: {error}"))?;
        Ok(received.clone())
    }
}

impl Drop for FakeDaemon {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn accept_with_deadline(listener: &TcpListener) -> Result<Option<TcpStream>> {
    let deadline = Instant::now() + Duration::from_secs(2);
    loop {
        match listener.accept() {
            Ok((stream, _)) => {
                stream.set_nonblocking(false).context("blocking stream")?;
                return Ok(Some(stream));
            }
            Err(ref error) if error.kind() == io::ErrorKind::WouldBlock => {
                if Instant::now() >= deadline {
                    // No client connected; exit cleanly so tests that abort
                    // before connecting do not hang or fail the daemon.
                    return Ok(None);
                }
                thread::sleep(Duration::from_millis(10));
            }
            Err(error) => return Err(error).context("accept connection"),
        }
    }
}

fn serve(
    listener: &TcpListener,
    script: &Script,
    received: &Arc<Mutex<Vec<String>>>,
) -> Result<()> {
    let Some(stream) = accept_with_deadline(listener)? else {
        return Ok(());
    };
    let mut socket = tungstenite::accept(stream).map_err(|error| anyhow!("handshake: {error}"))?;
    for frame in &script.greeting {
        socket
            .send(Message::Text(frame.clone()))
            .context("send greeting frame")?;
    }

    let mut replied = false;
    loop {
        match socket.read() {
            Ok(Message::Text(text)) => {
                received
                    .lock()
                    .map_err(|error| anyhow!("lock received: {error}"))?
                    .push(text);
                if !replied {
                    replied = true;
                    for frame in &script.on_first_frame {
                        socket
                            .send(Message::Text(frame.clone()))
                            .context("send reply frame")?;
                    }
                    if script.close_after_reply {
                        socket.close(None).context("close from server")?;
                    }
                }
            }
            Ok(_) => {}
            // Any termination, whether a clean close handshake or an abrupt
            // reset when the client tears the socket down, ends the script; the
            // recorded frames are what the tests assert on.
            Err(WsError::ConnectionClosed | WsError::AlreadyClosed | WsError::Io(_)) => {
                return Ok(());
            }
            Err(WsError::Protocol(_)) => return Ok(()),
            Err(error) => return Err(anyhow!("read frame: {error}")),
        }
    }
}

#[test]
fn pause_transmits_exactly_one_frame_after_connect() {
    let mut daemon = FakeDaemon::spawn(Script::default()).expect("spawn daemon");
    let client = Client::new(target_for(daemon.port()), test_options());

    client.run_verb("pause").expect("pause flow should succeed");

    let frames = daemon.finish().expect("daemon outcome");
    assert_eq!(frames, vec![r#"{"cmd":"pause"}"#.to_owned()]);
}

#[test]
fn unknown_verb_never_touches_the_network() {
    let mut daemon = FakeDaemon::spawn(Script::default()).expect("spawn daemon");
    let client = Client::new(target_for(daemon.port()), test_options());

    let error = client.run_verb("restart").expect_err("verb must be rejected");
    assert!(matches!(error, ClientError::UnknownCommand { .. }));

    // The rejection happened before connect(): the daemon's accept loop
    // drains its deadline without ever seeing a connection or a frame.
    let frames = daemon.finish().expect("daemon outcome");
    assert!(frames.is_empty());
}

#[test]
fn connect_timeout_fires_when_the_remote_never_handshakes() {
    // A listener that accepts TCP but never answers the upgrade request.
    let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind listener");
    let port = listener.local_addr().expect("local addr").port();
    let hold = thread::spawn(move || {
        let accepted = listener.accept();
        // Hold the stream open long enough for the timeout to fire.
        thread::sleep(Duration::from_secs(2));
        drop(accepted);
    });

    let client = Client::new(target_for(port), test_options());
    let started = Instant::now();
    let error = client.run_verb("pause").expect_err("flow must time out");

    assert!(matches!(error, ClientError::ConnectTimeout { .. }), "got {error}");
    assert!(started.elapsed() >= Duration::from_millis(400));
    hold.join().expect("join holder");
}

#[test]
fn status_flow_returns_the_first_text_frame_raw() {
    let snapshot = json!({"info": {"cpus": 8}, "units": []}).to_string();
    let mut daemon = FakeDaemon::spawn(Script {
        greeting: vec![snapshot.clone(), json!({"later": true}).to_string()],
        ..Script::default()
    })
    .expect("spawn daemon");
    let client = Client::new(target_for(daemon.port()), test_options());

    let answer = client.run_status().expect("status flow should succeed");
    assert_eq!(answer, snapshot);
    let _ = daemon.finish();
}

#[test]
fn config_flow_clamps_cpus_to_the_reported_maximum() {
    let mut daemon = FakeDaemon::spawn(Script {
        greeting: vec![json!({"info": {"cpus": 8}}).to_string()],
        ..Script::default()
    })
    .expect("spawn daemon");
    let client = Client::new(target_for(daemon.port()), test_options());

    let pairs = json!({"cpus": 999})
        .as_object()
        .expect("object literal")
        .clone();
    client.run_config(pairs).expect("config flow should succeed");

    let frames = daemon.finish().expect("daemon outcome");
    assert_eq!(
        frames,
        vec![r#"{"cmd":"config","config":{"cpus":8}}"#.to_owned()]
    );
}

#[test]
fn config_flow_waits_for_info_carried_by_a_patch() {
    let mut daemon = FakeDaemon::spawn(Script {
        greeting: vec![
            json!({"units": []}).to_string(),
            json!(["log", 0, "noise the flow must skip"]).to_string(),
            json!(["info", {"cpus": 4}]).to_string(),
        ],
        ..Script::default()
    })
    .expect("spawn daemon");
    let client = Client::new(target_for(daemon.port()), test_options());

    let pairs = json!({"cpus": 16})
        .as_object()
        .expect("object literal")
        .clone();
    client.run_config(pairs).expect("config flow should succeed");

    let frames = daemon.finish().expect("daemon outcome");
    assert_eq!(
        frames,
        vec![r#"{"cmd":"config","config":{"cpus":4}}"#.to_owned()]
    );
}

#[test]
fn log_flow_streams_lines_until_the_server_closes() {
    let mut daemon = FakeDaemon::spawn(Script {
        on_first_frame: vec![
            json!(["log", 0, "work unit 0 started"]).to_string(),
            json!({"not": "a log line"}).to_string(),
            json!(["log", 0, "work unit 0 finished"]).to_string(),
        ],
        close_after_reply: true,
        ..Script::default()
    })
    .expect("spawn daemon");
    let client = Client::new(target_for(daemon.port()), test_options());

    let mut lines = Vec::new();
    client
        .run_log(|line| lines.push(line.to_owned()))
        .expect("log flow should end cleanly");

    assert_eq!(lines, vec!["work unit 0 started", "work unit 0 finished"]);
    let frames = daemon.finish().expect("daemon outcome");
    assert_eq!(frames, vec![r#"{"cmd":"log","enable":true}"#.to_owned()]);
}

#[test]
fn keepalive_pings_do_not_disturb_a_streaming_flow() {
    let mut daemon = FakeDaemon::spawn(Script::default()).expect("spawn daemon");
    let options = SessionOptions {
        keepalive: Some(Duration::from_millis(100)),
        ..test_options()
    };
    let client = Client::new(target_for(daemon.port()), options);
    let interrupts: Sender<Event> = client.event_sender();

    let trigger = thread::spawn(move || {
        // Long enough for several keepalive ticks to fire and ping.
        thread::sleep(Duration::from_millis(350));
        let _ = interrupts.send(Event::Interrupt);
    });

    client
        .run_log(|_| {})
        .expect("log flow should survive keepalive pings");
    trigger.join().expect("join trigger");
    let frames = daemon.finish().expect("daemon outcome");
    assert_eq!(frames, vec![r#"{"cmd":"log","enable":true}"#.to_owned()]);
}

#[test]
fn interrupt_stops_a_streaming_flow() {
    let mut daemon = FakeDaemon::spawn(Script::default()).expect("spawn daemon");
    let client = Client::new(target_for(daemon.port()), test_options());
    let interrupts: Sender<Event> = client.event_sender();

    let trigger = thread::spawn(move || {
        thread::sleep(Duration::from_millis(150));
        let _ = interrupts.send(Event::Interrupt);
    });

    client
        .run_log(|_| {})
        .expect("interrupted log flow ends without error");
    trigger.join().expect("join trigger");
    let frames = daemon.finish().expect("daemon outcome");
    assert_eq!(frames, vec![r#"{"cmd":"log","enable":true}"#.to_owned()]);
}
