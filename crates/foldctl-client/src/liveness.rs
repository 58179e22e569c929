//! Connection liveness timers.
//!
//! Timers run on their own threads and post events into the run loop
//! channel. Cancellation must be race-free: a timer thread may already have
//! queued its fire event when the timer is cancelled, so every fire carries
//! a generation token and the consuming side ignores tokens that are no
//! longer live. Dropping a [`Timer`] cancels its thread.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread;
use std::time::Duration;

use crate::event::Event;

/// Grace period for the WebSocket handshake to complete.
pub const CONNECT_GRACE: Duration = Duration::from_secs(5);

/// Interval between keepalive pings when keepalive is enabled.
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

static GENERATION: AtomicU64 = AtomicU64::new(0);

fn next_generation() -> u64 {
    GENERATION.fetch_add(1, Ordering::Relaxed) + 1
}

/// A cancellable timer posting into the run loop channel.
#[derive(Debug)]
pub struct Timer {
    generation: u64,
    cancel: Sender<()>,
}

impl Timer {
    /// Arms a one-shot timer that posts `make(generation)` after `delay`.
    pub fn once(delay: Duration, events: Sender<Event>, make: fn(u64) -> Event) -> Self {
        let generation = next_generation();
        let (cancel, cancelled) = mpsc::channel();
        thread::spawn(move || {
            if cancelled.recv_timeout(delay) == Err(RecvTimeoutError::Timeout) {
                let _ = events.send(make(generation));
            }
        });
        Self { generation, cancel }
    }

    /// Arms a periodic timer that posts `make(generation)` every `interval`.
    pub fn every(interval: Duration, events: Sender<Event>, make: fn(u64) -> Event) -> Self {
        let generation = next_generation();
        let (cancel, cancelled) = mpsc::channel();
        thread::spawn(move || {
            while cancelled.recv_timeout(interval) == Err(RecvTimeoutError::Timeout) {
                if events.send(make(generation)).is_err() {
                    break;
                }
            }
        });
        Self { generation, cancel }
    }

    /// Token carried by this timer's fire events.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        let _ = self.cancel.send(());
    }
}

/// Manages the connect-timeout and keepalive timers for one session.
#[derive(Debug)]
pub struct LivenessSupervisor {
    events: Sender<Event>,
    connect_grace: Duration,
    keepalive_interval: Option<Duration>,
    connect_timer: Option<Timer>,
    keepalive_timer: Option<Timer>,
}

impl LivenessSupervisor {
    /// Builds a supervisor with the given connect grace period and optional
    /// keepalive interval.
    #[must_use]
    pub const fn new(
        events: Sender<Event>,
        connect_grace: Duration,
        keepalive_interval: Option<Duration>,
    ) -> Self {
        Self {
            events,
            connect_grace,
            keepalive_interval,
            connect_timer: None,
            keepalive_timer: None,
        }
    }

    /// Arms the connect-timeout timer. Called alongside `connect()`.
    pub fn arm_connect_timeout(&mut self) {
        self.connect_timer = Some(Timer::once(
            self.connect_grace,
            self.events.clone(),
            |generation| Event::ConnectTimeout { generation },
        ));
    }

    /// Disarms the connect timeout and starts keepalive if configured.
    /// Called when the `Connected` event arrives.
    pub fn on_connected(&mut self) {
        self.connect_timer = None;
        if let Some(interval) = self.keepalive_interval {
            self.keepalive_timer = Some(Timer::every(
                interval,
                self.events.clone(),
                |generation| Event::KeepaliveTick { generation },
            ));
        }
    }

    /// Whether a connect-timeout fire with this token is still live.
    #[must_use]
    pub fn connect_timeout_is_live(&self, generation: u64) -> bool {
        self.connect_timer
            .as_ref()
            .is_some_and(|timer| timer.generation() == generation)
    }

    /// Whether a keepalive tick with this token is still live.
    #[must_use]
    pub fn keepalive_is_live(&self, generation: u64) -> bool {
        self.keepalive_timer
            .as_ref()
            .is_some_and(|timer| timer.generation() == generation)
    }

    /// Cancels both timers unconditionally.
    pub fn cancel_all(&mut self) {
        self.connect_timer = None;
        self.keepalive_timer = None;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;
    use std::time::Instant;

    use super::*;

    #[test]
    fn one_shot_timer_fires_after_delay() {
        let (events, received) = mpsc::channel();
        let timer = Timer::once(Duration::from_millis(20), events, |generation| {
            Event::ConnectTimeout { generation }
        });
        let event = received
            .recv_timeout(Duration::from_secs(2))
            .expect("timer should fire");
        assert_eq!(
            event,
            Event::ConnectTimeout {
                generation: timer.generation()
            }
        );
    }

    #[test]
    fn dropped_timer_does_not_fire() {
        let (events, received) = mpsc::channel();
        let timer = Timer::once(Duration::from_millis(50), events, |generation| {
            Event::ConnectTimeout { generation }
        });
        drop(timer);
        assert!(received.recv_timeout(Duration::from_millis(200)).is_err());
    }

    #[test]
    fn periodic_timer_keeps_ticking() {
        let (events, received) = mpsc::channel();
        let _timer = Timer::every(Duration::from_millis(10), events, |generation| {
            Event::KeepaliveTick { generation }
        });
        let deadline = Instant::now() + Duration::from_secs(2);
        let mut ticks = 0;
        while ticks < 3 && Instant::now() < deadline {
            if received.recv_timeout(Duration::from_millis(100)).is_ok() {
                ticks += 1;
            }
        }
        assert_eq!(ticks, 3, "expected at least three ticks");
    }

    #[test]
    fn cancelled_connect_timeout_is_not_live() {
        let (events, received) = mpsc::channel();
        let mut supervisor =
            LivenessSupervisor::new(events, Duration::from_millis(10), None);
        supervisor.arm_connect_timeout();
        let armed_generation = supervisor
            .connect_timer
            .as_ref()
            .map(Timer::generation)
            .expect("timer should be armed");
        supervisor.on_connected();

        // Even if the fire event was already queued, its token is stale.
        assert!(!supervisor.connect_timeout_is_live(armed_generation));
        // Drain whatever the raced thread may have sent; it must be ignored
        // by token, not by luck.
        while let Ok(event) = received.recv_timeout(Duration::from_millis(50)) {
            let Event::ConnectTimeout { generation } = event else {
                continue;
            };
            assert!(!supervisor.connect_timeout_is_live(generation));
        }
    }

    #[test]
    fn rearming_mints_a_fresh_generation() {
        let (events, _received) = mpsc::channel();
        let mut supervisor =
            LivenessSupervisor::new(events, Duration::from_secs(5), None);
        supervisor.arm_connect_timeout();
        let first = supervisor
            .connect_timer
            .as_ref()
            .map(Timer::generation)
            .expect("armed");
        supervisor.arm_connect_timeout();
        let second = supervisor
            .connect_timer
            .as_ref()
            .map(Timer::generation)
            .expect("armed");
        assert_ne!(first, second);
        assert!(!supervisor.connect_timeout_is_live(first));
        assert!(supervisor.connect_timeout_is_live(second));
    }
}
