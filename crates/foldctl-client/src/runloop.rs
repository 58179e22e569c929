//! Run loop adapter.
//!
//! The cooperative driver that keeps an invocation alive while socket and
//! timer events are pending. One channel, one consumer: every handler
//! invocation runs to completion before the next event is taken, so state
//! touched from handlers needs no locking.

use std::sync::mpsc::{self, Receiver, Sender};

use crate::event::Event;

/// Handler verdict after processing one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Keep pumping events.
    Continue,
    /// Terminal condition reached; leave the loop.
    Stop,
}

/// Single-consumer event loop over the session channel.
#[derive(Debug)]
pub struct EventLoop {
    receiver: Receiver<Event>,
}

impl EventLoop {
    /// Creates the loop and the sender side handed to event producers.
    #[must_use]
    pub fn channel() -> (Sender<Event>, Self) {
        let (sender, receiver) = mpsc::channel();
        (sender, Self { receiver })
    }

    /// Pumps events until the handler stops the loop or every producer is
    /// gone.
    pub fn run(self, mut handler: impl FnMut(Event) -> Flow) {
        while let Ok(event) = self.receiver.recv() {
            if handler(event) == Flow::Stop {
                break;
            }
        }
    }
}
