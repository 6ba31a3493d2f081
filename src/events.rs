//! Events delivered to the main loop
//!
//! Chat sources and speech engines report from their own threads. Every
//! report becomes an [`Event`] on one channel, and the main loop is the
//! only consumer, so state is only ever touched from one place.

use crate::chat::ChatEvent;
use crate::speech::SpeechEvent;
use log::warn;
use mio::Waker;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;

/// Something that happened outside the main loop
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Chat(ChatEvent),
    Speech(SpeechEvent),
}

/// Cloneable handle for pushing events to the main loop
#[derive(Clone)]
pub struct EventSender {
    tx: Sender<Event>,
    waker: Option<Arc<Waker>>,
}

impl EventSender {
    /// Queue an event and wake the poll loop if one is attached
    pub fn send(&self, event: Event) {
        if self.tx.send(event).is_err() {
            // Receiver gone means the loop is shutting down
            return;
        }
        if let Some(waker) = &self.waker {
            if let Err(e) = waker.wake() {
                warn!("Failed to wake event loop: {}", e);
            }
        }
    }
}

/// Create an event channel
///
/// Pass a waker when the receiving side sleeps in `mio::Poll`.
pub fn channel(waker: Option<Arc<Waker>>) -> (EventSender, Receiver<Event>) {
    let (tx, rx) = mpsc::channel();
    (EventSender { tx, waker }, rx)
}
