//! Connection lifecycle
//!
//! ```text
//! Disconnected --connect--> Connecting --ok--> Connected
//!                              |  ^                |
//!                        failed|  |retry timer     |disconnect event
//!                              v  |                v
//!                           Reconnecting <---------+
//!                              |
//!                   out of attempts
//!                              v
//!                          Exhausted --reconnect--> Connecting
//! ```
//!
//! Connect failures and drops after a successful connect share one attempt
//! counter; it resets when a connect succeeds or on a manual reconnect.

use super::retry::{ConnectionState, RetryPolicy};
use crate::chat::{ChatEvent, ChatEventKind, ChatMessage, ChatSource, SessionId};
use crate::scheduler::{Scheduler, Timer};
use crate::speech::SpeechSequencer;
use crate::text::FilterSet;
use log::{debug, info, warn};

/// Shown once the attempt budget is spent
pub const EXHAUSTED_MESSAGE: &str = "Maximum retry attempts reached. Please try again later.";

/// Owns the chat source and keeps it connected
pub struct ConnectionManager {
    source: Box<dyn ChatSource>,
    policy: RetryPolicy,
    state: ConnectionState,

    /// Retries used since the last successful connect
    attempts: u32,
    last_error: Option<String>,

    /// Session whose events we accept
    session: Option<SessionId>,

    /// Bumped whenever a pending retry is abandoned
    retry_generation: u64,
}

impl ConnectionManager {
    pub fn new(source: Box<dyn ChatSource>, policy: RetryPolicy) -> Self {
        Self {
            source,
            policy,
            state: ConnectionState::Disconnected,
            attempts: 0,
            last_error: None,
            session: None,
            retry_generation: 0,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Open a session, replacing any existing one
    pub fn connect(&mut self, sched: &mut Scheduler) {
        self.open_session(sched);
    }

    /// User-initiated reconnect: fresh attempt budget, then connect
    pub fn reconnect(&mut self, sched: &mut Scheduler) {
        info!("Manual reconnect requested");
        self.attempts = 0;
        self.last_error = None;
        self.open_session(sched);
    }

    /// Close everything and stop retrying
    pub fn disconnect(&mut self, sched: &mut Scheduler) {
        self.cancel_retry(sched);
        self.close_session();
        self.attempts = 0;
        self.state = ConnectionState::Disconnected;
        info!("Disconnected");
    }

    /// Handle an event from the chat source
    ///
    /// Returns the message to display when the event was a chat line
    /// accepted while connected. Its speakable text has already been queued.
    pub fn on_event(
        &mut self,
        event: ChatEvent,
        filters: &FilterSet,
        speech: &mut SpeechSequencer,
        sched: &mut Scheduler,
    ) -> Option<ChatMessage> {
        if self.session != Some(event.session) {
            debug!("Ignoring event from stale session {:?}", event.session);
            return None;
        }

        match event.kind {
            ChatEventKind::Connected => {
                if self.state == ConnectionState::Connecting {
                    info!("Connected to chat");
                    self.state = ConnectionState::Connected;
                    self.attempts = 0;
                    self.last_error = None;
                }
                None
            }
            ChatEventKind::ConnectFailed(reason) => {
                if self.state == ConnectionState::Connecting {
                    warn!("Connection error: {}", reason);
                    self.fail(format!("Connection failed: {}", reason), sched);
                }
                None
            }
            ChatEventKind::Disconnected(reason) => {
                let reason = reason.unwrap_or_else(|| "Unknown error".to_string());
                match self.state {
                    ConnectionState::Connected => {
                        warn!("Disconnect event: {}", reason);
                        self.fail(format!("Disconnected: {}", reason), sched);
                    }
                    ConnectionState::Connecting => {
                        self.fail(format!("Connection failed: {}", reason), sched);
                    }
                    _ => {}
                }
                None
            }
            ChatEventKind::Message(message) => {
                if self.state != ConnectionState::Connected {
                    debug!("Dropping message received while {}", self.state);
                    return None;
                }
                let message = ChatMessage::from_event(&message, filters);
                debug!("{}: {}", message.username, message.raw_text);
                if let Some(utterance) = message.utterance() {
                    speech.enqueue(&utterance, sched);
                }
                Some(message)
            }
        }
    }

    /// Retry timer fired
    pub fn on_retry(&mut self, generation: u64, sched: &mut Scheduler) {
        if generation != self.retry_generation || self.state != ConnectionState::Reconnecting {
            debug!("Ignoring stale retry timer {}", generation);
            return;
        }
        info!(
            "Reconnect attempt {}/{}",
            self.attempts, self.policy.max_attempts
        );
        self.open_session(sched);
    }

    /// Human-readable status line
    pub fn status(&self) -> String {
        match (self.state, self.last_error.as_deref()) {
            (ConnectionState::Reconnecting, Some(err)) => format!(
                "reconnecting (attempt {}/{}): {}",
                self.attempts, self.policy.max_attempts, err
            ),
            (ConnectionState::Reconnecting, None) => format!(
                "reconnecting (attempt {}/{})",
                self.attempts, self.policy.max_attempts
            ),
            (ConnectionState::Exhausted, Some(err)) => {
                format!("exhausted: {} Last error: {}", EXHAUSTED_MESSAGE, err)
            }
            (ConnectionState::Exhausted, None) => format!("exhausted: {}", EXHAUSTED_MESSAGE),
            (state, Some(err)) => format!("{}: {}", state, err),
            (state, None) => state.to_string(),
        }
    }

    fn open_session(&mut self, sched: &mut Scheduler) {
        self.cancel_retry(sched);
        self.close_session();
        self.state = ConnectionState::Connecting;

        match self.source.connect() {
            Ok(session) => {
                debug!("Opened session {:?}", session);
                self.session = Some(session);
            }
            Err(e) => {
                warn!("Connection error: {}", e);
                self.fail(format!("Connection failed: {}", e), sched);
            }
        }
    }

    /// Record a failure and either schedule a retry or give up
    fn fail(&mut self, reason: String, sched: &mut Scheduler) {
        self.last_error = Some(reason);
        self.close_session();

        if self.attempts < self.policy.max_attempts {
            let delay = self.policy.delay(self.attempts);
            self.attempts += 1;
            self.retry_generation += 1;
            self.state = ConnectionState::Reconnecting;
            info!(
                "Retrying in {:.1} seconds... (Attempt {}/{})",
                delay.as_secs_f32(),
                self.attempts,
                self.policy.max_attempts
            );
            sched.schedule(
                delay,
                Timer::Retry {
                    generation: self.retry_generation,
                },
            );
        } else {
            warn!("{}", EXHAUSTED_MESSAGE);
            self.state = ConnectionState::Exhausted;
        }
    }

    fn cancel_retry(&mut self, sched: &mut Scheduler) {
        self.retry_generation += 1;
        sched.cancel(|t| matches!(t, Timer::Retry { .. }));
    }

    fn close_session(&mut self) {
        if let Some(session) = self.session.take() {
            debug!("Closing session {:?}", session);
            if let Err(e) = self.source.disconnect() {
                warn!("Failed to disconnect chat source: {}", e);
            }
        }
    }
}
