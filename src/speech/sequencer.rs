//! Sequential speech playback
//!
//! Chat can arrive faster than it can be spoken. The sequencer keeps a FIFO
//! of pending utterances and lets exactly one of them reach the engine at a
//! time; the next one only starts after the engine reports the current one
//! done (or failed) and a short settle delay has passed.

use super::engine::{SpeechEngine, SpeechEvent, Ticket, VoiceInfo};
use super::task::{Rate, SpeechTask};
use crate::scheduler::{Scheduler, Timer};
use crate::Result;
use log::{debug, info, warn};
use std::collections::VecDeque;
use std::time::Duration;

/// Default pause between utterances
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(100);

/// Owns the speech engine and the queue feeding it
pub struct SpeechSequencer {
    engine: Box<dyn SpeechEngine>,

    /// Pending utterances, head is spoken next
    queue: VecDeque<SpeechTask>,

    /// The utterance the engine is working on. This is the "speaking"
    /// guard: while it is `Some`, nothing else is started.
    in_flight: Option<(Ticket, SpeechTask)>,

    /// A settle timer is pending; the queue resumes when it fires
    settling: bool,

    next_ticket: u64,

    /// Settings captured by future enqueues
    voice: Option<String>,
    rate: Rate,
    enabled: bool,

    settle_delay: Duration,
}

impl SpeechSequencer {
    /// Create a sequencer around an engine
    ///
    /// Starts enabled at normal rate with no voice selected.
    pub fn new(engine: Box<dyn SpeechEngine>, settle_delay: Duration) -> Self {
        Self {
            engine,
            queue: VecDeque::new(),
            in_flight: None,
            settling: false,
            next_ticket: 0,
            voice: None,
            rate: Rate::NORMAL,
            enabled: true,
            settle_delay,
        }
    }

    /// Queue text for speaking
    ///
    /// Silently dropped when speech is disabled, no voice is selected or the
    /// text is blank. Returns whether the text was queued.
    pub fn enqueue(&mut self, text: &str, sched: &mut Scheduler) -> bool {
        if !self.enabled {
            debug!("TTS is disabled, ignoring message");
            return false;
        }
        if self.voice.is_none() {
            debug!("No voice selected, ignoring message");
            return false;
        }

        let Some(task) = SpeechTask::new(text, self.voice.clone(), self.rate) else {
            debug!("Nothing to speak, ignoring message");
            return false;
        };

        self.queue.push_back(task);
        debug!("Queued utterance, {} pending", self.queue.len());
        self.pump(sched);
        true
    }

    pub fn set_voice(&mut self, voice: Option<String>) {
        info!("Voice set to {:?}", voice);
        self.voice = voice;
    }

    pub fn voice(&self) -> Option<&str> {
        self.voice.as_deref()
    }

    pub fn set_rate(&mut self, rate: Rate) {
        info!("Speech rate set to {}", rate);
        self.rate = rate;
    }

    pub fn rate(&self) -> Rate {
        self.rate
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        info!("TTS {}", if enabled { "enabled" } else { "disabled" });
        self.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Voices offered by the engine
    pub fn voices(&self) -> Result<Vec<VoiceInfo>> {
        self.engine.voices()
    }

    /// Stop speaking and forget everything queued
    ///
    /// Safe to call at any time and more than once. Events for the
    /// cancelled utterance are ignored if they still arrive.
    pub fn shutdown(&mut self, sched: &mut Scheduler) {
        if let Some((ticket, _)) = self.in_flight.take() {
            info!("Cancelling utterance {:?}", ticket);
            if let Err(e) = self.engine.cancel() {
                warn!("Failed to cancel speech: {}", e);
            }
        }
        if !self.queue.is_empty() {
            debug!("Dropping {} queued utterances", self.queue.len());
            self.queue.clear();
        }
        self.settling = false;
        sched.cancel(|t| *t == Timer::SpeechSettle);
    }

    /// Cut the current utterance short and move on to the next one
    pub fn skip(&mut self, sched: &mut Scheduler) {
        if let Some((ticket, _)) = self.in_flight.take() {
            info!("Skipping utterance {:?}", ticket);
            if let Err(e) = self.engine.cancel() {
                warn!("Failed to cancel speech: {}", e);
            }
            self.settle(sched);
        }
    }

    /// Handle an event reported by the engine
    pub fn on_event(&mut self, event: SpeechEvent, sched: &mut Scheduler) {
        let current = self.in_flight.as_ref().map(|(t, _)| *t);
        if event.ticket().is_some() && event.ticket() != current {
            debug!("Ignoring stale speech event {:?}", event);
            return;
        }

        match event {
            SpeechEvent::Started(ticket) => {
                debug!("Speech started: {:?}", ticket);
            }
            SpeechEvent::Finished(ticket) => {
                debug!("Speech ended: {:?}", ticket);
                self.in_flight = None;
                self.settle(sched);
            }
            SpeechEvent::Failed(ticket, reason) => {
                warn!("Speech synthesis error on {:?}: {}", ticket, reason);
                self.in_flight = None;
                self.settle(sched);
            }
            SpeechEvent::VoicesChanged => {}
        }
    }

    /// Settle timer fired
    pub fn on_settle(&mut self, sched: &mut Scheduler) {
        self.settling = false;
        self.pump(sched);
    }

    /// Let engines without callbacks report completion
    ///
    /// Returns true when the engine reported that its voice list changed;
    /// the caller owns the voice list and must reload it.
    pub fn poll(&mut self, sched: &mut Scheduler) -> bool {
        match self.engine.poll() {
            Some(SpeechEvent::VoicesChanged) => true,
            Some(event) => {
                self.on_event(event, sched);
                false
            }
            None => false,
        }
    }

    pub fn is_speaking(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Text currently being spoken
    pub fn current(&self) -> Option<&SpeechTask> {
        self.in_flight.as_ref().map(|(_, task)| task)
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn queued(&self) -> impl Iterator<Item = &SpeechTask> {
        self.queue.iter()
    }

    fn settle(&mut self, sched: &mut Scheduler) {
        self.settling = true;
        sched.schedule(self.settle_delay, Timer::SpeechSettle);
    }

    /// Start the head of the queue if nothing is in flight
    fn pump(&mut self, sched: &mut Scheduler) {
        if self.in_flight.is_some() || self.settling {
            return;
        }
        let Some(task) = self.queue.pop_front() else {
            return;
        };

        // The engine may still think it's busy with an utterance abandoned
        // by an earlier cancel; clear it or the new one can get stuck.
        if let Err(e) = self.engine.cancel() {
            warn!("Failed to reset speech engine: {}", e);
        }

        self.next_ticket += 1;
        let ticket = Ticket(self.next_ticket);
        debug!("Speaking {:?}: {}", ticket, task.text);

        match self.engine.speak(&task, ticket) {
            Ok(()) => {
                self.in_flight = Some((ticket, task));
            }
            Err(e) => {
                warn!("Failed to start speech: {}", e);
                self.settle(sched);
            }
        }
    }
}
