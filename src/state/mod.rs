//! Application state management
//!
//! The State struct ties the pieces together: it routes events from the
//! chat source and speech engine, fires timers and runs console commands.
//! It lives on the main loop thread and is the only place where the
//! connection manager and speech sequencer are touched.

pub mod config;

use crate::chat::{ChatMessage, ChatSource, MessageLog};
use crate::connection::{ConnectionManager, ConnectionState};
use crate::events::Event;
use crate::input::{Command, HELP};
use crate::scheduler::{Scheduler, Timer};
use crate::speech::{default_voice, Rate, SpeechEngine, SpeechEvent, SpeechSequencer, VoiceInfo};
use crate::text::FilterSet;
use crate::{ChatSpeakError, Result};
use config::Config;
use log::{debug, info, warn};
use std::time::{Duration, Instant};

/// Main application state
pub struct State {
    /// Configuration loaded from ~/.chatspeak.cfg
    pub config: Config,

    /// Keeps the chat source connected
    pub connection: ConnectionManager,

    /// Speaks chat messages one at a time
    pub speech: SpeechSequencer,

    /// Words redacted from speakable text
    pub filters: FilterSet,

    /// Recently received messages
    pub log: MessageLog,

    /// Retry and settle timers
    pub scheduler: Scheduler,

    /// Last voice list reported by the engine
    voices: Vec<VoiceInfo>,
}

impl State {
    /// Build the state from configuration and the two outside services
    ///
    /// Listeners must already be attached to `source` and `engine`; the
    /// state only consumes their events through [`State::handle_event`].
    pub fn new(config: Config, source: Box<dyn ChatSource>, engine: Box<dyn SpeechEngine>) -> Self {
        let policy = config.retry_policy();
        info!(
            "Retry policy: {} attempts, {:?} initial, {:?} max, x{}",
            policy.max_attempts, policy.initial_delay, policy.max_delay, policy.backoff_multiplier
        );

        let mut speech = SpeechSequencer::new(engine, config.settle_delay());
        speech.set_rate(config.rate());
        speech.set_enabled(config.tts_enabled());

        let filters = config.filters();
        info!("  Filtered words: {}", filters.len());

        let mut state = Self {
            connection: ConnectionManager::new(source, policy),
            speech,
            filters,
            log: MessageLog::new(config.history()),
            scheduler: Scheduler::new(),
            voices: Vec::new(),
            config,
        };
        state.refresh_voices();
        state
    }

    /// Start connecting to chat
    pub fn start(&mut self) {
        self.connection.connect(&mut self.scheduler);
    }

    /// Route an event from the chat source or speech engine
    ///
    /// Returns the chat message to display, if the event produced one.
    pub fn handle_event(&mut self, event: Event) -> Option<ChatMessage> {
        match event {
            Event::Chat(event) => {
                let message = self.connection.on_event(
                    event,
                    &self.filters,
                    &mut self.speech,
                    &mut self.scheduler,
                )?;
                self.log.push(message.clone());
                Some(message)
            }
            Event::Speech(SpeechEvent::VoicesChanged) => {
                self.refresh_voices();
                None
            }
            Event::Speech(event) => {
                self.speech.on_event(event, &mut self.scheduler);
                None
            }
        }
    }

    // ========== Timers ==========

    /// Fire every timer that is due
    ///
    /// Returns true if any timer fired
    pub fn run_scheduled(&mut self, now: Instant) -> bool {
        let due = self.scheduler.take_due(now);
        let fired = !due.is_empty();
        for timer in due {
            self.fire(timer);
        }
        fired
    }

    /// Time until the next timer is due, used as the poll timeout
    pub fn time_until_next_scheduled(&self, now: Instant) -> Option<Duration> {
        self.scheduler.time_until_next(now)
    }

    /// Fire the earliest pending timer without waiting for it
    pub fn fire_next(&mut self) -> Option<Timer> {
        let timer = self.scheduler.take_next()?;
        self.fire(timer);
        Some(timer)
    }

    fn fire(&mut self, timer: Timer) {
        debug!("Timer fired: {:?}", timer);
        match timer {
            Timer::Retry { generation } => self.connection.on_retry(generation, &mut self.scheduler),
            Timer::SpeechSettle => self.speech.on_settle(&mut self.scheduler),
        }
    }

    /// Periodic housekeeping for engines that cannot report completion
    pub fn tick(&mut self) {
        if self.speech.poll(&mut self.scheduler) {
            info!("Voice list changed");
            self.refresh_voices();
        }
    }

    // ========== Speech settings ==========

    /// Reload the voice list and pick the active voice
    ///
    /// The configured voice wins when the engine offers it, otherwise the
    /// default voice is used.
    pub fn refresh_voices(&mut self) {
        self.voices = match self.speech.voices() {
            Ok(voices) => voices,
            Err(e) => {
                warn!("Failed to list voices: {}", e);
                Vec::new()
            }
        };
        info!("{} voices available", self.voices.len());

        let configured = self
            .config
            .voice()
            .and_then(|wanted| find_voice(&self.voices, &wanted).map(|v| v.id.clone()));
        let voice = configured.or_else(|| default_voice(&self.voices).map(|v| v.id.clone()));
        if voice.is_none() {
            warn!("No voice available, messages will not be spoken");
        }
        self.speech.set_voice(voice);
    }

    pub fn voices(&self) -> &[VoiceInfo] {
        &self.voices
    }

    /// Select a voice by id or name and remember it
    pub fn select_voice(&mut self, wanted: &str) -> Result<String> {
        let id = find_voice(&self.voices, wanted)
            .map(|v| v.id.clone())
            .ok_or_else(|| ChatSpeakError::Speech(format!("No such voice: {}", wanted)))?;
        self.speech.set_voice(Some(id.clone()));
        self.config.set_voice(Some(&id));
        self.save_config();
        Ok(id)
    }

    /// Set the speech rate; out-of-range values are clamped
    pub fn set_rate(&mut self, rate: f32) -> Rate {
        let rate = Rate::new(rate);
        self.speech.set_rate(rate);
        self.config.set_rate(rate);
        self.save_config();
        rate
    }

    /// Turn speech on or off
    ///
    /// Only affects messages received from now on.
    pub fn set_tts_enabled(&mut self, enabled: bool) {
        self.speech.set_enabled(enabled);
        self.config.set_tts_enabled(enabled);
        self.save_config();
    }

    // ========== Filters ==========

    /// Returns false if the word was already filtered
    pub fn add_filter(&mut self, word: &str) -> bool {
        let added = self.filters.add(word);
        if added {
            self.config.set_filters(&self.filters);
            self.save_config();
        }
        added
    }

    /// Returns false if the word was not filtered
    pub fn remove_filter(&mut self, word: &str) -> bool {
        let removed = self.filters.remove(word);
        if removed {
            self.config.set_filters(&self.filters);
            self.save_config();
        }
        removed
    }

    fn save_config(&self) {
        if let Err(e) = self.config.save() {
            warn!("{}", e);
        }
    }

    // ========== Console ==========

    /// Run a console command, returning the text to show the user
    pub fn execute(&mut self, command: Command) -> Result<String> {
        debug!("Executing {:?}", command);
        let reply = match command {
            Command::Reconnect => {
                self.connection.reconnect(&mut self.scheduler);
                self.connection.status()
            }
            Command::Disconnect => {
                self.connection.disconnect(&mut self.scheduler);
                self.connection.status()
            }
            Command::Status => self.status_line(),
            Command::Tts(enabled) => {
                self.set_tts_enabled(enabled);
                format!("TTS {}", if enabled { "on" } else { "off" })
            }
            Command::Rate(rate) => format!("Rate {}", self.set_rate(rate)),
            Command::Voice(wanted) => format!("Voice {}", self.select_voice(&wanted)?),
            Command::Voices => {
                if self.voices.is_empty() {
                    "No voices available".to_string()
                } else {
                    let current = self.speech.voice();
                    self.voices
                        .iter()
                        .map(|v| {
                            let mark = if current == Some(v.id.as_str()) { '*' } else { ' ' };
                            format!("{} {} ({}) [{}]", mark, v.name, v.language, v.id)
                        })
                        .collect::<Vec<_>>()
                        .join("\n")
                }
            }
            Command::Skip => {
                self.speech.skip(&mut self.scheduler);
                "Skipped".to_string()
            }
            Command::Stop => {
                self.speech.shutdown(&mut self.scheduler);
                "Speech stopped".to_string()
            }
            Command::FilterAdd(word) => {
                if self.add_filter(&word) {
                    format!("Filtering '{}'", word)
                } else {
                    format!("'{}' is already filtered", word)
                }
            }
            Command::FilterRemove(word) => {
                if self.remove_filter(&word) {
                    format!("No longer filtering '{}'", word)
                } else {
                    format!("'{}' was not filtered", word)
                }
            }
            Command::Filters => {
                if self.filters.is_empty() {
                    "No filtered words".to_string()
                } else {
                    self.filters.words().join(", ")
                }
            }
            Command::Help => HELP.to_string(),
            Command::Quit => {
                self.shutdown();
                "Goodbye".to_string()
            }
        };
        Ok(reply)
    }

    /// One-line summary of connection and speech
    pub fn status_line(&self) -> String {
        let tts = if !self.speech.is_enabled() {
            "off".to_string()
        } else {
            format!(
                "on, rate {}, voice {}",
                self.speech.rate(),
                self.speech.voice().unwrap_or("none")
            )
        };
        let speaking = if self.speech.is_speaking() {
            format!("speaking, {} queued", self.speech.queue_len())
        } else {
            format!("idle, {} queued", self.speech.queue_len())
        };
        format!("Chat: {} | TTS: {} | {}", self.connection.status(), tts, speaking)
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Leave chat and stop speaking
    pub fn shutdown(&mut self) {
        info!("Shutting down");
        self.connection.disconnect(&mut self.scheduler);
        self.speech.shutdown(&mut self.scheduler);
    }
}

/// Match a voice by exact id, then by case-insensitive id or name
fn find_voice<'a>(voices: &'a [VoiceInfo], wanted: &str) -> Option<&'a VoiceInfo> {
    voices.iter().find(|v| v.id == wanted).or_else(|| {
        voices
            .iter()
            .find(|v| v.id.eq_ignore_ascii_case(wanted) || v.name.eq_ignore_ascii_case(wanted))
    })
}
