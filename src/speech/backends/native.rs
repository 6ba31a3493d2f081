//! Native TTS backend using the tts crate
//!
//! Talks to Speech Dispatcher on Linux, AVFoundation on macOS and so on.
//! Where the platform reports utterance callbacks, completion comes from
//! them. Otherwise the backend polls `is_speaking`, and as a last resort
//! estimates how long the utterance takes.

use crate::speech::engine::voice_ids_differ;
use crate::speech::{SpeechEngine, SpeechEvent, SpeechListener, SpeechTask, Ticket, VoiceInfo};
use crate::{ChatSpeakError, Result};
use log::{debug, error, warn};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tts::{Tts as TtsCrate, UtteranceId, Voice};

/// How long `is_speaking` may report false before we assume the utterance
/// never started
const START_GRACE: Duration = Duration::from_millis(1500);

/// Rough per-character duration at normal rate, for platforms that can't
/// tell us anything
const ESTIMATED_CHAR_TIME: Duration = Duration::from_millis(70);

/// Which ticket the platform is currently speaking
///
/// Shared with the callbacks, which fire on platform threads.
#[derive(Default)]
struct Tracker {
    ticket: Option<Ticket>,
    id: Option<UtteranceId>,
    /// `speak` hasn't returned the id yet
    awaiting_id: bool,
    /// Ends reported before `speak` returned
    early: Vec<UtteranceId>,
}

impl Tracker {
    fn clear(&mut self) {
        self.ticket = None;
        self.id = None;
        self.awaiting_id = false;
        self.early.clear();
    }

    /// Claim the ticket if `uid` is the tracked utterance
    fn finish(&mut self, uid: UtteranceId) -> Option<Ticket> {
        self.ticket?;
        if self.awaiting_id {
            self.early.push(uid);
            return None;
        }
        let matches = match &self.id {
            Some(id) => *id == uid,
            // Backend didn't hand out ids; only one utterance is ever live
            None => true,
        };
        if matches {
            let ticket = self.ticket.take();
            self.clear();
            ticket
        } else {
            None
        }
    }
}

/// Completion tracking when callbacks aren't available
struct Polled {
    ticket: Ticket,
    started: Instant,
    saw_speaking: bool,
    estimate: Duration,
}

/// Native TTS backend using the tts crate
pub struct NativeEngine {
    tts: TtsCrate,
    tracker: Arc<Mutex<Tracker>>,
    listener: Arc<Mutex<Option<SpeechListener>>>,
    callbacks: bool,
    polled: Option<Polled>,

    /// Cached voice list for `set_voice`
    voices: Vec<Voice>,
}

impl NativeEngine {
    /// Create a new native TTS engine
    ///
    /// Initializes the platform-appropriate TTS backend and hooks its
    /// utterance callbacks when supported.
    pub fn new() -> Result<Self> {
        debug!("Creating native TTS backend");

        let tts = TtsCrate::default()
            .map_err(|e| ChatSpeakError::Speech(format!("Failed to initialize TTS: {}", e)))?;

        let tracker = Arc::new(Mutex::new(Tracker::default()));
        let listener: Arc<Mutex<Option<SpeechListener>>> = Arc::new(Mutex::new(None));

        let callbacks = tts.supported_features().utterance_callbacks;
        if callbacks {
            Self::hook_callbacks(&tts, &tracker, &listener)?;
        } else {
            warn!("Utterance callbacks not supported on this platform, polling instead");
        }

        let voices = tts.voices().unwrap_or_default();
        debug!("Native TTS backend created with {} voices", voices.len());

        Ok(Self {
            tts,
            tracker,
            listener,
            callbacks,
            polled: None,
            voices,
        })
    }

    fn hook_callbacks(
        tts: &TtsCrate,
        tracker: &Arc<Mutex<Tracker>>,
        listener: &Arc<Mutex<Option<SpeechListener>>>,
    ) -> Result<()> {
        let begin_tracker = Arc::clone(tracker);
        let begin_listener = Arc::clone(listener);
        tts.on_utterance_begin(Some(Box::new(move |uid: UtteranceId| {
            let ticket = match begin_tracker.lock() {
                Ok(t) if t.id.as_ref() == Some(&uid) => t.ticket,
                _ => None,
            };
            if let Some(ticket) = ticket {
                emit(&begin_listener, SpeechEvent::Started(ticket));
            }
        })))
        .map_err(|e| ChatSpeakError::Speech(format!("Failed to hook utterance begin: {}", e)))?;

        let end_tracker = Arc::clone(tracker);
        let end_listener = Arc::clone(listener);
        tts.on_utterance_end(Some(Box::new(move |uid: UtteranceId| {
            let ticket = end_tracker.lock().ok().and_then(|mut t| t.finish(uid));
            if let Some(ticket) = ticket {
                emit(&end_listener, SpeechEvent::Finished(ticket));
            }
        })))
        .map_err(|e| ChatSpeakError::Speech(format!("Failed to hook utterance end: {}", e)))?;

        // Stops we asked for have already cleared the tracker, so anything
        // that still matches was stopped by someone else.
        let stop_tracker = Arc::clone(tracker);
        let stop_listener = Arc::clone(listener);
        tts.on_utterance_stop(Some(Box::new(move |uid: UtteranceId| {
            let ticket = stop_tracker.lock().ok().and_then(|mut t| t.finish(uid));
            if let Some(ticket) = ticket {
                emit(&stop_listener, SpeechEvent::Finished(ticket));
            }
        })))
        .map_err(|e| ChatSpeakError::Speech(format!("Failed to hook utterance stop: {}", e)))?;

        Ok(())
    }

    /// Map a rate multiplier onto the platform's own range
    fn convert_rate(&self, multiplier: f32) -> f32 {
        let normal = self.tts.normal_rate();
        let (min, max) = (self.tts.min_rate(), self.tts.max_rate());
        (normal * multiplier).clamp(min.min(max), max.max(min))
    }

    fn apply_voice(&mut self, id: &str) -> Result<()> {
        if !self.tts.supported_features().voice {
            return Ok(());
        }
        if !self.voices.iter().any(|v| v.id() == id) {
            let voices = self
                .tts
                .voices()
                .map_err(|e| ChatSpeakError::Speech(format!("Failed to get voices: {}", e)))?;
            if voice_ids_differ(
                self.voices.iter().map(|v| v.id()),
                voices.iter().map(|v| v.id()),
            ) {
                debug!("Voice list changed ({} voices)", voices.len());
                emit(&self.listener, SpeechEvent::VoicesChanged);
            }
            self.voices = voices;
        }
        match self.voices.iter().find(|v| v.id() == id) {
            Some(voice) => {
                self.tts
                    .set_voice(voice)
                    .map_err(|e| ChatSpeakError::Speech(format!("Failed to set voice: {}", e)))?;
            }
            None => warn!("Voice {} not available", id),
        }
        Ok(())
    }

    fn lock_tracker(&self) -> Result<std::sync::MutexGuard<'_, Tracker>> {
        self.tracker
            .lock()
            .map_err(|_| ChatSpeakError::Speech("utterance tracker poisoned".to_string()))
    }
}

fn emit(listener: &Arc<Mutex<Option<SpeechListener>>>, event: SpeechEvent) {
    let listener = listener.lock().ok().and_then(|l| l.clone());
    if let Some(listener) = listener {
        listener(event);
    }
}

impl SpeechEngine for NativeEngine {
    fn set_listener(&mut self, listener: Option<SpeechListener>) {
        if let Ok(mut slot) = self.listener.lock() {
            *slot = listener;
        }
    }

    fn speak(&mut self, task: &SpeechTask, ticket: Ticket) -> Result<()> {
        if let Some(voice) = &task.voice {
            self.apply_voice(voice)?;
        }
        if self.tts.supported_features().rate {
            let rate = self.convert_rate(task.rate.value());
            self.tts
                .set_rate(rate)
                .map_err(|e| ChatSpeakError::Speech(format!("Failed to set rate: {}", e)))?;
        }

        {
            let mut tracker = self.lock_tracker()?;
            tracker.clear();
            tracker.ticket = Some(ticket);
            tracker.awaiting_id = true;
        }

        debug!("Speaking: {}", task.text);
        let spoken = self.tts.speak(task.text.as_str(), false);

        let mut tracker = self.lock_tracker()?;
        tracker.awaiting_id = false;
        let id = match spoken {
            Ok(id) => id,
            Err(e) => {
                tracker.clear();
                error!("Failed to speak: {}", e);
                return Err(ChatSpeakError::Speech(format!("Speak failed: {}", e)));
            }
        };

        if !self.callbacks {
            tracker.clear();
            drop(tracker);
            self.polled = Some(Polled {
                ticket,
                started: Instant::now(),
                saw_speaking: false,
                estimate: ESTIMATED_CHAR_TIME
                    .mul_f32(task.text.chars().count() as f32 / task.rate.value()),
            });
            return Ok(());
        }

        let ended_early = match &id {
            Some(id) => tracker.early.iter().any(|e| e == id),
            None => !tracker.early.is_empty(),
        };
        if ended_early {
            tracker.clear();
            drop(tracker);
            emit(&self.listener, SpeechEvent::Finished(ticket));
        } else {
            tracker.early.clear();
            tracker.id = id;
        }
        Ok(())
    }

    fn cancel(&mut self) -> Result<()> {
        self.lock_tracker()?.clear();
        self.polled = None;

        if !self.tts.supported_features().stop {
            return Ok(());
        }
        self.tts.stop().map_err(|e| {
            error!("Failed to cancel speech: {}", e);
            ChatSpeakError::Speech(format!("Cancel failed: {}", e))
        })?;
        Ok(())
    }

    fn voices(&self) -> Result<Vec<VoiceInfo>> {
        let features = self.tts.supported_features();
        let voices = self
            .tts
            .voices()
            .map_err(|e| ChatSpeakError::Speech(format!("Failed to get voices: {}", e)))?;

        let current = if features.get_voice {
            self.tts.voice().ok().flatten().map(|v| v.id())
        } else {
            None
        };

        Ok(voices
            .iter()
            .map(|v| VoiceInfo {
                id: v.id(),
                name: v.name(),
                language: v.language().as_str().to_string(),
                is_default: current.as_deref() == Some(v.id().as_str()),
            })
            .collect())
    }

    fn poll(&mut self) -> Option<SpeechEvent> {
        let polled = self.polled.as_mut()?;

        let done = if self.tts.supported_features().is_speaking {
            match self.tts.is_speaking() {
                Ok(true) => {
                    polled.saw_speaking = true;
                    false
                }
                Ok(false) => polled.saw_speaking || polled.started.elapsed() > START_GRACE,
                Err(e) => {
                    let ticket = polled.ticket;
                    self.polled = None;
                    return Some(SpeechEvent::Failed(ticket, e.to_string()));
                }
            }
        } else {
            polled.started.elapsed() >= polled.estimate
        };

        if done {
            let ticket = polled.ticket;
            self.polled = None;
            Some(SpeechEvent::Finished(ticket))
        } else {
            None
        }
    }
}
