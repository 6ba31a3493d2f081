//! Speech engine abstraction
//!
//! The sequencer drives any engine through this trait. Completion is
//! reported asynchronously as a [`SpeechEvent`], either through the
//! listener (engines with native callbacks) or from [`SpeechEngine::poll`].

use super::task::SpeechTask;
use crate::{ChatSpeakError, Result};
use log::info;
use std::sync::Arc;

/// Identifies one `speak` call so late events can be told apart
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ticket(pub u64);

/// Reports from a speech engine
#[derive(Debug, Clone, PartialEq)]
pub enum SpeechEvent {
    Started(Ticket),
    Finished(Ticket),
    Failed(Ticket, String),
    /// The set of available voices changed
    VoicesChanged,
}

impl SpeechEvent {
    pub fn ticket(&self) -> Option<Ticket> {
        match self {
            SpeechEvent::Started(t) | SpeechEvent::Finished(t) | SpeechEvent::Failed(t, _) => {
                Some(*t)
            }
            SpeechEvent::VoicesChanged => None,
        }
    }
}

/// A voice the engine can speak with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceInfo {
    pub id: String,
    pub name: String,
    pub language: String,
    pub is_default: bool,
}

/// Whether two voice listings differ, ignoring order
pub fn voice_ids_differ<A, B>(old: A, new: B) -> bool
where
    A: IntoIterator,
    A::Item: AsRef<str>,
    B: IntoIterator,
    B::Item: AsRef<str>,
{
    let mut old: Vec<String> = old.into_iter().map(|id| id.as_ref().to_string()).collect();
    let mut new: Vec<String> = new.into_iter().map(|id| id.as_ref().to_string()).collect();
    old.sort();
    new.sort();
    old != new
}

/// Callback used by engines to report events
pub type SpeechListener = Arc<dyn Fn(SpeechEvent) + Send + Sync>;

/// Text-to-speech engine
///
/// `speak` eventually produces exactly one `Finished` or `Failed` for its
/// ticket (optionally preceded by `Started`). `cancel` stops whatever is
/// playing and suppresses any further event for it.
pub trait SpeechEngine {
    /// Register where asynchronous events go
    fn set_listener(&mut self, listener: Option<SpeechListener>);

    /// Start speaking a task
    fn speak(&mut self, task: &SpeechTask, ticket: Ticket) -> Result<()>;

    /// Stop the current utterance, if any
    fn cancel(&mut self) -> Result<()>;

    /// Voices currently available
    fn voices(&self) -> Result<Vec<VoiceInfo>>;

    /// Check for completion on engines without callbacks
    fn poll(&mut self) -> Option<SpeechEvent> {
        None
    }
}

/// Which backend to create
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Native first, then espeak-ng
    Auto,
    Native,
    Espeak,
}

impl BackendKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Some(Self::Auto),
            "native" => Some(Self::Native),
            "espeak" | "espeak-ng" => Some(Self::Espeak),
            _ => None,
        }
    }
}

/// Create a speech engine
///
/// `Auto` tries the platform TTS service through the `tts` crate and falls
/// back to spawning espeak-ng.
pub fn create_engine(kind: BackendKind) -> Result<Box<dyn SpeechEngine>> {
    use super::backends::espeak::EspeakEngine;
    use super::backends::native::NativeEngine;

    match kind {
        BackendKind::Native => {
            info!("Creating native speech engine");
            Ok(Box::new(NativeEngine::new()?))
        }
        BackendKind::Espeak => {
            info!("Creating espeak-ng speech engine");
            Ok(Box::new(EspeakEngine::new()?))
        }
        BackendKind::Auto => {
            info!("Trying native speech engine...");
            match NativeEngine::new() {
                Ok(engine) => {
                    info!("✓ Successfully initialized native TTS backend");
                    return Ok(Box::new(engine));
                }
                Err(e) => {
                    info!("✗ Native TTS unavailable: {}", e);
                }
            }

            info!("Trying espeak-ng speech engine...");
            match EspeakEngine::new() {
                Ok(engine) => {
                    info!("✓ Successfully initialized espeak-ng backend");
                    Ok(Box::new(engine))
                }
                Err(e) => Err(ChatSpeakError::Speech(format!(
                    "No speech backend available. Tried:\n\
                     1. Platform TTS (Linux: sudo apt install speech-dispatcher)\n\
                     2. espeak-ng (install: sudo apt install espeak-ng)\n\
                     Error: {}",
                    e
                ))),
            }
        }
    }
}

/// Pick the voice to use when none is configured
///
/// Prefers the first English voice, then the first voice at all.
pub fn default_voice(voices: &[VoiceInfo]) -> Option<&VoiceInfo> {
    voices
        .iter()
        .find(|v| v.language.to_ascii_lowercase().starts_with("en"))
        .or_else(|| voices.first())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn voice(id: &str, language: &str) -> VoiceInfo {
        VoiceInfo {
            id: id.to_string(),
            name: id.to_string(),
            language: language.to_string(),
            is_default: false,
        }
    }

    #[test]
    fn test_default_voice_prefers_english() {
        let voices = vec![voice("de", "de-DE"), voice("en", "en-US")];
        assert_eq!(default_voice(&voices).unwrap().id, "en");
    }

    #[test]
    fn test_default_voice_falls_back_to_first() {
        let voices = vec![voice("de", "de-DE"), voice("fr", "fr-FR")];
        assert_eq!(default_voice(&voices).unwrap().id, "de");
        assert!(default_voice(&[]).is_none());
    }

    #[test]
    fn test_backend_parse() {
        assert_eq!(BackendKind::parse("AUTO"), Some(BackendKind::Auto));
        assert_eq!(BackendKind::parse("espeak-ng"), Some(BackendKind::Espeak));
        assert_eq!(BackendKind::parse("sapi"), None);
    }

    #[test]
    fn test_event_ticket() {
        assert_eq!(SpeechEvent::Finished(Ticket(3)).ticket(), Some(Ticket(3)));
        assert_eq!(SpeechEvent::VoicesChanged.ticket(), None);
    }

    #[test]
    fn test_voice_ids_differ() {
        assert!(!voice_ids_differ(["en", "de"], ["de", "en"]));
        assert!(voice_ids_differ(["en", "de"], ["en"]));
        assert!(voice_ids_differ(Vec::<String>::new(), ["en"]));
    }
}
