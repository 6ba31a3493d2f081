//! espeak-ng process backend
//!
//! Each utterance is one espeak-ng child process; the utterance is over
//! when the child exits. Used where no platform TTS service is running.
//!
//! Dependencies:
//! - espeak-ng (install with: sudo apt install espeak-ng)

use crate::speech::engine::voice_ids_differ;
use crate::speech::{SpeechEngine, SpeechEvent, SpeechListener, SpeechTask, Ticket, VoiceInfo};
use crate::{ChatSpeakError, Result};
use log::{debug, error, warn};
use std::process::{Child, Command, Stdio};

/// espeak-ng words per minute at rate 1.0
const NORMAL_WPM: f32 = 175.0;

/// Voices offered when `espeak-ng --voices` can't be read
const FALLBACK_VOICES: &[(&str, &str)] = &[
    ("en", "English"),
    ("en-us", "English (America)"),
    ("en-gb", "English (Great Britain)"),
    ("es", "Spanish"),
    ("fr", "French"),
    ("de", "German"),
    ("it", "Italian"),
    ("pt", "Portuguese"),
    ("ru", "Russian"),
];

/// espeak-ng backend driving one child process per utterance
pub struct EspeakEngine {
    /// Currently running espeak-ng process and the ticket it speaks
    current: Option<(Ticket, Child)>,

    /// Path to espeak-ng
    espeak_path: String,

    /// Voice ids from the last listing
    known_voices: Vec<String>,

    /// Set when a re-list found a different voice set; reported by `poll`
    voices_changed: bool,
}

impl EspeakEngine {
    /// Create a new espeak-ng engine
    ///
    /// Fails if espeak-ng can't be found.
    pub fn new() -> Result<Self> {
        debug!("Creating espeak-ng backend");

        let espeak_path = Self::find_espeak()?;
        debug!("Found espeak-ng at: {}", espeak_path);

        let mut engine = Self {
            current: None,
            espeak_path,
            known_voices: Vec::new(),
            voices_changed: false,
        };
        engine.known_voices = engine.voice_ids();
        Ok(engine)
    }

    fn voice_ids(&self) -> Vec<String> {
        self.voices()
            .unwrap_or_default()
            .into_iter()
            .map(|v| v.id)
            .collect()
    }

    /// Re-list voices when asked for one we haven't seen, so voices
    /// installed while running are picked up
    fn check_voice(&mut self, id: &str) {
        if self.known_voices.iter().any(|v| v == id) {
            return;
        }
        let ids = self.voice_ids();
        if voice_ids_differ(&self.known_voices, &ids) {
            debug!("espeak-ng voice list changed ({} voices)", ids.len());
            self.voices_changed = true;
        }
        self.known_voices = ids;
    }

    /// Find espeak-ng executable
    fn find_espeak() -> Result<String> {
        let paths = ["espeak-ng", "/usr/bin/espeak-ng", "/usr/local/bin/espeak-ng"];

        for path in paths {
            if let Ok(status) = Command::new(path)
                .arg("--version")
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
            {
                if status.success() {
                    return Ok(path.to_string());
                }
            }
        }

        Err(ChatSpeakError::Speech(
            "espeak-ng not found. Install with: sudo apt install espeak-ng".to_string(),
        ))
    }

    /// Convert a rate multiplier to espeak-ng speed (80-450 wpm)
    fn rate_to_wpm(multiplier: f32) -> u16 {
        (NORMAL_WPM * multiplier).round().clamp(80.0, 450.0) as u16
    }

    /// Parse the table printed by `espeak-ng --voices`
    ///
    /// ```text
    /// Pty Language       Age/Gender VoiceName          File                 Other Languages
    ///  5  af              --/M      Afrikaans          gmw/af
    /// ```
    fn parse_voice_table(output: &str) -> Vec<VoiceInfo> {
        output
            .lines()
            .skip(1)
            .filter_map(|line| {
                let mut cols = line.split_whitespace();
                let _priority = cols.next()?;
                let language = cols.next()?;
                let _age_gender = cols.next()?;
                let name = cols.next()?;
                Some(VoiceInfo {
                    id: language.to_string(),
                    name: name.replace('_', " "),
                    language: language.to_string(),
                    is_default: language == "en",
                })
            })
            .collect()
    }

    fn fallback_voices() -> Vec<VoiceInfo> {
        FALLBACK_VOICES
            .iter()
            .map(|(id, name)| VoiceInfo {
                id: id.to_string(),
                name: name.to_string(),
                language: id.to_string(),
                is_default: *id == "en",
            })
            .collect()
    }

    /// Kill any currently running speech process
    fn kill_current(&mut self) {
        if let Some((ticket, mut child)) = self.current.take() {
            debug!("Killing espeak-ng process for {:?}", ticket);
            match child.kill() {
                Ok(_) => {
                    let _ = child.wait(); // Clean up zombie
                }
                Err(e) => {
                    debug!("Failed to kill espeak-ng process: {}", e);
                }
            }
        }
    }
}

impl SpeechEngine for EspeakEngine {
    fn set_listener(&mut self, _listener: Option<SpeechListener>) {
        // Completion is picked up by poll()
    }

    fn speak(&mut self, task: &SpeechTask, ticket: Ticket) -> Result<()> {
        self.kill_current();

        if let Some(voice) = &task.voice {
            self.check_voice(voice);
        }

        let mut cmd = Command::new(&self.espeak_path);
        if let Some(voice) = &task.voice {
            cmd.arg("-v").arg(voice);
        }
        cmd.arg("-s").arg(Self::rate_to_wpm(task.rate.value()).to_string());
        // "--" so chat starting with a dash isn't taken as an option
        cmd.arg("--").arg(&task.text);
        cmd.stdout(Stdio::null());
        cmd.stderr(Stdio::null());

        match cmd.spawn() {
            Ok(child) => {
                debug!("espeak-ng process started for {:?}", ticket);
                self.current = Some((ticket, child));
                Ok(())
            }
            Err(e) => {
                error!("Failed to spawn espeak-ng: {}", e);
                Err(ChatSpeakError::Speech(format!("Failed to start espeak-ng: {}", e)))
            }
        }
    }

    fn cancel(&mut self) -> Result<()> {
        self.kill_current();
        Ok(())
    }

    fn voices(&self) -> Result<Vec<VoiceInfo>> {
        let output = Command::new(&self.espeak_path)
            .arg("--voices")
            .stderr(Stdio::null())
            .output();

        match output {
            Ok(out) if out.status.success() => {
                let voices = Self::parse_voice_table(&String::from_utf8_lossy(&out.stdout));
                if voices.is_empty() {
                    Ok(Self::fallback_voices())
                } else {
                    Ok(voices)
                }
            }
            Ok(out) => {
                warn!("espeak-ng --voices exited with {}", out.status);
                Ok(Self::fallback_voices())
            }
            Err(e) => {
                warn!("Failed to list espeak-ng voices: {}", e);
                Ok(Self::fallback_voices())
            }
        }
    }

    fn poll(&mut self) -> Option<SpeechEvent> {
        if std::mem::take(&mut self.voices_changed) {
            return Some(SpeechEvent::VoicesChanged);
        }
        let (ticket, child) = self.current.as_mut()?;
        let ticket = *ticket;

        let event = match child.try_wait() {
            Ok(None) => return None,
            Ok(Some(status)) if status.success() => SpeechEvent::Finished(ticket),
            Ok(Some(status)) => {
                SpeechEvent::Failed(ticket, format!("espeak-ng exited with {}", status))
            }
            Err(e) => SpeechEvent::Failed(ticket, e.to_string()),
        };
        self.current = None;
        Some(event)
    }
}

impl Drop for EspeakEngine {
    fn drop(&mut self) {
        debug!("Shutting down espeak-ng backend");
        self.kill_current();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_conversion() {
        assert_eq!(EspeakEngine::rate_to_wpm(0.5), 88);
        assert_eq!(EspeakEngine::rate_to_wpm(1.0), 175);
        assert_eq!(EspeakEngine::rate_to_wpm(2.0), 350);
    }

    #[test]
    fn test_parse_voice_table() {
        let output = "\
Pty Language       Age/Gender VoiceName          File                 Other Languages
 5  af              --/M      Afrikaans          gmw/af
 2  en-gb           --/M      English_(Great_Britain) gmw/en            (en 2)
";
        let voices = EspeakEngine::parse_voice_table(output);
        assert_eq!(voices.len(), 2);
        assert_eq!(voices[0].id, "af");
        assert_eq!(voices[1].name, "English (Great Britain)");
        assert!(!voices[1].is_default);
    }

    #[test]
    fn test_fallback_voices_have_default() {
        let voices = EspeakEngine::fallback_voices();
        assert!(voices.iter().any(|v| v.is_default && v.id == "en"));
    }

    #[test]
    fn test_unknown_voice_relists_and_reports_change() {
        // A missing binary lists the fallback voices
        let mut engine = EspeakEngine {
            current: None,
            espeak_path: "/nonexistent/espeak-ng".to_string(),
            known_voices: vec!["en".to_string()],
            voices_changed: false,
        };

        engine.check_voice("en");
        assert_eq!(engine.poll(), None);

        engine.check_voice("fr");
        assert_eq!(engine.known_voices.len(), FALLBACK_VOICES.len());
        assert_eq!(engine.poll(), Some(SpeechEvent::VoicesChanged));
        assert_eq!(engine.poll(), None);

        engine.check_voice("xx");
        assert_eq!(engine.poll(), None);
    }

    #[test]
    fn test_create_espeak_engine() {
        match EspeakEngine::new() {
            Ok(_) => println!("✓ espeak-ng backend available"),
            Err(e) => println!("⚠ espeak-ng backend not available: {}", e),
        }
    }
}
