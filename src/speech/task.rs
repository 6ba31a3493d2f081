//! Queued utterances and the settings they capture

use std::fmt;

/// Speech rate multiplier, 1.0 is the engine's normal speed
///
/// Always within `MIN..=MAX` and on a `STEP` boundary.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Rate(f32);

impl Rate {
    pub const MIN: f32 = 0.5;
    pub const MAX: f32 = 2.0;
    pub const STEP: f32 = 0.1;
    pub const NORMAL: Rate = Rate(1.0);

    /// Clamp into range and snap to the nearest step
    ///
    /// Non-finite input falls back to normal speed.
    pub fn new(value: f32) -> Self {
        if !value.is_finite() {
            return Self::NORMAL;
        }
        let clamped = value.clamp(Self::MIN, Self::MAX);
        Rate((clamped / Self::STEP).round() * Self::STEP)
    }

    pub fn value(self) -> f32 {
        self.0
    }
}

impl Default for Rate {
    fn default() -> Self {
        Self::NORMAL
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}", self.0)
    }
}

/// One utterance waiting to be spoken
///
/// Voice and rate are captured when the task is queued, so changing them
/// later only affects messages that arrive afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeechTask {
    pub text: String,
    pub voice: Option<String>,
    pub rate: Rate,
}

impl SpeechTask {
    /// Build a task; `None` for blank text
    pub fn new(text: &str, voice: Option<String>, rate: Rate) -> Option<Self> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        Some(Self {
            text: text.to_string(),
            voice,
            rate,
        })
    }
}
