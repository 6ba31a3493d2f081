//! Speech engine backends

// Native TTS backend using the tts crate (cross-platform)
pub mod native;

// espeak-ng child process per utterance
pub mod espeak;
