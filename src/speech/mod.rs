//! Speech synthesis system

pub mod backends;
pub mod engine;
pub mod sequencer;
pub mod task;

pub use engine::{
    create_engine, default_voice, BackendKind, SpeechEngine, SpeechEvent, SpeechListener, Ticket,
    VoiceInfo,
};
pub use sequencer::{SpeechSequencer, DEFAULT_SETTLE_DELAY};
pub use task::{Rate, SpeechTask};
