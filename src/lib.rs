//! chatspeak - Read Twitch chat aloud
//!
//! Connects anonymously to a Twitch channel's chat, cleans each message up
//! for speech (filtered words, links) and speaks messages one at a time
//! through the platform's text-to-speech engine. Dropped connections are
//! retried with exponential backoff.

pub mod chat;
pub mod connection;
pub mod error;
pub mod events;
pub mod input;
pub mod scheduler;
pub mod speech;
pub mod state;
pub mod text;

pub use error::{ChatSpeakError, Result};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const APP_NAME: &str = "chatspeak";
