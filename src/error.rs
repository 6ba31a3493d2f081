//! Error types for chatspeak

use std::io;
use thiserror::Error;

/// Main error type for chatspeak
#[derive(Error, Debug)]
pub enum ChatSpeakError {
    #[error("Chat source error: {0}")]
    Chat(String),

    #[error("Speech synthesis error: {0}")]
    Speech(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("INI parse error: {0}")]
    IniParse(String),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for chatspeak operations
pub type Result<T> = std::result::Result<T, ChatSpeakError>;

impl From<String> for ChatSpeakError {
    fn from(s: String) -> Self {
        ChatSpeakError::Other(s)
    }
}

impl From<&str> for ChatSpeakError {
    fn from(s: &str) -> Self {
        ChatSpeakError::Other(s.to_string())
    }
}
