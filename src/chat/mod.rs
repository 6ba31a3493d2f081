//! Chat input: the source abstraction, Twitch client and message types

pub mod irc;
pub mod message;
pub mod source;
pub mod twitch;

pub use message::{ChatMessage, MessageLog};
pub use source::{ChatEvent, ChatEventKind, ChatListener, ChatSource, MessageEvent, SessionId};
pub use twitch::{TwitchChat, TwitchConfig};
