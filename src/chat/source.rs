//! Chat source abstraction

use crate::Result;
use std::sync::Arc;

/// Identifies one connection attempt
///
/// Every `connect` call opens a new session. Events from older sessions
/// are stale and get dropped by the connection manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

/// A chat line as delivered by the source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageEvent {
    /// Upstream message id, when the source provides one
    pub id: Option<String>,
    pub username: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEventKind {
    /// The session is up and joined
    Connected,
    /// The session never came up
    ConnectFailed(String),
    Message(MessageEvent),
    /// An established session dropped
    Disconnected(Option<String>),
}

/// Event from a chat source, tagged with the session it belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatEvent {
    pub session: SessionId,
    pub kind: ChatEventKind,
}

/// Callback used by sources to report events
pub type ChatListener = Arc<dyn Fn(ChatEvent) + Send + Sync>;

/// Upstream chat service
///
/// `connect` only starts the attempt; the outcome arrives later as
/// `Connected` or `ConnectFailed` through the listener.
pub trait ChatSource {
    /// Register where events go; `None` removes the listener
    fn set_listener(&mut self, listener: Option<ChatListener>);

    /// Start opening a new session
    fn connect(&mut self) -> Result<SessionId>;

    /// Close the current session; no further events are emitted for it
    fn disconnect(&mut self) -> Result<()>;
}
