//! Received chat messages and the display log

use super::source::MessageEvent;
use crate::text::{normalize, FilterSet};
use std::collections::VecDeque;
use std::time::{SystemTime, UNIX_EPOCH};

/// A received chat message, never modified after creation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    /// Upstream id, or the arrival time in milliseconds if there was none
    pub id: String,
    pub username: String,
    pub raw_text: String,
    pub speakable_text: String,
    pub received_at: SystemTime,
}

impl ChatMessage {
    /// Build a message from a source event, filtering with the current set
    pub fn from_event(event: &MessageEvent, filters: &FilterSet) -> Self {
        let received_at = SystemTime::now();
        let id = match &event.id {
            Some(id) if !id.is_empty() => id.clone(),
            _ => received_at
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis())
                .unwrap_or(0)
                .to_string(),
        };

        Self {
            id,
            username: event.username.clone(),
            raw_text: event.text.clone(),
            speakable_text: normalize(&event.text, filters),
            received_at,
        }
    }

    /// What gets spoken, `None` when nothing is left after filtering
    pub fn utterance(&self) -> Option<String> {
        if self.speakable_text.is_empty() {
            None
        } else {
            Some(format!("{} says: {}", self.username, self.speakable_text))
        }
    }
}

/// Most recent messages, oldest dropped first
#[derive(Debug)]
pub struct MessageLog {
    entries: VecDeque<ChatMessage>,
    capacity: usize,
}

impl MessageLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    pub fn push(&mut self, message: ChatMessage) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(message);
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChatMessage> {
        self.entries.iter()
    }

    pub fn last(&self) -> Option<&ChatMessage> {
        self.entries.back()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(id: Option<&str>, text: &str) -> MessageEvent {
        MessageEvent {
            id: id.map(str::to_string),
            username: "bob".to_string(),
            text: text.to_string(),
        }
    }

    #[test]
    fn test_from_event_normalizes() {
        let msg = ChatMessage::from_event(
            &event(Some("1"), "check http://evil.com out"),
            &FilterSet::new(),
        );
        assert_eq!(msg.id, "1");
        assert_eq!(msg.raw_text, "check http://evil.com out");
        assert_eq!(msg.speakable_text, "check [link removed] out");
        assert_eq!(
            msg.utterance().as_deref(),
            Some("bob says: check [link removed] out")
        );
    }

    #[test]
    fn test_id_falls_back_to_timestamp() {
        let msg = ChatMessage::from_event(&event(None, "hi"), &FilterSet::new());
        assert!(msg.id.parse::<u128>().is_ok());
    }

    #[test]
    fn test_empty_after_filtering_is_silent() {
        let msg = ChatMessage::from_event(&event(None, "   "), &FilterSet::new());
        assert!(msg.utterance().is_none());
    }

    #[test]
    fn test_log_is_bounded() {
        let mut log = MessageLog::new(2);
        for text in ["a", "b", "c"] {
            log.push(ChatMessage::from_event(&event(None, text), &FilterSet::new()));
        }
        assert_eq!(log.len(), 2);
        let texts: Vec<_> = log.iter().map(|m| m.raw_text.as_str()).collect();
        assert_eq!(texts, vec!["b", "c"]);
        assert_eq!(log.last().unwrap().raw_text, "c");
    }
}
