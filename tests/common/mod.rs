//! Recording test doubles for the chat source and speech engine

#![allow(dead_code)]

use chatspeak::chat::{ChatEvent, ChatEventKind, ChatListener, ChatSource, MessageEvent, SessionId};
use chatspeak::speech::{
    Rate, SpeechEngine, SpeechEvent, SpeechListener, SpeechTask, Ticket, VoiceInfo,
};
use chatspeak::{ChatSpeakError, Result};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Something the mock engine was asked to do
#[derive(Debug, Clone, PartialEq)]
pub enum EngineCall {
    Speak {
        ticket: Ticket,
        text: String,
        voice: Option<String>,
        rate: Rate,
    },
    Cancel,
}

/// Shared view into a [`MockEngine`] after it was boxed
#[derive(Clone, Default)]
pub struct EngineHandle {
    calls: Arc<Mutex<Vec<EngineCall>>>,
    fail_speak: Arc<Mutex<bool>>,
    voices: Arc<Mutex<Vec<VoiceInfo>>>,
    polled: Arc<Mutex<VecDeque<SpeechEvent>>>,
}

impl EngineHandle {
    pub fn calls(&self) -> Vec<EngineCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// Texts passed to `speak`, in order
    pub fn spoken(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                EngineCall::Speak { text, .. } => Some(text),
                EngineCall::Cancel => None,
            })
            .collect()
    }

    /// Ticket of the most recent `speak`
    pub fn last_ticket(&self) -> Option<Ticket> {
        self.calls().into_iter().rev().find_map(|c| match c {
            EngineCall::Speak { ticket, .. } => Some(ticket),
            EngineCall::Cancel => None,
        })
    }

    pub fn cancel_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| **c == EngineCall::Cancel)
            .count()
    }

    pub fn set_fail_speak(&self, fail: bool) {
        *self.fail_speak.lock().unwrap() = fail;
    }

    /// Replace what `voices` returns from now on
    pub fn set_voices(&self, voices: Vec<VoiceInfo>) {
        *self.voices.lock().unwrap() = voices;
    }

    /// Queue an event for the next `poll`
    pub fn push_polled(&self, event: SpeechEvent) {
        self.polled.lock().unwrap().push_back(event);
    }
}

pub struct MockEngine {
    handle: EngineHandle,
}

impl MockEngine {
    pub fn new(voices: Vec<VoiceInfo>) -> (Self, EngineHandle) {
        let handle = EngineHandle::default();
        handle.set_voices(voices);
        (
            Self {
                handle: handle.clone(),
            },
            handle,
        )
    }

    /// Engine with one English and one German voice
    pub fn with_default_voices() -> (Self, EngineHandle) {
        Self::new(vec![voice("de-1", "de-DE"), voice("en-1", "en-US")])
    }
}

impl SpeechEngine for MockEngine {
    fn set_listener(&mut self, _listener: Option<SpeechListener>) {}

    fn speak(&mut self, task: &SpeechTask, ticket: Ticket) -> Result<()> {
        if *self.handle.fail_speak.lock().unwrap() {
            return Err(ChatSpeakError::Speech("synthesis unavailable".to_string()));
        }
        self.handle.calls.lock().unwrap().push(EngineCall::Speak {
            ticket,
            text: task.text.clone(),
            voice: task.voice.clone(),
            rate: task.rate,
        });
        Ok(())
    }

    fn cancel(&mut self) -> Result<()> {
        self.handle.calls.lock().unwrap().push(EngineCall::Cancel);
        Ok(())
    }

    fn voices(&self) -> Result<Vec<VoiceInfo>> {
        Ok(self.handle.voices.lock().unwrap().clone())
    }

    fn poll(&mut self) -> Option<SpeechEvent> {
        self.handle.polled.lock().unwrap().pop_front()
    }
}

pub fn voice(id: &str, language: &str) -> VoiceInfo {
    VoiceInfo {
        id: id.to_string(),
        name: format!("Voice {}", id),
        language: language.to_string(),
        is_default: false,
    }
}

/// Something the mock source was asked to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceCall {
    Connect(SessionId),
    Disconnect,
}

#[derive(Clone, Default)]
pub struct SourceHandle {
    calls: Arc<Mutex<Vec<SourceCall>>>,
    fail_connect: Arc<Mutex<bool>>,
}

impl SourceHandle {
    pub fn calls(&self) -> Vec<SourceCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn connect_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, SourceCall::Connect(_)))
            .count()
    }

    /// Session handed out by the latest `connect`
    pub fn session(&self) -> SessionId {
        self.calls()
            .into_iter()
            .rev()
            .find_map(|c| match c {
                SourceCall::Connect(id) => Some(id),
                SourceCall::Disconnect => None,
            })
            .expect("connect was never called")
    }

    pub fn set_fail_connect(&self, fail: bool) {
        *self.fail_connect.lock().unwrap() = fail;
    }
}

pub struct MockSource {
    handle: SourceHandle,
    next: u64,
}

impl MockSource {
    pub fn new() -> (Self, SourceHandle) {
        let handle = SourceHandle::default();
        (
            Self {
                handle: handle.clone(),
                next: 0,
            },
            handle,
        )
    }
}

impl ChatSource for MockSource {
    fn set_listener(&mut self, _listener: Option<ChatListener>) {}

    fn connect(&mut self) -> Result<SessionId> {
        if *self.handle.fail_connect.lock().unwrap() {
            return Err(ChatSpeakError::Chat("connection refused".to_string()));
        }
        self.next += 1;
        let session = SessionId(self.next);
        self.handle
            .calls
            .lock()
            .unwrap()
            .push(SourceCall::Connect(session));
        Ok(session)
    }

    fn disconnect(&mut self) -> Result<()> {
        self.handle.calls.lock().unwrap().push(SourceCall::Disconnect);
        Ok(())
    }
}

pub fn connected(session: SessionId) -> ChatEvent {
    ChatEvent {
        session,
        kind: ChatEventKind::Connected,
    }
}

pub fn dropped(session: SessionId, reason: &str) -> ChatEvent {
    ChatEvent {
        session,
        kind: ChatEventKind::Disconnected(Some(reason.to_string())),
    }
}

pub fn failed(session: SessionId, reason: &str) -> ChatEvent {
    ChatEvent {
        session,
        kind: ChatEventKind::ConnectFailed(reason.to_string()),
    }
}

pub fn message(session: SessionId, username: &str, text: &str) -> ChatEvent {
    ChatEvent {
        session,
        kind: ChatEventKind::Message(MessageEvent {
            id: None,
            username: username.to_string(),
            text: text.to_string(),
        }),
    }
}
