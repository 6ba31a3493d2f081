//! IRC line parsing with IRCv3 message tags
//!
//! Twitch chat is IRC with tags:
//!
//! ```text
//! @badge-info=;display-name=Bob;id=b34c...;tmi-sent-ts=1 :bob!bob@bob.tmi.twitch.tv PRIVMSG #chan :hello
//! ```

use std::collections::HashMap;

/// One parsed IRC line
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IrcLine {
    pub tags: HashMap<String, String>,
    pub prefix: Option<String>,
    pub command: String,
    pub params: Vec<String>,
}

impl IrcLine {
    /// Parse a single line (without the trailing CRLF)
    ///
    /// Returns `None` for empty or command-less lines.
    pub fn parse(line: &str) -> Option<Self> {
        let mut rest = line.trim_end_matches(&['\r', '\n'][..]);
        let mut parsed = IrcLine::default();

        if let Some(stripped) = rest.strip_prefix('@') {
            let (tags, tail) = stripped.split_once(' ')?;
            parsed.tags = parse_tags(tags);
            rest = tail.trim_start();
        }

        if let Some(stripped) = rest.strip_prefix(':') {
            let (prefix, tail) = stripped.split_once(' ')?;
            parsed.prefix = Some(prefix.to_string());
            rest = tail.trim_start();
        }

        let (command, mut rest) = match rest.split_once(' ') {
            Some((command, tail)) => (command, tail),
            None => (rest, ""),
        };
        if command.is_empty() {
            return None;
        }
        parsed.command = command.to_ascii_uppercase();

        while !rest.is_empty() {
            rest = rest.trim_start();
            if let Some(trailing) = rest.strip_prefix(':') {
                parsed.params.push(trailing.to_string());
                break;
            }
            match rest.split_once(' ') {
                Some((param, tail)) => {
                    parsed.params.push(param.to_string());
                    rest = tail;
                }
                None => {
                    if !rest.is_empty() {
                        parsed.params.push(rest.to_string());
                    }
                    break;
                }
            }
        }

        Some(parsed)
    }

    /// Nick part of the prefix (`nick!user@host`)
    pub fn nick(&self) -> Option<&str> {
        let prefix = self.prefix.as_deref()?;
        let nick = prefix.split(&['!', '@'][..]).next()?;
        if nick.is_empty() {
            None
        } else {
            Some(nick)
        }
    }

    /// Non-empty tag value
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// Last parameter, which carries the text for PRIVMSG and NOTICE
    pub fn trailing(&self) -> Option<&str> {
        self.params.last().map(String::as_str)
    }
}

fn parse_tags(raw: &str) -> HashMap<String, String> {
    raw.split(';')
        .filter(|t| !t.is_empty())
        .map(|tag| match tag.split_once('=') {
            Some((k, v)) => (k.to_string(), unescape_tag_value(v)),
            None => (tag.to_string(), String::new()),
        })
        .collect()
}

/// Undo IRCv3 tag value escaping
fn unescape_tag_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some(':') => out.push(';'),
            Some('s') => out.push(' '),
            Some('\\') => out.push('\\'),
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}
