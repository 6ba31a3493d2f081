//! Console command parsing
//!
//! One command per stdin line, e.g. `rate 1.5` or `filter add heck`.

use crate::{ChatSpeakError, Result};

/// A console command
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    // Connection
    Reconnect,
    Disconnect,
    Status,

    // Speech
    Tts(bool),
    Rate(f32),
    Voice(String),
    Voices,
    Skip,
    Stop,

    // Filters
    FilterAdd(String),
    FilterRemove(String),
    Filters,

    Help,
    Quit,
}

/// Shown for `help`
pub const HELP: &str = "\
Commands:
  reconnect              reconnect now, resetting the retry budget
  disconnect             leave chat and stop retrying
  status                 show connection and speech status
  tts on|off             enable or disable speech
  rate <0.5-2.0>         set speech rate
  voice <id>             select a voice
  voices                 list available voices
  skip                   cut the current message short
  stop                   stop speaking and drop queued messages
  filter add|remove <w>  manage filtered words
  filters                list filtered words
  quit                   exit";

/// Parse one console line
///
/// Blank lines give `Ok(None)`. Keywords are case-insensitive; arguments
/// keep their case.
pub fn parse_command(line: &str) -> Result<Option<Command>> {
    let mut parts = line.split_whitespace();
    let Some(keyword) = parts.next() else {
        return Ok(None);
    };
    let args: Vec<&str> = parts.collect();
    let keyword = keyword.to_lowercase();

    let command = match (keyword.as_str(), args.as_slice()) {
        ("reconnect", []) => Command::Reconnect,
        ("disconnect", []) => Command::Disconnect,
        ("status", []) => Command::Status,
        ("tts", [state]) => match state.to_lowercase().as_str() {
            "on" => Command::Tts(true),
            "off" => Command::Tts(false),
            _ => return Err(usage("tts on|off")),
        },
        ("rate", [value]) => match value.parse::<f32>() {
            Ok(rate) if rate.is_finite() => Command::Rate(rate),
            _ => return Err(usage("rate <number>")),
        },
        ("voice", [_, ..]) => Command::Voice(args.join(" ")),
        ("voices", []) => Command::Voices,
        ("skip", []) => Command::Skip,
        ("stop", []) => Command::Stop,
        ("filter", [action, word]) => match action.to_lowercase().as_str() {
            "add" => Command::FilterAdd(word.to_string()),
            "remove" | "rm" => Command::FilterRemove(word.to_string()),
            _ => return Err(usage("filter add|remove <word>")),
        },
        ("filters", []) => Command::Filters,
        ("help" | "?", []) => Command::Help,
        ("quit" | "exit", []) => Command::Quit,
        ("tts", _) => return Err(usage("tts on|off")),
        ("rate", _) => return Err(usage("rate <number>")),
        ("voice", _) => return Err(usage("voice <id>")),
        ("filter", _) => return Err(usage("filter add|remove <word>")),
        _ => {
            return Err(ChatSpeakError::Other(format!(
                "Unknown command: {} (try 'help')",
                line.trim()
            )))
        }
    };

    Ok(Some(command))
}

fn usage(form: &str) -> ChatSpeakError {
    ChatSpeakError::Other(format!("Usage: {}", form))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_line() {
        assert_eq!(parse_command("").unwrap(), None);
        assert_eq!(parse_command("   \t").unwrap(), None);
    }

    #[test]
    fn test_simple_commands() {
        assert_eq!(parse_command("reconnect").unwrap(), Some(Command::Reconnect));
        assert_eq!(parse_command(" STATUS ").unwrap(), Some(Command::Status));
        assert_eq!(parse_command("exit").unwrap(), Some(Command::Quit));
        assert_eq!(parse_command("skip").unwrap(), Some(Command::Skip));
    }

    #[test]
    fn test_arguments() {
        assert_eq!(parse_command("tts Off").unwrap(), Some(Command::Tts(false)));
        assert_eq!(parse_command("rate 1.5").unwrap(), Some(Command::Rate(1.5)));
        assert_eq!(
            parse_command("voice Microsoft Zira").unwrap(),
            Some(Command::Voice("Microsoft Zira".to_string()))
        );
        assert_eq!(
            parse_command("filter add Heck").unwrap(),
            Some(Command::FilterAdd("Heck".to_string()))
        );
        assert_eq!(
            parse_command("filter rm heck").unwrap(),
            Some(Command::FilterRemove("heck".to_string()))
        );
    }

    #[test]
    fn test_bad_input() {
        assert!(parse_command("tts maybe").is_err());
        assert!(parse_command("rate fast").is_err());
        assert!(parse_command("rate NaN").is_err());
        assert!(parse_command("voice").is_err());
        assert!(parse_command("filter add").is_err());
        assert!(parse_command("status now").is_err());
        assert!(parse_command("dance").is_err());
    }
}
