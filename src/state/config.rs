//! Configuration management

use crate::chat::twitch::{normalize_channel, DEFAULT_HOST, DEFAULT_KEEPALIVE, DEFAULT_PORT};
use crate::chat::TwitchConfig;
use crate::connection::RetryPolicy;
use crate::speech::{BackendKind, Rate, DEFAULT_SETTLE_DELAY};
use crate::text::FilterSet;
use crate::{ChatSpeakError, Result};
use ini::Ini;
use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default display log size
const DEFAULT_HISTORY: usize = 200;

/// Persistent settings, backed by an INI file (~/.chatspeak.cfg)
///
/// Getters fall back to defaults when a key is missing or malformed, so a
/// hand-edited file can never stop the program from starting.
pub struct Config {
    /// INI configuration storage
    ini: Ini,

    /// Config file path; `None` keeps everything in memory
    path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from ~/.chatspeak.cfg, creating it if missing
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from a specific file, creating it if missing
    pub fn load_from(path: &Path) -> Result<Self> {
        debug!("Loading config from {:?}", path);

        let ini = if path.exists() {
            Ini::load_from_file(path)
                .map_err(|e| ChatSpeakError::IniParse(format!("Failed to load config: {}", e)))?
        } else {
            info!("Config file not found, creating default");
            let default = Self::default_config();
            default
                .write_to_file(path)
                .map_err(|e| ChatSpeakError::IniParse(format!("Failed to write config: {}", e)))?;
            default
        };

        Ok(Self {
            ini,
            path: Some(path.to_path_buf()),
        })
    }

    /// Default configuration that is never written to disk
    pub fn in_memory() -> Self {
        Self {
            ini: Self::default_config(),
            path: None,
        }
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        debug!("Saving config to {:?}", path);
        self.ini
            .write_to_file(path)
            .map_err(|e| ChatSpeakError::Config(format!("Failed to save config: {}", e)))
    }

    /// Get config file path (~/.chatspeak.cfg)
    fn config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".chatspeak.cfg")
    }

    /// Expose the config file path for display
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Create default configuration
    fn default_config() -> Ini {
        let defaults = RetryPolicy::default();
        let mut ini = Ini::new();

        ini.with_section(Some("chat"))
            .set("channel", "")
            .set("host", DEFAULT_HOST)
            .set("port", DEFAULT_PORT.to_string())
            .set("connect_timeout_ms", "10000")
            .set("keepalive_ms", DEFAULT_KEEPALIVE.as_millis().to_string());

        ini.with_section(Some("retry"))
            .set("initial_delay_ms", defaults.initial_delay.as_millis().to_string())
            .set("max_delay_ms", defaults.max_delay.as_millis().to_string())
            .set("max_attempts", defaults.max_attempts.to_string())
            .set("backoff_multiplier", defaults.backoff_multiplier.to_string());

        ini.with_section(Some("speech"))
            .set("enabled", "true")
            .set("rate", "1.0")
            .set("voice", "")
            .set("backend", "auto")
            .set("settle_delay_ms", DEFAULT_SETTLE_DELAY.as_millis().to_string());

        ini.with_section(Some("filters")).set("words", "");

        ini.with_section(Some("display"))
            .set("history", DEFAULT_HISTORY.to_string());

        ini
    }

    /// Get a boolean value from config
    pub fn get_bool(&self, section: &str, key: &str, default: bool) -> bool {
        self.ini
            .get_from(Some(section), key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    /// Get a string value from config
    pub fn get_string(&self, section: &str, key: &str, default: &str) -> String {
        self.ini
            .get_from(Some(section), key)
            .unwrap_or(default)
            .to_string()
    }

    /// Get an unsigned integer value from config
    pub fn get_u64(&self, section: &str, key: &str, default: u64) -> u64 {
        self.ini
            .get_from(Some(section), key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    /// Get a float value from config
    pub fn get_float(&self, section: &str, key: &str, default: f32) -> f32 {
        self.ini
            .get_from(Some(section), key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    /// Set a value in config
    pub fn set(&mut self, section: &str, key: &str, value: &str) {
        self.ini.with_section(Some(section)).set(key, value);
    }

    fn get_millis(&self, section: &str, key: &str, default: Duration) -> Duration {
        Duration::from_millis(self.get_u64(section, key, default.as_millis() as u64))
    }

    // Chat settings

    /// Channel to join, without the leading '#'
    pub fn channel(&self) -> String {
        normalize_channel(&self.get_string("chat", "channel", ""))
    }

    pub fn set_channel(&mut self, channel: &str) {
        self.set("chat", "channel", &normalize_channel(channel));
    }

    /// Connection settings for the Twitch client
    pub fn twitch(&self) -> TwitchConfig {
        let port = self.get_u64("chat", "port", DEFAULT_PORT as u64);
        TwitchConfig {
            host: self.get_string("chat", "host", DEFAULT_HOST),
            port: u16::try_from(port).unwrap_or(DEFAULT_PORT),
            channel: self.channel(),
            connect_timeout: self.get_millis("chat", "connect_timeout_ms", Duration::from_secs(10)),
            keepalive: self.get_millis("chat", "keepalive_ms", DEFAULT_KEEPALIVE),
        }
    }

    /// Backoff policy for reconnects
    ///
    /// A multiplier below 1 would shrink delays, so it is raised to 1.
    pub fn retry_policy(&self) -> RetryPolicy {
        let defaults = RetryPolicy::default();
        let max_attempts = self.get_u64("retry", "max_attempts", defaults.max_attempts as u64);
        let multiplier = self.get_u64(
            "retry",
            "backoff_multiplier",
            defaults.backoff_multiplier as u64,
        );
        RetryPolicy {
            initial_delay: self.get_millis("retry", "initial_delay_ms", defaults.initial_delay),
            max_delay: self.get_millis("retry", "max_delay_ms", defaults.max_delay),
            max_attempts: u32::try_from(max_attempts).unwrap_or(defaults.max_attempts),
            backoff_multiplier: u32::try_from(multiplier)
                .unwrap_or(defaults.backoff_multiplier)
                .max(1),
        }
    }

    // Speech settings

    pub fn tts_enabled(&self) -> bool {
        self.get_bool("speech", "enabled", true)
    }

    pub fn set_tts_enabled(&mut self, enabled: bool) {
        self.set("speech", "enabled", if enabled { "true" } else { "false" });
    }

    pub fn rate(&self) -> Rate {
        Rate::new(self.get_float("speech", "rate", Rate::NORMAL.value()))
    }

    pub fn set_rate(&mut self, rate: Rate) {
        self.set("speech", "rate", &rate.to_string());
    }

    /// Preferred voice id, `None` to pick a default
    pub fn voice(&self) -> Option<String> {
        let voice = self.get_string("speech", "voice", "");
        let voice = voice.trim();
        if voice.is_empty() {
            None
        } else {
            Some(voice.to_string())
        }
    }

    pub fn set_voice(&mut self, voice: Option<&str>) {
        self.set("speech", "voice", voice.unwrap_or(""));
    }

    pub fn backend(&self) -> BackendKind {
        let raw = self.get_string("speech", "backend", "auto");
        BackendKind::parse(&raw).unwrap_or_else(|| {
            warn!("Unknown speech backend {:?}, using auto", raw);
            BackendKind::Auto
        })
    }

    /// Pause between utterances
    pub fn settle_delay(&self) -> Duration {
        self.get_millis("speech", "settle_delay_ms", DEFAULT_SETTLE_DELAY)
    }

    // Filter settings

    /// Redacted words, stored comma separated
    pub fn filters(&self) -> FilterSet {
        let raw = self.get_string("filters", "words", "");
        FilterSet::from_words(raw.split(',').map(str::trim).filter(|w| !w.is_empty()))
    }

    pub fn set_filters(&mut self, filters: &FilterSet) {
        self.set("filters", "words", &filters.words().join(","));
    }

    /// How many messages the display log keeps
    pub fn history(&self) -> usize {
        usize::try_from(self.get_u64("display", "history", DEFAULT_HISTORY as u64))
            .unwrap_or(DEFAULT_HISTORY)
    }
}
