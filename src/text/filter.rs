//! Redacted word set

use log::{debug, warn};
use regex::Regex;

/// Set of words that get redacted from chat before it is spoken
///
/// Matching is case-insensitive and whole-word. The compiled pattern is
/// rebuilt on every add/remove so normalizing a message never compiles
/// anything.
#[derive(Debug, Clone, Default)]
pub struct FilterSet {
    /// Words in insertion order, deduplicated case-insensitively
    words: Vec<String>,

    /// Alternation of all words, `None` when the set is empty
    pattern: Option<Regex>,
}

impl FilterSet {
    /// Create an empty filter set
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a filter set from a list of words
    pub fn from_words<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = Self::new();
        for word in words {
            set.insert(word.as_ref());
        }
        set.rebuild();
        set
    }

    /// Add a word. Returns false if it was blank or already present.
    pub fn add(&mut self, word: &str) -> bool {
        let added = self.insert(word);
        if added {
            self.rebuild();
        }
        added
    }

    /// Remove a word (case-insensitive). Returns false if it wasn't there.
    pub fn remove(&mut self, word: &str) -> bool {
        let word = word.trim().to_lowercase();
        let before = self.words.len();
        self.words.retain(|w| w.to_lowercase() != word);
        let removed = self.words.len() != before;
        if removed {
            self.rebuild();
        }
        removed
    }

    pub fn contains(&self, word: &str) -> bool {
        let word = word.trim().to_lowercase();
        self.words.iter().any(|w| w.to_lowercase() == word)
    }

    pub fn words(&self) -> &[String] {
        &self.words
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Compiled redaction pattern, if any words are set
    pub(crate) fn pattern(&self) -> Option<&Regex> {
        self.pattern.as_ref()
    }

    fn insert(&mut self, word: &str) -> bool {
        let word = word.trim();
        if word.is_empty() || self.contains(word) {
            return false;
        }
        self.words.push(word.to_string());
        true
    }

    /// Recompile the alternation after the word list changed
    fn rebuild(&mut self) {
        if self.words.is_empty() {
            self.pattern = None;
            return;
        }

        // Longest first so "foobar" wins over "foo" when both are filtered
        let mut sorted: Vec<&String> = self.words.iter().collect();
        sorted.sort_by_key(|w| std::cmp::Reverse(w.chars().count()));

        let alternation = sorted
            .iter()
            .map(|w| word_pattern(w))
            .collect::<Vec<_>>()
            .join("|");

        match Regex::new(&format!("(?i)(?:{})", alternation)) {
            Ok(re) => {
                debug!("Compiled filter pattern for {} words", self.words.len());
                self.pattern = Some(re);
            }
            Err(e) => {
                // Every word is escaped, so this only trips on size limits
                warn!("Failed to compile filter pattern: {}", e);
                self.pattern = None;
            }
        }
    }
}

/// Pattern for one word with boundaries on its word-character edges
///
/// `\b` only means something next to a word character, so "c++" gets a
/// boundary before the `c` and none after the `+`.
fn word_pattern(word: &str) -> String {
    let is_word_char = |c: char| c.is_alphanumeric() || c == '_';
    let starts_word = word.chars().next().map_or(false, is_word_char);
    let ends_word = word.chars().last().map_or(false, is_word_char);

    format!(
        "{}{}{}",
        if starts_word { r"\b" } else { "" },
        regex::escape(word),
        if ends_word { r"\b" } else { "" },
    )
}
