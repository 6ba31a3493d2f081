//! Chat text normalization
//!
//! Turns raw chat text into something worth saying out loud: filtered
//! words are redacted and links are replaced with a short placeholder.

pub mod filter;

pub use filter::FilterSet;

use once_cell::sync::Lazy;
use regex::Regex;

/// Replacement for each redacted word
pub const REDACTION_MARKER: &str = "***";

/// Replacement for each link
pub const LINK_PLACEHOLDER: &str = "[link removed]";

/// `scheme://` followed by a run of non-whitespace
static URL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[A-Za-z][A-Za-z0-9+.\-]*://\S+").expect("URL pattern is valid")
});

/// Normalize raw chat text into speakable text
///
/// Word redaction runs first, then link stripping, then the result is
/// trimmed. Never fails; empty input gives empty output.
pub fn normalize(raw: &str, filters: &FilterSet) -> String {
    let redacted = match filters.pattern() {
        Some(re) => re.replace_all(raw, REDACTION_MARKER),
        None => raw.into(),
    };

    let unlinked = URL_PATTERN.replace_all(&redacted, LINK_PLACEHOLDER);

    unlinked.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whole_word_only() {
        let filters = FilterSet::from_words(["ass"]);
        assert_eq!(normalize("this class is silly", &filters), "this class is silly");
        assert_eq!(normalize("what an ass", &filters), "what an ***");
    }

    #[test]
    fn test_case_insensitive() {
        let filters = FilterSet::from_words(["heck"]);
        assert_eq!(normalize("HECK yes, Heck no", &filters), "*** yes, *** no");
    }

    #[test]
    fn test_link_removed() {
        let filters = FilterSet::new();
        assert_eq!(
            normalize("go to http://x.co now", &filters),
            "go to [link removed] now"
        );
        assert_eq!(
            normalize("see https://example.com/a?b=c#d", &filters),
            "see [link removed]"
        );
        assert_eq!(normalize("ftp://files.example", &filters), "[link removed]");
    }

    #[test]
    fn test_words_before_links() {
        let filters = FilterSet::from_words(["evil"]);
        assert_eq!(
            normalize("evil http://evil.com", &filters),
            "*** [link removed]"
        );
    }

    #[test]
    fn test_trim_and_empty() {
        let filters = FilterSet::from_words(["x"]);
        assert_eq!(normalize("", &filters), "");
        assert_eq!(normalize("   ", &filters), "");
        assert_eq!(normalize("  hi  ", &filters), "hi");
    }

    #[test]
    fn test_regex_metacharacters_are_literal() {
        let filters = FilterSet::from_words(["a.b"]);
        assert_eq!(normalize("a.b axb", &filters), "*** axb");
    }
}
