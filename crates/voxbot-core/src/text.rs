//! Text normalization shared by keyword loading and utterance scoring.

use serde::{Deserialize, Serialize};

/// How a keyword is located inside a normalized utterance.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    /// Keyword (or phrase) must line up with word boundaries.
    #[default]
    WholeWord,
    /// Keyword may appear anywhere, including inside a longer word.
    Substring,
}

/// Lowercase, drop apostrophes, turn every other punctuation mark into a
/// space and collapse runs of whitespace.
///
/// `"What's the STATUS of order #123?"` becomes `"whats the status of order 123"`.
pub fn normalize(text: &str) -> String {
    let mut cleaned = String::with_capacity(text.len());
    for c in text.chars() {
        if c == '\'' || c == '\u{2019}' {
            continue;
        }
        if c.is_alphanumeric() || c.is_whitespace() {
            cleaned.extend(c.to_lowercase());
        } else {
            cleaned.push(' ');
        }
    }
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Check whether an already-normalized `phrase` occurs in an
/// already-normalized `haystack`.
pub fn contains_phrase(haystack: &str, phrase: &str, mode: MatchMode) -> bool {
    if phrase.is_empty() || haystack.is_empty() {
        return false;
    }
    match mode {
        MatchMode::Substring => haystack.contains(phrase),
        MatchMode::WholeWord => {
            let padded_haystack = format!(" {} ", haystack);
            let padded_phrase = format!(" {} ", phrase);
            padded_haystack.contains(&padded_phrase)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_lowercases_and_strips_punctuation() {
        assert_eq!(
            normalize("What's the STATUS of order #123?"),
            "whats the status of order 123"
        );
    }

    #[test]
    fn test_normalize_collapses_whitespace() {
        assert_eq!(normalize("  hi,\tthere!!  "), "hi there");
    }

    #[test]
    fn test_normalize_empty_and_punctuation_only() {
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("?!...,"), "");
    }

    #[test]
    fn test_normalize_typographic_apostrophe() {
        assert_eq!(normalize("I\u{2019}m stuck"), "im stuck");
    }

    #[test]
    fn test_whole_word_rejects_partial_words() {
        assert!(!contains_phrase("this is fine", "hi", MatchMode::WholeWord));
        assert!(contains_phrase("hi there", "hi", MatchMode::WholeWord));
    }

    #[test]
    fn test_whole_word_matches_phrases() {
        assert!(contains_phrase(
            "well good morning to you",
            "good morning",
            MatchMode::WholeWord
        ));
        assert!(!contains_phrase(
            "good mornings",
            "good morning",
            MatchMode::WholeWord
        ));
    }

    #[test]
    fn test_substring_mode_matches_inside_words() {
        assert!(contains_phrase("this is fine", "hi", MatchMode::Substring));
    }

    #[test]
    fn test_empty_phrase_never_matches() {
        assert!(!contains_phrase("anything", "", MatchMode::Substring));
        assert!(!contains_phrase("", "hi", MatchMode::WholeWord));
    }
}
