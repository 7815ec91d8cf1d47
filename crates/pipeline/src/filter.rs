//! Output filtering — duplicate suppression and low-confidence language removal.
//!
//! [`ContentFilter`] is created per run and dropped with it, so fingerprints
//! never leak from one request into another. Phrase stripping is a pure
//! function of the text and the [`PhraseCatalogue`].

use regex_lite::Regex;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::sync::{Arc, LazyLock};
use tracing::{debug, warn};

/// Hedging and placeholder phrases removed from generated text.
pub const HEDGING_PHRASES: &[&str] = &[
    "I assume",
    "I think",
    "probably",
    "maybe",
    "possibly",
    "This is likely",
    "It seems",
    "In my opinion",
    "[PLACEHOLDER]",
    "[TODO]",
    "[FIXME]",
    "undefined",
    "null",
    "None mentioned",
];

/// Chat-role echo lines some models prepend to their answer.
const ROLE_ECHO: &str = r"(?im)^(?:user:|model:|response:|here is)[^\n]*(?:\n|$)";

/// Marker that precedes the model's answer in an echoed chat template.
pub const ASSISTANT_MARKER: &str = "<|assistant|>";

static BUILTIN: LazyLock<Arc<PhraseCatalogue>> =
    LazyLock::new(|| Arc::new(PhraseCatalogue::from_phrases(HEDGING_PHRASES)));

/// A table of patterns stripped from generated text, matched case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct PhraseCatalogue {
    role_echo: Option<Regex>,
    patterns: Vec<Regex>,
}

impl PhraseCatalogue {
    /// The built-in hedging catalogue plus role-echo stripping.
    pub fn builtin() -> Arc<Self> {
        BUILTIN.clone()
    }

    /// Literal phrases, escaped and matched case-insensitively.
    pub fn from_phrases(phrases: &[&str]) -> Self {
        let mut catalogue = Self {
            role_echo: compile(ROLE_ECHO),
            patterns: Vec::new(),
        };
        for phrase in phrases {
            catalogue = catalogue.with_pattern(&format!("(?i){}", regex_lite::escape(phrase)));
        }
        catalogue
    }

    /// Add a raw pattern. A pattern that does not compile is skipped.
    pub fn with_pattern(mut self, pattern: &str) -> Self {
        if let Some(regex) = compile(pattern) {
            self.patterns.push(regex);
        }
        self
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Remove role-echo lines and every catalogued pattern, then trim.
    ///
    /// Patterns are re-applied until nothing matches, so removing one phrase
    /// can never splice together another.
    pub fn strip(&self, text: &str) -> String {
        let mut current = match &self.role_echo {
            Some(echo) => echo.replace_all(text, "").into_owned(),
            None => text.to_string(),
        };

        loop {
            let mut next = current.clone();
            for pattern in &self.patterns {
                if pattern.is_match(&next) {
                    next = pattern.replace_all(&next, "").into_owned();
                }
            }
            if next == current {
                break;
            }
            current = next;
        }

        current.trim().to_string()
    }
}

fn compile(pattern: &str) -> Option<Regex> {
    match Regex::new(pattern) {
        Ok(regex) => Some(regex),
        Err(e) => {
            warn!(pattern, error = %e, "Skipping filter pattern that does not compile");
            None
        }
    }
}

/// Keep only the text after the last echoed assistant marker.
pub fn trim_prompt_echo(text: &str) -> &str {
    match text.rfind(ASSISTANT_MARKER) {
        Some(index) => text[index + ASSISTANT_MARKER.len()..].trim(),
        None => text,
    }
}

/// SHA-256 of the exact text, hex encoded.
pub fn fingerprint(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

/// Run-scoped duplicate detector and phrase stripper.
#[derive(Debug)]
pub struct ContentFilter {
    seen: HashSet<String>,
    catalogue: Arc<PhraseCatalogue>,
}

impl ContentFilter {
    pub fn new() -> Self {
        Self::with_catalogue(PhraseCatalogue::builtin())
    }

    pub fn with_catalogue(catalogue: Arc<PhraseCatalogue>) -> Self {
        Self {
            seen: HashSet::new(),
            catalogue,
        }
    }

    /// `true` if this exact text was already seen in this run; otherwise
    /// remembers it and returns `false`.
    pub fn is_duplicate(&mut self, text: &str) -> bool {
        let duplicate = !self.seen.insert(fingerprint(text));
        if duplicate {
            debug!(chars = text.len(), "Duplicate output suppressed");
        }
        duplicate
    }

    pub fn strip_low_confidence_language(&self, text: &str) -> String {
        self.catalogue.strip(text)
    }

    /// Prompt-echo trimming followed by phrase stripping.
    pub fn clean(&self, raw: &str) -> String {
        self.strip_low_confidence_language(trim_prompt_echo(raw))
    }

    /// Number of distinct fingerprints recorded.
    pub fn fingerprints(&self) -> usize {
        self.seen.len()
    }
}

impl Default for ContentFilter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contains_forbidden(text: &str) -> Option<&'static str> {
        let lower = text.to_lowercase();
        HEDGING_PHRASES
            .iter()
            .copied()
            .find(|p| lower.contains(&p.to_lowercase()))
    }

    #[test]
    fn duplicate_detection_false_then_true() {
        let mut filter = ContentFilter::new();
        assert!(!filter.is_duplicate("The gateway exposes three routes."));
        assert!(filter.is_duplicate("The gateway exposes three routes."));
        assert!(!filter.is_duplicate("The gateway exposes four routes."));
        assert_eq!(filter.fingerprints(), 2);
    }

    #[test]
    fn filters_do_not_share_fingerprints() {
        let mut first = ContentFilter::new();
        let mut second = ContentFilter::new();
        assert!(!first.is_duplicate("same"));
        assert!(!second.is_duplicate("same"));
    }

    #[test]
    fn strips_hedging_case_insensitively() {
        let filter = ContentFilter::new();
        let out = filter.strip_low_confidence_language(
            "  I THINK the service probably caches results. [todo] It Seems fine.  ",
        );
        assert!(contains_forbidden(&out).is_none(), "{out}");
        assert!(out.contains("the service"));
        assert!(!out.starts_with(' '));
    }

    #[test]
    fn stripping_is_pure_and_closed() {
        let filter = ContentFilter::new();
        let inputs = [
            "mayI thinkbe this works",
            "nunullll values",
            "It seems It seems it SEEMS",
            "[PLACE[TODO]HOLDER] left over",
            "plain text with nothing to remove",
            "",
        ];
        for input in inputs {
            let once = filter.strip_low_confidence_language(input);
            let twice = filter.strip_low_confidence_language(input);
            assert_eq!(once, twice);
            assert!(contains_forbidden(&once).is_none(), "{input:?} -> {once:?}");
        }
        assert_eq!(
            filter.strip_low_confidence_language("plain text with nothing to remove"),
            "plain text with nothing to remove"
        );
    }

    #[test]
    fn role_echo_lines_removed() {
        let filter = ContentFilter::new();
        let out = filter.strip_low_confidence_language(
            "Here is the polished section:\n## Overview\nResponse: ok\nThe API is stateless.",
        );
        assert_eq!(out, "## Overview\nThe API is stateless.");
    }

    #[test]
    fn prompt_echo_trimmed_to_last_marker() {
        assert_eq!(trim_prompt_echo("<|user|>\nq\n<|assistant|>\n answer "), "answer");
        assert_eq!(trim_prompt_echo("a <|assistant|> b <|assistant|> c"), "c");
        assert_eq!(trim_prompt_echo("no marker"), "no marker");
    }

    #[test]
    fn invalid_pattern_is_skipped() {
        let catalogue = PhraseCatalogue::from_phrases(&["probably"]).with_pattern("([unclosed");
        assert_eq!(catalogue.len(), 1);
        assert_eq!(catalogue.strip("probably fine"), "fine");
    }

    #[test]
    fn empty_catalogue_returns_trimmed_input() {
        let catalogue = PhraseCatalogue::default();
        assert!(catalogue.is_empty());
        assert_eq!(catalogue.strip("  maybe  "), "maybe");
    }

    #[test]
    fn fingerprint_is_stable_hex() {
        let a = fingerprint("abc");
        assert_eq!(a.len(), 64);
        assert_eq!(a, fingerprint("abc"));
        assert_ne!(a, fingerprint("abd"));
    }
}
