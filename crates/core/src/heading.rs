//! Section headings — the unit of work repeated by every stage.

use serde::{Deserialize, Serialize};

/// Used when a request supplies no usable heading at all.
pub const DEFAULT_HEADINGS: &[&str] = &["Overview", "Technical Implementation"];

/// An ordered, de-duplicated, never-empty list of section titles.
///
/// Deserialized lists go through the same normalization as [`Self::new`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct SectionHeadings(Vec<String>);

impl SectionHeadings {
    /// Trim, drop blanks and de-duplicate (first occurrence wins).
    ///
    /// Falls back to `fallback`, then to [`DEFAULT_HEADINGS`], if nothing is left.
    pub fn with_fallback<I, S>(items: I, fallback: &[&str]) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut headings: Vec<String> = Vec::new();
        for item in items {
            let title = item.as_ref().trim();
            if title.is_empty() || headings.iter().any(|h| h == title) {
                continue;
            }
            headings.push(title.to_string());
        }

        if headings.is_empty() {
            let source = if fallback.is_empty() {
                DEFAULT_HEADINGS
            } else {
                fallback
            };
            headings = source.iter().map(|s| s.to_string()).collect();
        }

        Self(headings)
    }

    pub fn new<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::with_fallback(items, DEFAULT_HEADINGS)
    }

    /// One heading per line of a free-form template string.
    pub fn from_template(template: &str) -> Self {
        Self::new(template.lines())
    }

    /// Keep at most `max` headings (never fewer than one).
    pub fn truncated(mut self, max: usize) -> Self {
        self.0.truncate(max.max(1));
        self
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<String>> for SectionHeadings {
    fn from(items: Vec<String>) -> Self {
        Self::new(items)
    }
}

impl From<SectionHeadings> for Vec<String> {
    fn from(headings: SectionHeadings) -> Self {
        headings.0
    }
}

impl<'a> IntoIterator for &'a SectionHeadings {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
