//! Title-line detection.
//!
//! A line opens a new subject when it names a known subject or when it looks
//! like an all-caps heading. Any all-caps phrase of four or more characters
//! matches the heading rule, subject or not.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

/// Upper-cased set of canonical subject names. May be empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KnownTitles(HashSet<String>);

impl KnownTitles {
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalize and insert a subject name. Blank names are ignored.
    pub fn insert(&mut self, name: &str) {
        let name = name.trim();
        if !name.is_empty() {
            self.0.insert(name.to_uppercase());
        }
    }

    /// Whether `line`, trimmed and upper-cased, is a known subject name.
    pub fn contains(&self, line: &str) -> bool {
        !self.0.is_empty() && self.0.contains(&line.trim().to_uppercase())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: AsRef<str>> FromIterator<S> for KnownTitles {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut titles = Self::new();
        for name in iter {
            titles.insert(name.as_ref());
        }
        titles
    }
}

/// Decide whether a single line is a subject-title line.
pub fn is_title(line: &str, known_titles: &KnownTitles) -> bool {
    known_titles.contains(line) || looks_like_heading(line.trim())
}

/// Uppercase first letter, then only uppercase letters, whitespace and
/// hyphens, more than three characters in total.
fn looks_like_heading(trimmed: &str) -> bool {
    static HEADING_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^[A-Z][A-Z\s\-]{3,}$").expect("valid regex"));

    HEADING_RE.is_match(trimmed)
}
