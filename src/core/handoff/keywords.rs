//! Transfer keyword detection on caller transcripts.

use regex::{Regex, RegexBuilder};

/// Phrases that make a caller's turn a transfer request.
pub const DEFAULT_TRANSFER_KEYWORDS: &[&str] = &[
    "transfer",
    "human",
    "agent",
    "representative",
    "person",
    "someone",
    "connect",
    "live agent",
];

/// Case-insensitive whole-word matcher over a keyword list.
///
/// Multi-word phrases match across any run of whitespace, so "live  agent"
/// matches "live agent". Partial words do not match: "agenda" is not "agent".
/// A keyword must sit between non-word characters or the ends of the text,
/// so keywords that start or end with punctuation ("c++") still match.
#[derive(Debug, Clone)]
pub struct KeywordMatcher {
    keywords: Vec<String>,
    pattern: Regex,
}

impl KeywordMatcher {
    pub fn new<I, S>(keywords: I) -> Result<Self, regex::Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut keywords: Vec<String> = keywords
            .into_iter()
            .map(|k| k.as_ref().trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        // Longest first so "live agent" wins over "agent"
        keywords.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        keywords.dedup();

        let alternatives: Vec<String> = keywords
            .iter()
            .map(|k| {
                k.split_whitespace()
                    .map(regex::escape)
                    .collect::<Vec<_>>()
                    .join(r"\s+")
            })
            .collect();

        let source = if alternatives.is_empty() {
            // Matches nothing
            r"[^\s\S]".to_string()
        } else {
            format!(r"(?:^|\W)(?P<keyword>{})(?:\W|$)", alternatives.join("|"))
        };

        let pattern = RegexBuilder::new(&source).case_insensitive(true).build()?;
        Ok(Self { keywords, pattern })
    }

    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_TRANSFER_KEYWORDS).expect("default transfer keywords compile")
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    /// Return the configured keyword found in `text`, if any.
    pub fn find(&self, text: &str) -> Option<&str> {
        let captures = self.pattern.captures(text)?;
        let normalized = captures
            .name("keyword")?
            .as_str()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();
        self.keywords
            .iter()
            .find(|k| **k == normalized)
            .map(String::as_str)
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.pattern.is_match(text)
    }
}

impl Default for KeywordMatcher {
    fn default() -> Self {
        Self::with_defaults()
    }
}
