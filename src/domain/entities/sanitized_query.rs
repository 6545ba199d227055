use once_cell::sync::Lazy;
use regex::Regex;

use crate::helper::error_chain_fmt;

/// Server-side bound on a query, counted in characters after trimming
pub const MAX_QUERY_LENGTH: usize = 1000;

static CODE_BLOCK_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"```[\s\S]*?```").expect("Invalid code block pattern"));

/// Phrases attempting to override the system instructions.
/// Matched case-insensitively, each match is replaced as a whole.
static INJECTION_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)ignore (previous|above|all) instructions",
        r"(?i)forget (previous|above|all) instructions",
        r"(?i)system:\s*prompt",
        r"(?i)you (are|should) (now|instead)",
    ]
    .into_iter()
    .map(|pattern| Regex::new(pattern).expect("Invalid injection pattern"))
    .collect()
});

const CODE_BLOCK_REPLACEMENT: &str = "[code block removed]";
const INJECTION_REPLACEMENT: &str = "[filtered content]";

/// A user query cleaned for use in a model prompt.
///
/// This is the only form of user input passed downstream: control characters
/// are stripped, fenced code blocks and known instruction-override phrases
/// are replaced with inert markers. The inner string is never empty and
/// never exceeds [`MAX_QUERY_LENGTH`] characters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizedQuery(String);

impl SanitizedQuery {
    /// Validates and cleans a raw query string.
    ///
    /// Length is checked on the trimmed input before any rewriting, so an
    /// oversized query is rejected without paying for the regex passes.
    pub fn parse(raw: &str) -> Result<SanitizedQuery, SanitizedQueryError> {
        let trimmed = raw.trim();

        if trimmed.is_empty() {
            return Err(SanitizedQueryError::Empty);
        }
        if trimmed.chars().count() > MAX_QUERY_LENGTH {
            return Err(SanitizedQueryError::TooLong(MAX_QUERY_LENGTH));
        }

        let cleaned = strip_control_characters(trimmed);
        let cleaned = CODE_BLOCK_PATTERN.replace_all(&cleaned, CODE_BLOCK_REPLACEMENT);
        let cleaned = INJECTION_PATTERNS
            .iter()
            .fold(cleaned.into_owned(), |text, pattern| {
                pattern.replace_all(&text, INJECTION_REPLACEMENT).into_owned()
            });

        // Cleaning can leave nothing behind (e.g. an input made of control
        // characters only); the invariant is a non-empty query.
        let cleaned = cleaned.trim();
        if cleaned.is_empty() {
            return Err(SanitizedQueryError::Empty);
        }

        Ok(SanitizedQuery(cleaned.to_string()))
    }
}

impl AsRef<str> for SanitizedQuery {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SanitizedQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(thiserror::Error)]
pub enum SanitizedQueryError {
    #[error("Query cannot be empty")]
    Empty,
    #[error("Query exceeds maximum length of {0} characters")]
    TooLong(usize),
}

impl std::fmt::Debug for SanitizedQueryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

/// Removes C0 and C1 control characters, including DEL
pub(crate) fn strip_control_characters(text: &str) -> String {
    text.chars()
        .filter(|c| !matches!(u32::from(*c), 0x00..=0x1F | 0x7F..=0x9F))
        .collect()
}
