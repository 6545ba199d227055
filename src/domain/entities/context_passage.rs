use super::sanitized_query::strip_control_characters;

/// Bound on a single retrieved passage, counted in characters
pub const MAX_PASSAGE_LENGTH: usize = 2000;

const TRUNCATION_MARKER: &str = "...";

/// A text passage retrieved from the vector index, cleaned for prompt use.
///
/// Retrieved content is treated with the same suspicion as user input: it
/// could carry injected instructions, so control characters are stripped and
/// the length is capped before it reaches the prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextPassage(String);

impl ContextPassage {
    /// Cleans a raw stored passage.
    ///
    /// Returns `None` when nothing usable remains, so callers can silently
    /// drop empty matches.
    pub fn parse(raw: &str) -> Option<ContextPassage> {
        let cleaned = strip_control_characters(raw.trim());
        let cleaned = cleaned.trim();

        if cleaned.is_empty() {
            return None;
        }

        if cleaned.chars().count() > MAX_PASSAGE_LENGTH {
            let mut truncated: String = cleaned.chars().take(MAX_PASSAGE_LENGTH).collect();
            truncated.push_str(TRUNCATION_MARKER);
            return Some(ContextPassage(truncated));
        }

        Some(ContextPassage(cleaned.to_string()))
    }
}

impl AsRef<str> for ContextPassage {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a_plain_passage_is_kept_unchanged() {
        let passage = ContextPassage::parse("Medical supplies are sold at Deakins Research.");
        assert_eq!(
            passage.unwrap().as_ref(),
            "Medical supplies are sold at Deakins Research."
        );
    }

    #[test]
    fn an_empty_passage_is_dropped() {
        assert!(ContextPassage::parse("").is_none());
        assert!(ContextPassage::parse("   \n ").is_none());
    }

    #[test]
    fn a_passage_of_control_characters_only_is_dropped() {
        assert!(ContextPassage::parse("\u{0000}\u{001f}\u{007f}").is_none());
    }

    #[test]
    fn control_characters_are_stripped() {
        let passage = ContextPassage::parse("price:\u{0008} 42 aUEC").unwrap();
        assert_eq!(passage.as_ref(), "price: 42 aUEC");
    }

    #[test]
    fn a_passage_at_the_maximum_length_is_not_truncated() {
        let raw = "x".repeat(MAX_PASSAGE_LENGTH);
        let passage = ContextPassage::parse(&raw).unwrap();
        assert_eq!(passage.as_ref().chars().count(), MAX_PASSAGE_LENGTH);
        assert!(!passage.as_ref().ends_with("..."));
    }

    #[test]
    fn an_oversized_passage_is_truncated_with_a_marker() {
        let raw = "x".repeat(MAX_PASSAGE_LENGTH + 500);
        let passage = ContextPassage::parse(&raw).unwrap();
        assert_eq!(
            passage.as_ref().chars().count(),
            MAX_PASSAGE_LENGTH + "...".chars().count()
        );
        assert!(passage.as_ref().ends_with("..."));
    }

    #[test]
    fn truncation_respects_multibyte_characters() {
        let raw = "é".repeat(MAX_PASSAGE_LENGTH + 1);
        let passage = ContextPassage::parse(&raw).unwrap();
        assert!(passage.as_ref().starts_with('é'));
        assert!(passage.as_ref().ends_with("..."));
    }
}
