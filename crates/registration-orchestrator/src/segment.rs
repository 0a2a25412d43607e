//! Attendee segment derivation.

/// Tags that win over input order, highest priority first.
const PRIORITY_TAGS: [&str; 3] = ["demo", "partnership", "learn-more"];

/// Segment used when no interests were given.
pub const DEFAULT_SEGMENT: &str = "general";

/// First priority tag present, else the first tag, else `"general"`.
pub fn derive_segment(interests: &[String]) -> String {
    PRIORITY_TAGS
        .iter()
        .find(|tag| interests.iter().any(|i| i == *tag))
        .map(|tag| tag.to_string())
        .or_else(|| interests.first().cloned())
        .unwrap_or_else(|| DEFAULT_SEGMENT.to_string())
}
