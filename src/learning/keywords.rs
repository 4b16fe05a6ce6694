//! Phrase normalization and the command-keyword exclusion list

/// Words that mark an utterance as a deterministic command. Any utterance
/// containing one of these (as a substring) is never learned from and never
/// answered from the cache.
pub const EXCLUDED_KEYWORDS: &[&str] = &[
    "time", "date", "reminder", "search", "email", "send", "check", "read",
    "exit", "goodbye", "bye", "hello", "hi", "hey",
];

/// Lookup key for an utterance: trimmed and lowercased
pub fn normalize(utterance: &str) -> String {
    utterance.trim().to_lowercase()
}

/// Whether the utterance contains any excluded command keyword
pub fn is_excluded(utterance: &str) -> bool {
    let lowered = utterance.to_lowercase();
    EXCLUDED_KEYWORDS.iter().any(|k| lowered.contains(k))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("  Tell Me A Joke \n"), "tell me a joke");
    }

    #[test]
    fn test_excluded_keywords() {
        assert!(is_excluded("What TIME is it"));
        assert!(is_excluded("send an email to bob"));
        assert!(is_excluded("goodbye"));
        assert!(!is_excluded("tell me a joke"));
        assert!(!is_excluded("what's up"));
    }

    #[test]
    fn test_substring_match() {
        // containment, not whole words
        assert!(is_excluded("this is fine"));
        assert!(is_excluded("sometimes"));
    }
}
