//! Turning a dictated email address into a real one
//!
//! Speech recognition renders "john dot smith at gmail dot com" literally.
//! Each spoken symbol word is mapped to its character, everything else is
//! glued together, and the result must look like an address.

use once_cell::sync::Lazy;
use regex::Regex;

static EMAIL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").expect("valid email pattern")
});

const SPOKEN_SYMBOLS: &[(&str, &str)] = &[
    ("at", "@"),
    ("dot", "."),
    ("period", "."),
    ("point", "."),
    ("underscore", "_"),
    ("dash", "-"),
    ("hyphen", "-"),
    ("minus", "-"),
    ("plus", "+"),
    ("percent", "%"),
];

fn symbol_for(word: &str) -> Option<&'static str> {
    SPOKEN_SYMBOLS
        .iter()
        .find(|(spoken, _)| *spoken == word)
        .map(|(_, symbol)| *symbol)
}

/// Build an address from dictated text; `None` if it does not validate
pub fn format_email_address(spoken: &str) -> Option<String> {
    let address: String = spoken
        .to_lowercase()
        .split_whitespace()
        .map(|word| symbol_for(word).unwrap_or(word).to_string())
        .collect();

    if is_valid_email(&address) {
        Some(address)
    } else {
        None
    }
}

/// Whether text is already a valid address
pub fn is_valid_email(address: &str) -> bool {
    EMAIL_PATTERN.is_match(address)
}
