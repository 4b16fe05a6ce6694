//! Keyword command classifier
//!
//! Maps an utterance to one of the fixed assistant actions. Multi-word
//! triggers match by containment, single-word triggers match whole words so
//! that "this" is not taken for "hi".

/// Action an utterance resolves to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Greeting,
    Time,
    Date,
    Reminder,
    /// Search with the term left after stripping the trigger (may be empty)
    Search(String),
    SendEmail,
    CheckEmail,
    Exit,
    Unknown,
}

const GREETING_WORDS: &[&str] = &["hello", "hi", "hey", "greetings"];
const TIME_PHRASES: &[&str] = &["what time", "current time", "tell me the time"];
const DATE_PHRASES: &[&str] = &["what date", "today's date", "what day"];
const REMINDER_PHRASES: &[&str] = &["set reminder", "create reminder", "remind me"];
const SEARCH_PHRASES: &[&str] = &["search for", "look up", "search"];
const SEND_EMAIL_PHRASES: &[&str] = &["send email", "write email", "compose email"];
const CHECK_EMAIL_PHRASES: &[&str] = &["check email", "read email", "check inbox"];
const EXIT_WORDS: &[&str] = &["exit", "goodbye", "bye"];

fn words(utterance: &str) -> impl Iterator<Item = &str> {
    utterance
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric() && c != '\''))
}

fn has_word(utterance: &str, candidates: &[&str]) -> bool {
    words(utterance).any(|w| candidates.iter().any(|c| *c == w))
}

fn has_phrase(utterance: &str, candidates: &[&str]) -> bool {
    candidates.iter().any(|p| utterance.contains(p))
}

/// Classify an already normalized (lowercased, trimmed) utterance
pub fn classify(utterance: &str) -> Command {
    if has_word(utterance, GREETING_WORDS) {
        Command::Greeting
    } else if has_phrase(utterance, TIME_PHRASES) {
        Command::Time
    } else if has_phrase(utterance, DATE_PHRASES) {
        Command::Date
    } else if has_phrase(utterance, REMINDER_PHRASES) {
        Command::Reminder
    } else if has_phrase(utterance, SEARCH_PHRASES) {
        Command::Search(search_term(utterance))
    } else if has_phrase(utterance, SEND_EMAIL_PHRASES) {
        Command::SendEmail
    } else if has_phrase(utterance, CHECK_EMAIL_PHRASES) {
        Command::CheckEmail
    } else if has_word(utterance, EXIT_WORDS) {
        Command::Exit
    } else {
        Command::Unknown
    }
}

/// Strip every search trigger out of the utterance
pub fn search_term(utterance: &str) -> String {
    let mut term = utterance.to_string();
    for trigger in SEARCH_PHRASES {
        term = term.replace(trigger, "");
    }
    term.split_whitespace().collect::<Vec<_>>().join(" ")
}
