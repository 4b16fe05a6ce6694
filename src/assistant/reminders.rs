//! Daily wall-clock reminders
//!
//! Reminders are set for an `HH:MM` time later today and then fire once a
//! day from that point on. The assistant loop polls [`ReminderBook::take_due`]
//! between utterances. Saved reminders are brought back with
//! [`ReminderBook::restore`].

use chrono::{DateTime, Local, NaiveDate, NaiveTime};
use thiserror::Error;
use tracing::{info, warn};

use super::preferences::SavedReminder;

/// What a reminder says when it fires
pub const REMINDER_MESSAGE: &str = "Reminder! Time to check your tasks.";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReminderError {
    #[error("expected a time in HH:MM format, got \"{0}\"")]
    InvalidFormat(String),

    #[error("{0} has already passed today")]
    AlreadyPassed(NaiveTime),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reminder {
    pub at: NaiveTime,
    pub message: String,
    pub created_at: DateTime<Local>,
    last_fired: Option<NaiveDate>,
}

impl Reminder {
    pub fn new(at: NaiveTime, created_at: DateTime<Local>) -> Self {
        Self {
            at,
            message: REMINDER_MESSAGE.to_string(),
            created_at,
            last_fired: None,
        }
    }
}

#[derive(Debug, Default)]
pub struct ReminderBook {
    reminders: Vec<Reminder>,
}

/// Parse a spoken or typed 24-hour time: "14:30", "14 30", "14.30"
pub fn parse_time(text: &str) -> Result<NaiveTime, ReminderError> {
    let cleaned = text
        .trim()
        .split(|c: char| c == ':' || c == '.' || c.is_whitespace())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(":");
    NaiveTime::parse_from_str(&cleaned, "%H:%M")
        .map_err(|_| ReminderError::InvalidFormat(text.trim().to_string()))
}

impl ReminderBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a reminder for `text` (HH:MM) later today
    pub fn schedule(&mut self, text: &str, now: DateTime<Local>) -> Result<&Reminder, ReminderError> {
        let at = parse_time(text)?;
        if at < now.time() {
            return Err(ReminderError::AlreadyPassed(at));
        }

        info!("Reminder set for {}", at.format("%H:%M"));
        self.reminders.push(Reminder::new(at, now));
        Ok(&self.reminders[self.reminders.len() - 1])
    }

    /// Re-add saved reminders. One whose time already passed today next
    /// fires tomorrow.
    pub fn restore(&mut self, saved: &[SavedReminder], now: DateTime<Local>) {
        let before = self.reminders.len();
        for entry in saved {
            let at = match parse_time(&entry.time) {
                Ok(at) => at,
                Err(e) => {
                    warn!("Skipping saved reminder: {}", e);
                    continue;
                }
            };
            let mut reminder = Reminder::new(at, entry.created_at.with_timezone(&Local));
            if at <= now.time() {
                reminder.last_fired = Some(now.date_naive());
            }
            self.reminders.push(reminder);
        }
        if !saved.is_empty() {
            info!("Restored {} saved reminders", self.reminders.len() - before);
        }
    }

    /// Messages of every reminder whose time has come and that has not
    /// fired yet today
    pub fn take_due(&mut self, now: DateTime<Local>) -> Vec<String> {
        let today = now.date_naive();
        let mut due = Vec::new();
        for reminder in &mut self.reminders {
            if now.time() >= reminder.at && reminder.last_fired != Some(today) {
                reminder.last_fired = Some(today);
                due.push(reminder.message.clone());
            }
        }
        due
    }

    pub fn reminders(&self) -> &[Reminder] {
        &self.reminders
    }

    pub fn is_empty(&self) -> bool {
        self.reminders.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 15, h, m, 0).unwrap()
    }

    #[test]
    fn test_parse_time() {
        let expected = NaiveTime::from_hms_opt(14, 30, 0).unwrap();
        assert_eq!(parse_time("14:30"), Ok(expected));
        assert_eq!(parse_time(" 14 30 "), Ok(expected));
        assert_eq!(parse_time("14.30"), Ok(expected));
        assert!(matches!(parse_time("half past two"), Err(ReminderError::InvalidFormat(_))));
        assert!(matches!(parse_time("25:00"), Err(ReminderError::InvalidFormat(_))));
    }

    #[test]
    fn test_past_time_rejected() {
        let mut book = ReminderBook::new();
        assert!(matches!(book.schedule("09:00", at(10, 0)), Err(ReminderError::AlreadyPassed(_))));
        assert!(book.is_empty());
    }

    #[test]
    fn test_fires_once_per_day() {
        let mut book = ReminderBook::new();
        book.schedule("14:30", at(10, 0)).unwrap();

        assert!(book.take_due(at(14, 29)).is_empty());
        assert_eq!(book.take_due(at(14, 30)), vec![REMINDER_MESSAGE.to_string()]);
        assert!(book.take_due(at(15, 0)).is_empty());

        let next_day = Local.with_ymd_and_hms(2024, 3, 16, 14, 31, 0).unwrap();
        assert_eq!(book.take_due(next_day).len(), 1);
    }

    #[test]
    fn test_restore_saved() {
        let created = chrono::Utc::now();
        let saved = vec![
            SavedReminder { time: "09:00".to_string(), created_at: created },
            SavedReminder { time: "18:15".to_string(), created_at: created },
            SavedReminder { time: "teatime".to_string(), created_at: created },
        ];

        let mut book = ReminderBook::new();
        book.restore(&saved, at(12, 0));
        assert_eq!(book.reminders().len(), 2);

        // 09:00 already went by today, 18:15 has not
        assert!(book.take_due(at(12, 1)).is_empty());
        assert_eq!(book.take_due(at(18, 15)).len(), 1);

        let tomorrow = Local.with_ymd_and_hms(2024, 3, 16, 9, 0, 0).unwrap();
        assert_eq!(book.take_due(tomorrow).len(), 1);
    }
}
