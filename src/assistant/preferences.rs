//! User preferences file
//!
//! `user_preferences.json` keeps what the user set up by voice, chiefly the
//! daily reminders, so they come back after a restart. Keys this crate does
//! not know about are carried through unchanged.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::reminders::Reminder;
use crate::learning::data::timestamp;
use crate::learning::store::{move_aside, write_atomic};

/// A reminder as written to disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedReminder {
    /// 24-hour "HH:MM"
    pub time: String,
    #[serde(deserialize_with = "timestamp::deserialize")]
    pub created_at: DateTime<Utc>,
}

impl From<&Reminder> for SavedReminder {
    fn from(reminder: &Reminder) -> Self {
        Self {
            time: reminder.at.format("%H:%M").to_string(),
            created_at: reminder.created_at.with_timezone(&Utc),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserPreferences {
    #[serde(default)]
    pub reminders: Vec<SavedReminder>,
    #[serde(default = "Utc::now", deserialize_with = "timestamp::deserialize")]
    pub last_updated: DateTime<Utc>,
    /// Everything else found in the file
    #[serde(flatten)]
    pub other: serde_json::Map<String, serde_json::Value>,
}

impl Default for UserPreferences {
    fn default() -> Self {
        Self {
            reminders: Vec::new(),
            last_updated: Utc::now(),
            other: serde_json::Map::new(),
        }
    }
}

/// Preferences bound to their file
#[derive(Debug)]
pub struct PreferencesStore {
    path: PathBuf,
    preferences: UserPreferences,
}

impl PreferencesStore {
    /// Load the file; missing or unreadable files give empty preferences.
    /// An unreadable file is moved to `.bak` first.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let preferences = if path.exists() {
            match std::fs::read_to_string(&path)
                .map_err(anyhow::Error::from)
                .and_then(|contents| Ok(serde_json::from_str::<UserPreferences>(&contents)?))
            {
                Ok(preferences) => preferences,
                Err(e) => {
                    warn!("Could not load user preferences from {}: {}", path.display(), e);
                    match move_aside(&path) {
                        Ok(backup) => warn!("Unreadable preferences kept at {}", backup.display()),
                        Err(e) => warn!("Could not move unreadable preferences aside: {}", e),
                    }
                    UserPreferences::default()
                }
            }
        } else {
            UserPreferences::default()
        };

        Self { path, preferences }
    }

    /// Write the file. Errors are logged, not returned.
    pub fn save(&self) -> bool {
        let result = serde_json::to_string_pretty(&self.preferences)
            .map_err(anyhow::Error::from)
            .and_then(|json| Ok(write_atomic(&self.path, json.as_bytes())?));
        match result {
            Ok(()) => {
                info!("User preferences saved to {}", self.path.display());
                true
            }
            Err(e) => {
                warn!("Failed to save user preferences: {}", e);
                false
            }
        }
    }

    /// Remember a reminder and persist right away
    pub fn add_reminder(&mut self, reminder: SavedReminder) -> bool {
        self.preferences.reminders.push(reminder);
        self.preferences.last_updated = Local::now().with_timezone(&Utc);
        self.save()
    }

    pub fn preferences(&self) -> &UserPreferences {
        &self.preferences
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
