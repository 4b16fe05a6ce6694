//! Persisted learning document
//!
//! Typed model of everything the interaction store keeps: per-phrase
//! statistics, hour-bucketed interaction logs and the store-wide counters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Current on-disk format version
pub const LEARNING_DATA_VERSION: u32 = 1;

/// Hour and weekday an entry was first seen in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeenContext {
    /// Local hour of day (0-23)
    pub hour: u8,
    /// Weekday name, e.g. "Monday"
    pub day: String,
}

/// Statistics for one normalized phrase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhraseRecord {
    /// How many times the phrase was recorded, creation included
    #[serde(rename = "count")]
    pub occurrence_count: u64,
    /// Distinct responses in the order they were first given
    pub responses: Vec<String>,
    /// Exponentially weighted success average (0.0-1.0)
    pub success_rate: f64,
    #[serde(deserialize_with = "timestamp::deserialize")]
    pub last_used: DateTime<Utc>,
    #[serde(rename = "context")]
    pub first_seen_context: SeenContext,
}

impl PhraseRecord {
    pub fn new(response: &str, success: bool, now: DateTime<Utc>, context: SeenContext) -> Self {
        Self {
            occurrence_count: 1,
            responses: vec![response.to_string()],
            success_rate: outcome_value(success),
            last_used: now,
            first_seen_context: context,
        }
    }

    /// Fold one more observation into the record
    pub fn observe(&mut self, response: &str, success: bool, now: DateTime<Utc>) {
        self.occurrence_count += 1;
        if !self.responses.iter().any(|r| r == response) {
            self.responses.push(response.to_string());
        }
        self.last_used = now;
        self.success_rate = weighted_success(self.success_rate, success);
    }
}

/// One entry of an hour bucket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeBucketEntry {
    #[serde(rename = "command")]
    pub phrase: String,
    #[serde(rename = "day")]
    pub day_of_week: String,
    #[serde(deserialize_with = "timestamp::deserialize")]
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    pub response: String,
}

/// Raw success counts for one phrase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandSuccessRecord {
    pub successful: u64,
    pub total: u64,
    #[serde(default, deserialize_with = "timestamp::deserialize_option")]
    pub last_success: Option<DateTime<Utc>>,
    pub context: SeenContext,
}

impl CommandSuccessRecord {
    pub fn new(context: SeenContext) -> Self {
        Self {
            successful: 0,
            total: 0,
            last_success: None,
            context,
        }
    }

    pub fn observe(&mut self, success: bool, now: DateTime<Utc>) {
        self.total += 1;
        if success {
            self.successful += 1;
            self.last_success = Some(now);
        }
    }

    pub fn ratio(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.successful as f64 / self.total as f64
        }
    }
}

/// Process-wide learning counters, never decremented
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LearningProgress {
    #[serde(default)]
    pub phrases_learned: u64,
    #[serde(default)]
    pub patterns_recognized: u64,
    #[serde(default)]
    pub successful_commands: u64,
}

/// The whole persisted learning document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningData {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub common_phrases: BTreeMap<String, PhraseRecord>,
    /// Owned by the surrounding assistant, carried through untouched
    #[serde(default)]
    pub user_preferences: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub interaction_patterns: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub response_patterns: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub time_based_patterns: BTreeMap<u8, Vec<TimeBucketEntry>>,
    #[serde(default)]
    pub command_success_rate: BTreeMap<String, CommandSuccessRecord>,
    #[serde(default = "Utc::now", deserialize_with = "timestamp::deserialize")]
    pub last_updated: DateTime<Utc>,
    #[serde(default)]
    pub total_interactions: u64,
    #[serde(default)]
    pub learning_progress: LearningProgress,
}

fn default_version() -> u32 {
    LEARNING_DATA_VERSION
}

impl Default for LearningData {
    fn default() -> Self {
        Self {
            version: LEARNING_DATA_VERSION,
            common_phrases: BTreeMap::new(),
            user_preferences: serde_json::Map::new(),
            interaction_patterns: serde_json::Map::new(),
            response_patterns: serde_json::Map::new(),
            time_based_patterns: BTreeMap::new(),
            command_success_rate: BTreeMap::new(),
            last_updated: Utc::now(),
            total_interactions: 0,
            learning_progress: LearningProgress::default(),
        }
    }
}

/// Timestamps are written as RFC 3339. Documents written without an offset
/// (naive ISO 8601, e.g. `2024-03-15T20:30:00.123456`) are read as local time.
pub(crate) mod timestamp {
    use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
    use serde::{de, Deserialize, Deserializer};

    pub fn parse(text: &str) -> Option<DateTime<Utc>> {
        if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
            return Some(parsed.with_timezone(&Utc));
        }
        let naive = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f").ok()?;
        Some(
            Local
                .from_local_datetime(&naive)
                .earliest()
                .map(|local| local.with_timezone(&Utc))
                // skipped by a DST jump
                .unwrap_or_else(|| naive.and_utc()),
        )
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let text = String::deserialize(deserializer)?;
        parse(&text).ok_or_else(|| de::Error::custom(format!("invalid timestamp \"{}\"", text)))
    }

    pub fn deserialize_option<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            Some(text) => parse(&text)
                .map(Some)
                .ok_or_else(|| de::Error::custom(format!("invalid timestamp \"{}\"", text))),
            None => Ok(None),
        }
    }
}

/// Weight kept by the previous success rate on every new observation
pub const SUCCESS_DECAY: f64 = 0.7;
/// Weight given to the newest outcome
pub const SUCCESS_WEIGHT: f64 = 0.3;

fn outcome_value(success: bool) -> f64 {
    if success {
        1.0
    } else {
        0.0
    }
}

/// `old * 0.7 + outcome * 0.3`
pub fn weighted_success(old: f64, success: bool) -> f64 {
    old * SUCCESS_DECAY + outcome_value(success) * SUCCESS_WEIGHT
}
