//! Personalization Engine
//!
//! Owns the [`InteractionStore`] and implements the two halves of the
//! learning loop: folding a finished interaction into the statistics, and
//! deciding whether an earlier response can be reused for a new utterance.
//!
//! Both entry points have an `_at` variant taking the local time explicitly,
//! and lookups take the random source as a parameter, so behaviour can be
//! pinned down in tests.

use chrono::{DateTime, Local, Timelike, Utc};
use rand::seq::IndexedRandom;
use rand::Rng;
use tracing::{debug, info};

use super::data::{CommandSuccessRecord, PhraseRecord, SeenContext, TimeBucketEntry};
use super::keywords::{is_excluded, normalize};
use super::store::{InteractionStore, StorageBackend};

/// Tunables for recording and reuse
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    /// Recorded interactions between automatic saves
    pub flush_threshold: usize,
    /// A phrase's responses are reused only above this success rate
    pub reuse_threshold: f64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            flush_threshold: 5,
            reuse_threshold: 0.8,
        }
    }
}

impl From<&crate::config::LearningConfig> for EngineSettings {
    fn from(config: &crate::config::LearningConfig) -> Self {
        Self {
            flush_threshold: config.flush_threshold.max(1),
            reuse_threshold: config.reuse_threshold,
        }
    }
}

/// Records interactions and serves cached responses
pub struct PersonalizationEngine<B: StorageBackend> {
    store: InteractionStore<B>,
    settings: EngineSettings,
    /// Interactions recorded since the last automatic save
    pending: usize,
}

fn context_of(now: &DateTime<Local>) -> SeenContext {
    SeenContext {
        hour: now.hour() as u8,
        day: now.format("%A").to_string(),
    }
}

impl<B: StorageBackend> PersonalizationEngine<B> {
    pub fn new(store: InteractionStore<B>, settings: EngineSettings) -> Self {
        Self {
            store,
            settings,
            pending: 0,
        }
    }

    /// Open the backend and build an engine on top of it
    pub fn open(backend: B, settings: EngineSettings) -> Self {
        Self::new(InteractionStore::open(backend), settings)
    }

    /// Record a finished interaction at the current local time.
    /// Returns `false` when the utterance is a command and was skipped.
    pub fn record_interaction(&mut self, utterance: &str, response: &str, success: bool) -> bool {
        self.record_interaction_at(utterance, response, success, Local::now())
    }

    pub fn record_interaction_at(
        &mut self,
        utterance: &str,
        response: &str,
        success: bool,
        now: DateTime<Local>,
    ) -> bool {
        if is_excluded(utterance) {
            return false;
        }

        let key = normalize(utterance);
        let context = context_of(&now);
        let timestamp = now.with_timezone(&Utc);
        let data = self.store.data_mut();

        match data.common_phrases.get_mut(&key) {
            Some(record) => record.observe(response, success, timestamp),
            None => {
                data.common_phrases.insert(
                    key.clone(),
                    PhraseRecord::new(response, success, timestamp, context.clone()),
                );
                data.learning_progress.phrases_learned += 1;
                debug!("Learned new phrase: {}", key);
            }
        }

        data.time_based_patterns
            .entry(context.hour)
            .or_default()
            .push(TimeBucketEntry {
                phrase: key.clone(),
                day_of_week: context.day.clone(),
                timestamp,
                success,
                response: response.to_string(),
            });

        data.command_success_rate
            .entry(key)
            .or_insert_with(|| CommandSuccessRecord::new(context))
            .observe(success, timestamp);

        data.total_interactions += 1;
        if success {
            data.learning_progress.successful_commands += 1;
        }
        data.last_updated = timestamp;

        self.pending += 1;
        if self.pending >= self.settings.flush_threshold {
            debug!("Flush threshold reached after {} interactions", self.pending);
            self.store.save();
            self.pending = 0;
        }

        true
    }

    /// Look for a reusable response at the current local time
    pub fn get_personalized_response<R: Rng + ?Sized>(
        &mut self,
        utterance: &str,
        rng: &mut R,
    ) -> Option<String> {
        self.get_personalized_response_at(utterance, Local::now(), rng)
    }

    pub fn get_personalized_response_at<R: Rng + ?Sized>(
        &mut self,
        utterance: &str,
        now: DateTime<Local>,
        rng: &mut R,
    ) -> Option<String> {
        if is_excluded(utterance) {
            return None;
        }

        let key = normalize(utterance);
        let data = self.store.data();

        // A known phrase is answered from its own record or not at all; the
        // hour/weekday fallback only covers phrases never recorded.
        if let Some(record) = data.common_phrases.get(&key) {
            if record.success_rate <= self.settings.reuse_threshold {
                return None;
            }
            let response = record.responses.choose(rng)?;
            info!("Found personalized response for: {}", key);
            return Some(response.clone());
        }

        let context = context_of(&now);
        let phrase = most_common_success(
            data.time_based_patterns.get(&context.hour).map(Vec::as_slice).unwrap_or(&[]),
            &context.day,
        )?;
        let response = data
            .common_phrases
            .get(phrase)
            .and_then(|record| record.responses.choose(rng))
            .cloned()?;

        info!("Found time-based response for: {} (via \"{}\")", key, phrase);
        self.store.data_mut().learning_progress.patterns_recognized += 1;
        Some(response)
    }

    /// Save now, regardless of the threshold
    pub fn flush(&mut self) -> bool {
        self.pending = 0;
        self.store.save()
    }

    /// Interactions recorded since the last automatic save
    pub fn pending(&self) -> usize {
        self.pending
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn phrase(&self, utterance: &str) -> Option<&PhraseRecord> {
        self.store.data().common_phrases.get(&normalize(utterance))
    }

    pub fn store(&self) -> &InteractionStore<B> {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut InteractionStore<B> {
        &mut self.store
    }
}

/// Most frequent successful phrase seen on `day` within one hour bucket.
/// Ties go to the phrase encountered first.
fn most_common_success<'a>(entries: &'a [TimeBucketEntry], day: &str) -> Option<&'a str> {
    let mut counts: Vec<(&str, usize)> = Vec::new();
    for entry in entries.iter().filter(|e| e.success && e.day_of_week == day) {
        match counts.iter_mut().find(|(phrase, _)| *phrase == entry.phrase) {
            Some((_, n)) => *n += 1,
            None => counts.push((entry.phrase.as_str(), 1)),
        }
    }

    let mut best: Option<(&str, usize)> = None;
    for (phrase, n) in counts {
        if best.map_or(true, |(_, top)| n > top) {
            best = Some((phrase, n));
        }
    }
    best.map(|(phrase, _)| phrase)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::learning::data::LearningData;
    use crate::learning::error::StoreError;
    use chrono::TimeZone;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    /// Backend that keeps the last saved document and counts writes
    #[derive(Clone, Default)]
    struct MemoryBackend {
        saved: Rc<RefCell<Option<LearningData>>>,
        saves: Rc<Cell<usize>>,
        fail: bool,
    }

    impl StorageBackend for MemoryBackend {
        fn load(&self) -> Result<LearningData, StoreError> {
            self.saved
                .borrow()
                .clone()
                .ok_or_else(|| StoreError::NotFound("memory".into()))
        }

        fn save(&self, data: &LearningData) -> Result<(), StoreError> {
            if self.fail {
                return Err(StoreError::Io {
                    path: "memory".into(),
                    source: std::io::Error::other("disk full"),
                });
            }
            self.saves.set(self.saves.get() + 1);
            *self.saved.borrow_mut() = Some(data.clone());
            Ok(())
        }

        fn location(&self) -> String {
            "memory".to_string()
        }
    }

    fn engine() -> (PersonalizationEngine<MemoryBackend>, MemoryBackend) {
        let backend = MemoryBackend::default();
        let engine = PersonalizationEngine::open(backend.clone(), EngineSettings::default());
        (engine, backend)
    }

    fn friday_evening() -> DateTime<Local> {
        // 2024-03-15 was a Friday
        Local.with_ymd_and_hms(2024, 3, 15, 20, 30, 0).unwrap()
    }

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    #[test]
    fn test_new_phrase_created() {
        let (mut engine, _) = engine();
        assert!(engine.record_interaction_at("Tell me a joke", "Why did...", true, friday_evening()));

        let record = engine.phrase("tell me a joke").unwrap();
        assert_eq!(record.occurrence_count, 1);
        assert_eq!(record.success_rate, 1.0);
        assert_eq!(record.first_seen_context.hour, 20);
        assert_eq!(record.first_seen_context.day, "Friday");

        let data = engine.store().data();
        assert_eq!(data.learning_progress.phrases_learned, 1);
        assert_eq!(data.learning_progress.successful_commands, 1);
        assert_eq!(data.total_interactions, 1);
        assert_eq!(data.time_based_patterns[&20].len(), 1);
        assert_eq!(data.command_success_rate["tell me a joke"].total, 1);
    }

    #[test]
    fn test_ewma_recurrence() {
        let (mut engine, _) = engine();
        let now = friday_evening();
        engine.record_interaction_at("play some jazz", "ok", true, now);
        engine.record_interaction_at("play some jazz", "ok", false, now);
        let rate = engine.phrase("play some jazz").unwrap().success_rate;
        assert!((rate - 0.7).abs() < 1e-12);

        engine.record_interaction_at("play some jazz", "ok", true, now);
        let rate = engine.phrase("play some jazz").unwrap().success_rate;
        assert!((rate - (0.7 * 0.7 + 0.3)).abs() < 1e-12);
    }

    #[test]
    fn test_excluded_utterance_untouched() {
        let (mut engine, _) = engine();
        assert!(!engine.record_interaction_at("what time is it", "It is noon", true, friday_evening()));

        let data = engine.store().data();
        assert!(data.common_phrases.is_empty());
        assert!(data.time_based_patterns.is_empty());
        assert!(data.command_success_rate.is_empty());
        assert_eq!(data.total_interactions, 0);
        assert_eq!(engine.pending(), 0);
    }

    #[test]
    fn test_excluded_lookup_never_cached() {
        let (mut engine, _) = engine();
        let now = friday_evening();
        for _ in 0..3 {
            engine.record_interaction_at("tell me a joke", "Why did...", true, now);
        }
        // time fallback would otherwise find the joke
        assert_eq!(engine.get_personalized_response_at("hey there", now, &mut rng()), None);
    }

    #[test]
    fn test_low_success_rate_not_reused() {
        let (mut engine, _) = engine();
        let now = friday_evening();
        engine.record_interaction_at("what's up", "I'm not sure", false, now);
        assert_eq!(engine.phrase("what's up").unwrap().success_rate, 0.0);
        assert_eq!(engine.get_personalized_response_at("what's up", now, &mut rng()), None);
    }

    #[test]
    fn test_exact_match_reuse() {
        let (mut engine, _) = engine();
        let now = friday_evening();
        for _ in 0..3 {
            engine.record_interaction_at("tell me a joke", "Why did...", true, now);
        }
        let record = engine.phrase("tell me a joke").unwrap();
        assert_eq!(record.occurrence_count, 3);
        assert_eq!(record.success_rate, 1.0);
        assert_eq!(record.responses, vec!["Why did...".to_string()]);

        let got = engine.get_personalized_response_at("  TELL me a joke", now, &mut rng());
        assert_eq!(got.as_deref(), Some("Why did..."));
        // exact hits are not counted as recognized patterns
        assert_eq!(engine.store().data().learning_progress.patterns_recognized, 0);
    }

    #[test]
    fn test_time_based_fallback() {
        let (mut engine, _) = engine();
        let now = friday_evening();
        engine.record_interaction_at("play some jazz", "Playing jazz", true, now);
        engine.record_interaction_at("play some jazz", "Playing jazz", false, now);
        // 0.7 is not enough for an exact hit, but the jazz request is the
        // usual successful thing at this hour on Fridays
        let got = engine.get_personalized_response_at("surprise me", now, &mut rng());
        assert_eq!(got.as_deref(), Some("Playing jazz"));
        assert_eq!(engine.store().data().learning_progress.patterns_recognized, 1);
    }

    #[test]
    fn test_known_phrase_skips_time_fallback() {
        let (mut engine, _) = engine();
        let now = friday_evening();
        engine.record_interaction_at("play some jazz", "Playing jazz", true, now);
        for _ in 0..5 {
            engine.record_interaction_at("play some jazz", "Playing jazz", false, now);
        }
        let rate = engine.phrase("play some jazz").unwrap().success_rate;
        assert!(rate < 0.2);

        // same hour and weekday as the successful entry, still refused
        assert_eq!(engine.get_personalized_response_at("play some jazz", now, &mut rng()), None);
        assert_eq!(engine.store().data().learning_progress.patterns_recognized, 0);
    }

    #[test]
    fn test_time_fallback_other_day_ignored() {
        let (mut engine, _) = engine();
        engine.record_interaction_at("play some jazz", "Playing jazz", true, friday_evening());
        let saturday = Local.with_ymd_and_hms(2024, 3, 16, 20, 5, 0).unwrap();
        assert_eq!(engine.get_personalized_response_at("surprise me", saturday, &mut rng()), None);
        let other_hour = Local.with_ymd_and_hms(2024, 3, 15, 9, 0, 0).unwrap();
        assert_eq!(engine.get_personalized_response_at("surprise me", other_hour, &mut rng()), None);
    }

    #[test]
    fn test_most_common_tie_goes_to_first() {
        let entry = |phrase: &str, success: bool| TimeBucketEntry {
            phrase: phrase.to_string(),
            day_of_week: "Friday".to_string(),
            timestamp: Utc::now(),
            success,
            response: String::new(),
        };
        let entries = vec![
            entry("b", true),
            entry("a", true),
            entry("a", true),
            entry("b", true),
            entry("c", false),
            entry("c", false),
            entry("c", false),
        ];
        assert_eq!(most_common_success(&entries, "Friday"), Some("b"));
        assert_eq!(most_common_success(&entries, "Monday"), None);
        assert_eq!(most_common_success(&entries[..3], "Friday"), Some("a"));
    }

    #[test]
    fn test_random_choice_over_responses() {
        let (mut engine, _) = engine();
        let now = friday_evening();
        engine.record_interaction_at("cheer me up", "You got this", true, now);
        engine.record_interaction_at("cheer me up", "Keep going", true, now);
        let responses = engine.phrase("cheer me up").unwrap().responses.clone();

        let mut rng = rng();
        for _ in 0..10 {
            let got = engine.get_personalized_response_at("cheer me up", now, &mut rng).unwrap();
            assert!(responses.contains(&got));
        }
    }

    #[test]
    fn test_flush_threshold() {
        let (mut engine, backend) = engine();
        // opening a fresh store writes it once
        assert_eq!(backend.saves.get(), 1);

        let now = friday_evening();
        for i in 0..4 {
            engine.record_interaction_at(&format!("phrase {}", i), "ok", true, now);
        }
        assert_eq!(backend.saves.get(), 1);
        assert_eq!(engine.pending(), 4);

        engine.record_interaction_at("phrase 4", "ok", true, now);
        assert_eq!(backend.saves.get(), 2);
        assert_eq!(engine.pending(), 0);

        // excluded utterances do not count towards the threshold
        for _ in 0..5 {
            engine.record_interaction_at("check my email", "ok", true, now);
        }
        assert_eq!(backend.saves.get(), 2);
    }

    #[test]
    fn test_failed_save_keeps_learning() {
        let backend = MemoryBackend { fail: true, ..Default::default() };
        let mut engine = PersonalizationEngine::open(
            backend.clone(),
            EngineSettings { flush_threshold: 1, reuse_threshold: 0.8 },
        );
        let now = friday_evening();
        engine.record_interaction_at("tell me a joke", "Why did...", true, now);
        engine.record_interaction_at("tell me a joke", "Why did...", true, now);

        assert_eq!(backend.saves.get(), 0);
        assert_eq!(engine.pending(), 0);
        assert_eq!(engine.phrase("tell me a joke").unwrap().occurrence_count, 2);
        assert!(engine.get_personalized_response_at("tell me a joke", now, &mut rng()).is_some());
    }

    #[test]
    fn test_counters_survive_reopen() {
        let (mut engine, backend) = engine();
        let now = friday_evening();
        engine.record_interaction_at("tell me a joke", "Why did...", true, now);
        engine.record_interaction_at("what's up", "Not much", false, now);
        assert!(engine.flush());

        let mut reopened = PersonalizationEngine::open(backend, EngineSettings::default());
        reopened.record_interaction_at("tell me a joke", "Why did...", true, now);
        let data = reopened.store().data();
        assert_eq!(data.total_interactions, 3);
        assert_eq!(data.learning_progress.phrases_learned, 2);
        assert_eq!(data.learning_progress.successful_commands, 2);
        assert_eq!(data.common_phrases["tell me a joke"].occurrence_count, 2);
    }
}
