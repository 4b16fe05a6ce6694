//! Adaptive interaction learning
//!
//! Tracks which free-form phrases the user says, what was answered and
//! whether it worked, bucketed by hour and weekday, and uses that history to
//! reuse earlier responses instead of falling back to a clarification.

pub mod data;
pub mod engine;
pub mod error;
pub mod keywords;
pub mod store;

pub use data::{
    CommandSuccessRecord, LearningData, LearningProgress, PhraseRecord, SeenContext,
    TimeBucketEntry,
};
pub use engine::{EngineSettings, PersonalizationEngine};
pub use error::StoreError;
pub use keywords::{is_excluded, normalize, EXCLUDED_KEYWORDS};
pub use store::{InteractionStore, JsonFileBackend, StorageBackend};
