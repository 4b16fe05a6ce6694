//! Voice Assistant Library
//!
//! A voice command assistant with:
//! - Keyword command dispatch (time, date, reminders, web search, mail)
//! - An adaptive interaction-learning store that reuses responses which
//!   proved successful for repeated free-form phrases
//! - JSON persistence of everything learned, flushed every few interactions
//! - Gmail send/read over the REST API and daily reminders kept in a
//!   preferences file
//!
//! # Example
//!
//! ```no_run
//! use voice_assistant::learning::{EngineSettings, JsonFileBackend, PersonalizationEngine};
//!
//! let backend = JsonFileBackend::new("learning_data.json");
//! let mut engine = PersonalizationEngine::open(backend, EngineSettings::default());
//! engine.record_interaction("tell me a joke", "Why did the chicken...", true);
//! let reply = engine.get_personalized_response("tell me a joke", &mut rand::rng());
//! println!("{:?}", reply);
//! ```

pub mod config;
pub mod learning;
pub mod assistant;
pub mod cli;

pub use config::Config;

pub use learning::{
    EngineSettings,
    InteractionStore,
    JsonFileBackend,
    LearningData,
    PersonalizationEngine,
    PhraseRecord,
    StorageBackend,
    StoreError,
};

pub use assistant::{
    Assistant,
    Outcome,
    io::{ConsoleInput, ConsoleOutput, SpeechInput, SpeechOutput},
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Get the library info
pub fn info() -> String {
    format!("{} v{} - Voice Command Assistant Library", NAME, VERSION)
}
