//! Interaction Store - durable home of the learning document
//!
//! Keeps the [`LearningData`] in memory and moves it to and from a
//! [`StorageBackend`]. Loading never fails: a missing document is created
//! and persisted, a corrupt or unreadable one is moved aside (`.bak`) and
//! replaced by an empty store.
//! Saving never fails either; errors are logged and the in-memory state
//! stays authoritative until the next successful write.

use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::data::{LearningData, LEARNING_DATA_VERSION};
use super::error::StoreError;

/// Where the learning document lives
pub trait StorageBackend {
    /// Read the persisted document. `StoreError::NotFound` means nothing
    /// has been written yet.
    fn load(&self) -> Result<LearningData, StoreError>;

    /// Replace the persisted document as a whole
    fn save(&self, data: &LearningData) -> Result<(), StoreError>;

    /// Human readable location, for logs and the CLI
    fn location(&self) -> String;

    /// Move an unreadable document out of the way so the next save cannot
    /// replace it. Returns where it went.
    fn set_aside(&self) -> Result<Option<String>, StoreError> {
        Ok(None)
    }
}

/// JSON file backend with write-to-temp plus rename
#[derive(Debug, Clone)]
pub struct JsonFileBackend {
    path: PathBuf,
}

impl JsonFileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    #[cfg(test)]
    fn temp_path(&self) -> PathBuf {
        temp_path(&self.path)
    }

    fn io_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl StorageBackend for JsonFileBackend {
    fn load(&self) -> Result<LearningData, StoreError> {
        if !self.path.exists() {
            return Err(StoreError::NotFound(self.path.clone()));
        }

        let contents = std::fs::read_to_string(&self.path).map_err(|e| self.io_error(e))?;
        let data: LearningData = serde_json::from_str(&contents)?;
        if data.version > LEARNING_DATA_VERSION {
            return Err(StoreError::UnsupportedVersion(data.version));
        }
        Ok(data)
    }

    fn save(&self, data: &LearningData) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(data)?;
        write_atomic(&self.path, json.as_bytes()).map_err(|e| self.io_error(e))?;

        debug!(path = %self.path.display(), "Learning data written");
        Ok(())
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }

    fn set_aside(&self) -> Result<Option<String>, StoreError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let backup = move_aside(&self.path).map_err(|e| self.io_error(e))?;
        Ok(Some(backup.display().to_string()))
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

/// Replace `path` with `contents` via a synced temp file and a rename, so a
/// crash never leaves a half-written document behind
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let tmp_path = temp_path(path);
    let mut file = std::fs::File::create(&tmp_path)?;
    file.write_all(contents)?;
    if let Err(e) = file.sync_all() {
        warn!("Failed to sync {}: {}", tmp_path.display(), e);
    }
    drop(file);

    std::fs::rename(&tmp_path, path).map_err(|e| {
        let _ = std::fs::remove_file(&tmp_path);
        e
    })
}

/// Rename `path` to the first free `<file>.bak`, `<file>.bak.1`, ...
pub(crate) fn move_aside(path: &Path) -> std::io::Result<PathBuf> {
    let mut name = path.as_os_str().to_owned();
    name.push(".bak");
    let first = PathBuf::from(name);

    let mut backup = first.clone();
    let mut n = 1;
    while backup.exists() {
        let mut name = first.clone().into_os_string();
        name.push(format!(".{}", n));
        backup = PathBuf::from(name);
        n += 1;
    }

    std::fs::rename(path, &backup)?;
    Ok(backup)
}

/// In-memory learning document bound to its backend
pub struct InteractionStore<B: StorageBackend> {
    data: LearningData,
    backend: B,
}

impl<B: StorageBackend> InteractionStore<B> {
    /// Load persisted state, falling back to an empty store
    pub fn open(backend: B) -> Self {
        match backend.load() {
            Ok(data) => {
                info!(
                    "Loaded learning data from {} ({} phrases, {} interactions)",
                    backend.location(),
                    data.common_phrases.len(),
                    data.total_interactions
                );
                Self { data, backend }
            }
            Err(StoreError::NotFound(_)) => {
                info!("Creating new learning data at {}", backend.location());
                let store = Self {
                    data: LearningData::default(),
                    backend,
                };
                store.save();
                store
            }
            Err(e) => {
                warn!("Could not load learning data, starting empty: {}", e);
                match backend.set_aside() {
                    Ok(Some(moved)) => warn!("Unreadable learning data kept at {}", moved),
                    Ok(None) => {}
                    Err(e) => warn!("Could not move unreadable learning data aside: {}", e),
                }
                Self {
                    data: LearningData::default(),
                    backend,
                }
            }
        }
    }

    /// Persist the full document. Returns whether the write succeeded.
    pub fn save(&self) -> bool {
        match self.backend.save(&self.data) {
            Ok(()) => {
                info!("Learning data saved to {}", self.backend.location());
                true
            }
            Err(e) => {
                warn!("Failed to save learning data: {}", e);
                false
            }
        }
    }

    /// Drop everything learned so far and persist the empty document
    pub fn reset(&mut self) -> bool {
        self.data = LearningData::default();
        self.save()
    }

    pub fn data(&self) -> &LearningData {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut LearningData {
        &mut self.data
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }
}
