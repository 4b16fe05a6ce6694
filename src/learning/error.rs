use std::path::PathBuf;
use thiserror::Error;

/// Failures moving learning data to or from durable storage
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("learning data not found at {0}")]
    NotFound(PathBuf),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed learning data: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("unsupported learning data version {0}")]
    UnsupportedVersion(u32),
}
