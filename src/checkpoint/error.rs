//! Error types for the checkpoint store.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while reading or persisting checkpoints.
#[derive(Error, Debug)]
pub(crate) enum CheckpointError {
    /// The checkpoint file or its directory could not be read or written.
    #[error("Checkpoint I/O failed at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The checkpoint file exists but does not hold a job -> timestamp map.
    #[error("Checkpoint file {path} is malformed: {source}")]
    Malformed {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// Serializing the in-memory mapping failed.
    #[error("Failed to encode checkpoints: {0}")]
    Encode(#[source] serde_json::Error),
}

impl CheckpointError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
