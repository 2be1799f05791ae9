use thiserror::Error;

use crate::checkpoint::CheckpointError;
use crate::immich::ImmichError;

/// Reasons a job run aborts. Every variant leaves the checkpoint at the last
/// fully processed asset, so the next run resumes from there.
#[derive(Error, Debug)]
pub(crate) enum JobError {
    #[error("Unknown target timezone '{0}'")]
    UnknownTimezone(String),

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error(transparent)]
    Remote(#[from] ImmichError),

    #[error("Updating asset {id} failed: {source}")]
    UpdateAsset { id: String, source: ImmichError },

    #[error("Recording checkpoint after asset {id} failed: {source}")]
    AdvanceCheckpoint { id: String, source: CheckpointError },

    /// Not skipped: the asset is retried by every future run until the
    /// server data is fixed.
    #[error("Asset id '{id}' is not a valid UUID: {source}")]
    InvalidAssetId { id: String, source: uuid::Error },

    #[error("Asset {id} has an unparseable local time '{value}': {source}")]
    LocalTime {
        id: String,
        value: String,
        source: chrono::ParseError,
    },
}

impl JobError {
    /// Short classification used as a structured log field.
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            JobError::UnknownTimezone(_) => "config",
            JobError::Checkpoint(_) | JobError::AdvanceCheckpoint { .. } => "storage",
            JobError::Remote(_) | JobError::UpdateAsset { .. } => "remote",
            JobError::InvalidAssetId { .. } | JobError::LocalTime { .. } => "data",
        }
    }
}
