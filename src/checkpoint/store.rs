//! Checkpoint store trait and JSON file implementation.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::fs;

use super::error::CheckpointError;

/// File holding every job's checkpoint inside the checkpoint directory.
pub(crate) const CHECKPOINT_FILE_NAME: &str = "last_created.json";

/// Persisted layout: job name -> creation timestamp of the last processed
/// asset. `null` means the job has never advanced (or was reset).
pub(crate) type Checkpoints = BTreeMap<String, Option<DateTime<Utc>>>;

/// Trait for checkpoint persistence.
///
/// Object-safe so the job can hold an `Arc<dyn CheckpointStore>`.
#[async_trait]
pub(crate) trait CheckpointStore: Send + Sync {
    /// Return the stored checkpoint for `job`.
    ///
    /// `None` when the store does not exist yet, has no entry for the job,
    /// or the entry is `null`.
    async fn read(&self, job: &str) -> Result<Option<DateTime<Utc>>, CheckpointError>;

    /// Record `at` as the job's checkpoint.
    ///
    /// Read-modify-write of the whole store. A value older than the stored
    /// one is ignored so the checkpoint never moves backward.
    async fn write(&self, job: &str, at: DateTime<Utc>) -> Result<(), CheckpointError>;

    /// Reset the job's checkpoint to `null`. Returns whether a non-null
    /// checkpoint was present.
    async fn clear(&self, job: &str) -> Result<bool, CheckpointError>;

    /// Every stored checkpoint, ordered by job name.
    async fn all(&self) -> Result<Checkpoints, CheckpointError>;
}

/// Checkpoints stored as a pretty-printed JSON object in
/// `<dir>/last_created.json`.
pub(crate) struct JsonCheckpointStore {
    dir: PathBuf,
    path: PathBuf,
}

impl std::fmt::Debug for JsonCheckpointStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonCheckpointStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl JsonCheckpointStore {
    pub(crate) fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let path = dir.join(CHECKPOINT_FILE_NAME);
        Self { dir, path }
    }

    /// Path of the backing file.
    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// Load the full mapping. A missing or blank file is an empty mapping.
    async fn load(&self) -> Result<Checkpoints, CheckpointError> {
        let bytes = match fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Checkpoints::new());
            }
            Err(e) => return Err(CheckpointError::io(&self.path, e)),
        };

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Checkpoints::new());
        }

        serde_json::from_slice(&bytes).map_err(|source| CheckpointError::Malformed {
            path: self.path.clone(),
            source,
        })
    }

    /// Replace the backing file with `checkpoints`.
    ///
    /// Written to a `.part` sibling first and renamed over the target, so a
    /// crash mid-write leaves either the old or the new file, never a
    /// truncated one.
    async fn persist(&self, checkpoints: &Checkpoints) -> Result<(), CheckpointError> {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| CheckpointError::io(&self.dir, e))?;

        let json = serde_json::to_string_pretty(checkpoints).map_err(CheckpointError::Encode)?;
        let part_path = self.path.with_extension("json.part");
        fs::write(&part_path, json)
            .await
            .map_err(|e| CheckpointError::io(&part_path, e))?;
        fs::rename(&part_path, &self.path)
            .await
            .map_err(|e| CheckpointError::io(&self.path, e))?;

        tracing::trace!(path = %self.path.display(), "Saved checkpoints");
        Ok(())
    }
}

#[async_trait]
impl CheckpointStore for JsonCheckpointStore {
    async fn read(&self, job: &str) -> Result<Option<DateTime<Utc>>, CheckpointError> {
        let checkpoints = self.load().await?;
        Ok(checkpoints.get(job).copied().flatten())
    }

    async fn write(&self, job: &str, at: DateTime<Utc>) -> Result<(), CheckpointError> {
        let mut checkpoints = self.load().await?;

        if let Some(Some(previous)) = checkpoints.get(job) {
            if at < *previous {
                tracing::warn!(
                    job,
                    checkpoint = %previous,
                    rejected = %at,
                    "Refusing to move checkpoint backward"
                );
                return Ok(());
            }
        }

        checkpoints.insert(job.to_string(), Some(at));
        self.persist(&checkpoints).await
    }

    async fn clear(&self, job: &str) -> Result<bool, CheckpointError> {
        let mut checkpoints = self.load().await?;
        let previous = checkpoints.insert(job.to_string(), None).flatten();
        self.persist(&checkpoints).await?;
        Ok(previous.is_some())
    }

    async fn all(&self) -> Result<Checkpoints, CheckpointError> {
        self.load().await
    }
}
