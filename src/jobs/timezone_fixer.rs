//! Asset timezone fixer.
//!
//! Some cameras and import paths leave assets annotated with a `UTC`
//! timezone even though the capture happened in local time. This job walks
//! the catalog oldest-first from its checkpoint, rewrites the original
//! capture time of every `UTC`-annotated asset into the target timezone, and
//! advances the checkpoint after each asset (updated or not). A run that
//! fails partway resumes at the first asset it had not finished.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use super::error::JobError;
use crate::checkpoint::CheckpointStore;
use crate::immich::{find_assets, Asset, AssetCatalog, AssetFilter, UpdateAssetRequest};
use crate::scheduler::ScheduledJob;

/// Checkpoint key for this job.
pub(crate) const JOB_NAME: &str = "asset_timezone_fixer";

/// Annotation that marks an asset for rewriting (compared case-insensitively).
pub(crate) const SENTINEL_TIMEZONE: &str = "UTC";

pub(crate) const DEFAULT_TARGET_TIMEZONE: &str = "Asia/Tokyo";

/// Format Immich accepts for `dateTimeOriginal`.
const CAPTURE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%:z";

/// Resolve an IANA timezone name such as `Asia/Tokyo`.
pub(crate) fn resolve_timezone(name: &str) -> Result<Tz, JobError> {
    name.parse::<Tz>()
        .map_err(|_| JobError::UnknownTimezone(name.to_string()))
}

/// Whether the asset carries the sentinel annotation.
///
/// Absent and empty annotations never match.
pub(crate) fn needs_fix(asset: &Asset) -> bool {
    asset
        .time_zone()
        .is_some_and(|tz| tz.eq_ignore_ascii_case(SENTINEL_TIMEZONE))
}

/// Express the stored capture instant in `tz`, formatted for the update API.
pub(crate) fn convert_local_time(value: &str, tz: Tz) -> Result<String, chrono::ParseError> {
    let instant = DateTime::parse_from_rfc3339(value)?;
    Ok(instant.with_timezone(&tz).format(CAPTURE_TIME_FORMAT).to_string())
}

/// Per-deployment knobs for the job.
#[derive(Debug, Clone)]
pub(crate) struct FixerSettings {
    pub target_timezone: String,
    pub library_id: Option<String>,
    pub device_id: Option<String>,
}

impl Default for FixerSettings {
    fn default() -> Self {
        Self {
            target_timezone: DEFAULT_TARGET_TIMEZONE.to_string(),
            library_id: None,
            device_id: None,
        }
    }
}

/// Outcome of one completed (or cleanly interrupted) run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct RunSummary {
    /// Assets whose processing step finished.
    pub inspected: u64,
    pub updated: u64,
    pub skipped: u64,
    /// Checkpoint after the run; unchanged when nothing new was found.
    pub checkpoint: Option<DateTime<Utc>>,
    /// Stopped early because shutdown was requested.
    pub interrupted: bool,
}

pub(crate) struct TimezoneFixer {
    catalog: Arc<dyn AssetCatalog>,
    checkpoints: Arc<dyn CheckpointStore>,
    settings: FixerSettings,
}

impl std::fmt::Debug for TimezoneFixer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimezoneFixer")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl TimezoneFixer {
    pub(crate) fn new(
        catalog: Arc<dyn AssetCatalog>,
        checkpoints: Arc<dyn CheckpointStore>,
        settings: FixerSettings,
    ) -> Self {
        Self {
            catalog,
            checkpoints,
            settings,
        }
    }

    /// Execute one run.
    ///
    /// Assets are handled strictly one at a time; the checkpoint is written
    /// after each asset's processing step, never before. Any error aborts
    /// the run with the checkpoint at the last finished asset. `shutdown` is
    /// checked between assets.
    pub(crate) async fn execute(&self, shutdown: &CancellationToken) -> Result<RunSummary, JobError> {
        let tz = resolve_timezone(&self.settings.target_timezone)?;

        let checkpoint = self.checkpoints.read(JOB_NAME).await?;
        info!(
            job = JOB_NAME,
            checkpoint = ?checkpoint,
            target_timezone = %tz,
            "Starting run"
        );

        let filter = AssetFilter {
            created_after: checkpoint,
            library_id: self.settings.library_id.clone(),
            device_id: self.settings.device_id.clone(),
        };

        let mut summary = RunSummary {
            checkpoint,
            ..RunSummary::default()
        };

        let assets = find_assets(self.catalog.as_ref(), filter);
        tokio::pin!(assets);

        loop {
            if shutdown.is_cancelled() {
                info!(job = JOB_NAME, "Shutdown requested, stopping between assets");
                summary.interrupted = true;
                break;
            }
            let Some(asset) = assets.next().await else {
                break;
            };
            let asset = asset?;

            if self.process(&asset, tz).await? {
                summary.updated += 1;
            } else {
                summary.skipped += 1;
            }

            self.checkpoints
                .write(JOB_NAME, asset.created_at)
                .await
                .map_err(|source| JobError::AdvanceCheckpoint {
                    id: asset.id.clone(),
                    source,
                })?;
            summary.inspected += 1;
            summary.checkpoint = Some(asset.created_at);
        }

        Ok(summary)
    }

    /// Evaluate one asset and update it when it carries the sentinel.
    /// Returns whether an update was sent.
    async fn process(&self, asset: &Asset, tz: Tz) -> Result<bool, JobError> {
        let id = Uuid::parse_str(&asset.id).map_err(|source| JobError::InvalidAssetId {
            id: asset.id.clone(),
            source,
        })?;

        debug!(asset_id = %id, created_at = %asset.created_at, "Processing asset");

        if !needs_fix(asset) {
            debug!(
                asset_id = %id,
                timezone = ?asset.time_zone(),
                "Skipping asset, timezone is not UTC"
            );
            return Ok(false);
        }

        let converted = convert_local_time(&asset.local_date_time, tz).map_err(|source| {
            JobError::LocalTime {
                id: asset.id.clone(),
                value: asset.local_date_time.clone(),
                source,
            }
        })?;

        info!(
            asset_id = %id,
            local_date_time = %asset.local_date_time,
            date_time_original = %converted,
            timezone = %tz,
            "Updating asset timezone"
        );

        let update = UpdateAssetRequest {
            date_time_original: Some(converted),
        };
        self.catalog
            .update_asset(id, &update)
            .await
            .map_err(|source| JobError::UpdateAsset {
                id: asset.id.clone(),
                source,
            })?;
        Ok(true)
    }
}

#[async_trait]
impl ScheduledJob for TimezoneFixer {
    fn name(&self) -> &str {
        JOB_NAME
    }

    async fn run(&self, shutdown: CancellationToken) -> anyhow::Result<()> {
        match self.execute(&shutdown).await {
            Ok(summary) => {
                info!(
                    job = JOB_NAME,
                    inspected = summary.inspected,
                    updated = summary.updated,
                    skipped = summary.skipped,
                    checkpoint = ?summary.checkpoint,
                    interrupted = summary.interrupted,
                    "Run finished"
                );
                Ok(())
            }
            Err(e) => {
                let kind = e.kind();
                Err(anyhow::Error::new(e).context(format!("{JOB_NAME} run aborted ({kind} error)")))
            }
        }
    }
}
