//! In-memory catalog used by unit tests across the crate.

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::catalog::AssetCatalog;
use super::error::ImmichError;
use super::types::{Asset, AssetFilter, ExifInfo, UpdateAssetRequest};

/// `n` seconds after a fixed epoch, so tests can name timestamps by index.
pub(crate) fn at(n: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + n, 0).unwrap()
}

pub(crate) fn asset(n: i64, time_zone: Option<&str>) -> Asset {
    Asset {
        id: Uuid::from_u128(n as u128 + 1).to_string(),
        created_at: at(n),
        local_date_time: "2024-06-01T10:00:00.000Z".to_string(),
        exif_info: Some(ExifInfo {
            time_zone: time_zone.map(str::to_string),
        }),
    }
}

/// Pages a sorted asset list the way the server does: `createdAt` strictly
/// greater than the filter bound, ascending, `size` per page.
pub(crate) struct FakeCatalog {
    assets: Vec<Asset>,
    fail_search_on_page: Option<u32>,
    fail_update_for: HashSet<String>,
    cancel_on_update: Option<CancellationToken>,
    searches: Mutex<Vec<(u32, AssetFilter)>>,
    updates: Mutex<Vec<(Uuid, UpdateAssetRequest)>>,
}

impl FakeCatalog {
    pub(crate) fn new(mut assets: Vec<Asset>) -> Self {
        assets.sort_by_key(|a| a.created_at);
        Self {
            assets,
            fail_search_on_page: None,
            fail_update_for: HashSet::new(),
            cancel_on_update: None,
            searches: Mutex::new(Vec::new()),
            updates: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn failing_search_on_page(mut self, page: u32) -> Self {
        self.fail_search_on_page = Some(page);
        self
    }

    pub(crate) fn failing_update_for(mut self, id: &str) -> Self {
        self.fail_update_for.insert(id.to_string());
        self
    }

    /// Cancel `token` while the first update is in flight.
    pub(crate) fn cancelling_on_update(mut self, token: CancellationToken) -> Self {
        self.cancel_on_update = Some(token);
        self
    }

    pub(crate) fn searches(&self) -> Vec<(u32, AssetFilter)> {
        self.searches.lock().unwrap().clone()
    }

    pub(crate) fn pages_requested(&self) -> Vec<u32> {
        self.searches().into_iter().map(|(page, _)| page).collect()
    }

    pub(crate) fn updates(&self) -> Vec<(Uuid, UpdateAssetRequest)> {
        self.updates.lock().unwrap().clone()
    }

    pub(crate) fn updated_ids(&self) -> Vec<String> {
        self.updates()
            .into_iter()
            .map(|(id, _)| id.to_string())
            .collect()
    }
}

#[async_trait]
impl AssetCatalog for FakeCatalog {
    async fn search_page(
        &self,
        filter: &AssetFilter,
        page: u32,
        size: u32,
    ) -> Result<Vec<Asset>, ImmichError> {
        self.searches.lock().unwrap().push((page, filter.clone()));
        if self.fail_search_on_page == Some(page) {
            return Err(ImmichError::Status {
                operation: "search assets",
                status: 500,
                body: "internal error".into(),
            });
        }
        let start = ((page.max(1) - 1) * size) as usize;
        Ok(self
            .assets
            .iter()
            .filter(|a| filter.created_after.is_none_or(|after| a.created_at > after))
            .skip(start)
            .take(size as usize)
            .cloned()
            .collect())
    }

    async fn update_asset(
        &self,
        id: Uuid,
        update: &UpdateAssetRequest,
    ) -> Result<(), ImmichError> {
        self.updates.lock().unwrap().push((id, update.clone()));
        if let Some(token) = &self.cancel_on_update {
            token.cancel();
        }
        if self.fail_update_for.contains(&id.to_string()) {
            return Err(ImmichError::Status {
                operation: "update asset",
                status: 400,
                body: "rejected".into(),
            });
        }
        Ok(())
    }
}
