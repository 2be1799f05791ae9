//! Wire types for the subset of the Immich API the jobs use.
//!
//! Only the fields a job reads are modelled; everything else in the
//! server's `AssetResponseDto` is ignored on deserialization.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An asset as returned by `POST /search/metadata`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Asset {
    /// Server-assigned identifier (a UUID on well-formed servers).
    pub id: String,
    /// Creation time in the catalog; the ordering key for pagination.
    pub created_at: DateTime<Utc>,
    /// Capture time as the server stores it, kept raw so a single bad
    /// value only fails the asset that carries it.
    pub local_date_time: String,
    #[serde(default)]
    pub exif_info: Option<ExifInfo>,
}

impl Asset {
    /// The EXIF timezone annotation, if the asset has one.
    pub(crate) fn time_zone(&self) -> Option<&str> {
        self.exif_info.as_ref()?.time_zone.as_deref()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ExifInfo {
    #[serde(default)]
    pub time_zone: Option<String>,
}

/// Sort direction for `createdAt`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
#[allow(dead_code)] // Desc is part of the API surface; jobs always scan ascending
pub(crate) enum AssetOrder {
    Asc,
    Desc,
}

/// Narrowing filters shared by every page of one search.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct AssetFilter {
    /// Exclusive lower bound on `createdAt`; `None` means full history.
    pub created_after: Option<DateTime<Utc>>,
    pub library_id: Option<String>,
    pub device_id: Option<String>,
}

/// Request body for `POST /search/metadata`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SearchRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_after: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub library_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<&'a str>,
    pub order: AssetOrder,
    pub page: u32,
    pub size: u32,
    pub with_exif: bool,
}

impl<'a> SearchRequest<'a> {
    pub(crate) fn ascending(filter: &'a AssetFilter, page: u32, size: u32) -> Self {
        Self {
            created_after: filter.created_after,
            library_id: filter.library_id.as_deref(),
            device_id: filter.device_id.as_deref(),
            order: AssetOrder::Asc,
            page,
            size,
            with_exif: true,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct SearchResponse {
    pub assets: AssetPage,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AssetPage {
    #[serde(default)]
    pub items: Vec<Asset>,
}

/// Partial update body for `PUT /assets/{id}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UpdateAssetRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_time_original: Option<String>,
}
