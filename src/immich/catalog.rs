use async_trait::async_trait;
use uuid::Uuid;

use super::error::ImmichError;
use super::types::{Asset, AssetFilter, UpdateAssetRequest};

/// Minimal catalog operations the jobs depend on.
/// The HTTP implementation is [`super::ImmichClient`].
#[async_trait]
pub(crate) trait AssetCatalog: Send + Sync {
    /// Fetch one page (1-based) of assets matching `filter`, oldest first.
    async fn search_page(
        &self,
        filter: &AssetFilter,
        page: u32,
        size: u32,
    ) -> Result<Vec<Asset>, ImmichError>;

    /// Apply a partial update to a single asset.
    async fn update_asset(&self, id: Uuid, update: &UpdateAssetRequest)
        -> Result<(), ImmichError>;
}
