//! Immich catalog access: the asset search/update API and the paginated
//! asset stream the jobs iterate over.

mod catalog;
mod client;
pub(crate) mod error;
mod search;
pub(crate) mod types;

#[cfg(test)]
pub(crate) mod testing;

pub(crate) use catalog::AssetCatalog;
pub(crate) use client::ImmichClient;
pub(crate) use error::ImmichError;
pub(crate) use search::find_assets;
pub(crate) use types::{Asset, AssetFilter, UpdateAssetRequest};
