use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::{Client, Response, Url};
use uuid::Uuid;

use super::catalog::AssetCatalog;
use super::error::ImmichError;
use super::types::{Asset, AssetFilter, SearchRequest, SearchResponse, UpdateAssetRequest};

const API_KEY_HEADER: &str = "x-api-key";

/// Error bodies are logged; keep them short.
const MAX_ERROR_BODY: usize = 512;

/// HTTP client for an Immich server.
///
/// The API key is attached to every request as a default header, so callers
/// never handle credentials. `reqwest::Client` is `Arc`-backed; cloning the
/// wrapper shares the connection pool.
#[derive(Clone)]
pub(crate) struct ImmichClient {
    http: Client,
    base_url: Url,
}

impl std::fmt::Debug for ImmichClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImmichClient")
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}

impl ImmichClient {
    /// Build a client for `base_url` (e.g. `http://immich:2283/api`).
    pub(crate) fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self, ImmichError> {
        let mut parsed = Url::parse(base_url).map_err(|e| ImmichError::InvalidUrl {
            url: base_url.to_string(),
            reason: e.to_string(),
        })?;
        if parsed.cannot_be_a_base() {
            return Err(ImmichError::InvalidUrl {
                url: base_url.to_string(),
                reason: "URL cannot be used as a base".to_string(),
            });
        }
        // Url::join replaces the last segment unless the path ends in '/'.
        if !parsed.path().ends_with('/') {
            let path = format!("{}/", parsed.path());
            parsed.set_path(&path);
        }

        let mut key = HeaderValue::from_str(api_key).map_err(|_| ImmichError::InvalidApiKey)?;
        key.set_sensitive(true);

        let mut default_headers = HeaderMap::new();
        default_headers.insert(API_KEY_HEADER, key);
        default_headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let http = Client::builder()
            .default_headers(default_headers)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            http,
            base_url: parsed,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, ImmichError> {
        self.base_url
            .join(path)
            .map_err(|e| ImmichError::InvalidUrl {
                url: format!("{}{}", self.base_url, path),
                reason: e.to_string(),
            })
    }
}

/// Turn a non-2xx response into [`ImmichError::Status`].
async fn ensure_success(operation: &'static str, response: Response) -> Result<Response, ImmichError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let mut body = response.text().await.unwrap_or_default();
    if body.len() > MAX_ERROR_BODY {
        let mut end = MAX_ERROR_BODY;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        body.truncate(end);
    }
    Err(ImmichError::Status {
        operation,
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl AssetCatalog for ImmichClient {
    async fn search_page(
        &self,
        filter: &AssetFilter,
        page: u32,
        size: u32,
    ) -> Result<Vec<Asset>, ImmichError> {
        let url = self.endpoint("search/metadata")?;
        let body = SearchRequest::ascending(filter, page, size);

        tracing::debug!(%url, page, created_after = ?filter.created_after, "POST search");
        let response = self.http.post(url).json(&body).send().await?;
        let response = ensure_success("search assets", response).await?;
        let parsed: SearchResponse = response.json().await?;
        Ok(parsed.assets.items)
    }

    async fn update_asset(
        &self,
        id: Uuid,
        update: &UpdateAssetRequest,
    ) -> Result<(), ImmichError> {
        let url = self.endpoint(&format!("assets/{id}"))?;

        tracing::debug!(%url, "PUT asset");
        let response = self.http.put(url).json(update).send().await?;
        ensure_success("update asset", response).await?;
        Ok(())
    }
}
