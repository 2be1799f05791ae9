use thiserror::Error;

/// Failures talking to the Immich API. None of these are retried in place;
/// the next scheduled run picks up from the last checkpoint.
#[derive(Error, Debug)]
pub(crate) enum ImmichError {
    #[error("Invalid Immich API URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("API key contains characters that are not valid in an HTTP header")]
    InvalidApiKey,
    #[error("{operation} request failed with status {status}: {body}")]
    Status {
        operation: &'static str,
        status: u16,
        body: String,
    },
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

impl ImmichError {
    /// HTTP status of a rejected request, if the server answered at all.
    pub(crate) fn status(&self) -> Option<u16> {
        match self {
            ImmichError::Status { status, .. } => Some(*status),
            ImmichError::Http(e) => e.status().map(|s| s.as_u16()),
            ImmichError::InvalidUrl { .. } | ImmichError::InvalidApiKey => None,
        }
    }
}
