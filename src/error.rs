use thiserror::Error;

#[derive(Debug, Error)]
pub enum CitationError {
    /// Upstream unreachable: timeout, DNS, connection reset, truncated body.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("upstream returned HTTP {status}")]
    FetchFailed { status: u16 },

    #[error("unable to parse total citations from upstream document")]
    UnparsableResponse,

    #[error("dataset error: {0}")]
    Persistence(#[from] rusqlite::Error),
}

impl CitationError {
    /// True for failures caused by the upstream source rather than by us.
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            CitationError::Network(_)
                | CitationError::FetchFailed { .. }
                | CitationError::UnparsableResponse
        )
    }

    /// HTTP-equivalent status class reported to callers of the inbound endpoint.
    pub fn status_class(&self) -> u16 {
        if self.is_upstream() {
            502
        } else {
            500
        }
    }
}

pub type Result<T> = std::result::Result<T, CitationError>;
