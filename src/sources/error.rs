use thiserror::Error;

/// Failure of a single lookup against an external metadata service.
///
/// "Not found" is not an error: adapters answer `Ok(None)` for it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SourceError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Rate limited")]
    RateLimited,

    #[error("Unauthorized even after refreshing credentials")]
    Unauthorized,

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Authentication failed: {0}")]
    Auth(String),
}

impl SourceError {
    /// Whether repeating the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            SourceError::Connection(_)
            | SourceError::Timeout
            | SourceError::RateLimited
            | SourceError::Unauthorized
            | SourceError::InvalidResponse(_) => true,
            SourceError::Api { status, .. } => *status >= 500,
            SourceError::Auth(_) => false,
        }
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            SourceError::Timeout
        } else if e.is_decode() {
            SourceError::InvalidResponse(e.to_string())
        } else {
            SourceError::Connection(e.to_string())
        }
    }
}
