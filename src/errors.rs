//! Error types for seismodash.
//!
//! Uses `thiserror` for library-style error definitions.

use thiserror::Error;

/// Errors that can occur in seismodash operations.
#[derive(Error, Debug)]
pub enum SeismodashError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing failed
    #[error("Failed to parse JSON: {0}")]
    Parse(#[from] serde_json::Error),

    /// Feed returned an error status
    #[error("USGS API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    /// Invalid response structure
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Filter configuration rejected by validation
    #[error("Invalid filter configuration: {0}")]
    InvalidConfig(String),

    /// Secondary detail lookup failed; never affects the main snapshot
    #[error("Details unavailable for event {id}: {reason}")]
    DetailUnavailable { id: String, reason: String },
}

impl SeismodashError {
    /// Wrap any fetch error as a detail failure for the given event.
    #[must_use]
    pub fn into_detail_failure(self, id: &str) -> Self {
        match self {
            Self::DetailUnavailable { .. } => self,
            other => Self::DetailUnavailable {
                id: id.to_string(),
                reason: other.to_string(),
            },
        }
    }
}
