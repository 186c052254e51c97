//! Fetch error types.

use thiserror::Error;

/// Error type for acquisition operations.
#[derive(Debug, Error)]
pub enum FetchError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The remote rejected the ambient session credentials (401/403).
    #[error("Authentication required: {0}")]
    AuthRequired(String),

    /// Recognized success response with an unexpected shape.
    ///
    /// Fails closed: unknown shapes never silently default to zero.
    #[error("Parse failure: {0}")]
    Parse(String),

    /// Non-auth HTTP failure or malformed body.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// JSON deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Core error.
    #[error("Core error: {0}")]
    Core(#[from] ringbar_core::CoreError),

    /// No scrape collaborator is wired up.
    #[error("Scrape delegate not available")]
    ScrapeUnavailable,
}
