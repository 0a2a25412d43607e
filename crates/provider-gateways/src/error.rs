//! Error types for the provider gateways.

use thiserror::Error;

/// Errors that can occur while calling an external provider.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// HTTP request failed (connect, timeout, redirect refused, body read).
    /// The request URL is stripped on conversion.
    #[error("HTTP error: {0}")]
    Http(reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Provider asked us to slow down
    #[error("{provider} rate limit exceeded")]
    RateLimited { provider: &'static str },

    /// Provider returned an error response
    #[error("{provider} API error: {status} - {message}")]
    Api {
        provider: &'static str,
        status: u16,
        message: String,
    },

    /// Response was well-formed HTTP but not the content we asked for
    #[error("Invalid API response: {0}")]
    InvalidResponse(String),

    /// Missing API key
    #[error("Missing API key: {0}")]
    MissingApiKey(&'static str),

    /// Provider is intentionally not configured
    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    /// Local storage failed while serving a gateway call
    #[error("Storage error: {0}")]
    Storage(#[from] rsvp_database::DatabaseError),
}

impl From<reqwest::Error> for GatewayError {
    fn from(e: reqwest::Error) -> Self {
        Self::Http(e.without_url())
    }
}

impl GatewayError {
    /// Whether another attempt could plausibly succeed.
    ///
    /// Configuration problems and malformed provider output are final.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Self::MissingApiKey(_) | Self::NotConfigured(_) | Self::InvalidResponse(_)
        )
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }
}

/// Result type alias using GatewayError.
pub type GatewayResult<T> = Result<T, GatewayError>;
