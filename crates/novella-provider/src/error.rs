//! Error types for the novella-provider crate.

use std::time::Duration;

/// Errors that can occur in generation backend operations.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Backend returned an error response or an in-band error event
    #[error("API error: {0}")]
    Api(String),

    /// Backend rejected the request for quota reasons (HTTP 429)
    #[error("Rate limited by {provider}: {message}")]
    RateLimited { provider: String, message: String },

    /// Backend went quiet mid-response for longer than the stall window
    #[error("Stream from {provider} stalled: no data for {idle:?}")]
    Stalled { provider: String, idle: Duration },

    /// Authentication error (missing key, HTTP 401/403)
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Backend produced a response we could not interpret
    #[error("Malformed response: {0}")]
    Malformed(String),

    /// Unknown provider name
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    /// Provider does not support the requested operation
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
