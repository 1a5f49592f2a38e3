//! Error types for the novella-core crate.

use novella_ledger::LedgerError;
use novella_provider::ProviderError;
use novella_records::RecordError;

/// Core error type for wiring and configuration.
///
/// Request-path failures are expressed as [`Rejection`](crate::Rejection)
/// before streaming and as in-band `error` events after.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Record(#[from] RecordError),

    /// Invalid configuration value
    #[error("Config error: {0}")]
    Config(String),

    /// I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
