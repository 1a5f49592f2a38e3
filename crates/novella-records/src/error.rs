//! Error types for the novella-records crate.

/// Errors that can occur while persisting or reading generation records.
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    /// Invalid record file contents
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// Sink refused or lost the record
    #[error("Sink error: {0}")]
    Sink(String),

    /// I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
