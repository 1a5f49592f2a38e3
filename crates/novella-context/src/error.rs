//! Error types for the novella-context crate.

/// Failures reported by retrieval collaborators.
///
/// The assembler absorbs these; they only reach callers that use the
/// collaborators directly.
#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    /// Embedding index unreachable or not built
    #[error("Retrieval index unavailable: {0}")]
    IndexUnavailable(String),

    /// Relational store failure
    #[error("Store error: {0}")]
    Store(String),

    /// Novel not found
    #[error("Novel not found: {0}")]
    NotFound(String),
}
