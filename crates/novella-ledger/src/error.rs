//! Error types for the novella-ledger crate.

/// Errors raised by balance storage. Insufficient funds are not errors; they
/// are reported on the [`CreditLedgerEntry`](crate::CreditLedgerEntry).
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// Backing store failed or is unreachable
    #[error("Balance store error: {0}")]
    Store(String),

    /// Amount outside what the store can represent
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
}
