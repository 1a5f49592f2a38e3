//! Failures returned before any byte of the stream is produced.

use serde_json::{json, Value};

/// A synchronous, pre-stream refusal.
///
/// Every variant except `DebitFailed` and `Internal` is raised before the
/// ledger is touched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error("origin not allowed: {}", origin.as_deref().unwrap_or("<none>"))]
    InvalidOrigin { origin: Option<String> },

    #[error("authentication required")]
    Unauthenticated,

    #[error("invalid request: {}", errors.join("; "))]
    InvalidRequest { errors: Vec<String> },

    #[error("rate limited, retry in {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("insufficient credits: {required} required, {balance} available")]
    InsufficientCredits { required: u64, balance: u64 },

    #[error("credit debit failed: {reason}")]
    DebitFailed {
        required: u64,
        balance: u64,
        reason: String,
    },

    #[error("internal error: {message}")]
    Internal { message: String },
}

impl Rejection {
    /// HTTP status class.
    pub fn status(&self) -> u16 {
        match self {
            Rejection::InvalidOrigin { .. } => 403,
            Rejection::Unauthenticated => 401,
            Rejection::InvalidRequest { .. } => 400,
            Rejection::RateLimited { .. } => 429,
            Rejection::InsufficientCredits { .. } | Rejection::DebitFailed { .. } => 402,
            Rejection::Internal { .. } => 500,
        }
    }

    /// JSON response body.
    pub fn body(&self) -> Value {
        let error = self.to_string();
        match self {
            Rejection::InvalidRequest { errors } => json!({"error": error, "details": errors}),
            Rejection::RateLimited { retry_after_secs } => {
                json!({"error": error, "retryAfter": retry_after_secs})
            }
            Rejection::InsufficientCredits { required, balance }
            | Rejection::DebitFailed {
                required, balance, ..
            } => json!({"error": error, "required": required, "balance": balance}),
            _ => json!({"error": error}),
        }
    }
}
