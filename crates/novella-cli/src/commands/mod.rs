//! Command implementations.

pub mod cost;
pub mod generate;
pub mod library;
pub mod providers;
pub mod records;

use novella_core::Rejection;

/// Typed error used to propagate deterministic process exit codes.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct ExitError {
    pub code: i32,
    pub message: String,
}

/// Exit code for a generation that was accepted but ended with an `error` event.
pub const EXIT_GENERATION_FAILED: i32 = 9;

/// One exit code per rejection class.
pub fn exit_code(rejection: &Rejection) -> i32 {
    match rejection.status() {
        400 => 2,
        401 => 3,
        402 => 4,
        403 => 5,
        429 => 6,
        _ => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_are_distinct() {
        let rejections = [
            Rejection::InvalidRequest { errors: vec![] },
            Rejection::Unauthenticated,
            Rejection::InsufficientCredits {
                required: 1,
                balance: 0,
            },
            Rejection::InvalidOrigin { origin: None },
            Rejection::RateLimited {
                retry_after_secs: 1,
            },
            Rejection::Internal {
                message: "x".into(),
            },
        ];
        let mut codes: Vec<i32> = rejections.iter().map(exit_code).collect();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), rejections.len());
        assert!(!codes.contains(&EXIT_GENERATION_FAILED));
    }

    #[test]
    fn test_debit_failure_shares_the_credit_code() {
        let failed = Rejection::DebitFailed {
            required: 5,
            balance: 4,
            reason: "contention".into(),
        };
        assert_eq!(exit_code(&failed), 4);
    }
}
