//! Sufficiency check and atomic debit.

use crate::error::LedgerError;
use crate::store::BalanceStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Default number of compare-and-set attempts before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 16;

/// Result of the advisory read-only check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sufficiency {
    pub sufficient: bool,
    pub balance: u64,
}

/// Why a debit did not happen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebitFailure {
    /// Balance no longer covers the amount.
    InsufficientCredits,
    /// Every attempt lost a race with a concurrent writer.
    Contention,
}

impl std::fmt::Display for DebitFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DebitFailure::InsufficientCredits => f.write_str("insufficient credits"),
            DebitFailure::Contention => f.write_str("balance changed concurrently, retry later"),
        }
    }
}

/// One debit attempt. Either the full `required_amount` moved or nothing did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditLedgerEntry {
    pub user_id: String,
    pub required_amount: u64,
    pub balance_before: u64,
    pub balance_after: u64,
    pub succeeded: bool,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<DebitFailure>,
}

/// The credit gate in front of generation.
#[derive(Clone)]
pub struct CreditLedger {
    store: Arc<dyn BalanceStore>,
    max_attempts: u32,
}

impl CreditLedger {
    pub fn new(store: Arc<dyn BalanceStore>) -> Self {
        Self {
            store,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Advisory check. Does not reserve anything.
    pub async fn check_sufficient(
        &self,
        user_id: &str,
        amount: u64,
    ) -> Result<Sufficiency, LedgerError> {
        let balance = self.store.balance(user_id).await?;
        Ok(Sufficiency {
            sufficient: balance >= amount,
            balance,
        })
    }

    /// Debit `amount` from `user_id`.
    ///
    /// Each attempt re-reads the balance and swaps it only if nobody wrote in
    /// between, so concurrent debits can never overdraw. A failed debit comes
    /// back as `Ok` with `succeeded == false`; `Err` means the store itself
    /// failed.
    pub async fn consume(
        &self,
        user_id: &str,
        amount: u64,
        description: &str,
    ) -> Result<CreditLedgerEntry, LedgerError> {
        let entry = |before: u64, after: u64, failure: Option<DebitFailure>| CreditLedgerEntry {
            user_id: user_id.to_string(),
            required_amount: amount,
            balance_before: before,
            balance_after: after,
            succeeded: failure.is_none(),
            description: description.to_string(),
            failure,
        };

        let mut last_seen = 0;
        for attempt in 1..=self.max_attempts {
            let current = self.store.balance(user_id).await?;
            last_seen = current;

            if current < amount {
                tracing::info!(
                    user_id = %user_id,
                    required = amount,
                    balance = current,
                    "debit refused: insufficient credits"
                );
                return Ok(entry(current, current, Some(DebitFailure::InsufficientCredits)));
            }

            let next = current - amount;
            if amount == 0 || self.store.compare_and_set(user_id, current, next).await? {
                tracing::info!(
                    user_id = %user_id,
                    amount,
                    balance_after = next,
                    description = %description,
                    "credits debited"
                );
                return Ok(entry(current, next, None));
            }

            tracing::debug!(user_id = %user_id, attempt, "debit lost a race, retrying");
        }

        tracing::warn!(
            user_id = %user_id,
            attempts = self.max_attempts,
            "debit abandoned under contention"
        );
        Ok(entry(last_seen, last_seen, Some(DebitFailure::Contention)))
    }
}

impl std::fmt::Debug for CreditLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CreditLedger")
            .field("max_attempts", &self.max_attempts)
            .finish_non_exhaustive()
    }
}
