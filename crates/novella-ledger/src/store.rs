//! Balance storage with compare-and-set semantics.

use crate::error::LedgerError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

/// Storage for per-user credit balances.
///
/// `compare_and_set` is the only write the ledger performs; it must succeed
/// only when the stored balance still equals `expected`.
#[async_trait]
pub trait BalanceStore: Send + Sync {
    /// Current balance; unknown users have a balance of zero.
    async fn balance(&self, user_id: &str) -> Result<u64, LedgerError>;

    /// Atomically replace `expected` with `new`. Returns `false` when the
    /// balance changed underneath the caller.
    async fn compare_and_set(
        &self,
        user_id: &str,
        expected: u64,
        new: u64,
    ) -> Result<bool, LedgerError>;
}

// Compile-time check: BalanceStore must be object-safe
const _: () = {
    fn _assert_object_safe(_: &dyn BalanceStore) {}
};

/// In-process balance store backed by one atomic per user.
#[derive(Debug, Default)]
pub struct MemoryBalanceStore {
    balances: RwLock<HashMap<String, Arc<AtomicU64>>>,
}

impl MemoryBalanceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a store from `(user, balance)` pairs.
    pub fn with_balances<I, K>(balances: I) -> Self
    where
        I: IntoIterator<Item = (K, u64)>,
        K: Into<String>,
    {
        let store = Self::new();
        if let Ok(mut map) = store.balances.write() {
            for (user, balance) in balances {
                map.insert(user.into(), Arc::new(AtomicU64::new(balance)));
            }
        }
        store
    }

    /// Overwrite a user's balance.
    pub fn set_balance(&self, user_id: &str, balance: u64) -> Result<(), LedgerError> {
        self.slot(user_id)?.store(balance, Ordering::SeqCst);
        Ok(())
    }

    /// Add credits to a user's balance (top-up).
    pub fn credit(&self, user_id: &str, amount: u64) -> Result<u64, LedgerError> {
        let slot = self.slot(user_id)?;
        loop {
            let current = slot.load(Ordering::SeqCst);
            let next = current.checked_add(amount).ok_or_else(|| {
                LedgerError::InvalidAmount(format!("balance overflow for {user_id}"))
            })?;
            if slot
                .compare_exchange(current, next, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                return Ok(next);
            }
        }
    }

    fn existing(&self, user_id: &str) -> Result<Option<Arc<AtomicU64>>, LedgerError> {
        let map = self
            .balances
            .read()
            .map_err(|_| LedgerError::Store("balance map lock poisoned".to_string()))?;
        Ok(map.get(user_id).cloned())
    }

    fn slot(&self, user_id: &str) -> Result<Arc<AtomicU64>, LedgerError> {
        if let Some(slot) = self.existing(user_id)? {
            return Ok(slot);
        }
        let mut map = self
            .balances
            .write()
            .map_err(|_| LedgerError::Store("balance map lock poisoned".to_string()))?;
        Ok(map
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(AtomicU64::new(0)))
            .clone())
    }
}

#[async_trait]
impl BalanceStore for MemoryBalanceStore {
    async fn balance(&self, user_id: &str) -> Result<u64, LedgerError> {
        Ok(self
            .existing(user_id)?
            .map(|slot| slot.load(Ordering::SeqCst))
            .unwrap_or(0))
    }

    async fn compare_and_set(
        &self,
        user_id: &str,
        expected: u64,
        new: u64,
    ) -> Result<bool, LedgerError> {
        let slot = self.slot(user_id)?;
        Ok(slot
            .compare_exchange(expected, new, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok())
    }
}
