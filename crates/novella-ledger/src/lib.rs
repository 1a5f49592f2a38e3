//! novella-ledger: prepaid credit balances, the atomic debit gate and pricing.

mod error;
pub mod gate;
pub mod store;
pub mod tariff;

pub use error::LedgerError;
pub use gate::{CreditLedger, CreditLedgerEntry, DebitFailure, Sufficiency};
pub use store::{BalanceStore, MemoryBalanceStore};
pub use tariff::Tariff;
