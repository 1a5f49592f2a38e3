//! JSON fixture library: tokens, balances and novels for local runs.

use novella_context::{MemoryNovelStore, NovelData};
use novella_core::StaticTokenAuthenticator;
use novella_ledger::MemoryBalanceStore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// On-disk shape of a fixture library.
///
/// ```json
/// {
///   "tokens": { "tok-1": "writer" },
///   "balances": { "writer": 120 },
///   "novels": { "novel-1": { "summary": "...", "entities": [] } }
/// }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FixtureLibrary {
    /// Bearer token → user id.
    pub tokens: HashMap<String, String>,
    pub balances: HashMap<String, u64>,
    pub novels: HashMap<String, NovelData>,
}

impl FixtureLibrary {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read library {}: {e}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        serde_json::from_str(content).map_err(|e| anyhow::anyhow!("Invalid library: {e}"))
    }

    pub fn authenticator(&self) -> StaticTokenAuthenticator {
        StaticTokenAuthenticator::new(self.tokens.clone())
    }

    pub fn balance_store(&self) -> MemoryBalanceStore {
        MemoryBalanceStore::with_balances(self.balances.clone())
    }

    pub fn novel_store(&self) -> MemoryNovelStore {
        MemoryNovelStore::from_novels(self.novels.clone())
    }
}
