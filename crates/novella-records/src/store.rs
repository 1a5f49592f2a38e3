//! Record sinks: a JSONL store on disk and an in-memory sink.

use crate::error::RecordError;
use crate::record::GenerationRecord;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::fs;
use tokio::io::AsyncWriteExt;

const RECORDS_FILE: &str = "generations.jsonl";

/// Destination for completed generation records.
///
/// Persistence is best-effort from the caller's point of view: a failed
/// `persist` is logged, never surfaced to the client.
#[async_trait]
pub trait RecordSink: Send + Sync {
    async fn persist(&self, record: &GenerationRecord) -> Result<(), RecordError>;
}

// Compile-time check: RecordSink must be object-safe
const _: () = {
    fn _assert_object_safe(_: &dyn RecordSink) {}
};

/// Append-only JSONL storage, one file per user.
pub struct JsonlRecordStore {
    records_dir: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
}

impl JsonlRecordStore {
    /// Create a new record store. Uses `~/.local/share/novella/records/` by default.
    pub fn new() -> Self {
        let base = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("novella")
            .join("records");
        Self::with_dir(base)
    }

    /// Create with a custom directory (for testing).
    pub fn with_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            records_dir: dir.into(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.records_dir
    }

    /// Hash a user id into a short folder name.
    fn user_hash(user_id: &str) -> String {
        let hash = blake3::hash(user_id.as_bytes());
        hash.to_hex()[..16].to_string()
    }

    fn user_file(&self, user_id: &str) -> PathBuf {
        self.records_dir
            .join(Self::user_hash(user_id))
            .join(RECORDS_FILE)
    }

    /// Append one record.
    pub async fn append(&self, record: &GenerationRecord) -> Result<(), RecordError> {
        let path = self.user_file(&record.user_id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let line = serde_json::to_string(record)?;
        let _guard = self.write_lock.lock().await;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(format!("{line}\n").as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    /// Most recent records for a user, newest first.
    ///
    /// Unparseable lines are skipped with a warning so one torn write does not
    /// hide the rest of the history.
    pub async fn list_recent(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<GenerationRecord>, RecordError> {
        let path = self.user_file(user_id);
        if !path.exists() {
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(&path).await?;
        let mut records = Vec::new();
        for (line_num, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<GenerationRecord>(line) {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!(
                    path = %path.display(),
                    line = line_num + 1,
                    "skipping unreadable record: {e}"
                ),
            }
        }

        // Append order is creation order
        records.reverse();
        records.truncate(limit);
        Ok(records)
    }
}

impl Default for JsonlRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordSink for JsonlRecordStore {
    async fn persist(&self, record: &GenerationRecord) -> Result<(), RecordError> {
        self.append(record).await?;
        tracing::debug!(record_id = %record.id, user_id = %record.user_id, "generation record written");
        Ok(())
    }
}

/// Keeps records in memory.
#[derive(Debug, Default)]
pub struct MemoryRecordSink {
    records: Mutex<Vec<GenerationRecord>>,
}

impl MemoryRecordSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<GenerationRecord> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl RecordSink for MemoryRecordSink {
    async fn persist(&self, record: &GenerationRecord) -> Result<(), RecordError> {
        self.records
            .lock()
            .map_err(|_| RecordError::Sink("record list lock poisoned".to_string()))?
            .push(record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use novella_provider::TokenUsage;
    use tempfile::TempDir;

    fn record(user: &str, text: &str) -> GenerationRecord {
        let mut r = GenerationRecord::new(user, "novel-1", "gemini", "gemini-2.5-flash");
        r.generated_text = text.to_string();
        r.usage = TokenUsage::new(10, 20, None);
        r
    }

    #[tokio::test]
    async fn test_append_and_list_newest_first() {
        let dir = TempDir::new().unwrap();
        let store = JsonlRecordStore::with_dir(dir.path());

        for text in ["first", "second", "third"] {
            store.persist(&record("u1", text)).await.unwrap();
        }

        let records = store.list_recent("u1", 2).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].generated_text, "third");
        assert_eq!(records[1].generated_text, "second");
        assert_eq!(records[0].usage.total_tokens, 30);
    }

    #[tokio::test]
    async fn test_users_are_isolated() {
        let dir = TempDir::new().unwrap();
        let store = JsonlRecordStore::with_dir(dir.path());
        store.persist(&record("u1", "mine")).await.unwrap();

        assert!(store.list_recent("u2", 10).await.unwrap().is_empty());
        assert_ne!(
            JsonlRecordStore::user_hash("u1"),
            JsonlRecordStore::user_hash("u2")
        );
    }

    #[tokio::test]
    async fn test_torn_line_is_skipped() {
        let dir = TempDir::new().unwrap();
        let store = JsonlRecordStore::with_dir(dir.path());
        store.persist(&record("u1", "ok")).await.unwrap();

        let path = store.user_file("u1");
        let mut content = std::fs::read_to_string(&path).unwrap();
        content.push_str("{\"id\":\"trunc\n");
        std::fs::write(&path, content).unwrap();

        let records = store.list_recent("u1", 10).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].generated_text, "ok");
    }

    #[tokio::test]
    async fn test_memory_sink_collects() {
        let sink = MemoryRecordSink::new();
        sink.persist(&record("u1", "a")).await.unwrap();
        assert_eq!(sink.records().len(), 1);
    }
}
