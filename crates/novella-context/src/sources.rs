//! Collaborators the assembler reads from.

use crate::error::ContextError;
use crate::types::{ChapterSummary, EntityCard, LinkedChapter};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Identity plus short description; full attributes are fetched separately.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityMatch {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub description: String,
    pub similarity: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryMatch {
    pub id: String,
    #[serde(default)]
    pub chapter_number: u32,
    #[serde(default)]
    pub title: String,
    pub summary: String,
    pub similarity: f32,
}

impl From<SummaryMatch> for ChapterSummary {
    fn from(m: SummaryMatch) -> Self {
        ChapterSummary {
            id: m.id,
            chapter_number: m.chapter_number,
            title: m.title,
            summary: m.summary,
        }
    }
}

/// Semantic lookup over embedded entities and summaries.
#[async_trait]
pub trait RetrievalIndex: Send + Sync {
    /// Top `top_k` entities with similarity >= `threshold`, best first.
    async fn match_entities(
        &self,
        novel_id: &str,
        query: &str,
        top_k: usize,
        threshold: f32,
    ) -> Result<Vec<EntityMatch>, ContextError>;

    /// Top `top_k` chapter summaries with similarity >= `threshold`, best first.
    async fn match_summaries(
        &self,
        novel_id: &str,
        query: &str,
        top_k: usize,
        threshold: f32,
    ) -> Result<Vec<SummaryMatch>, ContextError>;
}

/// Raw novel data.
#[async_trait]
pub trait NovelStore: Send + Sync {
    async fn novel_summary(&self, novel_id: &str) -> Result<Option<String>, ContextError>;

    /// Every entity of the novel that declares at least one trigger word.
    async fn trigger_entities(&self, novel_id: &str) -> Result<Vec<EntityCard>, ContextError>;

    /// Full cards for `ids`; unknown ids are skipped.
    async fn entities_by_ids(
        &self,
        novel_id: &str,
        ids: &[String],
    ) -> Result<Vec<EntityCard>, ContextError>;

    /// The `limit` most recent summaries before `before_chapter` (all chapters
    /// when `None`), oldest first.
    async fn recent_summaries(
        &self,
        novel_id: &str,
        before_chapter: Option<u32>,
        limit: usize,
    ) -> Result<Vec<ChapterSummary>, ContextError>;

    /// Chapters for `ids`, in the order requested; unknown ids are skipped.
    async fn chapters_by_ids(
        &self,
        novel_id: &str,
        ids: &[String],
    ) -> Result<Vec<LinkedChapter>, ContextError>;
}

// Compile-time check: collaborators must be object-safe
const _: () = {
    fn _assert_index(_: &dyn RetrievalIndex) {}
    fn _assert_store(_: &dyn NovelStore) {}
};
