//! In-memory collaborators.

use crate::error::ContextError;
use crate::sources::{EntityMatch, NovelStore, RetrievalIndex, SummaryMatch};
use crate::types::{ChapterSummary, EntityCard, LinkedChapter};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Everything the assembler may read about one novel.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NovelData {
    pub summary: Option<String>,
    pub entities: Vec<EntityCard>,
    pub summaries: Vec<ChapterSummary>,
    pub chapters: Vec<LinkedChapter>,
}

/// A [`NovelStore`] over novels held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryNovelStore {
    novels: HashMap<String, NovelData>,
}

impl MemoryNovelStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_novel(mut self, novel_id: impl Into<String>, data: NovelData) -> Self {
        self.novels.insert(novel_id.into(), data);
        self
    }

    pub fn from_novels(novels: HashMap<String, NovelData>) -> Self {
        Self { novels }
    }

    pub fn contains(&self, novel_id: &str) -> bool {
        self.novels.contains_key(novel_id)
    }

    fn novel(&self, novel_id: &str) -> Result<&NovelData, ContextError> {
        self.novels
            .get(novel_id)
            .ok_or_else(|| ContextError::NotFound(novel_id.to_string()))
    }
}

#[async_trait]
impl NovelStore for MemoryNovelStore {
    async fn novel_summary(&self, novel_id: &str) -> Result<Option<String>, ContextError> {
        Ok(self.novel(novel_id)?.summary.clone())
    }

    async fn trigger_entities(&self, novel_id: &str) -> Result<Vec<EntityCard>, ContextError> {
        Ok(self
            .novel(novel_id)?
            .entities
            .iter()
            .filter(|e| e.trigger_words.iter().any(|w| !w.trim().is_empty()))
            .cloned()
            .collect())
    }

    async fn entities_by_ids(
        &self,
        novel_id: &str,
        ids: &[String],
    ) -> Result<Vec<EntityCard>, ContextError> {
        let novel = self.novel(novel_id)?;
        Ok(ids
            .iter()
            .filter_map(|id| novel.entities.iter().find(|e| &e.id == id))
            .cloned()
            .collect())
    }

    async fn recent_summaries(
        &self,
        novel_id: &str,
        before_chapter: Option<u32>,
        limit: usize,
    ) -> Result<Vec<ChapterSummary>, ContextError> {
        let mut summaries: Vec<ChapterSummary> = self
            .novel(novel_id)?
            .summaries
            .iter()
            .filter(|s| before_chapter.map_or(true, |current| s.chapter_number < current))
            .cloned()
            .collect();
        summaries.sort_by_key(|s| s.chapter_number);
        let skip = summaries.len().saturating_sub(limit);
        Ok(summaries.split_off(skip))
    }

    async fn chapters_by_ids(
        &self,
        novel_id: &str,
        ids: &[String],
    ) -> Result<Vec<LinkedChapter>, ContextError> {
        let novel = self.novel(novel_id)?;
        Ok(ids
            .iter()
            .filter_map(|id| novel.chapters.iter().find(|c| &c.id == id))
            .cloned()
            .collect())
    }
}

/// A [`RetrievalIndex`] with no embeddings behind it; every lookup fails, so
/// assembly always takes the deterministic fallbacks.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableIndex;

#[async_trait]
impl RetrievalIndex for UnavailableIndex {
    async fn match_entities(
        &self,
        _novel_id: &str,
        _query: &str,
        _top_k: usize,
        _threshold: f32,
    ) -> Result<Vec<EntityMatch>, ContextError> {
        Err(ContextError::IndexUnavailable("no embedding index configured".into()))
    }

    async fn match_summaries(
        &self,
        _novel_id: &str,
        _query: &str,
        _top_k: usize,
        _threshold: f32,
    ) -> Result<Vec<SummaryMatch>, ContextError> {
        Err(ContextError::IndexUnavailable("no embedding index configured".into()))
    }
}
