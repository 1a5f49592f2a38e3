//! Semantic-first context assembly with deterministic fallbacks.
//!
//! Entity and summary lookups run concurrently against the retrieval index.
//! When a lookup fails or comes back empty, entities fall back to a
//! trigger-word scan over the raw novel data and summaries fall back to the
//! most recent chapters. Collaborator failures are logged and absorbed;
//! assembly itself never fails.

use crate::sources::{EntityMatch, NovelStore, RetrievalIndex, SummaryMatch};
use crate::types::{ChapterSummary, ContextBundle, ContextQuery, EntityCard, LinkedChapter};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Tuning for retrieval and bundle size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextSettings {
    /// Queries shorter than this (in characters) skip retrieval.
    pub min_query_chars: usize,
    pub entity_top_k: usize,
    pub entity_threshold: f32,
    pub summary_top_k: usize,
    pub summary_threshold: f32,
    /// Summaries taken by the recent-chapters fallback.
    pub recent_summary_count: usize,
    pub max_entities: usize,
}

impl Default for ContextSettings {
    fn default() -> Self {
        Self {
            min_query_chars: 10,
            entity_top_k: 8,
            entity_threshold: 0.45,
            summary_top_k: 5,
            summary_threshold: 0.5,
            recent_summary_count: 10,
            max_entities: 20,
        }
    }
}

/// Builds a [`ContextBundle`] for one request.
#[derive(Clone)]
pub struct ContextAssembler {
    index: Arc<dyn RetrievalIndex>,
    store: Arc<dyn NovelStore>,
    settings: ContextSettings,
}

impl ContextAssembler {
    pub fn new(index: Arc<dyn RetrievalIndex>, store: Arc<dyn NovelStore>) -> Self {
        Self {
            index,
            store,
            settings: ContextSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: ContextSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &ContextSettings {
        &self.settings
    }

    /// Fetch explicitly attached chapters. A store failure yields none.
    pub async fn linked_chapters(&self, novel_id: &str, ids: &[String]) -> Vec<LinkedChapter> {
        if ids.is_empty() {
            return Vec::new();
        }
        match self.store.chapters_by_ids(novel_id, ids).await {
            Ok(chapters) => chapters,
            Err(e) => {
                tracing::warn!(novel_id = %novel_id, "linked chapter fetch failed: {e}");
                Vec::new()
            }
        }
    }

    /// Assemble context for `query`.
    pub async fn assemble(&self, query: &ContextQuery) -> ContextBundle {
        let mut bundle = ContextBundle {
            linked_chapters: query.linked_chapters.clone(),
            ..ContextBundle::default()
        };

        let text = query.query_text.trim();
        if text.chars().count() < self.settings.min_query_chars {
            tracing::debug!(
                novel_id = %query.novel_id,
                chars = text.chars().count(),
                "query too short for retrieval, using linked chapters only"
            );
            return bundle;
        }

        let (summary, (entities, summaries)) = futures::join!(
            self.novel_summary(&query.novel_id),
            self.semantic_lookups(&query.novel_id, text),
        );
        bundle.novel_summary = summary;

        bundle.matched_entities = match entities {
            Some(matches) if !matches.is_empty() => {
                let kept: Vec<EntityMatch> = matches
                    .into_iter()
                    .filter(|m| !query.excluded_entity_ids.contains(&m.id))
                    .collect();
                self.enrich(&query.novel_id, kept).await
            }
            _ => {
                tracing::debug!(novel_id = %query.novel_id, "entity fallback: trigger-word scan");
                self.trigger_scan(&query.novel_id, text, &query.excluded_entity_ids)
                    .await
            }
        };
        bundle.matched_entities.truncate(self.settings.max_entities);

        bundle.chapter_summaries = match summaries {
            Some(matches) if !matches.is_empty() => {
                let mut kept: Vec<ChapterSummary> = matches
                    .into_iter()
                    .filter(|m| !query.excluded_summary_ids.contains(&m.id))
                    .map(ChapterSummary::from)
                    .collect();
                kept.sort_by_key(|s| s.chapter_number);
                kept
            }
            _ => {
                tracing::debug!(novel_id = %query.novel_id, "summary fallback: recent chapters");
                self.recent_summaries(query).await
            }
        };

        bundle
    }

    /// Both lookups concurrently; `None` marks a failed branch. One branch
    /// failing never discards the other's result.
    async fn semantic_lookups(
        &self,
        novel_id: &str,
        text: &str,
    ) -> (Option<Vec<EntityMatch>>, Option<Vec<SummaryMatch>>) {
        let s = &self.settings;
        let (entities, summaries) = futures::join!(
            self.index
                .match_entities(novel_id, text, s.entity_top_k, s.entity_threshold),
            self.index
                .match_summaries(novel_id, text, s.summary_top_k, s.summary_threshold),
        );

        let entities = entities
            .map_err(|e| tracing::warn!(novel_id = %novel_id, "entity lookup failed: {e}"))
            .ok();
        let summaries = summaries
            .map_err(|e| tracing::warn!(novel_id = %novel_id, "summary lookup failed: {e}"))
            .ok();
        (entities, summaries)
    }

    async fn novel_summary(&self, novel_id: &str) -> Option<String> {
        match self.store.novel_summary(novel_id).await {
            Ok(summary) => summary.filter(|s| !s.trim().is_empty()),
            Err(e) => {
                tracing::warn!(novel_id = %novel_id, "novel summary fetch failed: {e}");
                None
            }
        }
    }

    /// Replace shallow matches with full cards, keeping match order. Falls
    /// back to the shallow descriptors if the bulk lookup fails.
    async fn enrich(&self, novel_id: &str, matches: Vec<EntityMatch>) -> Vec<EntityCard> {
        if matches.is_empty() {
            return Vec::new();
        }
        let ids: Vec<String> = matches
            .iter()
            .take(self.settings.max_entities)
            .map(|m| m.id.clone())
            .collect();

        let mut full: HashMap<String, EntityCard> = match self.store.entities_by_ids(novel_id, &ids).await {
            Ok(cards) => cards.into_iter().map(|c| (c.id.clone(), c)).collect(),
            Err(e) => {
                tracing::warn!(novel_id = %novel_id, "entity enrichment failed: {e}");
                HashMap::new()
            }
        };

        matches
            .into_iter()
            .map(|m| {
                full.remove(&m.id).unwrap_or(EntityCard {
                    id: m.id,
                    name: m.name,
                    category: m.category,
                    description: m.description,
                    ..EntityCard::default()
                })
            })
            .collect()
    }

    /// Entities whose trigger words occur in `text`, deduplicated by id, first
    /// occurrence wins.
    async fn trigger_scan(
        &self,
        novel_id: &str,
        text: &str,
        excluded: &HashSet<String>,
    ) -> Vec<EntityCard> {
        let entities = match self.store.trigger_entities(novel_id).await {
            Ok(entities) => entities,
            Err(e) => {
                tracing::warn!(novel_id = %novel_id, "trigger entity fetch failed: {e}");
                return Vec::new();
            }
        };

        let mut seen = HashSet::new();
        entities
            .into_iter()
            .filter(|e| !excluded.contains(&e.id))
            .filter(|e| e.is_triggered_by(text))
            .filter(|e| seen.insert(e.id.clone()))
            .collect()
    }

    async fn recent_summaries(&self, query: &ContextQuery) -> Vec<ChapterSummary> {
        let limit = self.settings.recent_summary_count;
        if limit == 0 {
            return Vec::new();
        }
        match self
            .store
            .recent_summaries(&query.novel_id, query.current_chapter, limit)
            .await
        {
            Ok(summaries) => summaries
                .into_iter()
                .filter(|s| !query.excluded_summary_ids.contains(&s.id))
                .collect(),
            Err(e) => {
                tracing::warn!(novel_id = %query.novel_id, "recent summary fetch failed: {e}");
                Vec::new()
            }
        }
    }
}

impl std::fmt::Debug for ContextAssembler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextAssembler")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}
