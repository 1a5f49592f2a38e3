//! Context bundle and its parts.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// A story entity (character, place, item, ...) with its full attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EntityCard {
    pub id: String,
    pub name: String,
    pub category: String,
    pub description: String,
    /// Free-form attributes (appearance, personality, ...).
    pub attributes: BTreeMap<String, String>,
    /// Literal substrings that pull this entity into context.
    pub trigger_words: Vec<String>,
}

impl EntityCard {
    /// Whether any nonempty trigger word occurs literally in `text`.
    pub fn is_triggered_by(&self, text: &str) -> bool {
        self.trigger_words
            .iter()
            .map(|w| w.trim())
            .any(|w| !w.is_empty() && text.contains(w))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ChapterSummary {
    pub id: String,
    pub chapter_number: u32,
    pub title: String,
    pub summary: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LinkedChapter {
    pub id: String,
    pub title: String,
    pub content: String,
}

/// Supporting material folded into one prompt. Built per request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextBundle {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub novel_summary: Option<String>,
    /// Oldest to newest.
    pub chapter_summaries: Vec<ChapterSummary>,
    pub matched_entities: Vec<EntityCard>,
    pub linked_chapters: Vec<LinkedChapter>,
}

impl ContextBundle {
    pub fn is_empty(&self) -> bool {
        self.novel_summary.as_deref().map_or(true, |s| s.trim().is_empty())
            && self.chapter_summaries.is_empty()
            && self.matched_entities.is_empty()
            && self.linked_chapters.is_empty()
    }

    /// Characters of attached prior-chapter text (drives the variable tariff).
    pub fn linked_character_count(&self) -> u64 {
        linked_character_count(&self.linked_chapters)
    }

    pub fn entity_ids(&self) -> Vec<&str> {
        self.matched_entities.iter().map(|e| e.id.as_str()).collect()
    }
}

pub fn linked_character_count(chapters: &[LinkedChapter]) -> u64 {
    chapters.iter().map(|c| c.content.chars().count() as u64).sum()
}

/// Input to [`ContextAssembler::assemble`](crate::ContextAssembler::assemble).
#[derive(Debug, Clone, Default)]
pub struct ContextQuery {
    pub novel_id: String,
    pub query_text: String,
    /// Chapter being written; summaries from it onward are not used.
    pub current_chapter: Option<u32>,
    pub excluded_entity_ids: HashSet<String>,
    pub excluded_summary_ids: HashSet<String>,
    /// Chapters the caller attached explicitly, already fetched.
    pub linked_chapters: Vec<LinkedChapter>,
}

impl ContextQuery {
    pub fn new(novel_id: impl Into<String>, query_text: impl Into<String>) -> Self {
        Self {
            novel_id: novel_id.into(),
            query_text: query_text.into(),
            ..Self::default()
        }
    }

    pub fn with_current_chapter(mut self, chapter: u32) -> Self {
        self.current_chapter = Some(chapter);
        self
    }

    pub fn excluding_entities<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excluded_entity_ids.extend(ids.into_iter().map(Into::into));
        self
    }

    pub fn excluding_summaries<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excluded_summary_ids.extend(ids.into_iter().map(Into::into));
        self
    }

    pub fn with_linked_chapters(mut self, chapters: Vec<LinkedChapter>) -> Self {
        self.linked_chapters = chapters;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trigger_match_is_literal_substring() {
        let card = EntityCard {
            id: "e1".into(),
            trigger_words: vec!["烈焰".into(), "  ".into()],
            ..EntityCard::default()
        };
        assert!(card.is_triggered_by("他挥出烈焰之剑"));
        assert!(!card.is_triggered_by("火焰"));
        assert!(!card.is_triggered_by(" "));
    }

    #[test]
    fn test_bundle_emptiness_and_linked_chars() {
        let mut bundle = ContextBundle::default();
        assert!(bundle.is_empty());
        bundle.novel_summary = Some("  ".into());
        assert!(bundle.is_empty());
        bundle.linked_chapters.push(LinkedChapter {
            id: "c1".into(),
            title: "One".into(),
            content: "烈焰abc".into(),
        });
        assert!(!bundle.is_empty());
        assert_eq!(bundle.linked_character_count(), 5);
    }

    #[test]
    fn test_entity_card_accepts_partial_json() {
        let card: EntityCard =
            serde_json::from_str(r#"{"id":"e1","name":"Lin","triggerWords":["Lin"]}"#).unwrap();
        assert_eq!(card.name, "Lin");
        assert!(card.attributes.is_empty());
    }
}
