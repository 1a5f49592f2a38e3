//! The persisted audit row written after a successful generation.

use novella_provider::TokenUsage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Marker appended to a field cut short for storage.
const ELLIPSIS: char = '…';

/// The prompt material a generation was produced from, sanitized for storage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptInputs {
    pub content_type: String,
    #[serde(default)]
    pub system_prompt: String,
    #[serde(default)]
    pub user_prompt: String,
    /// Caller-supplied request fields (instruction, outline, style, ...).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, String>,
}

impl PromptInputs {
    pub fn new(content_type: impl Into<String>) -> Self {
        Self {
            content_type: content_type.into(),
            ..Self::default()
        }
    }

    pub fn with_prompts(mut self, system: impl Into<String>, user: impl Into<String>) -> Self {
        self.system_prompt = system.into();
        self.user_prompt = user.into();
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let value = value.into();
        if !value.trim().is_empty() {
            self.fields.insert(name.into(), value);
        }
        self
    }

    /// Strip control characters and cap every text field at `max_chars`.
    pub fn sanitized(self, max_chars: usize) -> Self {
        Self {
            content_type: sanitize(&self.content_type, max_chars),
            system_prompt: sanitize(&self.system_prompt, max_chars),
            user_prompt: sanitize(&self.user_prompt, max_chars),
            fields: self
                .fields
                .into_iter()
                .map(|(k, v)| (k, sanitize(&v, max_chars)))
                .collect(),
        }
    }
}

/// Remove control characters (newlines and tabs survive) and truncate on a
/// character boundary.
pub fn sanitize(text: &str, max_chars: usize) -> String {
    let cleaned = text
        .chars()
        .filter(|c| !c.is_control() || matches!(c, '\n' | '\t'));
    let mut out: String = cleaned.clone().take(max_chars).collect();
    if cleaned.count() > max_chars {
        out.push(ELLIPSIS);
    }
    out
}

/// One completed generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRecord {
    /// ULID; sorts by creation time.
    pub id: String,
    pub user_id: String,
    pub novel_id: String,
    pub provider: String,
    pub model: String,
    pub prompt: PromptInputs,
    pub usage: TokenUsage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking_text: Option<String>,
    pub generated_text: String,
    /// Credits debited for the request.
    #[serde(default)]
    pub credits: u64,
    /// Unix timestamp (seconds).
    pub created_at: u64,
}

impl GenerationRecord {
    /// Start a record stamped with a fresh id and the current time.
    pub fn new(
        user_id: impl Into<String>,
        novel_id: impl Into<String>,
        provider: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        let created_at = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        Self {
            id: ulid::Ulid::new().to_string(),
            user_id: user_id.into(),
            novel_id: novel_id.into(),
            provider: provider.into(),
            model: model.into(),
            prompt: PromptInputs::default(),
            usage: TokenUsage::default(),
            thinking_text: None,
            generated_text: String::new(),
            credits: 0,
            created_at,
        }
    }
}
