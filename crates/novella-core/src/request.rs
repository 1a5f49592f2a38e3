//! Inbound request body, its schema and validation.

use once_cell::sync::Lazy;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What is being generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Chapter,
    Rewrite,
    Card,
    Outline,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Chapter => "chapter",
            ContentType::Rewrite => "rewrite",
            ContentType::Card => "card",
            ContentType::Outline => "outline",
        }
    }

    /// Structured outputs ask the backend for JSON.
    pub fn wants_json(&self) -> bool {
        matches!(self, ContentType::Card | ContentType::Outline)
    }
}

/// Body of a generation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GenerateBody {
    /// Novel the generation belongs to.
    #[schemars(length(min = 1, max = 128))]
    pub novel_id: String,
    pub content_type: ContentType,
    /// Target length in words; sizes the token budget.
    #[schemars(range(min = 50, max = 20000))]
    pub word_count: u32,
    #[serde(default)]
    #[schemars(length(max = 2000))]
    pub instruction: Option<String>,
    #[serde(default)]
    #[schemars(length(max = 2000))]
    pub outline: Option<String>,
    #[serde(default)]
    #[schemars(length(max = 500))]
    pub style: Option<String>,
    /// Passage to rewrite.
    #[serde(default)]
    #[schemars(length(max = 20000))]
    pub source_text: Option<String>,
    /// Chapter being written.
    #[serde(default)]
    #[schemars(range(min = 1))]
    pub chapter_number: Option<u32>,
    #[serde(default)]
    #[schemars(length(max = 10))]
    pub linked_chapter_ids: Vec<String>,
    /// Entity cards the caller removed from the preview.
    #[serde(default)]
    #[schemars(length(max = 200))]
    pub excluded_card_ids: Vec<String>,
    #[serde(default)]
    #[schemars(length(max = 200))]
    pub excluded_summary_ids: Vec<String>,
    /// Provider name, or a model id to infer it from.
    #[serde(default)]
    #[schemars(length(max = 64))]
    pub provider: Option<String>,
    #[serde(default)]
    #[schemars(length(max = 128))]
    pub model: Option<String>,
    #[serde(default)]
    pub enable_thinking: bool,
    #[serde(default)]
    #[schemars(range(min = 128, max = 32768))]
    pub thinking_budget: Option<u32>,
    #[serde(default)]
    #[schemars(range(min = 0.0, max = 2.0))]
    pub temperature: Option<f64>,
}

static REQUEST_SCHEMA: Lazy<Value> = Lazy::new(|| {
    serde_json::to_value(schemars::schema_for!(GenerateBody)).unwrap_or(Value::Bool(true))
});

static REQUEST_VALIDATOR: Lazy<Result<jsonschema::Validator, String>> = Lazy::new(|| {
    jsonschema::validator_for(&REQUEST_SCHEMA).map_err(|e| format!("invalid request schema: {e}"))
});

/// JSON schema of [`GenerateBody`].
pub fn request_schema() -> &'static Value {
    &REQUEST_SCHEMA
}

/// Validate `body` against the schema, deserialize and sanitize it.
///
/// Every violation is reported, sorted.
pub fn parse_body(body: &Value) -> Result<GenerateBody, Vec<String>> {
    let validator = REQUEST_VALIDATOR.as_ref().map_err(|e| vec![e.clone()])?;

    let mut errors: Vec<String> = validator.iter_errors(body).map(|e| e.to_string()).collect();
    if !errors.is_empty() {
        errors.sort();
        return Err(errors);
    }

    let parsed: GenerateBody =
        serde_json::from_value(body.clone()).map_err(|e| vec![e.to_string()])?;
    let parsed = parsed.sanitized();

    if parsed.novel_id.is_empty() {
        return Err(vec!["novelId must not be blank".to_string()]);
    }
    if parsed.content_type == ContentType::Rewrite && parsed.source_text.is_none() {
        return Err(vec!["rewrite requires sourceText".to_string()]);
    }
    Ok(parsed)
}

impl GenerateBody {
    /// Strip control characters, trim, and drop fields left empty.
    pub fn sanitized(mut self) -> Self {
        let clean = |s: Option<String>| s.map(|s| clean_text(&s)).filter(|s| !s.is_empty());
        self.novel_id = clean_text(&self.novel_id);
        self.instruction = clean(self.instruction);
        self.outline = clean(self.outline);
        self.style = clean(self.style);
        self.source_text = clean(self.source_text);
        self.provider = clean(self.provider);
        self.model = clean(self.model);
        for ids in [
            &mut self.linked_chapter_ids,
            &mut self.excluded_card_ids,
            &mut self.excluded_summary_ids,
        ] {
            ids.iter_mut().for_each(|id| *id = clean_text(id));
            ids.retain(|id| !id.is_empty());
        }
        self
    }

    /// Thinking budget when thinking is on.
    pub fn effective_thinking_budget(&self, default_budget: u32) -> Option<u32> {
        self.enable_thinking
            .then(|| self.thinking_budget.unwrap_or(default_budget))
    }

    /// `word_count * 2`, plus the thinking budget when one applies.
    pub fn max_tokens(&self, thinking_budget: Option<u32>) -> u32 {
        self.word_count
            .saturating_mul(2)
            .saturating_add(thinking_budget.unwrap_or(0))
    }

    /// Free text used to look up supporting context.
    pub fn query_text(&self) -> String {
        [&self.instruction, &self.outline, &self.source_text]
            .into_iter()
            .flatten()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Remove control characters other than newline and tab, then trim.
fn clean_text(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_control() || matches!(c, '\n' | '\t'))
        .collect::<String>()
        .trim()
        .to_string()
}
