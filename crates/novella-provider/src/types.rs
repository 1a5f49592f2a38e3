//! Backend-agnostic request, result and stream types shared by every adapter.

use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Reasoning effort for backends that take a coarse level instead of a budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThinkingLevel {
    Low,
    High,
}

impl ThinkingLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThinkingLevel::Low => "low",
            ThinkingLevel::High => "high",
        }
    }
}

/// Configuration for reasoning traces.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThinkingConfig {
    /// Whether thinking is requested.
    pub enabled: bool,
    /// Budget in tokens for thinking.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget: Option<u32>,
    /// Coarse reasoning level.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<ThinkingLevel>,
    /// Whether the reasoning text should be returned alongside the content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_in_response: Option<bool>,
}

impl ThinkingConfig {
    /// Thinking enabled with an explicit token budget.
    pub fn with_budget(budget: u32) -> Self {
        Self {
            enabled: true,
            budget: Some(budget),
            level: None,
            include_in_response: Some(true),
        }
    }

    /// Whether reasoning text should be surfaced to the caller.
    pub fn wants_trace(&self) -> bool {
        self.enabled && self.include_in_response.unwrap_or(true)
    }
}

/// Request to a provider. Passed into exactly one provider call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerateRequest {
    /// Model identifier. `None` selects the provider's default text model.
    pub model: Option<String>,
    /// System prompt.
    pub system_prompt: Option<String>,
    /// User prompt.
    pub user_prompt: String,
    /// Maximum tokens in the response.
    pub max_tokens: Option<u32>,
    /// Sampling temperature.
    pub temperature: Option<f64>,
    /// Constrain output to a JSON object.
    pub json_mode: bool,
    /// Thinking configuration.
    pub thinking: Option<ThinkingConfig>,
    /// Backend-native fields deep-merged into the request body after translation.
    pub native_overrides: Option<Map<String, Value>>,
}

impl GenerateRequest {
    pub fn new(user_prompt: impl Into<String>) -> Self {
        Self {
            user_prompt: user_prompt.into(),
            ..Default::default()
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system_prompt = Some(system.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_json_mode(mut self, json_mode: bool) -> Self {
        self.json_mode = json_mode;
        self
    }

    pub fn with_thinking(mut self, thinking: ThinkingConfig) -> Self {
        self.thinking = Some(thinking);
        self
    }

    pub fn with_native_overrides(mut self, overrides: Map<String, Value>) -> Self {
        self.native_overrides = Some(overrides);
        self
    }

    /// Thinking settings if, and only if, thinking was requested.
    pub fn thinking_enabled(&self) -> Option<&ThinkingConfig> {
        self.thinking.as_ref().filter(|t| t.enabled)
    }
}

/// Token usage information, normalized across backends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    /// Input tokens consumed.
    pub input_tokens: u64,
    /// Output tokens generated.
    pub output_tokens: u64,
    /// Tokens spent on reasoning, when the backend reports them separately.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking_tokens: Option<u64>,
    /// Input tokens served from a prompt cache.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cached_tokens: Option<u64>,
    /// Total tokens billed. Never less than `input_tokens + output_tokens`.
    pub total_tokens: u64,
}

impl TokenUsage {
    /// Build a usage value, clamping the total to at least input + output.
    pub fn new(input_tokens: u64, output_tokens: u64, total_tokens: Option<u64>) -> Self {
        let floor = input_tokens.saturating_add(output_tokens);
        Self {
            input_tokens,
            output_tokens,
            thinking_tokens: None,
            cached_tokens: None,
            total_tokens: total_tokens.unwrap_or(floor).max(floor),
        }
    }

    pub fn with_thinking_tokens(mut self, tokens: Option<u64>) -> Self {
        self.thinking_tokens = tokens;
        self
    }

    pub fn with_cached_tokens(mut self, tokens: Option<u64>) -> Self {
        self.cached_tokens = tokens;
        self
    }

    /// Fold a later report into this one.
    ///
    /// Backends report either cumulative counts on every chunk or partial counts
    /// on different chunks; taking the field-wise maximum is correct for both.
    pub fn merge(&mut self, other: &TokenUsage) {
        self.input_tokens = self.input_tokens.max(other.input_tokens);
        self.output_tokens = self.output_tokens.max(other.output_tokens);
        self.thinking_tokens = max_opt(self.thinking_tokens, other.thinking_tokens);
        self.cached_tokens = max_opt(self.cached_tokens, other.cached_tokens);
        let floor = self.input_tokens.saturating_add(self.output_tokens);
        self.total_tokens = self.total_tokens.max(other.total_tokens).max(floor);
    }
}

fn max_opt(a: Option<u64>, b: Option<u64>) -> Option<u64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}

/// Single-shot generation result.
#[derive(Debug, Clone, PartialEq)]
pub struct TextResult {
    /// Final content.
    pub text: String,
    /// Reasoning trace, if the backend returned one.
    pub thinking: Option<String>,
    /// Token usage.
    pub usage: TokenUsage,
    /// Model that served the request.
    pub model: String,
}

/// A unit of streamed output.
///
/// Every stream yields zero or more `Content`/`Thinking` chunks, then at most
/// one `Usage`, then exactly one of `Done` or `Error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StreamChunk {
    Content { text: String },
    Thinking { text: String },
    Usage { usage: TokenUsage },
    Done,
    Error { message: String },
}

impl StreamChunk {
    /// Whether this chunk ends the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamChunk::Done | StreamChunk::Error { .. })
    }
}

/// Lazily evaluated chunk stream. Each call to `generate_stream` re-issues the
/// backend request; the stream is not restartable.
pub type ChunkStream = BoxStream<'static, StreamChunk>;

/// Deep-merge `overrides` into `target`: objects merge key-wise, anything else
/// replaces the existing value.
pub fn merge_native(target: &mut Value, overrides: &Map<String, Value>) {
    let Value::Object(target) = target else {
        return;
    };
    for (key, value) in overrides {
        match (target.get_mut(key), value) {
            (Some(existing @ Value::Object(_)), Value::Object(nested)) => {
                merge_native(existing, nested);
            }
            _ => {
                target.insert(key.clone(), value.clone());
            }
        }
    }
}
