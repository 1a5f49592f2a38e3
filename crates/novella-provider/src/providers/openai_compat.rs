//! Generic OpenAI-compatible provider.
//!
//! Handles the chat completions format spoken by OpenAI and DeepSeek. Reasoning
//! text arrives in a separate `reasoning_content` delta field, and usage only
//! on the final chunk when `stream_options.include_usage` is set.

use crate::capabilities::ProviderKind;
use crate::error::ProviderError;
use crate::sequencer::RawEvent;
use crate::traits::Provider;
use crate::transport::{HttpRequest, HttpTransport};
use crate::types::{
    merge_native, ChunkStream, GenerateRequest, TextResult, ThinkingLevel, TokenUsage,
};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

/// Configuration for an OpenAI-compatible provider.
#[derive(Debug, Clone)]
pub struct OpenAiCompatConfig {
    pub kind: ProviderKind,
    pub base_url: String,
    pub api_key: String,
}

/// A provider that speaks the OpenAI chat completions protocol.
pub struct OpenAiCompatProvider {
    config: OpenAiCompatConfig,
    transport: HttpTransport,
}

impl OpenAiCompatProvider {
    /// Create a new OpenAI-compatible provider.
    pub fn new(config: OpenAiCompatConfig) -> Self {
        let transport = HttpTransport::new(config.kind.as_str());
        Self { config, transport }
    }

    /// Create with a custom base URL (for testing/proxy).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Give up on a stream once the backend has been silent this long.
    pub fn with_stall_timeout(mut self, stall_timeout: Duration) -> Self {
        self.transport = self.transport.with_stall_timeout(stall_timeout);
        self
    }

    fn http_request(&self, body: Value) -> HttpRequest {
        HttpRequest {
            url: format!("{}/chat/completions", self.config.base_url),
            headers: vec![("Authorization", format!("Bearer {}", self.config.api_key))],
            body,
        }
    }

    /// Build the JSON request body.
    ///
    /// Reasoning models constrain the parameter shape: DeepSeek's reasoner
    /// rejects temperature and length caps outright, OpenAI's take
    /// `max_completion_tokens` plus a `reasoning_effort` instead.
    fn build_request_body(&self, model: &str, request: &GenerateRequest, stream: bool) -> Value {
        let mut messages = Vec::new();
        if let Some(ref system) = request.system_prompt {
            messages.push(json!({"role": "system", "content": system}));
        }
        messages.push(json!({"role": "user", "content": request.user_prompt}));

        let mut body = json!({
            "model": model,
            "messages": messages,
            "stream": stream,
        });
        if stream {
            body["stream_options"] = json!({"include_usage": true});
        }

        let reasoning = self.capabilities().supports_thinking(model);
        match (self.config.kind, reasoning) {
            (ProviderKind::DeepSeek, true) => {
                if request.temperature.is_some() || request.max_tokens.is_some() {
                    tracing::debug!(model, "dropping temperature/max_tokens for reasoning model");
                }
            }
            (_, true) => {
                if let Some(max_tokens) = request.max_tokens {
                    body["max_completion_tokens"] = json!(max_tokens);
                }
                if let Some(thinking) = request.thinking_enabled() {
                    let effort = match thinking.level {
                        Some(ThinkingLevel::Low) => "low",
                        Some(ThinkingLevel::High) => "high",
                        None => "medium",
                    };
                    body["reasoning_effort"] = json!(effort);
                }
            }
            (_, false) => {
                if let Some(max_tokens) = request.max_tokens {
                    body["max_tokens"] = json!(max_tokens);
                }
                if let Some(temperature) = request.temperature {
                    body["temperature"] = json!(temperature);
                }
            }
        }

        if request.json_mode {
            body["response_format"] = json!({"type": "json_object"});
        }

        if let Some(ref overrides) = request.native_overrides {
            merge_native(&mut body, overrides);
        }

        body
    }

    /// Parse an SSE payload into raw events.
    fn parse_sse_event(data: &str) -> Result<Vec<RawEvent>, ProviderError> {
        if data.trim() == "[DONE]" {
            return Ok(vec![]);
        }

        let chunk: OpenAiChunk = serde_json::from_str(data)
            .map_err(|e| ProviderError::Malformed(format!("chat completion chunk: {e}")))?;

        if let Some(error) = chunk.error {
            return Err(ProviderError::Api(error.message));
        }

        let mut events = Vec::new();
        let mut blocked = false;
        for choice in chunk.choices {
            if let Some(reasoning) = choice.delta.reasoning_content {
                events.push(RawEvent::Thinking(reasoning));
            }
            if let Some(content) = choice.delta.content {
                events.push(RawEvent::Content(content));
            }
            blocked |= choice.finish_reason.as_deref() == Some("content_filter");
        }
        if blocked {
            events.push(RawEvent::Failed(
                "generation blocked: content_filter".to_string(),
            ));
            return Ok(events);
        }

        if let Some(usage) = chunk.usage {
            events.push(RawEvent::Usage(usage.normalize()));
        }

        Ok(events)
    }

    fn parse_response(value: Value, model: &str) -> Result<TextResult, ProviderError> {
        let resp: OpenAiResponse = serde_json::from_value(value)
            .map_err(|e| ProviderError::Malformed(format!("chat completion: {e}")))?;

        if let Some(error) = resp.error {
            return Err(ProviderError::Api(error.message));
        }

        let choice = resp
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::Malformed("No choices in response".to_string()))?;

        Ok(TextResult {
            text: choice.message.content.unwrap_or_default(),
            thinking: choice.message.reasoning_content.filter(|r| !r.is_empty()),
            usage: resp.usage.map(|u| u.normalize()).unwrap_or_default(),
            model: resp.model.unwrap_or_else(|| model.to_string()),
        })
    }
}

#[async_trait]
impl Provider for OpenAiCompatProvider {
    fn kind(&self) -> ProviderKind {
        self.config.kind
    }

    async fn generate(&self, request: GenerateRequest) -> Result<TextResult, ProviderError> {
        let model = self.resolve_model(&request);
        let body = self.build_request_body(&model, &request, false);
        let value = self.transport.post_json(&self.http_request(body)).await?;
        Self::parse_response(value, &model)
    }

    fn generate_stream(&self, request: GenerateRequest) -> ChunkStream {
        let model = self.resolve_model(&request);
        let body = self.build_request_body(&model, &request, true);
        let include_thinking = request.thinking_enabled().is_some_and(|t| t.wants_trace());
        self.transport
            .event_stream(self.http_request(body), Self::parse_sse_event, include_thinking)
    }
}

// ──────────────────────────────────────────────────────────
// OpenAI-compatible response types
// ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct OpenAiChunk {
    #[serde(default)]
    choices: Vec<OpenAiChunkChoice>,
    #[serde(default)]
    usage: Option<OpenAiUsage>,
    #[serde(default)]
    error: Option<OpenAiError>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChunkChoice {
    #[serde(default)]
    delta: OpenAiDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct OpenAiDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    reasoning_content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<OpenAiResponseChoice>,
    #[serde(default)]
    usage: Option<OpenAiUsage>,
    #[serde(default)]
    error: Option<OpenAiError>,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponseChoice {
    message: OpenAiMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    reasoning_content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiError {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct OpenAiUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    total_tokens: Option<u64>,
    #[serde(default)]
    completion_tokens_details: Option<CompletionDetails>,
    #[serde(default)]
    prompt_tokens_details: Option<PromptDetails>,
    /// DeepSeek reports cache hits at the top level.
    #[serde(default)]
    prompt_cache_hit_tokens: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct CompletionDetails {
    #[serde(default)]
    reasoning_tokens: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct PromptDetails {
    #[serde(default)]
    cached_tokens: Option<u64>,
}

impl OpenAiUsage {
    fn normalize(self) -> TokenUsage {
        let cached = self
            .prompt_tokens_details
            .and_then(|d| d.cached_tokens)
            .or(self.prompt_cache_hit_tokens);
        TokenUsage::new(self.prompt_tokens, self.completion_tokens, self.total_tokens)
            .with_thinking_tokens(self.completion_tokens_details.and_then(|d| d.reasoning_tokens))
            .with_cached_tokens(cached)
    }
}
