//! Anthropic Claude provider implementation.
//!
//! Implements the Provider trait for Anthropic's Messages API with SSE streaming.

use crate::capabilities::ProviderKind;
use crate::error::ProviderError;
use crate::sequencer::RawEvent;
use crate::traits::Provider;
use crate::transport::{HttpRequest, HttpTransport};
use crate::types::{merge_native, ChunkStream, GenerateRequest, TextResult, TokenUsage};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

const API_BASE: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 16_384;
/// Extended thinking rejects smaller budgets.
const MIN_THINKING_BUDGET: u32 = 1_024;
const JSON_INSTRUCTION: &str = "Respond with a single valid JSON object and nothing else.";

/// Anthropic Claude provider.
pub struct AnthropicProvider {
    transport: HttpTransport,
    api_key: String,
    base_url: String,
}

impl AnthropicProvider {
    /// Create a new Anthropic provider with the given API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            transport: HttpTransport::new("anthropic"),
            api_key: api_key.into(),
            base_url: API_BASE.to_string(),
        }
    }

    /// Create with a custom base URL (for testing/proxy).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Give up on a stream once the backend has been silent this long.
    pub fn with_stall_timeout(mut self, stall_timeout: Duration) -> Self {
        self.transport = self.transport.with_stall_timeout(stall_timeout);
        self
    }

    fn http_request(&self, body: Value) -> HttpRequest {
        HttpRequest {
            url: format!("{}/v1/messages", self.base_url),
            headers: vec![
                ("x-api-key", self.api_key.clone()),
                ("anthropic-version", API_VERSION.to_string()),
            ],
            body,
        }
    }

    /// Convert a unified request into the Anthropic API request body.
    ///
    /// With thinking on, temperature must stay unset and `max_tokens` has to
    /// exceed the thinking budget.
    fn build_request_body(&self, model: &str, request: &GenerateRequest, stream: bool) -> Value {
        let mut max_tokens = request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS);

        let mut body = json!({
            "model": model,
            "messages": [{"role": "user", "content": request.user_prompt}],
            "stream": stream,
        });

        let thinking = request
            .thinking_enabled()
            .filter(|_| self.capabilities().supports_thinking(model));
        match thinking {
            Some(thinking) => {
                let budget = thinking.budget.unwrap_or(MIN_THINKING_BUDGET).max(MIN_THINKING_BUDGET);
                if max_tokens <= budget {
                    max_tokens = budget.saturating_add(max_tokens);
                }
                body["thinking"] = json!({
                    "type": "enabled",
                    "budget_tokens": budget,
                });
            }
            None => {
                if let Some(temperature) = request.temperature {
                    body["temperature"] = json!(temperature);
                }
            }
        }
        body["max_tokens"] = json!(max_tokens);

        // No native JSON mode; ask for it in the system prompt instead.
        let system = match (&request.system_prompt, request.json_mode) {
            (Some(system), true) => Some(format!("{system}\n\n{JSON_INSTRUCTION}")),
            (None, true) => Some(JSON_INSTRUCTION.to_string()),
            (system, false) => system.clone(),
        };
        if let Some(system) = system {
            body["system"] = json!(system);
        }

        if let Some(ref overrides) = request.native_overrides {
            merge_native(&mut body, overrides);
        }

        body
    }

    /// Parse an Anthropic SSE payload into raw events.
    fn parse_sse_event(data: &str) -> Result<Vec<RawEvent>, ProviderError> {
        let event: AnthropicEvent = serde_json::from_str(data)
            .map_err(|e| ProviderError::Malformed(format!("anthropic event: {e}")))?;

        Ok(match event {
            AnthropicEvent::ContentBlockDelta { delta } => match delta {
                Delta::Text { text } => vec![RawEvent::Content(text)],
                Delta::Thinking { thinking } => vec![RawEvent::Thinking(thinking)],
                Delta::Other => vec![],
            },
            AnthropicEvent::MessageStart { message } => {
                message.usage.map(|u| vec![RawEvent::Usage(u.normalize())]).unwrap_or_default()
            }
            AnthropicEvent::MessageDelta { usage } => {
                usage.map(|u| vec![RawEvent::Usage(u.normalize())]).unwrap_or_default()
            }
            AnthropicEvent::Error { error } => {
                return Err(ProviderError::Api(format!(
                    "{}: {}",
                    error.error_type, error.message
                )));
            }
            AnthropicEvent::Other => vec![],
        })
    }

    fn parse_response(value: Value, model: &str) -> Result<TextResult, ProviderError> {
        let resp: AnthropicResponse = serde_json::from_value(value)
            .map_err(|e| ProviderError::Malformed(format!("anthropic response: {e}")))?;

        let mut text = String::new();
        let mut thinking = String::new();
        for block in resp.content {
            match block {
                ContentBlock::Text { text: t } => text.push_str(&t),
                ContentBlock::Thinking { thinking: t } => thinking.push_str(&t),
                ContentBlock::Other => {}
            }
        }

        Ok(TextResult {
            text,
            thinking: (!thinking.is_empty()).then_some(thinking),
            usage: resp.usage.map(UsageData::normalize).unwrap_or_default(),
            model: resp.model.unwrap_or_else(|| model.to_string()),
        })
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Anthropic
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
// Anthropic SSE event types (internal)
// ──────────────────────────────────────────────────────────

/// Top-level SSE event from the Anthropic API.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum AnthropicEvent {
    #[serde(rename = "message_start")]
    MessageStart { message: MessageStartData },

    #[serde(rename = "content_block_delta")]
    ContentBlockDelta { delta: Delta },

    #[serde(rename = "message_delta")]
    MessageDelta {
        #[serde(default)]
        usage: Option<UsageData>,
    },

    #[serde(rename = "error")]
    Error { error: ErrorData },

    /// ping, content_block_start/stop, message_stop
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct MessageStartData {
    #[serde(default)]
    usage: Option<UsageData>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum Delta {
    #[serde(rename = "text_delta")]
    Text { text: String },

    #[serde(rename = "thinking_delta")]
    Thinking { thinking: String },

    /// signature and tool-argument deltas
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct UsageData {
    #[serde(default)]
    input_tokens: Option<u64>,
    #[serde(default)]
    output_tokens: Option<u64>,
    #[serde(default)]
    cache_read_input_tokens: Option<u64>,
}

impl UsageData {
    fn normalize(self) -> TokenUsage {
        let cached = self.cache_read_input_tokens.unwrap_or(0);
        let input = self.input_tokens.unwrap_or(0) + cached;
        TokenUsage::new(input, self.output_tokens.unwrap_or(0), None)
            .with_cached_tokens(self.cache_read_input_tokens)
    }
}

#[derive(Debug, Deserialize)]
struct ErrorData {
    #[serde(rename = "type", default)]
    error_type: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: Option<UsageData>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },

    #[serde(rename = "thinking")]
    Thinking { thinking: String },

    #[serde(other)]
    Other,
}

// ──────────────────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────────────────
