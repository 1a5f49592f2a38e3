//! Google Gemini provider implementation.
//!
//! Talks to the native `generateContent` API. Reasoning text arrives as
//! ordinary parts flagged with `thought: true`, and `usageMetadata` may ride
//! along on any chunk.

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

const API_BASE: &str = "https://generativelanguage.googleapis.com";
/// The 2.5 Pro model cannot turn reasoning off and rejects budgets below this.
const PRO_MIN_THINKING_BUDGET: u32 = 128;
/// Budget value asking the backend to size reasoning itself.
const DYNAMIC_THINKING_BUDGET: i64 = -1;
const BLOCKING_FINISH_REASONS: &[&str] = &[
    "SAFETY",
    "RECITATION",
    "BLOCKLIST",
    "PROHIBITED_CONTENT",
    "SPII",
];

/// Gemini provider.
pub struct GeminiProvider {
    transport: HttpTransport,
    api_key: String,
    base_url: String,
}

impl GeminiProvider {
    /// Create a new Gemini provider with the given API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            transport: HttpTransport::new("gemini"),
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

    fn http_request(&self, model: &str, method: &str, body: Value) -> HttpRequest {
        let mut url = format!("{}/v1beta/models/{}:{}", self.base_url, model, method);
        if method == "streamGenerateContent" {
            url.push_str("?alt=sse");
        }
        HttpRequest {
            url,
            headers: vec![("x-goog-api-key", self.api_key.clone())],
            body,
        }
    }

    /// Convert a unified request into the Gemini request body.
    fn build_request_body(&self, model: &str, request: &GenerateRequest) -> Value {
        let mut generation_config = json!({});
        if let Some(max_tokens) = request.max_tokens {
            generation_config["maxOutputTokens"] = json!(max_tokens);
        }
        if let Some(temperature) = request.temperature {
            generation_config["temperature"] = json!(temperature);
        }
        if request.json_mode {
            generation_config["responseMimeType"] = json!("application/json");
        }
        if let Some(thinking) = self.thinking_config(model, request) {
            generation_config["thinkingConfig"] = thinking;
        }

        let mut body = json!({
            "contents": [{
                "role": "user",
                "parts": [{"text": request.user_prompt}],
            }],
            "generationConfig": generation_config,
        });

        if let Some(ref system) = request.system_prompt {
            body["systemInstruction"] = json!({"parts": [{"text": system}]});
        }

        if let Some(ref overrides) = request.native_overrides {
            merge_native(&mut body, overrides);
        }

        body
    }

    /// Map unified thinking settings onto `thinkingConfig`.
    ///
    /// 3.x models take a level; 2.5 models take a token budget. The Pro model
    /// always reasons, so "disabled" becomes the minimum budget with the
    /// trace hidden.
    fn thinking_config(&self, model: &str, request: &GenerateRequest) -> Option<Value> {
        if !self.capabilities().supports_thinking(model) {
            if request.thinking_enabled().is_some() {
                tracing::debug!(model, "thinking requested for a model without reasoning support");
            }
            return None;
        }

        let model = model.to_ascii_lowercase();
        let thinking = request.thinking_enabled();
        let include = thinking.is_some_and(|t| t.wants_trace());

        if model.contains("gemini-3") {
            let level = match thinking {
                Some(t) => t.level.unwrap_or(ThinkingLevel::High),
                None => ThinkingLevel::Low,
            };
            return Some(json!({
                "thinkingLevel": level.as_str(),
                "includeThoughts": include,
            }));
        }

        let is_pro = model.contains("2.5-pro");
        let budget: i64 = match thinking {
            Some(t) => match t.budget {
                Some(b) if is_pro => i64::from(b.max(PRO_MIN_THINKING_BUDGET)),
                Some(b) => i64::from(b),
                None => DYNAMIC_THINKING_BUDGET,
            },
            None if is_pro => i64::from(PRO_MIN_THINKING_BUDGET),
            None => 0,
        };

        Some(json!({
            "thinkingBudget": budget,
            "includeThoughts": include,
        }))
    }

    /// Parse one streamed chunk.
    fn parse_chunk(data: &str) -> Result<Vec<RawEvent>, ProviderError> {
        let chunk: GeminiResponse = serde_json::from_str(data)
            .map_err(|e| ProviderError::Malformed(format!("gemini chunk: {e}")))?;
        chunk.into_events()
    }

    /// Fold a single-shot response into text, thinking and usage.
    fn parse_response(value: Value, model: &str) -> Result<TextResult, ProviderError> {
        let response: GeminiResponse = serde_json::from_value(value)
            .map_err(|e| ProviderError::Malformed(format!("gemini response: {e}")))?;

        let mut text = String::new();
        let mut thinking = String::new();
        let mut usage = TokenUsage::default();
        for event in response.into_events()? {
            match event {
                RawEvent::Content(t) => text.push_str(&t),
                RawEvent::Thinking(t) => thinking.push_str(&t),
                RawEvent::Usage(u) => usage.merge(&u),
                RawEvent::Failed(message) => return Err(ProviderError::Api(message)),
            }
        }

        Ok(TextResult {
            text,
            thinking: (!thinking.is_empty()).then_some(thinking),
            usage,
            model: model.to_string(),
        })
    }
}

#[async_trait]
impl Provider for GeminiProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Gemini
    }

    async fn generate(&self, request: GenerateRequest) -> Result<TextResult, ProviderError> {
        let model = self.resolve_model(&request);
        let body = self.build_request_body(&model, &request);
        let value = self
            .transport
            .post_json(&self.http_request(&model, "generateContent", body))
            .await?;
        Self::parse_response(value, &model)
    }

    fn generate_stream(&self, request: GenerateRequest) -> ChunkStream {
        let model = self.resolve_model(&request);
        let body = self.build_request_body(&model, &request);
        // includeThoughts already gates the trace server-side.
        self.transport.event_stream(
            self.http_request(&model, "streamGenerateContent", body),
            Self::parse_chunk,
            true,
        )
    }
}

// ──────────────────────────────────────────────────────────
// Gemini response types (internal)
// ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
    #[serde(default)]
    error: Option<ErrorData>,
}

impl GeminiResponse {
    fn into_events(self) -> Result<Vec<RawEvent>, ProviderError> {
        if let Some(error) = self.error {
            return Err(ProviderError::Api(format!(
                "{} {}: {}",
                error.code, error.status, error.message
            )));
        }
        if let Some(reason) = self.prompt_feedback.and_then(|f| f.block_reason) {
            return Err(ProviderError::Api(format!("prompt blocked: {reason}")));
        }

        let mut events = Vec::new();
        for candidate in self.candidates {
            for part in candidate.content.map(|c| c.parts).unwrap_or_default() {
                let Some(text) = part.text else { continue };
                if part.thought {
                    events.push(RawEvent::Thinking(text));
                } else {
                    events.push(RawEvent::Content(text));
                }
            }
            if let Some(reason) = candidate.finish_reason {
                if BLOCKING_FINISH_REASONS.contains(&reason.as_str()) {
                    return Err(ProviderError::Api(format!("generation blocked: {reason}")));
                }
            }
        }

        if let Some(usage) = self.usage_metadata {
            events.push(RawEvent::Usage(
                TokenUsage::new(
                    usage.prompt_token_count,
                    usage.candidates_token_count,
                    usage.total_token_count,
                )
                .with_thinking_tokens(usage.thoughts_token_count)
                .with_cached_tokens(usage.cached_content_token_count),
            ));
        }

        Ok(events)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    thought: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u64,
    #[serde(default)]
    candidates_token_count: u64,
    #[serde(default)]
    thoughts_token_count: Option<u64>,
    #[serde(default)]
    cached_content_token_count: Option<u64>,
    #[serde(default)]
    total_token_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorData {
    #[serde(default)]
    code: u16,
    #[serde(default)]
    status: String,
    #[serde(default)]
    message: String,
}

// ──────────────────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ThinkingConfig;

    fn provider() -> GeminiProvider {
        GeminiProvider::new("test-key")
    }

    #[test]
    fn test_provider_name_and_default_model() {
        let p = provider();
        assert_eq!(p.name(), "gemini");
        assert_eq!(p.resolve_model(&GenerateRequest::new("hi")), "gemini-2.5-flash");
    }

    #[test]
    fn test_build_request_body() {
        let request = GenerateRequest::new("Write a chapter")
            .with_system("You are a novelist.")
            .with_max_tokens(4000)
            .with_temperature(0.8)
            .with_json_mode(true);

        let body = provider().build_request_body("gemini-2.0-flash", &request);
        assert_eq!(body["contents"][0]["parts"][0]["text"], "Write a chapter");
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "You are a novelist.");
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 4000);
        assert_eq!(body["generationConfig"]["responseMimeType"], "application/json");
        assert!(body["generationConfig"]["thinkingConfig"].is_null());
    }

    #[test]
    fn test_pro_cannot_disable_thinking() {
        let body = provider().build_request_body("gemini-2.5-pro", &GenerateRequest::new("x"));
        let thinking = &body["generationConfig"]["thinkingConfig"];
        assert_eq!(thinking["thinkingBudget"], 128);
        assert_eq!(thinking["includeThoughts"], false);
    }

    #[test]
    fn test_pro_budget_is_clamped_to_minimum() {
        let request = GenerateRequest::new("x").with_thinking(ThinkingConfig::with_budget(16));
        let body = provider().build_request_body("gemini-2.5-pro", &request);
        assert_eq!(body["generationConfig"]["thinkingConfig"]["thinkingBudget"], 128);
        assert_eq!(body["generationConfig"]["thinkingConfig"]["includeThoughts"], true);
    }

    #[test]
    fn test_flash_disables_thinking_with_zero_budget() {
        let body = provider().build_request_body("gemini-2.5-flash", &GenerateRequest::new("x"));
        assert_eq!(body["generationConfig"]["thinkingConfig"]["thinkingBudget"], 0);

        let request = GenerateRequest::new("x").with_thinking(ThinkingConfig {
            enabled: true,
            ..Default::default()
        });
        let body = provider().build_request_body("gemini-2.5-flash", &request);
        assert_eq!(body["generationConfig"]["thinkingConfig"]["thinkingBudget"], -1);
    }

    #[test]
    fn test_gemini_3_uses_thinking_level() {
        let request = GenerateRequest::new("x").with_thinking(ThinkingConfig {
            enabled: true,
            level: Some(ThinkingLevel::Low),
            ..Default::default()
        });
        let body = provider().build_request_body("gemini-3-pro-preview", &request);
        let thinking = &body["generationConfig"]["thinkingConfig"];
        assert_eq!(thinking["thinkingLevel"], "low");
        assert!(thinking.get("thinkingBudget").is_none());
    }

    #[test]
    fn test_native_overrides_are_merged() {
        let overrides = json!({"generationConfig": {"topK": 5}, "safetySettings": []});
        let request = GenerateRequest::new("x")
            .with_max_tokens(10)
            .with_native_overrides(overrides.as_object().unwrap().clone());
        let body = provider().build_request_body("gemini-2.0-flash", &request);
        assert_eq!(body["generationConfig"]["topK"], 5);
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 10);
        assert!(body["safetySettings"].is_array());
    }

    #[test]
    fn test_parse_thought_and_text_parts() {
        let data = r#"{"candidates":[{"content":{"parts":[{"text":"plan","thought":true},{"text":"Once"}]}}],"usageMetadata":{"promptTokenCount":12,"candidatesTokenCount":3,"thoughtsTokenCount":4,"totalTokenCount":19}}"#;
        let events = GeminiProvider::parse_chunk(data).unwrap();
        assert_eq!(events[0], RawEvent::Thinking("plan".to_string()));
        assert_eq!(events[1], RawEvent::Content("Once".to_string()));
        match &events[2] {
            RawEvent::Usage(u) => {
                assert_eq!(u.input_tokens, 12);
                assert_eq!(u.output_tokens, 3);
                assert_eq!(u.thinking_tokens, Some(4));
                assert_eq!(u.total_tokens, 19);
            }
            other => panic!("Expected usage, got: {other:?}"),
        }
    }

    #[test]
    fn test_parse_blocked_finish_reason() {
        let data = r#"{"candidates":[{"content":{"parts":[]},"finishReason":"SAFETY"}]}"#;
        assert!(matches!(
            GeminiProvider::parse_chunk(data),
            Err(ProviderError::Api(msg)) if msg.contains("SAFETY")
        ));
    }

    #[test]
    fn test_parse_error_payload_and_garbage() {
        let data = r#"{"error":{"code":503,"status":"UNAVAILABLE","message":"overloaded"}}"#;
        assert!(GeminiProvider::parse_chunk(data).is_err());
        assert!(matches!(
            GeminiProvider::parse_chunk("not json"),
            Err(ProviderError::Malformed(_))
        ));
    }

    #[test]
    fn test_parse_single_shot_response() {
        let value = json!({
            "candidates": [{"content": {"parts": [
                {"text": "think", "thought": true},
                {"text": "Hello "},
                {"text": "world"}
            ]}, "finishReason": "STOP"}],
            "usageMetadata": {"promptTokenCount": 5, "candidatesTokenCount": 2, "totalTokenCount": 9}
        });
        let result = GeminiProvider::parse_response(value, "gemini-2.5-flash").unwrap();
        assert_eq!(result.text, "Hello world");
        assert_eq!(result.thinking.as_deref(), Some("think"));
        assert_eq!(result.usage.total_tokens, 9);
    }

    #[test]
    fn test_stream_url_uses_sse() {
        let p = provider().with_base_url("http://localhost:9/");
        let req = p.http_request("gemini-2.5-flash", "streamGenerateContent", json!({}));
        assert_eq!(
            req.url,
            "http://localhost:9/v1beta/models/gemini-2.5-flash:streamGenerateContent?alt=sse"
        );
    }
}
