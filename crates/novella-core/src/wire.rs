//! Line-framed wire protocol: one JSON object per event.

use novella_provider::{StreamChunk, TokenUsage};
use serde::{Deserialize, Serialize};

/// Token counts as they appear on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireUsage {
    pub prompt_token_count: u64,
    pub candidates_token_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thoughts_token_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cached_content_token_count: Option<u64>,
    pub total_token_count: u64,
}

impl From<TokenUsage> for WireUsage {
    fn from(u: TokenUsage) -> Self {
        Self {
            prompt_token_count: u.input_tokens,
            candidates_token_count: u.output_tokens,
            thoughts_token_count: u.thinking_tokens,
            cached_content_token_count: u.cached_tokens,
            total_token_count: u.total_tokens,
        }
    }
}

/// One event of a generation stream.
///
/// Order: `credit` first, then content/thinking, at most one `usage`, then
/// exactly one of `done` or `error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WireEvent {
    Credit { credits: u64, balance: u64 },
    Content { text: String },
    Thinking { text: String },
    Usage { usage: WireUsage },
    Done,
    Error { message: String },
}

impl WireEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, WireEvent::Done | WireEvent::Error { .. })
    }

    /// Serialize as one newline-terminated line.
    pub fn to_line(&self) -> String {
        match serde_json::to_string(self) {
            Ok(json) => format!("{json}\n"),
            // unreachable for these shapes
            Err(_) => "{\"type\":\"error\",\"message\":\"serialization failed\"}\n".to_string(),
        }
    }
}

impl From<StreamChunk> for WireEvent {
    fn from(chunk: StreamChunk) -> Self {
        match chunk {
            StreamChunk::Content { text } => WireEvent::Content { text },
            StreamChunk::Thinking { text } => WireEvent::Thinking { text },
            StreamChunk::Usage { usage } => WireEvent::Usage {
                usage: usage.into(),
            },
            StreamChunk::Done => WireEvent::Done,
            StreamChunk::Error { message } => WireEvent::Error { message },
        }
    }
}
