//! novella-provider: generation backend abstraction, adapters and selection.

pub mod capabilities;
mod error;
pub mod factory;
pub mod providers;
pub mod sequencer;
pub mod sse;
pub mod traits;
mod transport;
pub mod types;

pub use capabilities::{
    all_capabilities, capabilities_of, infer_provider, recognized_by, ProviderCapabilities,
    ProviderKind,
};
pub use error::ProviderError;
pub use factory::{ProviderFactory, ProviderSettings};
pub use providers::anthropic::AnthropicProvider;
pub use providers::gemini::GeminiProvider;
pub use providers::openai::{new_deepseek_provider, new_openai_provider};
pub use providers::openai_compat::{OpenAiCompatConfig, OpenAiCompatProvider};
pub use sequencer::{ChunkSequencer, RawEvent};
pub use traits::Provider;
pub use types::{
    merge_native, ChunkStream, GenerateRequest, StreamChunk, TextResult, ThinkingConfig,
    ThinkingLevel, TokenUsage,
};
