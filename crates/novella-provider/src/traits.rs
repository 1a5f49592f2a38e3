//! Provider trait definition.

use crate::capabilities::{capabilities_of, ProviderCapabilities, ProviderKind};
use crate::error::ProviderError;
use crate::types::{ChunkStream, GenerateRequest, TextResult};
use async_trait::async_trait;

/// Trait for generation backend adapters.
///
/// Adapters translate a [`GenerateRequest`] into one backend's native call and
/// normalize whatever comes back. They hold no per-request state and are
/// shared across concurrent requests.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Which backend this adapter talks to.
    fn kind(&self) -> ProviderKind;

    /// Provider name (e.g., "gemini", "anthropic").
    fn name(&self) -> &str {
        self.kind().as_str()
    }

    /// Static feature declaration for this backend.
    fn capabilities(&self) -> &'static ProviderCapabilities {
        capabilities_of(self.kind())
    }

    /// The model a request will be served by.
    fn resolve_model(&self, request: &GenerateRequest) -> String {
        request
            .model
            .clone()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| self.capabilities().default_text_model.to_string())
    }

    /// Send a non-streaming request and collect the full result.
    ///
    /// Transport and API failures are returned as errors; nothing is retried.
    async fn generate(&self, request: GenerateRequest) -> Result<TextResult, ProviderError>;

    /// Send a streaming request.
    ///
    /// The backend call is issued when the stream is first polled. Failures
    /// surface as a single terminal `Error` chunk.
    fn generate_stream(&self, request: GenerateRequest) -> ChunkStream;
}

// Compile-time check: Provider must be object-safe
const _: () = {
    fn _assert_object_safe(_: &dyn Provider) {}
};
