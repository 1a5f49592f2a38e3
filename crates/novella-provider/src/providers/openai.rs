//! OpenAI and DeepSeek providers built on the OpenAI-compatible transport.

use crate::capabilities::ProviderKind;
use crate::providers::openai_compat::{OpenAiCompatConfig, OpenAiCompatProvider};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com/v1";

/// Create a new OpenAI provider.
///
/// Set the `OPENAI_API_KEY` environment variable.
pub fn new_openai_provider(api_key: String) -> OpenAiCompatProvider {
    OpenAiCompatProvider::new(OpenAiCompatConfig {
        kind: ProviderKind::OpenAi,
        base_url: OPENAI_BASE_URL.to_string(),
        api_key,
    })
}

/// Create a new DeepSeek provider.
///
/// `deepseek-reasoner` streams its chain of thought as `reasoning_content`.
/// Set the `DEEPSEEK_API_KEY` environment variable.
pub fn new_deepseek_provider(api_key: String) -> OpenAiCompatProvider {
    OpenAiCompatProvider::new(OpenAiCompatConfig {
        kind: ProviderKind::DeepSeek,
        base_url: DEEPSEEK_BASE_URL.to_string(),
        api_key,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::Provider;
    use crate::types::GenerateRequest;

    #[test]
    fn test_openai_provider_name() {
        let p = new_openai_provider("test-key".to_string());
        assert_eq!(p.name(), "openai");
        assert!(p.capabilities().supports_json_mode);
    }

    #[test]
    fn test_openai_default_model() {
        let p = new_openai_provider("test-key".to_string());
        assert_eq!(p.resolve_model(&GenerateRequest::new("x")), "gpt-4o");
    }

    #[test]
    fn test_deepseek_provider_name() {
        let p = new_deepseek_provider("test-key".to_string());
        assert_eq!(p.name(), "deepseek");
        assert!(p.capabilities().supports_thinking("deepseek-reasoner"));
    }

    #[test]
    fn test_explicit_model_wins() {
        let p = new_deepseek_provider("test-key".to_string());
        let request = GenerateRequest::new("x").with_model("deepseek-reasoner");
        assert_eq!(p.resolve_model(&request), "deepseek-reasoner");
    }
}
