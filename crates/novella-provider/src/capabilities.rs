//! Static declaration of what each generation backend supports.

use crate::error::ProviderError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The closed set of supported backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Gemini,
    #[serde(rename = "openai")]
    OpenAi,
    #[serde(rename = "deepseek")]
    DeepSeek,
    Anthropic,
}

impl ProviderKind {
    /// Every backend, in inference priority order.
    pub const ALL: [ProviderKind; 4] = [
        ProviderKind::Gemini,
        ProviderKind::Anthropic,
        ProviderKind::DeepSeek,
        ProviderKind::OpenAi,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Gemini => "gemini",
            ProviderKind::OpenAi => "openai",
            ProviderKind::DeepSeek => "deepseek",
            ProviderKind::Anthropic => "anthropic",
        }
    }

    /// Environment variable consulted for this backend's API key.
    pub fn api_key_env(&self) -> &'static str {
        match self {
            ProviderKind::Gemini => "GEMINI_API_KEY",
            ProviderKind::OpenAi => "OPENAI_API_KEY",
            ProviderKind::DeepSeek => "DEEPSEEK_API_KEY",
            ProviderKind::Anthropic => "ANTHROPIC_API_KEY",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProviderKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ProviderError::UnknownProvider(s.to_string()))
    }
}

/// How a pattern is compared against a normalized model id.
#[derive(Debug, Clone, Copy)]
enum ModelRule {
    Prefix(&'static str),
    Contains(&'static str),
}

impl ModelRule {
    fn matches(&self, model: &str) -> bool {
        match self {
            ModelRule::Prefix(p) => model.starts_with(p),
            ModelRule::Contains(p) => model.contains(p),
        }
    }
}

/// Read-only feature declaration for one backend.
#[derive(Debug, Clone, Copy)]
pub struct ProviderCapabilities {
    pub kind: ProviderKind,
    pub name: &'static str,
    pub default_text_model: &'static str,
    pub default_image_model: Option<&'static str>,
    pub supports_streaming: bool,
    pub supports_json_mode: bool,
    thinking_models: &'static [ModelRule],
    model_patterns: &'static [ModelRule],
}

impl ProviderCapabilities {
    /// Whether `model` exposes a reasoning trace / accepts thinking settings.
    pub fn supports_thinking(&self, model: &str) -> bool {
        let model = normalize_model(model);
        self.thinking_models.iter().any(|rule| rule.matches(&model))
    }

    /// Whether `model` looks like one of this backend's model ids.
    pub fn recognizes(&self, model: &str) -> bool {
        let model = normalize_model(model);
        self.model_patterns.iter().any(|rule| rule.matches(&model))
    }
}

const REGISTRY: &[ProviderCapabilities] = &[
    ProviderCapabilities {
        kind: ProviderKind::Gemini,
        name: "gemini",
        default_text_model: "gemini-2.5-flash",
        default_image_model: Some("gemini-2.5-flash-image"),
        supports_streaming: true,
        supports_json_mode: true,
        thinking_models: &[ModelRule::Prefix("gemini-2.5"), ModelRule::Prefix("gemini-3")],
        model_patterns: &[ModelRule::Contains("gemini"), ModelRule::Prefix("imagen")],
    },
    ProviderCapabilities {
        kind: ProviderKind::Anthropic,
        name: "anthropic",
        default_text_model: "claude-sonnet-4-20250514",
        default_image_model: None,
        supports_streaming: true,
        supports_json_mode: false,
        thinking_models: &[
            ModelRule::Prefix("claude-sonnet-4"),
            ModelRule::Prefix("claude-opus-4"),
            ModelRule::Prefix("claude-haiku-4"),
            ModelRule::Prefix("claude-3-7-sonnet"),
        ],
        model_patterns: &[ModelRule::Contains("claude")],
    },
    ProviderCapabilities {
        kind: ProviderKind::DeepSeek,
        name: "deepseek",
        default_text_model: "deepseek-chat",
        default_image_model: None,
        supports_streaming: true,
        supports_json_mode: true,
        thinking_models: &[
            ModelRule::Prefix("deepseek-reasoner"),
            ModelRule::Prefix("deepseek-r1"),
        ],
        model_patterns: &[ModelRule::Contains("deepseek")],
    },
    ProviderCapabilities {
        kind: ProviderKind::OpenAi,
        name: "openai",
        default_text_model: "gpt-4o",
        default_image_model: Some("gpt-image-1"),
        supports_streaming: true,
        supports_json_mode: true,
        thinking_models: &[
            ModelRule::Prefix("o1"),
            ModelRule::Prefix("o3"),
            ModelRule::Prefix("o4"),
            ModelRule::Prefix("gpt-5"),
        ],
        model_patterns: &[
            ModelRule::Prefix("gpt"),
            ModelRule::Prefix("chatgpt"),
            ModelRule::Prefix("o1"),
            ModelRule::Prefix("o3"),
            ModelRule::Prefix("o4"),
            ModelRule::Prefix("dall-e"),
        ],
    },
];

/// Lowercase and strip the `models/` resource prefix some backends echo back.
fn normalize_model(model: &str) -> String {
    let model = model.trim().to_ascii_lowercase();
    match model.strip_prefix("models/") {
        Some(rest) => rest.to_string(),
        None => model,
    }
}

/// Returns the whole registry.
pub fn all_capabilities() -> &'static [ProviderCapabilities] {
    REGISTRY
}

/// Capabilities of one backend.
pub fn capabilities_of(kind: ProviderKind) -> &'static ProviderCapabilities {
    REGISTRY
        .iter()
        .find(|caps| caps.kind == kind)
        .unwrap_or(&REGISTRY[0])
}

/// Infer the backend that serves `model`, falling back to `default` for
/// unrecognized ids.
pub fn infer_provider(model: &str, default: ProviderKind) -> ProviderKind {
    recognized_by(model).unwrap_or(default)
}

/// The first backend whose model patterns match `model`.
pub fn recognized_by(model: &str) -> Option<ProviderKind> {
    REGISTRY
        .iter()
        .find(|caps| caps.recognizes(model))
        .map(|caps| caps.kind)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_kind_is_registered() {
        for kind in ProviderKind::ALL {
            assert_eq!(capabilities_of(kind).kind, kind);
            assert_eq!(capabilities_of(kind).name, kind.as_str());
        }
    }

    #[test]
    fn test_infer_provider_by_pattern() {
        let d = ProviderKind::Gemini;
        assert_eq!(infer_provider("gemini-2.5-pro", d), ProviderKind::Gemini);
        assert_eq!(infer_provider("models/gemini-2.0-flash", d), ProviderKind::Gemini);
        assert_eq!(infer_provider("claude-sonnet-4-20250514", d), ProviderKind::Anthropic);
        assert_eq!(infer_provider("deepseek-reasoner", d), ProviderKind::DeepSeek);
        assert_eq!(infer_provider("gpt-4o-mini", d), ProviderKind::OpenAi);
        assert_eq!(infer_provider("o3-mini", d), ProviderKind::OpenAi);
        assert_eq!(infer_provider("GPT-4O", d), ProviderKind::OpenAi);
    }

    #[test]
    fn test_unknown_model_falls_back_to_default() {
        assert_eq!(
            infer_provider("mystery-model-9", ProviderKind::DeepSeek),
            ProviderKind::DeepSeek
        );
        assert_eq!(infer_provider("", ProviderKind::OpenAi), ProviderKind::OpenAi);
    }

    #[test]
    fn test_supports_thinking_is_per_model() {
        let gemini = capabilities_of(ProviderKind::Gemini);
        assert!(gemini.supports_thinking("gemini-2.5-pro"));
        assert!(gemini.supports_thinking("gemini-3-pro-preview"));
        assert!(!gemini.supports_thinking("gemini-2.0-flash"));

        let deepseek = capabilities_of(ProviderKind::DeepSeek);
        assert!(deepseek.supports_thinking("deepseek-reasoner"));
        assert!(!deepseek.supports_thinking("deepseek-chat"));

        let openai = capabilities_of(ProviderKind::OpenAi);
        assert!(openai.supports_thinking("o3-mini"));
        assert!(!openai.supports_thinking("gpt-4o"));
    }

    #[test]
    fn test_json_mode_and_image_declarations() {
        assert!(!capabilities_of(ProviderKind::Anthropic).supports_json_mode);
        assert!(capabilities_of(ProviderKind::Gemini).default_image_model.is_some());
        assert!(capabilities_of(ProviderKind::DeepSeek).default_image_model.is_none());
    }

    #[test]
    fn test_provider_kind_from_str() {
        assert_eq!("OpenAI".parse::<ProviderKind>().unwrap(), ProviderKind::OpenAi);
        assert_eq!(" gemini ".parse::<ProviderKind>().unwrap(), ProviderKind::Gemini);
        assert!("cohere".parse::<ProviderKind>().is_err());
    }
}
