//! Adapter selection by provider name or model id.

use crate::capabilities::{capabilities_of, infer_provider, recognized_by, ProviderKind};
use crate::error::ProviderError;
use crate::providers::anthropic::AnthropicProvider;
use crate::providers::gemini::GeminiProvider;
use crate::providers::openai::{new_deepseek_provider, new_openai_provider};
use crate::traits::Provider;
use std::collections::HashMap;
use std::sync::Arc;

/// Connection settings for one backend.
#[derive(Debug, Clone, Default)]
pub struct ProviderSettings {
    /// API key; falls back to the backend's `*_API_KEY` env var when unset.
    pub api_key: Option<String>,
    /// Base URL override (proxies, tests).
    pub base_url: Option<String>,
}

impl ProviderSettings {
    fn resolve_key(&self, kind: ProviderKind) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var(kind.api_key_env()).ok())
            .filter(|k| !k.trim().is_empty())
    }
}

/// Holds one shared adapter per configured backend for the process lifetime.
///
/// Backends without an API key are simply absent; asking for one yields
/// [`ProviderError::Auth`] naming the missing variable.
#[derive(Clone)]
pub struct ProviderFactory {
    providers: HashMap<ProviderKind, Arc<dyn Provider>>,
    default_text: ProviderKind,
    default_image: ProviderKind,
}

impl ProviderFactory {
    /// An empty factory; adapters are added with [`register`](Self::register).
    pub fn new(default_text: ProviderKind, default_image: ProviderKind) -> Self {
        Self {
            providers: HashMap::new(),
            default_text,
            default_image,
        }
    }

    /// Build every backend that has a key, from explicit settings or env.
    pub fn from_settings(
        settings: &HashMap<ProviderKind, ProviderSettings>,
        default_text: ProviderKind,
        default_image: ProviderKind,
    ) -> Self {
        let mut factory = Self::new(default_text, default_image);
        let empty = ProviderSettings::default();

        for kind in ProviderKind::ALL {
            let entry = settings.get(&kind).unwrap_or(&empty);
            let Some(key) = entry.resolve_key(kind) else {
                tracing::debug!(provider = %kind, "no API key, backend not registered");
                continue;
            };
            let base_url = entry.base_url.clone();

            let provider: Arc<dyn Provider> = match kind {
                ProviderKind::Gemini => {
                    let p = GeminiProvider::new(key);
                    Arc::new(match base_url {
                        Some(url) => p.with_base_url(url),
                        None => p,
                    })
                }
                ProviderKind::Anthropic => {
                    let p = AnthropicProvider::new(key);
                    Arc::new(match base_url {
                        Some(url) => p.with_base_url(url),
                        None => p,
                    })
                }
                ProviderKind::OpenAi => {
                    let p = new_openai_provider(key);
                    Arc::new(match base_url {
                        Some(url) => p.with_base_url(url),
                        None => p,
                    })
                }
                ProviderKind::DeepSeek => {
                    let p = new_deepseek_provider(key);
                    Arc::new(match base_url {
                        Some(url) => p.with_base_url(url),
                        None => p,
                    })
                }
            };
            factory.providers.insert(kind, provider);
        }

        factory
    }

    /// Register (or replace) the adapter for its kind.
    pub fn register(&mut self, provider: Arc<dyn Provider>) {
        self.providers.insert(provider.kind(), provider);
    }

    /// Builder form of [`register`](Self::register).
    pub fn with_provider(mut self, provider: Arc<dyn Provider>) -> Self {
        self.register(provider);
        self
    }

    /// Backends currently available.
    pub fn available(&self) -> Vec<ProviderKind> {
        ProviderKind::ALL
            .into_iter()
            .filter(|kind| self.providers.contains_key(kind))
            .collect()
    }

    pub fn default_text(&self) -> ProviderKind {
        self.default_text
    }

    /// Text adapter by provider name, by model id, or the configured default.
    ///
    /// A name that is not a provider is treated as a model id and resolved
    /// through registry inference.
    pub fn text_provider(&self, name: Option<&str>) -> Result<Arc<dyn Provider>, ProviderError> {
        match name.map(str::trim).filter(|n| !n.is_empty()) {
            None => self.get(self.default_text),
            Some(name) => match name.parse::<ProviderKind>() {
                Ok(kind) => self.get(kind),
                Err(_) => self.provider_for_model(name),
            },
        }
    }

    /// Adapter for image generation; the backend must declare an image model.
    pub fn image_provider(&self, name: Option<&str>) -> Result<Arc<dyn Provider>, ProviderError> {
        let kind = match name.map(str::trim).filter(|n| !n.is_empty()) {
            None => self.default_image,
            Some(name) => name.parse::<ProviderKind>()?,
        };
        if capabilities_of(kind).default_image_model.is_none() {
            return Err(ProviderError::Unsupported(format!(
                "{kind} has no image generation model"
            )));
        }
        self.get(kind)
    }

    /// Adapter inferred from a model id, falling back to the default.
    pub fn provider_for_model(&self, model: &str) -> Result<Arc<dyn Provider>, ProviderError> {
        self.get(infer_provider(model, self.default_text))
    }

    /// Explicit name wins, then model inference, then the default.
    ///
    /// A model that belongs to another backend's family is refused rather
    /// than sent to the named one.
    pub fn resolve(
        &self,
        name: Option<&str>,
        model: Option<&str>,
    ) -> Result<Arc<dyn Provider>, ProviderError> {
        match (name.filter(|n| !n.trim().is_empty()), model.filter(|m| !m.trim().is_empty())) {
            (Some(name), model) => {
                let provider = self.text_provider(Some(name))?;
                if let Some(model) = model {
                    check_model_family(provider.kind(), model)?;
                }
                Ok(provider)
            }
            (None, Some(model)) => self.provider_for_model(model),
            (None, None) => self.text_provider(None),
        }
    }

    fn get(&self, kind: ProviderKind) -> Result<Arc<dyn Provider>, ProviderError> {
        self.providers.get(&kind).cloned().ok_or_else(|| {
            ProviderError::Auth(format!(
                "{kind} is not configured; set {}",
                kind.api_key_env()
            ))
        })
    }
}

fn check_model_family(kind: ProviderKind, model: &str) -> Result<(), ProviderError> {
    if capabilities_of(kind).recognizes(model) {
        return Ok(());
    }
    match recognized_by(model) {
        Some(owner) => Err(ProviderError::Unsupported(format!(
            "model {model} is served by {owner}, not {kind}"
        ))),
        None => Ok(()),
    }
}

impl std::fmt::Debug for ProviderFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderFactory")
            .field("providers", &self.available())
            .field("default_text", &self.default_text)
            .field("default_image", &self.default_image)
            .finish()
    }
}
