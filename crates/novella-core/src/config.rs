use crate::auth::OriginPolicy;
use crate::error::CoreError;
use crate::rate_limit::SlidingWindowLimiter;
use novella_context::ContextSettings;
use novella_ledger::Tariff;
use novella_provider::{ProviderFactory, ProviderKind, ProviderSettings};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Per-identity request budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    pub max_requests: u32,
    pub window_secs: u64,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            max_requests: 10,
            window_secs: 60,
        }
    }
}

/// Serialized settings from ~/.novella/config.json
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub default_text_provider: String,
    pub default_image_provider: String,
    pub default_model: Option<String>,
    /// Keyed by provider name.
    pub api_keys: HashMap<String, String>,
    /// Keyed by provider name.
    pub base_urls: HashMap<String, String>,
    /// Empty allows every origin.
    pub allowed_origins: Vec<String>,
    pub rate_limit: RateLimitSettings,
    pub default_thinking_budget: u32,
    pub tariff: Tariff,
    pub context: ContextSettings,
    /// Cap applied to each stored prompt field.
    pub prompt_input_max_chars: usize,
    /// Wire events buffered between the producer task and the caller.
    pub stream_buffer: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_text_provider: "gemini".to_string(),
            default_image_provider: "gemini".to_string(),
            default_model: None,
            api_keys: HashMap::new(),
            base_urls: HashMap::new(),
            allowed_origins: Vec::new(),
            rate_limit: RateLimitSettings::default(),
            default_thinking_budget: 2_048,
            tariff: Tariff::default(),
            context: ContextSettings::default(),
            prompt_input_max_chars: 4_000,
            stream_buffer: 32,
        }
    }
}

impl Config {
    fn kind(name: &str, field: &str) -> Result<ProviderKind, CoreError> {
        name.parse()
            .map_err(|_| CoreError::Config(format!("{field}: unknown provider '{name}'")))
    }

    /// Keys and base URLs per backend, as the provider factory wants them.
    pub fn provider_settings(&self) -> HashMap<ProviderKind, ProviderSettings> {
        ProviderKind::ALL
            .into_iter()
            .map(|kind| {
                let settings = ProviderSettings {
                    api_key: self
                        .api_keys
                        .get(kind.as_str())
                        .filter(|k| !k.is_empty())
                        .cloned(),
                    base_url: self.base_urls.get(kind.as_str()).cloned(),
                };
                (kind, settings)
            })
            .collect()
    }

    /// Build the provider factory from keys in this config or the environment.
    pub fn provider_factory(&self) -> Result<ProviderFactory, CoreError> {
        let text = Self::kind(&self.default_text_provider, "default_text_provider")?;
        let image = Self::kind(&self.default_image_provider, "default_image_provider")?;
        Ok(ProviderFactory::from_settings(
            &self.provider_settings(),
            text,
            image,
        ))
    }

    pub fn origin_policy(&self) -> OriginPolicy {
        OriginPolicy::new(self.allowed_origins.clone())
    }

    pub fn rate_limiter(&self) -> SlidingWindowLimiter {
        SlidingWindowLimiter::new(
            self.rate_limit.max_requests,
            Duration::from_secs(self.rate_limit.window_secs),
        )
    }
}

/// Helper struct for storing the location to read/write global settings
pub struct ConfigStore {
    path: PathBuf,
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore {
    pub fn new() -> Self {
        let mut path = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push(".novella");
        path.push("config.json");
        Self { path }
    }

    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the user's saved config, or fallback to Default
    pub fn load(&self) -> Config {
        let Ok(content) = fs::read_to_string(&self.path) else {
            return Config::default();
        };
        match serde_json::from_str(&content) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), "ignoring unreadable config: {e}");
                Config::default()
            }
        }
    }

    /// Save the user's config back to disk
    pub fn save(&self, config: &Config) -> Result<(), CoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(config)?;
        fs::write(&self.path, content)?;
        Ok(())
    }

    /// Export stored API keys as `<PROVIDER>_API_KEY`, never overwriting process env
    pub fn hydrate_env(&self) {
        let config = self.load();
        for (provider, key) in config.api_keys.iter() {
            if !key.is_empty() {
                let env_var = format!("{}_API_KEY", provider.to_uppercase());
                if std::env::var(&env_var).is_err() {
                    std::env::set_var(&env_var, key);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_backward_compatible_defaults() {
        let legacy = r#"{
            "default_text_provider":"deepseek",
            "api_keys":{"deepseek":"k"}
        }"#;

        let parsed: Config = serde_json::from_str(legacy).unwrap();
        assert_eq!(parsed.default_text_provider, "deepseek");
        assert_eq!(parsed.default_image_provider, "gemini");
        assert_eq!(parsed.rate_limit, RateLimitSettings::default());
        assert_eq!(parsed.tariff, Tariff::default());
        assert!(parsed.allowed_origins.is_empty());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::with_path(dir.path().join("nested").join("config.json"));
        let config = Config {
            allowed_origins: vec!["https://novella.app".to_string()],
            default_thinking_budget: 4_096,
            ..Config::default()
        };
        store.save(&config).unwrap();
        assert_eq!(store.load(), config);
    }

    #[test]
    fn test_unreadable_config_falls_back_to_default() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert_eq!(ConfigStore::with_path(path).load(), Config::default());
    }

    #[test]
    fn test_provider_factory_rejects_unknown_default() {
        let config = Config {
            default_text_provider: "mystery".to_string(),
            ..Config::default()
        };
        assert!(matches!(
            config.provider_factory(),
            Err(CoreError::Config(_))
        ));
    }

    #[test]
    fn test_provider_settings_use_stored_keys() {
        let mut config = Config::default();
        config.api_keys.insert("anthropic".into(), "a-key".into());
        config.base_urls.insert("anthropic".into(), "http://localhost:1".into());
        let settings = config.provider_settings();
        let anthropic = &settings[&ProviderKind::Anthropic];
        assert_eq!(anthropic.api_key.as_deref(), Some("a-key"));
        assert_eq!(anthropic.base_url.as_deref(), Some("http://localhost:1"));
    }
}
