//! Caller identity and origin checks.

use async_trait::async_trait;
use std::collections::HashMap;

/// Resolves a bearer token to a user id.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// `None` when the token is missing, unknown or expired.
    async fn authenticate(&self, token: Option<&str>) -> Option<String>;
}

/// Fixed token table.
#[derive(Debug, Clone, Default)]
pub struct StaticTokenAuthenticator {
    tokens: HashMap<String, String>,
}

impl StaticTokenAuthenticator {
    pub fn new(tokens: HashMap<String, String>) -> Self {
        Self { tokens }
    }

    pub fn with_token(mut self, token: impl Into<String>, user_id: impl Into<String>) -> Self {
        self.tokens.insert(token.into(), user_id.into());
        self
    }
}

#[async_trait]
impl Authenticator for StaticTokenAuthenticator {
    async fn authenticate(&self, token: Option<&str>) -> Option<String> {
        let token = token?.trim();
        let token = token.strip_prefix("Bearer ").unwrap_or(token).trim();
        if token.is_empty() {
            return None;
        }
        self.tokens.get(token).cloned()
    }
}

/// Allowlist of request origins. An empty list allows every origin.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OriginPolicy {
    allowed: Vec<String>,
}

impl OriginPolicy {
    pub fn new(allowed: Vec<String>) -> Self {
        let allowed = allowed
            .into_iter()
            .map(|o| normalize_origin(&o))
            .filter(|o| !o.is_empty())
            .collect();
        Self { allowed }
    }

    pub fn allow_all() -> Self {
        Self::default()
    }

    /// With a nonempty allowlist a missing origin is refused.
    pub fn allows(&self, origin: Option<&str>) -> bool {
        if self.allowed.is_empty() {
            return true;
        }
        match origin {
            Some(origin) => {
                let origin = normalize_origin(origin);
                self.allowed.iter().any(|a| *a == origin)
            }
            None => false,
        }
    }
}

fn normalize_origin(origin: &str) -> String {
    origin.trim().trim_end_matches('/').to_ascii_lowercase()
}
