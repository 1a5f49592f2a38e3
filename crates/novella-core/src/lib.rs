//! novella-core: request admission, credit gating and generation streaming.

pub mod auth;
pub mod config;
mod error;
pub mod orchestrator;
pub mod prompt;
pub mod rate_limit;
pub mod rejection;
pub mod request;
pub mod wire;

pub use auth::{Authenticator, OriginPolicy, StaticTokenAuthenticator};
pub use config::{Config, ConfigStore, RateLimitSettings};
pub use error::CoreError;
pub use orchestrator::{
    GenerationStream, InboundRequest, Orchestrator, OrchestratorSettings, Services,
};
pub use prompt::{build_prompt, BuiltPrompt};
pub use rate_limit::{RateDecision, RateLimiter, SlidingWindowLimiter, Unlimited};
pub use rejection::Rejection;
pub use request::{parse_body, request_schema, ContentType, GenerateBody};
pub use wire::{WireEvent, WireUsage};
