//! Generation orchestration: from an inbound request to a wire event stream.
//!
//! Everything up to and including the credit debit happens synchronously and
//! fails with a [`Rejection`]. After the debit the work moves into a spawned
//! producer task that feeds a bounded channel; from then on failures travel
//! in-band as an `error` event and credits are never refunded.

use crate::auth::{Authenticator, OriginPolicy};
use crate::prompt::{build_prompt, BuiltPrompt};
use crate::rate_limit::{RateDecision, RateLimiter};
use crate::rejection::Rejection;
use crate::request::{parse_body, GenerateBody};
use crate::wire::WireEvent;
use futures::channel::mpsc;
use futures::stream::{Stream, StreamExt};
use futures::SinkExt;
use novella_context::{linked_character_count, ContextAssembler, ContextQuery, LinkedChapter};
use novella_ledger::{CreditLedger, Tariff};
use novella_provider::{
    GenerateRequest, Provider, ProviderError, ProviderFactory, ProviderKind, StreamChunk,
    ThinkingConfig, TokenUsage,
};
use novella_records::{GenerationRecord, PromptInputs, RecordSink};
use serde_json::Value;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

/// A request as it arrives at the edge.
#[derive(Debug, Clone, Default)]
pub struct InboundRequest {
    pub origin: Option<String>,
    pub bearer_token: Option<String>,
    pub body: Value,
}

/// Collaborators the orchestrator drives.
#[derive(Clone)]
pub struct Services {
    pub providers: ProviderFactory,
    pub ledger: CreditLedger,
    pub context: ContextAssembler,
    pub records: Arc<dyn RecordSink>,
    pub rate_limiter: Arc<dyn RateLimiter>,
    pub authenticator: Arc<dyn Authenticator>,
    pub origins: OriginPolicy,
}

/// Request-independent knobs.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub tariff: Tariff,
    pub default_thinking_budget: u32,
    pub prompt_input_max_chars: usize,
    pub stream_buffer: usize,
    /// Model used when a request names none.
    pub default_model: Option<String>,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            tariff: Tariff::default(),
            default_thinking_budget: 2_048,
            prompt_input_max_chars: 4_000,
            stream_buffer: 32,
            default_model: None,
        }
    }
}

impl From<&crate::config::Config> for OrchestratorSettings {
    fn from(config: &crate::config::Config) -> Self {
        Self {
            tariff: config.tariff.clone(),
            default_thinking_budget: config.default_thinking_budget,
            prompt_input_max_chars: config.prompt_input_max_chars,
            stream_buffer: config.stream_buffer,
            default_model: config.default_model.clone(),
        }
    }
}

/// The composition root for one generation endpoint.
#[derive(Clone)]
pub struct Orchestrator {
    services: Services,
    settings: OrchestratorSettings,
}

/// Everything the producer task needs once credits are taken.
struct Job {
    user_id: String,
    body: GenerateBody,
    provider: Arc<dyn Provider>,
    model: String,
    thinking_budget: Option<u32>,
    linked_chapters: Vec<LinkedChapter>,
    credits: u64,
    balance: u64,
}

/// Ordered wire events of one accepted request.
///
/// Ends after the terminal event, once any record has been persisted.
/// Dropping it does not cancel generation.
pub struct GenerationStream {
    receiver: mpsc::Receiver<WireEvent>,
    credits: u64,
    balance: u64,
}

impl GenerationStream {
    /// Credits debited for this request.
    pub fn credits(&self) -> u64 {
        self.credits
    }

    /// Balance right after the debit.
    pub fn balance(&self) -> u64 {
        self.balance
    }
}

impl Stream for GenerationStream {
    type Item = WireEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_next_unpin(cx)
    }
}

impl Orchestrator {
    pub fn new(services: Services, settings: OrchestratorSettings) -> Self {
        Self { services, settings }
    }

    /// Run the pre-stream checks, debit credits and start streaming.
    pub async fn handle(&self, request: InboundRequest) -> Result<GenerationStream, Rejection> {
        let job = self.admit(request).await?;
        let (tx, rx) = mpsc::channel(self.settings.stream_buffer.max(1));
        let credits = job.credits;
        let balance = job.balance;

        let orchestrator = self.clone();
        tokio::spawn(async move { orchestrator.produce(job, tx).await });

        Ok(GenerationStream {
            receiver: rx,
            credits,
            balance,
        })
    }

    /// Checks in order, ending with the debit.
    async fn admit(&self, request: InboundRequest) -> Result<Job, Rejection> {
        let s = &self.services;

        if !s.origins.allows(request.origin.as_deref()) {
            tracing::info!(origin = ?request.origin, "rejected: origin");
            return Err(Rejection::InvalidOrigin {
                origin: request.origin,
            });
        }

        let user_id = s
            .authenticator
            .authenticate(request.bearer_token.as_deref())
            .await
            .ok_or(Rejection::Unauthenticated)?;

        let body = parse_body(&request.body)
            .map_err(|errors| Rejection::InvalidRequest { errors })?;

        if let RateDecision::Limited { retry_after } = s.rate_limiter.check(&user_id).await {
            tracing::info!(user_id = %user_id, "rejected: rate limited");
            return Err(Rejection::RateLimited {
                retry_after_secs: retry_after.as_secs_f64().ceil() as u64,
            });
        }

        // A provider field that names no backend is read as a model id.
        let named_model = body
            .provider
            .as_deref()
            .filter(|p| p.parse::<ProviderKind>().is_err());
        let requested_model = body
            .model
            .clone()
            .or_else(|| named_model.map(str::to_string))
            .or_else(|| match body.provider {
                None => self.settings.default_model.clone(),
                Some(_) => None,
            });
        let provider = s
            .providers
            .resolve(body.provider.as_deref(), requested_model.as_deref())
            .map_err(|e| match e {
                ProviderError::UnknownProvider(_)
                | ProviderError::Unsupported(_)
                | ProviderError::Auth(_) => {
                    Rejection::InvalidRequest {
                        errors: vec![e.to_string()],
                    }
                }
                other => Rejection::Internal {
                    message: other.to_string(),
                },
            })?;
        let model = provider.resolve_model(&GenerateRequest {
            model: requested_model,
            ..GenerateRequest::default()
        });

        let linked_chapters = s
            .context
            .linked_chapters(&body.novel_id, &body.linked_chapter_ids)
            .await;
        let required = self
            .settings
            .tariff
            .required_amount(&model, linked_character_count(&linked_chapters));

        let check = s
            .ledger
            .check_sufficient(&user_id, required)
            .await
            .map_err(internal)?;
        if !check.sufficient {
            tracing::info!(user_id = %user_id, required, balance = check.balance, "rejected: insufficient credits");
            return Err(Rejection::InsufficientCredits {
                required,
                balance: check.balance,
            });
        }

        let description = format!("{} generation with {model}", body.content_type.as_str());
        let entry = s
            .ledger
            .consume(&user_id, required, &description)
            .await
            .map_err(internal)?;
        if !entry.succeeded {
            return Err(Rejection::DebitFailed {
                required,
                balance: entry.balance_after,
                reason: entry
                    .failure
                    .map(|f| f.to_string())
                    .unwrap_or_else(|| "debit refused".to_string()),
            });
        }

        let thinking_budget = body.effective_thinking_budget(self.settings.default_thinking_budget);
        Ok(Job {
            user_id,
            body,
            provider,
            model,
            thinking_budget,
            linked_chapters,
            credits: required,
            balance: entry.balance_after,
        })
    }

    /// Context, prompt, backend stream and record. A departed client stops
    /// delivery, not generation or persistence.
    async fn produce(&self, job: Job, tx: mpsc::Sender<WireEvent>) {
        let mut out = Outlet { tx, live: true };
        out.send(WireEvent::Credit {
            credits: job.credits,
            balance: job.balance,
        })
        .await;

        let query = ContextQuery {
            novel_id: job.body.novel_id.clone(),
            query_text: job.body.query_text(),
            current_chapter: job.body.chapter_number,
            excluded_entity_ids: job.body.excluded_card_ids.iter().cloned().collect(),
            excluded_summary_ids: job.body.excluded_summary_ids.iter().cloned().collect(),
            linked_chapters: job.linked_chapters.clone(),
        };
        let bundle = self.services.context.assemble(&query).await;
        let prompt = build_prompt(&job.body, &bundle);

        let mut request = GenerateRequest::new(prompt.user.clone())
            .with_model(job.model.clone())
            .with_system(prompt.system.clone())
            .with_max_tokens(job.body.max_tokens(job.thinking_budget))
            .with_json_mode(prompt.json_mode);
        if let Some(temperature) = job.body.temperature {
            request = request.with_temperature(temperature);
        }
        if let Some(budget) = job.thinking_budget {
            request = request.with_thinking(ThinkingConfig::with_budget(budget));
        }

        tracing::info!(
            user_id = %job.user_id,
            provider = %job.provider.name(),
            model = %job.model,
            entities = bundle.matched_entities.len(),
            summaries = bundle.chapter_summaries.len(),
            "generation started"
        );

        let mut text = String::new();
        let mut thinking = String::new();
        let mut usage: Option<TokenUsage> = None;
        let mut failure: Option<String> = None;
        let mut terminated = false;

        let mut chunks = job.provider.generate_stream(request);
        while let Some(chunk) = chunks.next().await {
            match &chunk {
                StreamChunk::Content { text: t } => text.push_str(t),
                StreamChunk::Thinking { text: t } => thinking.push_str(t),
                StreamChunk::Usage { usage: u } => usage = Some(*u),
                StreamChunk::Done => {}
                StreamChunk::Error { message } => failure = Some(message.clone()),
            }
            terminated = chunk.is_terminal();
            out.send(WireEvent::from(chunk)).await;
            if terminated {
                break;
            }
        }
        if !terminated {
            out.send(WireEvent::Error {
                message: "generation stream ended unexpectedly".to_string(),
            })
            .await;
            failure = Some("stream ended without a terminal chunk".to_string());
        }

        if let Some(message) = failure {
            tracing::warn!(
                user_id = %job.user_id,
                credits = job.credits,
                "generation failed after debit: {message}"
            );
            return;
        }
        match usage {
            Some(usage) => self.finalize(&job, &prompt, usage, text, thinking).await,
            None => tracing::warn!(user_id = %job.user_id, "stream finished without usage; no record written"),
        }
    }

    /// Best-effort persistence of the generation record.
    async fn finalize(
        &self,
        job: &Job,
        prompt: &BuiltPrompt,
        usage: TokenUsage,
        text: String,
        thinking: String,
    ) {
        let body = &job.body;
        let inputs = PromptInputs::new(body.content_type.as_str())
            .with_prompts(prompt.system.as_str(), prompt.user.as_str())
            .with_field("instruction", body.instruction.clone().unwrap_or_default())
            .with_field("outline", body.outline.clone().unwrap_or_default())
            .with_field("style", body.style.clone().unwrap_or_default())
            .with_field("sourceText", body.source_text.clone().unwrap_or_default())
            .sanitized(self.settings.prompt_input_max_chars);

        let mut record = GenerationRecord::new(
            &job.user_id,
            &body.novel_id,
            job.provider.name(),
            &job.model,
        );
        record.prompt = inputs;
        record.usage = usage;
        record.thinking_text = (!thinking.is_empty()).then_some(thinking);
        record.generated_text = text;
        record.credits = job.credits;

        match self.services.records.persist(&record).await {
            Ok(()) => tracing::info!(
                user_id = %job.user_id,
                record_id = %record.id,
                total_tokens = usage.total_tokens,
                "generation completed"
            ),
            Err(e) => tracing::warn!(user_id = %job.user_id, "failed to persist generation record: {e}"),
        }
    }
}

/// Sending half of the event channel. Stops trying once the receiver is gone.
struct Outlet {
    tx: mpsc::Sender<WireEvent>,
    live: bool,
}

impl Outlet {
    async fn send(&mut self, event: WireEvent) {
        if self.live && self.tx.send(event).await.is_err() {
            tracing::debug!("client went away; finishing generation");
            self.live = false;
        }
    }
}

fn internal(e: impl std::fmt::Display) -> Rejection {
    Rejection::Internal {
        message: e.to_string(),
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}
