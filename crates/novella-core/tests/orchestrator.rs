//! End-to-end request handling against scripted backends.

use async_trait::async_trait;
use futures::StreamExt;
use novella_context::{ContextAssembler, EntityCard, MemoryNovelStore, NovelData, UnavailableIndex};
use novella_core::{
    InboundRequest, Orchestrator, OrchestratorSettings, OriginPolicy, Rejection, Services,
    SlidingWindowLimiter, StaticTokenAuthenticator, Unlimited, WireEvent,
};
use novella_ledger::{BalanceStore, CreditLedger, LedgerError, MemoryBalanceStore, Tariff};
use novella_provider::{
    ChunkStream, GenerateRequest, Provider, ProviderError, ProviderFactory, ProviderKind,
    StreamChunk, TextResult, TokenUsage,
};
use novella_records::MemoryRecordSink;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ────────────────────────────────────────────────────────────────────────────
// Fixtures
// ────────────────────────────────────────────────────────────────────────────

struct ScriptedProvider {
    chunks: Vec<StreamChunk>,
    seen: Mutex<Vec<GenerateRequest>>,
    pace: Option<Duration>,
}

impl ScriptedProvider {
    fn new(chunks: Vec<StreamChunk>) -> Self {
        Self {
            chunks,
            seen: Mutex::new(Vec::new()),
            pace: None,
        }
    }

    /// Wait `pace` before each chunk, like a backend producing tokens.
    fn paced(mut self, pace: Duration) -> Self {
        self.pace = Some(pace);
        self
    }

    fn requests(&self) -> Vec<GenerateRequest> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Gemini
    }

    async fn generate(&self, _request: GenerateRequest) -> Result<TextResult, ProviderError> {
        Err(ProviderError::Unsupported("scripted".into()))
    }

    fn generate_stream(&self, request: GenerateRequest) -> ChunkStream {
        self.seen.lock().unwrap().push(request);
        let chunks = futures::stream::iter(self.chunks.clone());
        match self.pace {
            Some(pace) => chunks
                .then(move |chunk| async move {
                    tokio::time::sleep(pace).await;
                    chunk
                })
                .boxed(),
            None => chunks.boxed(),
        }
    }
}

/// Counts writes so tests can tell whether a debit was attempted.
struct CountingStore {
    inner: MemoryBalanceStore,
    writes: AtomicUsize,
}

#[async_trait]
impl BalanceStore for CountingStore {
    async fn balance(&self, user_id: &str) -> Result<u64, LedgerError> {
        self.inner.balance(user_id).await
    }

    async fn compare_and_set(
        &self,
        user_id: &str,
        expected: u64,
        new: u64,
    ) -> Result<bool, LedgerError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.compare_and_set(user_id, expected, new).await
    }
}

struct Harness {
    orchestrator: Orchestrator,
    provider: Arc<ScriptedProvider>,
    store: Arc<CountingStore>,
    records: Arc<MemoryRecordSink>,
}

fn success_script() -> Vec<StreamChunk> {
    vec![
        StreamChunk::Thinking {
            text: "plan the duel".into(),
        },
        StreamChunk::Content {
            text: "Lin Feng ".into(),
        },
        StreamChunk::Content {
            text: "drew his blade.".into(),
        },
        StreamChunk::Usage {
            usage: TokenUsage::new(120, 40, Some(175)).with_thinking_tokens(Some(15)),
        },
        StreamChunk::Done,
    ]
}

fn novel() -> NovelData {
    NovelData {
        summary: Some("A cultivator seeks revenge.".into()),
        entities: vec![EntityCard {
            id: "e1".into(),
            name: "Lin Feng".into(),
            category: "character".into(),
            trigger_words: vec!["Lin Feng".into()],
            ..EntityCard::default()
        }],
        ..NovelData::default()
    }
}

fn harness(script: Vec<StreamChunk>, balance: u64, tariff: Tariff) -> Harness {
    harness_with(ScriptedProvider::new(script), balance, tariff)
}

fn harness_with(provider: ScriptedProvider, balance: u64, tariff: Tariff) -> Harness {
    let provider = Arc::new(provider);
    let store = Arc::new(CountingStore {
        inner: MemoryBalanceStore::with_balances([("writer", balance)]),
        writes: AtomicUsize::new(0),
    });
    let records = Arc::new(MemoryRecordSink::new());
    let context = ContextAssembler::new(
        Arc::new(UnavailableIndex),
        Arc::new(MemoryNovelStore::new().with_novel("novel-1", novel())),
    );
    let services = Services {
        providers: ProviderFactory::new(ProviderKind::Gemini, ProviderKind::Gemini)
            .with_provider(provider.clone()),
        ledger: CreditLedger::new(store.clone()),
        context,
        records: records.clone(),
        rate_limiter: Arc::new(Unlimited),
        authenticator: Arc::new(StaticTokenAuthenticator::default().with_token("tok", "writer")),
        origins: OriginPolicy::new(vec!["https://novella.example".into()]),
    };
    let settings = OrchestratorSettings {
        tariff,
        ..OrchestratorSettings::default()
    };
    Harness {
        orchestrator: Orchestrator::new(services, settings),
        provider,
        store,
        records,
    }
}

fn flat_tariff(cost: u64) -> Tariff {
    Tariff {
        base_cost: cost,
        model_base_costs: Default::default(),
        ..Tariff::default()
    }
}

fn request(body: Value) -> InboundRequest {
    InboundRequest {
        origin: Some("https://novella.example".into()),
        bearer_token: Some("Bearer tok".into()),
        body,
    }
}

fn chapter_body() -> Value {
    json!({
        "novelId": "novel-1",
        "contentType": "chapter",
        "wordCount": 800,
        "chapterNumber": 2,
        "instruction": "Lin Feng confronts the elder at dawn."
    })
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_successful_generation_event_order() {
    let h = harness(success_script(), 100, flat_tariff(10));
    let stream = h.orchestrator.handle(request(chapter_body())).await.unwrap();
    assert_eq!(stream.credits(), 10);
    assert_eq!(stream.balance(), 90);

    let events: Vec<WireEvent> = stream.collect().await;
    assert_eq!(
        events.first(),
        Some(&WireEvent::Credit {
            credits: 10,
            balance: 90
        })
    );
    assert_eq!(events.last(), Some(&WireEvent::Done));
    assert!(matches!(events[events.len() - 2], WireEvent::Usage { .. }));
    assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);

    let request = &h.provider.requests()[0];
    assert_eq!(request.max_tokens, Some(1600));
    assert!(request.thinking.is_none());
    assert!(request.user_prompt.contains("Lin Feng"));
    assert!(request.user_prompt.contains("A cultivator seeks revenge."));
}

#[tokio::test]
async fn test_record_usage_matches_wire_usage() {
    let h = harness(success_script(), 100, flat_tariff(10));
    let events: Vec<WireEvent> = h
        .orchestrator
        .handle(request(chapter_body()))
        .await
        .unwrap()
        .collect()
        .await;

    let wire_total = events
        .iter()
        .find_map(|e| match e {
            WireEvent::Usage { usage } => Some(usage.total_token_count),
            _ => None,
        })
        .unwrap();

    let records = h.records.records();
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.usage.total_tokens, wire_total);
    assert_eq!(record.generated_text, "Lin Feng drew his blade.");
    assert_eq!(record.thinking_text.as_deref(), Some("plan the duel"));
    assert_eq!(record.credits, 10);
    assert_eq!(record.user_id, "writer");
    assert_eq!(record.model, "gemini-2.5-flash");
}

#[tokio::test]
async fn test_insufficient_credits_never_debits() {
    let h = harness(success_script(), 30, flat_tariff(50));
    let rejection = h
        .orchestrator
        .handle(request(chapter_body()))
        .await
        .err()
        .unwrap();

    assert_eq!(rejection.status(), 402);
    let body = rejection.body();
    assert_eq!(body["required"], 50);
    assert_eq!(body["balance"], 30);
    assert_eq!(h.store.writes.load(Ordering::SeqCst), 0);
    assert!(h.provider.requests().is_empty());
}

#[tokio::test]
async fn test_mid_stream_error_keeps_debit() {
    let script = vec![
        StreamChunk::Content {
            text: "The gate ".into(),
        },
        StreamChunk::Error {
            message: "backend reset".into(),
        },
    ];
    let h = harness(script, 100, flat_tariff(10));
    let events: Vec<WireEvent> = h
        .orchestrator
        .handle(request(chapter_body()))
        .await
        .unwrap()
        .collect()
        .await;

    assert!(matches!(events.last(), Some(WireEvent::Error { message }) if message == "backend reset"));
    assert!(!events.iter().any(|e| matches!(e, WireEvent::Done)));
    assert_eq!(h.store.balance("writer").await.unwrap(), 90);
    assert!(h.records.records().is_empty());
}

#[tokio::test]
async fn test_thinking_budget_reaches_backend() {
    let h = harness(success_script(), 100, flat_tariff(10));
    let mut body = chapter_body();
    body["enableThinking"] = json!(true);
    body["thinkingBudget"] = json!(2000);
    body["wordCount"] = json!(2000);
    let _: Vec<WireEvent> = h.orchestrator.handle(request(body)).await.unwrap().collect().await;

    let request = &h.provider.requests()[0];
    assert_eq!(request.max_tokens, Some(6000));
    assert_eq!(request.thinking.as_ref().and_then(|t| t.budget), Some(2000));
}

#[tokio::test]
async fn test_rejections_precede_the_ledger() {
    let h = harness(success_script(), 100, flat_tariff(10));

    let mut bad_origin = request(chapter_body());
    bad_origin.origin = Some("https://elsewhere.example".into());
    let r = h.orchestrator.handle(bad_origin).await.err().unwrap();
    assert_eq!(r.status(), 403);

    let mut anonymous = request(chapter_body());
    anonymous.bearer_token = None;
    let r = h.orchestrator.handle(anonymous).await.err().unwrap();
    assert_eq!(r, Rejection::Unauthenticated);

    let r = h
        .orchestrator
        .handle(request(json!({"novelId": "novel-1", "contentType": "chapter"})))
        .await
        .err()
        .unwrap();
    assert_eq!(r.status(), 400);

    assert_eq!(h.store.writes.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_rate_limit_rejects_after_budget() {
    let mut h = harness(success_script(), 100, flat_tariff(10));
    let mut services = services_of(&h);
    services.rate_limiter = Arc::new(SlidingWindowLimiter::new(1, Duration::from_secs(60)));
    h.orchestrator = Orchestrator::new(services, OrchestratorSettings {
        tariff: flat_tariff(10),
        ..OrchestratorSettings::default()
    });

    let _: Vec<WireEvent> = h
        .orchestrator
        .handle(request(chapter_body()))
        .await
        .unwrap()
        .collect()
        .await;
    let r = h
        .orchestrator
        .handle(request(chapter_body()))
        .await
        .err()
        .unwrap();
    assert_eq!(r.status(), 429);
    assert!(r.body()["retryAfter"].as_u64().unwrap() > 0);
    assert_eq!(h.store.balance("writer").await.unwrap(), 90);
}

#[tokio::test]
async fn test_unconfigured_provider_is_a_bad_request() {
    let h = harness(success_script(), 100, flat_tariff(10));
    let mut body = chapter_body();
    body["provider"] = json!("anthropic");
    let r = h.orchestrator.handle(request(body)).await.err().unwrap();
    assert_eq!(r.status(), 400);
    assert!(r.body()["details"][0].as_str().unwrap().contains("ANTHROPIC_API_KEY"));
}

#[tokio::test]
async fn test_model_in_provider_field_is_used_as_model() {
    let h = harness(success_script(), 100, Tariff::default());
    let mut body = chapter_body();
    body["provider"] = json!("gemini-2.5-pro");
    let stream = h.orchestrator.handle(request(body)).await.unwrap();
    assert_eq!(stream.credits(), 20);
    let _: Vec<WireEvent> = stream.collect().await;
    assert_eq!(h.provider.requests()[0].model.as_deref(), Some("gemini-2.5-pro"));
}

#[tokio::test]
async fn test_named_provider_with_foreign_model_is_refused() {
    let h = harness(success_script(), 100, flat_tariff(10));
    let mut body = chapter_body();
    body["provider"] = json!("gemini");
    body["model"] = json!("claude-sonnet-4-20250514");

    let r = h.orchestrator.handle(request(body)).await.err().unwrap();
    assert_eq!(r.status(), 400);
    assert!(r.body()["details"][0].as_str().unwrap().contains("claude-sonnet-4-20250514"));
    assert_eq!(h.store.writes.load(Ordering::SeqCst), 0);
    assert!(h.provider.requests().is_empty());
}

#[tokio::test]
async fn test_temperature_reaches_backend_unchanged() {
    let h = harness(success_script(), 100, flat_tariff(10));
    let mut body = chapter_body();
    body["temperature"] = json!(0.3);
    let _: Vec<WireEvent> = h.orchestrator.handle(request(body)).await.unwrap().collect().await;

    assert_eq!(h.provider.requests()[0].temperature, Some(0.3));
}

#[tokio::test]
async fn test_client_leaving_mid_stream_still_records() {
    let provider = ScriptedProvider::new(success_script()).paced(Duration::from_millis(20));
    let h = harness_with(provider, 100, flat_tariff(10));

    let mut stream = h.orchestrator.handle(request(chapter_body())).await.unwrap();
    let first = stream.next().await;
    assert!(matches!(first, Some(WireEvent::Credit { credits: 10, .. })));
    drop(stream);

    let records = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let records = h.records.records();
            if !records.is_empty() {
                return records;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("generation should finish without a reader");

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].generated_text, "Lin Feng drew his blade.");
    assert_eq!(records[0].usage.total_tokens, 175);
    assert_eq!(h.store.balance("writer").await.unwrap(), 90);
}

fn services_of(h: &Harness) -> Services {
    Services {
        providers: ProviderFactory::new(ProviderKind::Gemini, ProviderKind::Gemini)
            .with_provider(h.provider.clone()),
        ledger: CreditLedger::new(h.store.clone()),
        context: ContextAssembler::new(
            Arc::new(UnavailableIndex),
            Arc::new(MemoryNovelStore::new().with_novel("novel-1", novel())),
        ),
        records: h.records.clone(),
        rate_limiter: Arc::new(Unlimited),
        authenticator: Arc::new(StaticTokenAuthenticator::default().with_token("tok", "writer")),
        origins: OriginPolicy::allow_all(),
    }
}
