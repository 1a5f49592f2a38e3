//! `novella generate`: one request through the full orchestrator.

use super::library::FixtureLibrary;
use super::{exit_code, ExitError, EXIT_GENERATION_FAILED};
use futures::StreamExt;
use novella_context::{ContextAssembler, UnavailableIndex};
use novella_core::{Config, InboundRequest, Orchestrator, OrchestratorSettings, Services, WireEvent};
use novella_ledger::CreditLedger;
use novella_records::JsonlRecordStore;
use serde_json::Value;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct GenerateOptions {
    pub library: PathBuf,
    pub token: Option<String>,
    pub origin: Option<String>,
    pub records_dir: Option<PathBuf>,
    /// Body file path, or `-` for stdin.
    pub request: String,
}

pub async fn run(config: &Config, options: GenerateOptions) -> anyhow::Result<()> {
    let library = FixtureLibrary::load(&options.library)?;
    tracing::debug!(
        users = library.tokens.len(),
        novels = library.novels.len(),
        "loaded fixture library"
    );
    let body = read_body(&options.request)?;
    let orchestrator = build_orchestrator(config, &library, options.records_dir)?;

    let request = InboundRequest {
        origin: options.origin,
        bearer_token: options.token,
        body,
    };

    let mut stdout = std::io::stdout().lock();
    let mut stream = match orchestrator.handle(request).await {
        Ok(stream) => stream,
        Err(rejection) => {
            writeln!(stdout, "{}", rejection.body())?;
            return Err(anyhow::Error::new(ExitError {
                code: exit_code(&rejection),
                message: format!("{} {rejection}", rejection.status()),
            }));
        }
    };

    let mut failed = None;
    while let Some(event) = stream.next().await {
        if let WireEvent::Error { message } = &event {
            failed = Some(message.clone());
        }
        stdout.write_all(event.to_line().as_bytes())?;
        stdout.flush()?;
    }

    match failed {
        Some(message) => Err(anyhow::Error::new(ExitError {
            code: EXIT_GENERATION_FAILED,
            message: format!("generation failed: {message}"),
        })),
        None => Ok(()),
    }
}

/// Wire the orchestrator from config and a fixture library. The library has
/// no semantic index, so context comes from trigger words and recent summaries.
pub fn build_orchestrator(
    config: &Config,
    library: &FixtureLibrary,
    records_dir: Option<PathBuf>,
) -> anyhow::Result<Orchestrator> {
    let providers = config
        .provider_factory()
        .map_err(|e| anyhow::anyhow!("Invalid config: {e}"))?;
    let records = match records_dir {
        Some(dir) => JsonlRecordStore::with_dir(dir),
        None => JsonlRecordStore::new(),
    };
    let context = ContextAssembler::new(Arc::new(UnavailableIndex), Arc::new(library.novel_store()))
        .with_settings(config.context.clone());

    let services = Services {
        providers,
        ledger: CreditLedger::new(Arc::new(library.balance_store())),
        context,
        records: Arc::new(records),
        rate_limiter: Arc::new(config.rate_limiter()),
        authenticator: Arc::new(library.authenticator()),
        origins: config.origin_policy(),
    };
    Ok(Orchestrator::new(services, OrchestratorSettings::from(config)))
}

fn read_body(source: &str) -> anyhow::Result<Value> {
    let content = if source == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        std::fs::read_to_string(source)
            .map_err(|e| anyhow::anyhow!("Failed to read request {source}: {e}"))?
    };
    serde_json::from_str(&content).map_err(|e| anyhow::anyhow!("Request is not JSON: {e}"))
}
