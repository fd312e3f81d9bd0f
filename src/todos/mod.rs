use std::time::Instant;

use anyhow::Result;
use clap::Args;
use tracing::Instrument;

use crate::output::config::{OutputConfig, OutputFormat};
use crate::output::types::{Envelope, Meta};
use crate::output::Emitter;
use crate::telemetry::{self};

pub mod client;
pub mod config;
pub mod orchestrator;
pub mod render;
pub mod types;

use client::{HttpTodoSource, TodoSource};
use config::Settings;
use orchestrator::{FetchOrchestrator, NoopObserver};
use render::ConsoleRenderer;

/// Fetch TODOs and render them as they arrive
#[derive(Args, Debug, Clone, Default)]
pub struct FetchCmd {
    /// Number of TODOs to fetch [env: NUM_TODOS, default: 20]
    #[arg(short = 'n', long = "num")] pub num: Option<usize>,
    /// Number of retries for failed requests [env: NUM_RETRIES, default: 3]
    #[arg(short, long)] pub retries: Option<u32>,
    /// Base URL; the id is appended as the last path segment [env: TODOS_BASE_URL]
    #[arg(long)] pub base_url: Option<String>,
    /// Per-request timeout in seconds [env: TODOS_TIMEOUT_SECS]
    #[arg(long)] pub timeout_secs: Option<u64>,
    /// Cap on requests in flight; unlimited when omitted [env: TODOS_CONCURRENCY]
    #[arg(long)] pub concurrency: Option<usize>,
}

pub async fn run(args: FetchCmd) -> Result<()> {
    let log = telemetry::fetch();
    let settings = Settings::resolve(&args, |key| std::env::var(key).ok())?;
    let output = OutputConfig::from_env();
    let root = log.root_span_kv([
        ("num", settings.fetch.count.to_string()),
        ("retries", settings.fetch.retry_budget.to_string()),
        ("concurrency", format!("{:?}", settings.fetch.concurrency)),
        ("base_url", settings.client.base_url.clone()),
        ("format", format!("{:?}", output.format)),
    ]);

    let source = HttpTodoSource::new(settings.client)?;
    let orchestrator = FetchOrchestrator::new(settings.fetch, source);

    if let Some(env) = execute(&orchestrator, output.format).instrument(root).await? {
        Emitter::new(output).emit(&env)?;
    }
    Ok(())
}

/// Text drives the console UI and returns nothing; Json runs quietly and
/// returns the envelope to print.
pub async fn execute<S: TodoSource>(orchestrator: &FetchOrchestrator<S>, format: OutputFormat) -> Result<Option<Envelope>> {
    match format {
        OutputFormat::Text => {
            let renderer = ConsoleRenderer::new(orchestrator.config().count);
            orchestrator.run(&renderer).await;
            Ok(None)
        }
        OutputFormat::Json => {
            let t0 = Instant::now();
            let report = orchestrator.run(&NoopObserver).await;
            let meta = Meta { duration_ms: Some(t0.elapsed().as_millis()) };
            Ok(Some(telemetry::fetch().envelope(&report, Some(meta))?))
        }
    }
}
