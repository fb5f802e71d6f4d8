mod batch;
mod cache;
mod config;
mod enrichment;
mod errors;
mod fingerprint;
mod llm_client;
mod models;
mod pipeline;
mod retry;
mod routes;
mod state;
mod validator;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::task::JoinHandle;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::batch::BatchScheduler;
use crate::cache::{MemoryStore, RedisStore, ResultCache, TtlStore};
use crate::config::Config;
use crate::enrichment::{DisabledProvider, EnrichmentClient, SearchProvider, TavilyProvider};
use crate::llm_client::anthropic::{AnthropicBackend, MODEL_ADVANCED, MODEL_BASIC};
use crate::llm_client::usage::{spawn_usage_logger, UsageRecorder};
use crate::llm_client::ModelClient;
use crate::pipeline::{cancel_pair, Pipeline, PipelineDeps};
use crate::retry::RetryPolicy;
use crate::routes::build_router;
use crate::state::AppState;
use crate::validator::GuidelineRegistry;

const PURGE_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting summarizer v{} (pipeline version {})",
        env!("CARGO_PKG_VERSION"),
        config.pipeline.pipeline_version
    );
    let settings = &config.pipeline;

    // Shared TTL store for result and enrichment caches
    let store: Arc<dyn TtlStore> = match &config.redis_url {
        Some(url) => {
            let client = redis::Client::open(url.as_str())
                .context("REDIS_URL is not a valid Redis URL")?;
            info!("Using Redis TTL store");
            Arc::new(RedisStore::new(client))
        }
        None => {
            warn!("REDIS_URL not set; caches are in-memory and per-process");
            let memory = Arc::new(MemoryStore::new());
            spawn_purge_task(memory.clone());
            memory
        }
    };

    // Usage telemetry drains in the background
    let (usage, usage_rx) = UsageRecorder::channel();
    spawn_usage_logger(usage_rx);

    // Initialize model client
    let backend = AnthropicBackend::new(config.anthropic_api_key.clone(), settings.call_timeout)
        .context("Failed to build Anthropic HTTP client")?;
    let model_retry = RetryPolicy::new(settings.model_max_attempts, settings.model_backoff_base);
    info!(
        attempts = model_retry.max_attempts,
        "Model retry backoff before jitter: {:?}",
        model_retry.total_base_backoff()
    );
    let model = Arc::new(ModelClient::new(
        Arc::new(backend),
        model_retry,
        settings.call_timeout,
        usage,
    ));
    info!("Model client initialized (advanced: {MODEL_ADVANCED}, basic: {MODEL_BASIC})");

    // Initialize enrichment client
    let provider: Arc<dyn SearchProvider> = match &config.tavily_api_key {
        Some(key) => Arc::new(
            TavilyProvider::new(key.clone(), settings.call_timeout)
                .context("Failed to build Tavily HTTP client")?,
        ),
        None => {
            warn!("TAVILY_API_KEY not set; runs proceed without enrichment");
            Arc::new(DisabledProvider)
        }
    };
    let enrichment = Arc::new(EnrichmentClient::new(
        provider,
        store.clone(),
        RetryPolicy::new(settings.enrich_max_attempts, settings.enrich_backoff_base),
        settings.call_timeout,
        settings.enrich_ttl,
    ));

    // Load guideline specs
    let guidelines = match &config.guidelines_path {
        Some(path) => GuidelineRegistry::from_json_file(path)?,
        None => GuidelineRegistry::with_default(),
    };
    info!("Guideline versions: {:?}", guidelines.versions());

    let pipeline = Arc::new(Pipeline::new(
        PipelineDeps {
            model,
            enrichment,
            cache: ResultCache::new(store),
            guidelines: Arc::new(guidelines),
        },
        settings.clone(),
    ));
    let batch = Arc::new(BatchScheduler::new(pipeline.clone(), settings.batch_concurrency));

    let (shutdown_handle, shutdown) = cancel_pair();

    // Build router
    let app = build_router(AppState {
        pipeline,
        batch,
        shutdown,
    })
    .layer(TraceLayer::new_for_http())
    .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for shutdown signal: {e}");
                std::future::pending::<()>().await;
            }
            info!("Shutdown signal received, cancelling in-flight runs");
            shutdown_handle.cancel();
        })
        .await?;

    Ok(())
}

/// Periodically sweeps expired entries so keys that are never read again do not pile up.
fn spawn_purge_task(store: Arc<MemoryStore>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(PURGE_INTERVAL);
        loop {
            interval.tick().await;
            let purged = store.purge_expired();
            if purged > 0 {
                debug!(purged, remaining = store.len(), "Purged expired cache entries");
            }
        }
    })
}
