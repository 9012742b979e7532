mod analysis;
mod cache;
mod clock;
mod config;
mod db;
mod errors;
mod llm_client;
mod rate_limit;
mod routes;
mod state;
mod store;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::analysis::extract::{HttpFetcher, PdfTextExtractor};
use crate::analysis::pipeline::{Pipeline, PipelineDeps, PipelineSettings};
use crate::cache::redis_store::RedisCacheStore;
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::db::create_pool;
use crate::llm_client::LlmClient;
use crate::rate_limit::postgres::PgRateLimitLog;
use crate::rate_limit::{spawn_compaction, RateLimitLog};
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first; invalid or missing values abort startup
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_CRATE_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Analysis API v{}", env!("CARGO_PKG_VERSION"));

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    // Initialize PostgreSQL (rate-limit log)
    let db = create_pool(&config.database_url).await?;
    let rate_log: Arc<dyn RateLimitLog> = Arc::new(PgRateLimitLog::new(db));

    // Initialize Redis (result cache)
    let redis = redis::Client::open(config.redis_url.clone())?;
    let cache_store = Arc::new(RedisCacheStore::connect(&redis).await?);
    info!("Redis cache connected");

    // Initialize LLM client
    let llm = LlmClient::new(config.anthropic_api_key.clone(), config.model_timeout)?;
    info!("LLM client initialized (model: {})", llm_client::MODEL);

    let deps = PipelineDeps {
        fetcher: Arc::new(HttpFetcher::new(config.fetch_timeout, config.max_upload_bytes)?),
        extractor: Arc::new(PdfTextExtractor),
        invoker: Arc::new(llm),
        cache_store,
        rate_log: rate_log.clone(),
        clock: clock.clone(),
    };
    let settings = PipelineSettings {
        max_requests: config.rate_limit.max_requests,
        window: config.rate_limit.window,
        fail_mode: config.rate_limit.fail_mode,
        cache_ttl: config.cache_ttl,
        cache_scope: config.cache_scope,
        request_timeout: config.request_timeout,
    };
    info!(
        "Rate limit: {} requests per {:?} (fail {:?}); cache TTL {:?}, scope {:?}",
        settings.max_requests, settings.window, settings.fail_mode, settings.cache_ttl, settings.cache_scope
    );

    spawn_compaction(
        rate_log,
        clock,
        config.rate_limit.window,
        config.rate_limit.compact_interval,
    );

    // Build app state
    let state = AppState {
        config: Arc::new(config.clone()),
        fit_analysis: Arc::new(Pipeline::new(&deps, &settings)),
        ats_score: Arc::new(Pipeline::new(&deps, &settings)),
    };

    // Build router
    let app = build_router(state).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive()), // TODO: restrict origins once the frontend domain is fixed
    );

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
