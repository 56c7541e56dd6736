mod config;
mod errors;
mod llm_client;
mod routes;
mod screening;
mod state;
mod store;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::llm_client::{LlmClient, OpenAiTransport, RetryPolicy};
use crate::routes::build_router;
use crate::screening::matcher::{MatchSettings, TwoPhaseMatcher};
use crate::state::AppState;
use crate::store::JsonStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails fast on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Screener API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize the record store
    let store = JsonStore::new(&config.data_dir);
    store.ensure_layout().await?;

    // Initialize LLM client
    let transport = OpenAiTransport::new(
        config.openai_api_key.clone(),
        &config.openai_base_url,
        config.openai_model.clone(),
    )?;
    let retry = RetryPolicy::new(
        config.llm_max_attempts,
        Duration::from_millis(config.llm_retry_base_ms),
    );
    let llm = LlmClient::new(
        Arc::new(transport),
        retry,
        Duration::from_secs(config.llm_timeout_secs),
    );
    info!(
        "LLM client initialized (model: {}, {} attempts, {}s deadline)",
        llm.model(),
        config.llm_max_attempts,
        config.llm_timeout_secs
    );

    let matcher = TwoPhaseMatcher::new(
        llm.clone(),
        store.clone(),
        MatchSettings {
            max_concurrent: config.max_concurrent_requests,
            review_threshold: config.review_confidence_threshold,
        },
    );

    // Build app state
    let state = AppState {
        store,
        llm,
        matcher,
        config: config.clone(),
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: restrict origins once the web UI has a fixed host

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
