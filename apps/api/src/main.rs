mod assembly;
mod config;
mod errors;
mod layout;
mod llm_client;
mod models;
mod routes;
mod state;

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::assembly::{SessionRegistry, SessionSettings};
use crate::config::Config;
use crate::layout::{HeuristicStrategyProvider, LayoutEngine, LlmStrategyProvider, StrategyProvider};
use crate::llm_client::LlmClient;
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on malformed env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_CRATE_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Deckgrid API v{}", env!("CARGO_PKG_VERSION"));

    let engine = LayoutEngine::new(config.layout.clone());
    info!(
        "Layout grid {}x{} (margin {}, gutter {}), white space {:.2}-{:.2}",
        config.layout.grid_width,
        config.layout.grid_height,
        config.layout.margin,
        config.layout.gutter,
        config.layout.white_space_min,
        config.layout.white_space_max
    );

    // Pattern strategy: LLM-backed when a key is configured, heuristic otherwise
    let strategy: Arc<dyn StrategyProvider> = match &config.anthropic_api_key {
        Some(key) => {
            let llm = LlmClient::new(key.clone())?;
            info!("LLM strategy provider initialized (model: {})", llm_client::MODEL);
            Arc::new(LlmStrategyProvider::new(llm))
        }
        None => {
            info!("ANTHROPIC_API_KEY not set; using heuristic strategy provider");
            Arc::new(HeuristicStrategyProvider)
        }
    };

    let sessions = Arc::new(SessionRegistry::new(
        engine.clone(),
        strategy.clone(),
        SessionSettings {
            producer_timeout: config.producer_timeout,
            outbound_capacity: config.outbound_queue_capacity,
        },
    ));

    // Build app state
    let state = AppState {
        engine,
        strategy,
        sessions,
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: restrict origins once the deck editor has a fixed host

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
