// =============================================================================
// Meridian Auto-Trader — Main Entry Point
// =============================================================================
//
// Long-lived trading service: KIS broker client, sentiment stack, trading
// cycle engine, market-hours scheduler, and the REST control surface.
//
// The engine starts with dry-run enabled. Live trading must be switched on
// explicitly through `PUT /api/v1/auto-trader/config`.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod api;
mod app_state;
mod broker;
mod config;
mod error;
mod market_hours;
mod risk;
mod scheduler;
mod screener;
mod sentiment;
mod signal;
mod trader;
mod types;
mod universe;

#[cfg(test)]
mod testutil;

use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::app_state::AppState;
use crate::broker::{Broker, KisClient};
use crate::config::BrokerSettings;
use crate::sentiment::{HybridSentimentAnalyzer, SentimentFeed};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & logging ─────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Meridian Auto-Trader starting up");

    // ── 2. Broker client ─────────────────────────────────────────────────
    let settings = BrokerSettings::from_env()?;
    let broker: Arc<dyn Broker> = Arc::new(KisClient::new(&settings)?);

    // ── 3. Sentiment stack (news path only with an LLM API key) ──────────
    let sentiment: Arc<dyn SentimentFeed> = Arc::new(HybridSentimentAnalyzer::from_env());

    // ── 4. Shared state ──────────────────────────────────────────────────
    let state = Arc::new(AppState::new(broker, sentiment));
    {
        let cfg = state.config.load();
        info!(
            universe = %cfg.universe_name,
            dry_run = cfg.dry_run,
            mock = settings.mock,
            "engine configured (dry-run stays on until changed via the API)"
        );
    }

    // ── 5. API server ────────────────────────────────────────────────────
    let bind_addr =
        std::env::var("MERIDIAN_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3001".into());
    let app = api::rest::router(state.clone());
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %bind_addr, "API server listening");

    let server = tokio::spawn(async move {
        axum::serve(listener, app).await.expect("API server failed");
    });

    info!("All subsystems running. Press Ctrl+C to stop.");

    // ── 6. Graceful shutdown ─────────────────────────────────────────────
    tokio::signal::ctrl_c().await?;
    warn!("Shutdown signal received — stopping");

    state.scheduler.stop();
    server.abort();

    info!("Meridian Auto-Trader shut down complete.");
    Ok(())
}
