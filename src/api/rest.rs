// =============================================================================
// REST control surface — Axum 0.7
// =============================================================================
//
// All endpoints live under `/api/v1/`. Every call is synchronous
// request/response; `/run` and `/scan` block for the duration of a cycle.
// Errors render as `{ "error": { "code", "message", "detail?" } }` via the
// application error type.
//
// CORS is configured permissively for development; tighten `allowed_origins`
// in production.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{Json, Path, Query, State},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::app_state::AppState;
use crate::config::AutoTraderConfig;
use crate::error::AppError;
use crate::risk::{calculate_position_size, PositionRiskConfig};
use crate::scheduler::SchedulerStatus;
use crate::screener::ScreeningResult;
use crate::types::{CycleRecord, CycleResult, TradeSignal};
use crate::universe::StockUniverse;

// =============================================================================
// Router construction
// =============================================================================

/// Build the full REST router with CORS middleware and shared state.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // ── Health ──────────────────────────────────────────────────
        .route("/api/v1/health", get(health))
        // ── Trader ──────────────────────────────────────────────────
        .route("/api/v1/auto-trader/scan", post(scan))
        .route("/api/v1/auto-trader/run", post(run_cycle))
        .route("/api/v1/auto-trader/config", get(get_config).put(put_config))
        // ── Scheduler ───────────────────────────────────────────────
        .route("/api/v1/auto-trader/scheduler/start", post(scheduler_start))
        .route("/api/v1/auto-trader/scheduler/stop", post(scheduler_stop))
        .route("/api/v1/auto-trader/scheduler/status", get(scheduler_status))
        .route("/api/v1/auto-trader/scheduler/history", get(scheduler_history))
        // ── Analysis ────────────────────────────────────────────────
        .route("/api/v1/analysis/screen", post(screen))
        .route("/api/v1/analysis/universes", get(list_universes).post(create_universe))
        .route("/api/v1/analysis/universes/:name/add", post(universe_add_symbol))
        .route("/api/v1/analysis/universes/:name/remove", post(universe_remove_symbol))
        // ── Policies ────────────────────────────────────────────────
        .route("/api/v1/policies/position-size", post(position_size))
        // ── Middleware & state ──────────────────────────────────────
        .layer(cors)
        .with_state(state)
}

// =============================================================================
// Health
// =============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    server_time: i64,
    uptime_seconds: u64,
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        server_time: chrono::Utc::now().timestamp_millis(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
    })
}

// =============================================================================
// Scan / run
// =============================================================================

#[derive(Serialize)]
struct ScanResponse {
    signals: Vec<TradeSignal>,
    total: usize,
}

/// Scan the universe into signals only — no orders, no holdings sweep.
async fn scan(State(state): State<Arc<AppState>>) -> Result<Json<ScanResponse>, AppError> {
    let signals = state.trader.scan_universe().await?;
    Ok(Json(ScanResponse { total: signals.len(), signals }))
}

/// Run one full cycle synchronously and return its result.
async fn run_cycle(State(state): State<Arc<AppState>>) -> Result<Json<CycleResult>, AppError> {
    let result = state.trader.run_cycle().await?;
    Ok(Json(result))
}

// =============================================================================
// Config
// =============================================================================

async fn get_config(State(state): State<Arc<AppState>>) -> Json<AutoTraderConfig> {
    Json((**state.config.load()).clone())
}

/// Replace the trader configuration atomically. In-flight cycles keep the
/// snapshot they started with; the change applies from the next cycle.
async fn put_config(
    State(state): State<Arc<AppState>>,
    Json(config): Json<AutoTraderConfig>,
) -> Json<AutoTraderConfig> {
    info!(
        universe = %config.universe_name,
        dry_run = config.dry_run,
        max_daily_trades = config.risk_limits.max_daily_trades,
        "auto-trader config replaced"
    );
    state.config.store(Arc::new(config.clone()));
    Json(config)
}

// =============================================================================
// Scheduler control
// =============================================================================

fn default_interval_minutes() -> u32 {
    30
}

fn default_kr_market_only() -> bool {
    true
}

#[derive(Deserialize)]
struct SchedulerStartRequest {
    #[serde(default = "default_interval_minutes")]
    interval_minutes: u32,
    #[serde(default = "default_kr_market_only")]
    kr_market_only: bool,
    #[serde(default)]
    us_market: bool,
}

async fn scheduler_start(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SchedulerStartRequest>,
) -> Result<Json<SchedulerStatus>, AppError> {
    state
        .scheduler
        .clone()
        .start(req.interval_minutes, req.kr_market_only, req.us_market)?;
    Ok(Json(state.scheduler.status()))
}

async fn scheduler_stop(State(state): State<Arc<AppState>>) -> Json<SchedulerStatus> {
    state.scheduler.stop();
    Json(state.scheduler.status())
}

async fn scheduler_status(State(state): State<Arc<AppState>>) -> Json<SchedulerStatus> {
    Json(state.scheduler.status())
}

fn default_history_limit() -> usize {
    10
}

#[derive(Deserialize)]
struct HistoryParams {
    #[serde(default = "default_history_limit")]
    limit: usize,
}

async fn scheduler_history(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HistoryParams>,
) -> Json<Vec<CycleRecord>> {
    Json(state.scheduler.history(params.limit))
}

// =============================================================================
// Analysis: screening and universe management
// =============================================================================

#[derive(Deserialize)]
struct ScreenRequest {
    symbols: Vec<String>,
}

#[derive(Serialize)]
struct ScreenResponse {
    results: Vec<ScreeningResult>,
    total: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    errors: Vec<String>,
}

/// Screen an explicit symbol list into quality classifications.
async fn screen(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ScreenRequest>,
) -> Json<ScreenResponse> {
    let (results, errors) = state.trader.screen_symbols(&req.symbols).await;
    Json(ScreenResponse { total: results.len(), results, errors })
}

async fn list_universes(State(state): State<Arc<AppState>>) -> Json<Vec<StockUniverse>> {
    Json(state.universe.list())
}

#[derive(Deserialize)]
struct CreateUniverseRequest {
    name: String,
    symbols: Vec<String>,
    #[serde(default)]
    description: String,
}

async fn create_universe(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateUniverseRequest>,
) -> Json<StockUniverse> {
    Json(state.universe.create(&req.name, req.symbols, &req.description))
}

#[derive(Deserialize)]
struct UniverseSymbolRequest {
    symbol: String,
}

async fn universe_add_symbol(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(req): Json<UniverseSymbolRequest>,
) -> Result<Json<StockUniverse>, AppError> {
    if !state.universe.add_symbol(&name, &req.symbol) {
        return Err(AppError::validation_with(
            "unknown universe",
            serde_json::json!({ "universe": name }),
        ));
    }
    state
        .universe
        .get(&name)
        .map(Json)
        .ok_or_else(|| AppError::validation("unknown universe"))
}

async fn universe_remove_symbol(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(req): Json<UniverseSymbolRequest>,
) -> Result<Json<StockUniverse>, AppError> {
    if !state.universe.remove_symbol(&name, &req.symbol) {
        return Err(AppError::validation_with(
            "unknown universe",
            serde_json::json!({ "universe": name }),
        ));
    }
    state
        .universe
        .get(&name)
        .map(Json)
        .ok_or_else(|| AppError::validation("unknown universe"))
}

// =============================================================================
// Policies: pre-trade sizing checks
// =============================================================================

#[derive(Deserialize)]
struct PositionSizeRequest {
    equity: f64,
    entry_price: f64,
    stop_loss_price: f64,
    #[serde(default)]
    risk: Option<PositionRiskConfig>,
}

#[derive(Serialize)]
struct PositionSizeResponse {
    quantity: u32,
    notional: f64,
}

/// Stop-loss based position sizing, exposed as a pre-trade check.
async fn position_size(
    Json(req): Json<PositionSizeRequest>,
) -> Result<Json<PositionSizeResponse>, AppError> {
    let risk = req.risk.unwrap_or_default();
    let quantity =
        calculate_position_size(req.equity, req.entry_price, req.stop_loss_price, &risk)?;
    Ok(Json(PositionSizeResponse {
        quantity,
        notional: f64::from(quantity) * req.entry_price,
    }))
}
