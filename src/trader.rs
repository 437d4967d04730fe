// =============================================================================
// AutoTrader — sentiment, screening, and technicals behind a risk-gated executor
// =============================================================================
//
// One cycle, in order:
//   1. resolve hybrid sentiment (critical news urgency aborts the cycle)
//   2. scan the configured universe into composite signals
//   3. fetch the balance once; derive equity and aggregate exposure
//   4. push buy candidates (best score first) through the risk gate and the
//      executor, updating the daily counter and exposure per accepted order
//   5. sweep holdings for take-profit / stop-loss / reversal sells
//   6. emit a structured cycle result
//
// A single symbol's failure is logged and recorded, never fatal. The only
// hard stops are the critical-news gate and the daily-loss breaker (which
// stops buys but lets sells proceed).
// =============================================================================

use std::sync::Arc;

use arc_swap::ArcSwap;
use chrono::{NaiveDate, Utc};
use parking_lot::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::broker::Broker;
use crate::config::AutoTraderConfig;
use crate::error::{AppError, AppResult};
use crate::market_hours;
use crate::risk;
use crate::screener::{stock_data, StockScreener};
use crate::sentiment::{HybridSentiment, SentimentFeed};
use crate::signal;
use crate::types::{
    symbol_kind, Balance, CycleResult, ExecutionRecord, OrderSide, Quote, SentimentSummary,
    SignalBrief, SymbolKind, TradeSignal, Urgency,
};
use crate::universe::UniverseManager;

/// Take-profit threshold on held positions (percent). Hard-coded policy,
/// independent of the configurable risk limits.
const TAKE_PROFIT_PCT: f64 = 10.0;
/// Stop-loss threshold on held positions (percent).
const STOP_LOSS_PCT: f64 = -5.0;

/// Counters that reset on the KST calendar-day boundary.
struct DailyState {
    date: NaiveDate,
    trade_count: u32,
    peak_equity: f64,
}

/// The trading-cycle engine.
pub struct AutoTrader {
    broker: Arc<dyn Broker>,
    sentiment: Arc<dyn SentimentFeed>,
    screener: StockScreener,
    universe: Arc<UniverseManager>,
    config: Arc<ArcSwap<AutoTraderConfig>>,
    daily: Mutex<DailyState>,
}

impl AutoTrader {
    pub fn new(
        broker: Arc<dyn Broker>,
        sentiment: Arc<dyn SentimentFeed>,
        universe: Arc<UniverseManager>,
        config: Arc<ArcSwap<AutoTraderConfig>>,
    ) -> Self {
        Self {
            broker,
            sentiment,
            screener: StockScreener::default(),
            universe,
            config,
            daily: Mutex::new(DailyState {
                date: market_hours::now_kst().date_naive(),
                trade_count: 0,
                peak_equity: 0.0,
            }),
        }
    }

    /// Snapshot of the current configuration.
    pub fn config(&self) -> Arc<AutoTraderConfig> {
        self.config.load_full()
    }

    /// Executed-trade count for the current KST day.
    pub fn daily_trade_count(&self) -> u32 {
        self.daily_state().trade_count
    }

    // -------------------------------------------------------------------------
    // Daily counters
    // -------------------------------------------------------------------------

    fn daily_state(&self) -> parking_lot::MutexGuard<'_, DailyState> {
        let today = market_hours::now_kst().date_naive();
        let mut daily = self.daily.lock();
        if daily.date != today {
            info!(old = %daily.date, new = %today, "KST date rolled, resetting daily counters");
            *daily = DailyState { date: today, trade_count: 0, peak_equity: 0.0 };
        }
        daily
    }

    fn record_trade(&self) {
        self.daily_state().trade_count += 1;
    }

    /// Track today's peak equity and return it.
    fn update_peak_equity(&self, equity: f64) -> f64 {
        let mut daily = self.daily_state();
        if equity > daily.peak_equity {
            daily.peak_equity = equity;
        }
        daily.peak_equity
    }

    // -------------------------------------------------------------------------
    // Quotes
    // -------------------------------------------------------------------------

    /// Fetch a fresh quote, dispatching on the symbol's venue.
    async fn fetch_quote(&self, symbol: &str) -> AppResult<Quote> {
        match symbol_kind(symbol) {
            Some(SymbolKind::Domestic) => self.broker.quote(symbol).await,
            Some(SymbolKind::Overseas) => {
                self.broker
                    .quote_overseas(symbol, stock_data::exchange_of(symbol))
                    .await
            }
            None => Err(AppError::validation_with(
                "symbol matches neither the domestic nor the overseas shape",
                serde_json::json!({ "symbol": symbol }),
            )),
        }
    }

    // -------------------------------------------------------------------------
    // Signal calculation
    // -------------------------------------------------------------------------

    /// Screen one symbol and build its composite signal from a fresh quote.
    pub async fn calculate_signal(
        &self,
        symbol: &str,
        hybrid: Option<&HybridSentiment>,
        numeric_score: i32,
        max_notional: u64,
    ) -> AppResult<TradeSignal> {
        let quote = self.fetch_quote(symbol).await?;
        let fundamentals = self.screener.fundamentals_from_quote(&quote);
        let screening = self.screener.evaluate(&fundamentals);
        Ok(signal::build_signal(&screening, hybrid, numeric_score, &quote, max_notional))
    }

    /// Screen a list of symbols without producing signals or orders.
    /// Per-symbol failures are collected alongside the results.
    pub async fn screen_symbols(
        &self,
        symbols: &[String],
    ) -> (Vec<crate::screener::ScreeningResult>, Vec<String>) {
        let mut results = Vec::with_capacity(symbols.len());
        let mut errors = Vec::new();
        for symbol in symbols {
            match self.fetch_quote(symbol).await {
                Ok(quote) => {
                    let fundamentals = self.screener.fundamentals_from_quote(&quote);
                    results.push(self.screener.evaluate(&fundamentals));
                }
                Err(err) => {
                    warn!(symbol = %symbol, error = %err, "screening failed, skipping");
                    errors.push(format!("{symbol}: {err}"));
                }
            }
        }
        (results, errors)
    }

    /// Scan the configured universe into signals, no orders. Critical news
    /// urgency empties the scan.
    pub async fn scan_universe(&self) -> AppResult<Vec<TradeSignal>> {
        let cfg = self.config.load_full();
        let hybrid = self.sentiment.hybrid().await?;

        if hybrid.news_urgency == Some(Urgency::Critical) {
            warn!("news urgency is critical, skipping the scan");
            return Ok(Vec::new());
        }

        let (signals, _errors) = self.scan_with(&cfg, &hybrid).await;
        Ok(signals)
    }

    /// Scan all universe symbols with an already-resolved sentiment snapshot.
    /// Per-symbol failures are collected, not raised.
    async fn scan_with(
        &self,
        cfg: &AutoTraderConfig,
        hybrid: &HybridSentiment,
    ) -> (Vec<TradeSignal>, Vec<String>) {
        let Some(universe) = self.universe.get(&cfg.universe_name) else {
            warn!(universe = %cfg.universe_name, "unknown universe");
            return (Vec::new(), vec![format!("unknown universe '{}'", cfg.universe_name)]);
        };

        let mut signals = Vec::with_capacity(universe.symbols.len());
        let mut errors = Vec::new();

        for symbol in &universe.symbols {
            match self
                .calculate_signal(symbol, Some(hybrid), hybrid.fear_greed.score, cfg.max_notional_krw)
                .await
            {
                Ok(signal) => signals.push(signal),
                Err(err) => {
                    warn!(symbol = %symbol, error = %err, "signal calculation failed, skipping");
                    errors.push(format!("{symbol}: {err}"));
                }
            }
        }

        // Best score first; ties break on the symbol for a deterministic order.
        signals.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.symbol.cmp(&b.symbol))
        });

        info!(
            universe = %cfg.universe_name,
            scanned = universe.symbols.len(),
            signals = signals.len(),
            "universe scan complete"
        );
        (signals, errors)
    }

    // -------------------------------------------------------------------------
    // Buy execution
    // -------------------------------------------------------------------------

    /// Run accepted buy candidates through the risk gate and the executor.
    async fn execute_buy_signals(
        &self,
        cfg: &AutoTraderConfig,
        signals: &[TradeSignal],
        buy_multiplier: f64,
        balance: &Balance,
        errors: &mut Vec<String>,
    ) -> Vec<ExecutionRecord> {
        let limits = &cfg.risk_limits;
        let candidates: Vec<&TradeSignal> = signals
            .iter()
            .filter(|s| s.signal_type.is_buy() && s.score >= limits.min_signal_score_buy)
            .collect();

        let equity = balance.summary.total_value;
        let mut position_value = balance.position_value();

        // Daily-loss breaker: an excessive drawdown from today's peak stops
        // the buy phase entirely. Sells still proceed.
        let peak = self.update_peak_equity(equity);
        if equity > 0.0 {
            if let Err(err) =
                risk::check_daily_loss_limit(peak, equity, limits.max_daily_loss_pct * 100.0)
            {
                warn!(error = %err, "daily loss breaker tripped, skipping all buys");
                errors.push(format!("buys skipped: {err}"));
                return Vec::new();
            }
        }

        let mut executed = Vec::new();

        for candidate in candidates {
            if self.daily_trade_count() >= limits.max_daily_trades {
                warn!(count = self.daily_trade_count(), "daily trade limit reached");
                break;
            }

            let position_fraction = if equity > 0.0 { position_value / equity } else { 0.0 };
            if position_fraction >= limits.max_total_position_pct {
                warn!(
                    position_fraction,
                    limit = limits.max_total_position_pct,
                    "aggregate position limit reached"
                );
                break;
            }

            match self.execute_buy(cfg, candidate, equity, buy_multiplier).await {
                Ok(Some(record)) => {
                    position_value += record.notional;
                    self.record_trade();
                    executed.push(record);
                }
                Ok(None) => {}
                Err(err) => {
                    warn!(symbol = %candidate.symbol, error = %err, "buy execution failed, skipping");
                    errors.push(format!("{}: {err}", candidate.symbol));
                }
            }
        }

        executed
    }

    /// Size and place (or simulate) one buy. Returns `None` when sizing
    /// eliminates the order without it being an error.
    async fn execute_buy(
        &self,
        cfg: &AutoTraderConfig,
        signal: &TradeSignal,
        equity: f64,
        buy_multiplier: f64,
    ) -> AppResult<Option<ExecutionRecord>> {
        // Risk decisions consume live prices, so re-quote before sizing.
        let quote = self.fetch_quote(&signal.symbol).await?;
        let price = quote.price;
        if price <= 0.0 {
            return Ok(None);
        }

        let cap = cfg.max_notional_krw as f64;
        let base_qty = (cap / price).floor().max(1.0);
        let mut qty = (base_qty * buy_multiplier).floor();
        if qty < 1.0 {
            info!(symbol = %signal.symbol, buy_multiplier, "sentiment multiplier zeroed the order");
            return Ok(None);
        }

        // Notional cap, then per-position fraction of equity.
        qty = qty.min((cap / price).floor());
        if equity > 0.0 {
            qty = qty.min((equity * cfg.risk_limits.max_position_pct / price).floor());
        }
        if qty < 1.0 {
            info!(symbol = %signal.symbol, "position limits left no room for a single share");
            return Ok(None);
        }

        let quantity = qty as u32;
        let notional = f64::from(quantity) * price;

        if cfg.dry_run {
            info!(
                symbol = %signal.symbol,
                name = %signal.name,
                quantity,
                price,
                notional,
                "[DRY RUN] buy"
            );
            return Ok(Some(ExecutionRecord {
                symbol: signal.symbol.clone(),
                name: signal.name.clone(),
                action: OrderSide::Buy,
                quantity,
                price,
                notional,
                dry_run: true,
                signal_score: Some(signal.score),
                order_no: Some(format!("dry-{}", Uuid::new_v4())),
                reason: None,
            }));
        }

        let receipt = match symbol_kind(&signal.symbol) {
            Some(SymbolKind::Overseas) => {
                let exchange = stock_data::exchange_of(&signal.symbol);
                self.broker
                    .place_overseas_order(&signal.symbol, exchange, OrderSide::Buy, quantity, price)
                    .await?
            }
            _ => {
                self.broker
                    .place_order(&signal.symbol, OrderSide::Buy, quantity, Some(price.round() as u32))
                    .await?
            }
        };

        info!(symbol = %signal.symbol, quantity, price, order_no = %receipt.order_no, "buy order placed");
        Ok(Some(ExecutionRecord {
            symbol: signal.symbol.clone(),
            name: signal.name.clone(),
            action: OrderSide::Buy,
            quantity,
            price,
            notional,
            dry_run: false,
            signal_score: Some(signal.score),
            order_no: Some(receipt.order_no),
            reason: None,
        }))
    }

    // -------------------------------------------------------------------------
    // Holdings sweep
    // -------------------------------------------------------------------------

    /// Inspect each held position for take-profit, stop-loss, or a reversal
    /// of the composite signal. The cycle's sentiment snapshot is reused.
    async fn check_holdings(
        &self,
        cfg: &AutoTraderConfig,
        balance: &Balance,
        hybrid: &HybridSentiment,
    ) -> (Vec<TradeSignal>, Vec<String>) {
        let mut sells = Vec::new();
        let mut errors = Vec::new();

        for position in &balance.positions {
            if position.quantity == 0 || position.symbol.is_empty() {
                continue;
            }

            if position.pnl_pct >= TAKE_PROFIT_PCT {
                sells.push(holding_exit_signal(
                    position.symbol.clone(),
                    position.name.clone(),
                    crate::types::SignalType::Sell,
                    -40.0,
                    format!("take-profit: PnL {:+.1}% >= {TAKE_PROFIT_PCT}%", position.pnl_pct),
                    position.quantity,
                    position.current_price,
                ));
                continue;
            }

            if position.pnl_pct <= STOP_LOSS_PCT {
                sells.push(holding_exit_signal(
                    position.symbol.clone(),
                    position.name.clone(),
                    crate::types::SignalType::StrongSell,
                    -80.0,
                    format!("stop-loss: PnL {:+.1}% <= {STOP_LOSS_PCT}%", position.pnl_pct),
                    position.quantity,
                    position.current_price,
                ));
                continue;
            }

            match self
                .calculate_signal(
                    &position.symbol,
                    Some(hybrid),
                    hybrid.fear_greed.score,
                    cfg.max_notional_krw,
                )
                .await
            {
                Ok(mut signal) if signal.signal_type.is_sell() => {
                    signal.recommended_action =
                        format!("sell {} @ {:.0}", position.quantity, position.current_price);
                    sells.push(signal);
                }
                Ok(_) => {}
                Err(err) => {
                    warn!(symbol = %position.symbol, error = %err, "holding signal failed, skipping");
                    errors.push(format!("{}: {err}", position.symbol));
                }
            }
        }

        (sells, errors)
    }

    /// Execute (or simulate) the sell signals against held quantities.
    async fn execute_sell_signals(
        &self,
        cfg: &AutoTraderConfig,
        sells: &[TradeSignal],
        balance: &Balance,
        errors: &mut Vec<String>,
    ) -> Vec<ExecutionRecord> {
        let mut executed = Vec::new();

        for signal in sells {
            let Some(position) = balance.positions.iter().find(|p| p.symbol == signal.symbol)
            else {
                continue;
            };
            if position.quantity == 0 {
                continue;
            }

            if cfg.dry_run {
                info!(
                    symbol = %signal.symbol,
                    quantity = position.quantity,
                    reason = %signal.reason,
                    "[DRY RUN] sell"
                );
                executed.push(ExecutionRecord {
                    symbol: signal.symbol.clone(),
                    name: signal.name.clone(),
                    action: OrderSide::Sell,
                    quantity: position.quantity,
                    price: position.current_price,
                    notional: f64::from(position.quantity) * position.current_price,
                    dry_run: true,
                    signal_score: Some(signal.score),
                    order_no: Some(format!("dry-{}", Uuid::new_v4())),
                    reason: Some(signal.reason.clone()),
                });
                continue;
            }

            match self.execute_sell(signal, position.quantity).await {
                Ok(record) => executed.push(record),
                Err(err) => {
                    warn!(symbol = %signal.symbol, error = %err, "sell execution failed, skipping");
                    errors.push(format!("{}: {err}", signal.symbol));
                }
            }
        }

        executed
    }

    async fn execute_sell(&self, signal: &TradeSignal, quantity: u32) -> AppResult<ExecutionRecord> {
        let quote = self.fetch_quote(&signal.symbol).await?;
        let price = quote.price;

        let receipt = match symbol_kind(&signal.symbol) {
            Some(SymbolKind::Overseas) => {
                let exchange = stock_data::exchange_of(&signal.symbol);
                self.broker
                    .place_overseas_order(&signal.symbol, exchange, OrderSide::Sell, quantity, price)
                    .await?
            }
            _ => {
                self.broker
                    .place_order(&signal.symbol, OrderSide::Sell, quantity, Some(price.round() as u32))
                    .await?
            }
        };

        info!(symbol = %signal.symbol, quantity, price, order_no = %receipt.order_no, "sell order placed");
        Ok(ExecutionRecord {
            symbol: signal.symbol.clone(),
            name: signal.name.clone(),
            action: OrderSide::Sell,
            quantity,
            price,
            notional: f64::from(quantity) * price,
            dry_run: false,
            signal_score: Some(signal.score),
            order_no: Some(receipt.order_no),
            reason: Some(signal.reason.clone()),
        })
    }

    // -------------------------------------------------------------------------
    // Cycle
    // -------------------------------------------------------------------------

    /// Run one full cycle: scan, buys, holdings sweep, sells.
    pub async fn run_cycle(&self) -> AppResult<CycleResult> {
        let cfg = self.config.load_full();
        let timestamp = Utc::now().to_rfc3339();

        let market = self.sentiment.market().await?;
        let hybrid = self.sentiment.hybrid().await?;

        let sentiment = SentimentSummary {
            score: market.fear_greed.score,
            classification: market.fear_greed.classification.to_string(),
            buy_multiplier: market.buy_multiplier,
            recommendation: market.recommendation.to_string(),
            hybrid_score: Some(hybrid.hybrid_score),
            news_urgency: hybrid.news_urgency,
        };

        if hybrid.news_urgency == Some(Urgency::Critical) {
            warn!("news urgency is critical, aborting the cycle");
            return Ok(CycleResult {
                timestamp,
                sentiment,
                scanned: 0,
                buy_signals: Vec::new(),
                sell_signals: Vec::new(),
                executed_buys: Vec::new(),
                executed_sells: Vec::new(),
                dry_run: cfg.dry_run,
                errors: Vec::new(),
            });
        }

        let (signals, mut errors) = self.scan_with(&cfg, &hybrid).await;

        // One balance snapshot per cycle; a failure here is catastrophic and
        // surfaces to the scheduler as an error record.
        let balance = self.broker.balance().await?;

        let executed_buys = self
            .execute_buy_signals(&cfg, &signals, market.buy_multiplier, &balance, &mut errors)
            .await;

        let (sell_signals, sell_errors) = self.check_holdings(&cfg, &balance, &hybrid).await;
        errors.extend(sell_errors);

        let executed_sells = self
            .execute_sell_signals(&cfg, &sell_signals, &balance, &mut errors)
            .await;

        let buy_signals: Vec<SignalBrief> = signals
            .iter()
            .filter(|s| s.signal_type.is_buy())
            .map(SignalBrief::from)
            .collect();
        let sell_briefs: Vec<SignalBrief> = sell_signals.iter().map(SignalBrief::from).collect();

        info!(
            scanned = signals.len(),
            buys = buy_signals.len(),
            sells = sell_briefs.len(),
            executed_buys = executed_buys.len(),
            executed_sells = executed_sells.len(),
            dry_run = cfg.dry_run,
            "cycle complete"
        );

        Ok(CycleResult {
            timestamp,
            sentiment,
            scanned: signals.len(),
            buy_signals,
            sell_signals: sell_briefs,
            executed_buys,
            executed_sells,
            dry_run: cfg.dry_run,
            errors,
        })
    }
}

/// Sell signal for a take-profit or stop-loss exit: components zeroed, the
/// action references the held quantity.
fn holding_exit_signal(
    symbol: String,
    name: String,
    signal_type: crate::types::SignalType,
    score: f64,
    reason: String,
    quantity: u32,
    price: f64,
) -> TradeSignal {
    TradeSignal {
        symbol,
        name,
        signal_type,
        score,
        sentiment_score: 0.0,
        quality_score: 0.0,
        technical_score: 0.0,
        reason,
        recommended_action: format!("sell {quantity} @ {price:.0}"),
    }
}
