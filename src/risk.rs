// =============================================================================
// Risk utilities — position sizing and the daily-loss circuit breaker
// =============================================================================
//
// Pure calculation only: no I/O, no shared state. The cycle engine calls
// `check_daily_loss_limit` before its buy phase; a tripped breaker surfaces
// as a strategy error that stops buys while sells proceed.
// =============================================================================

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{AppError, AppResult};

/// Per-trade sizing limits for stop-loss based position sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionRiskConfig {
    /// Maximum loss a single trade may inflict, as a percentage of equity.
    pub max_risk_per_trade_pct: f64,
    /// Maximum capital a single position may take, as a percentage of equity.
    pub max_position_size_pct: f64,
}

impl Default for PositionRiskConfig {
    fn default() -> Self {
        Self {
            max_risk_per_trade_pct: 1.0,
            max_position_size_pct: 20.0,
        }
    }
}

impl PositionRiskConfig {
    pub fn validate(&self) -> AppResult<()> {
        if self.max_risk_per_trade_pct <= 0.0 {
            return Err(AppError::validation_with(
                "max_risk_per_trade_pct must be positive",
                serde_json::json!({ "max_risk_per_trade_pct": self.max_risk_per_trade_pct }),
            ));
        }
        if self.max_position_size_pct <= 0.0 {
            return Err(AppError::validation_with(
                "max_position_size_pct must be positive",
                serde_json::json!({ "max_position_size_pct": self.max_position_size_pct }),
            ));
        }
        Ok(())
    }
}

/// Largest long-position quantity satisfying both the per-trade loss limit
/// and the per-position capital limit, given a stop-loss price.
///
/// Rules:
/// - the stop must sit below the entry;
/// - max loss per trade = `equity * max_risk_per_trade_pct / 100`;
/// - max capital per position = `equity * max_position_size_pct / 100`;
/// - the quantity is floored to an integer and must be at least 1.
pub fn calculate_position_size(
    equity: f64,
    entry_price: f64,
    stop_loss_price: f64,
    config: &PositionRiskConfig,
) -> AppResult<u32> {
    config.validate()?;

    if equity <= 0.0 {
        return Err(AppError::validation_with(
            "equity must be positive",
            serde_json::json!({ "equity": equity }),
        ));
    }
    if entry_price <= 0.0 || stop_loss_price <= 0.0 {
        return Err(AppError::validation_with(
            "entry and stop prices must be positive",
            serde_json::json!({ "entry_price": entry_price, "stop_loss_price": stop_loss_price }),
        ));
    }
    if stop_loss_price >= entry_price {
        return Err(AppError::validation_with(
            "stop-loss price must be below the entry price",
            serde_json::json!({ "entry_price": entry_price, "stop_loss_price": stop_loss_price }),
        ));
    }

    let risk_per_share = entry_price - stop_loss_price;
    let max_risk_amount = equity * (config.max_risk_per_trade_pct / 100.0);
    let max_position_capital = equity * (config.max_position_size_pct / 100.0);

    let qty_by_risk = (max_risk_amount / risk_per_share).floor();
    let qty_by_capital = (max_position_capital / entry_price).floor();
    let quantity = qty_by_risk.min(qty_by_capital);

    if quantity < 1.0 {
        return Err(AppError::validation_with(
            "risk limits do not allow a position of at least one share",
            serde_json::json!({
                "equity": equity,
                "entry_price": entry_price,
                "stop_loss_price": stop_loss_price,
                "risk_per_share": risk_per_share,
                "max_risk_amount": max_risk_amount,
                "max_position_capital": max_position_capital,
            }),
        ));
    }

    info!(
        equity,
        entry_price,
        stop_loss_price,
        quantity,
        "position size calculated"
    );
    Ok(quantity as u32)
}

/// Daily-loss circuit breaker: compares the drawdown from today's peak equity
/// against the allowed percentage.
///
/// A fresh equity high always passes. A drawdown above the limit returns a
/// strategy error — the caller must stop opening positions for the day.
pub fn check_daily_loss_limit(
    peak_equity: f64,
    current_equity: f64,
    max_daily_loss_pct: f64,
) -> AppResult<()> {
    if peak_equity <= 0.0 || current_equity <= 0.0 {
        return Err(AppError::validation_with(
            "equity values must be positive",
            serde_json::json!({ "peak_equity": peak_equity, "current_equity": current_equity }),
        ));
    }
    if max_daily_loss_pct <= 0.0 {
        return Err(AppError::validation_with(
            "max_daily_loss_pct must be positive",
            serde_json::json!({ "max_daily_loss_pct": max_daily_loss_pct }),
        ));
    }

    if current_equity > peak_equity {
        info!(
            peak_equity,
            current_equity, "new equity high, daily loss limit not applicable"
        );
        return Ok(());
    }

    let drawdown_pct = (peak_equity - current_equity) / peak_equity * 100.0;
    info!(
        peak_equity,
        current_equity, drawdown_pct, max_daily_loss_pct, "daily loss check"
    );

    if drawdown_pct > max_daily_loss_pct {
        return Err(AppError::strategy_with(
            "daily loss limit exceeded, trading stopped for today",
            serde_json::json!({
                "peak_equity": peak_equity,
                "current_equity": current_equity,
                "drawdown_pct": drawdown_pct,
                "max_daily_loss_pct": max_daily_loss_pct,
            }),
        ));
    }

    Ok(())
}
