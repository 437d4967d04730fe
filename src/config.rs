// =============================================================================
// Engine configuration — risk limits, trader settings, broker credentials
// =============================================================================
//
// `AutoTraderConfig` is the operator-facing configuration replaced through the
// control surface. It is held in an `ArcSwap` so that a running cycle keeps
// the snapshot it read at entry and never observes a torn config.
//
// All fields carry serde defaults so a partial JSON body on `PUT /config`
// fills in the rest.
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_true() -> bool {
    true
}

fn default_universe_name() -> String {
    "kospi_top30".to_string()
}

fn default_max_daily_trades() -> u32 {
    10
}

fn default_max_position_pct() -> f64 {
    0.2
}

fn default_max_total_position_pct() -> f64 {
    0.8
}

fn default_max_daily_loss_pct() -> f64 {
    0.03
}

fn default_min_signal_score_buy() -> f64 {
    35.0
}

fn default_max_signal_score_sell() -> f64 {
    -20.0
}

fn default_max_notional_krw() -> u64 {
    5_000_000
}

// =============================================================================
// RiskLimits
// =============================================================================

/// Global per-cycle risk constraints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskLimits {
    /// Maximum accepted orders per KST calendar day.
    #[serde(default = "default_max_daily_trades")]
    pub max_daily_trades: u32,

    /// Maximum fraction of total equity a single position may take.
    #[serde(default = "default_max_position_pct")]
    pub max_position_pct: f64,

    /// Maximum aggregate position fraction of total equity.
    #[serde(default = "default_max_total_position_pct")]
    pub max_total_position_pct: f64,

    /// Daily-loss circuit breaker as a fraction of peak equity.
    #[serde(default = "default_max_daily_loss_pct")]
    pub max_daily_loss_pct: f64,

    /// Minimum composite score a buy candidate must reach.
    /// This field is the sole source of truth for the buy threshold.
    #[serde(default = "default_min_signal_score_buy")]
    pub min_signal_score_buy: f64,

    /// Score at or below which a reversal sell is considered.
    #[serde(default = "default_max_signal_score_sell")]
    pub max_signal_score_sell: f64,
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self {
            max_daily_trades: default_max_daily_trades(),
            max_position_pct: default_max_position_pct(),
            max_total_position_pct: default_max_total_position_pct(),
            max_daily_loss_pct: default_max_daily_loss_pct(),
            min_signal_score_buy: default_min_signal_score_buy(),
            max_signal_score_sell: default_max_signal_score_sell(),
        }
    }
}

// =============================================================================
// AutoTraderConfig
// =============================================================================

/// Operator-facing trader configuration. Replaced atomically via the control
/// surface; a change takes effect on the next cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoTraderConfig {
    /// Name of the symbol universe scanned each cycle.
    #[serde(default = "default_universe_name")]
    pub universe_name: String,

    #[serde(default)]
    pub risk_limits: RiskLimits,

    /// When true (the default), all decision logic runs but no order leaves
    /// the executor.
    #[serde(default = "default_true")]
    pub dry_run: bool,

    /// Per-symbol notional cap in KRW.
    #[serde(default = "default_max_notional_krw")]
    pub max_notional_krw: u64,
}

impl Default for AutoTraderConfig {
    fn default() -> Self {
        Self {
            universe_name: default_universe_name(),
            risk_limits: RiskLimits::default(),
            dry_run: true,
            max_notional_krw: default_max_notional_krw(),
        }
    }
}

// =============================================================================
// Broker credentials (environment)
// =============================================================================

/// Broker credentials read from the environment at startup.
#[derive(Debug, Clone)]
pub struct BrokerSettings {
    pub app_key: String,
    pub app_secret: String,
    /// Account identifier in "XXXXXXXX-XX" form.
    pub account_no: String,
    /// Mock (paper) mode selects the VTS host and mock transaction ids.
    pub mock: bool,
}

impl BrokerSettings {
    /// Load credentials from `KIS_APP_KEY`, `KIS_APP_SECRET`,
    /// `KIS_ACCOUNT_NO`, and `KIS_MOCK` (anything except "false"/"0" keeps
    /// the safe mock default).
    pub fn from_env() -> AppResult<Self> {
        let app_key = std::env::var("KIS_APP_KEY").unwrap_or_default();
        let app_secret = std::env::var("KIS_APP_SECRET").unwrap_or_default();
        let account_no = std::env::var("KIS_ACCOUNT_NO").unwrap_or_default();

        if app_key.is_empty() || app_secret.is_empty() || account_no.is_empty() {
            return Err(AppError::validation_with(
                "KIS_APP_KEY, KIS_APP_SECRET and KIS_ACCOUNT_NO must be set",
                serde_json::json!({
                    "app_key": !app_key.is_empty(),
                    "app_secret": !app_secret.is_empty(),
                    "account_no": !account_no.is_empty(),
                }),
            ));
        }

        let mock = !matches!(
            std::env::var("KIS_MOCK").unwrap_or_default().as_str(),
            "false" | "0"
        );

        Ok(Self { app_key, app_secret, account_no, mock })
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let cfg = AutoTraderConfig::default();
        assert_eq!(cfg.universe_name, "kospi_top30");
        assert!(cfg.dry_run);
        assert_eq!(cfg.max_notional_krw, 5_000_000);
        assert_eq!(cfg.risk_limits.max_daily_trades, 10);
        assert!((cfg.risk_limits.max_position_pct - 0.2).abs() < f64::EPSILON);
        assert!((cfg.risk_limits.max_total_position_pct - 0.8).abs() < f64::EPSILON);
        assert!((cfg.risk_limits.min_signal_score_buy - 35.0).abs() < f64::EPSILON);
        assert!((cfg.risk_limits.max_signal_score_sell + 20.0).abs() < f64::EPSILON);
    }

    #[test]
    fn deserialise_empty_json_uses_defaults() {
        let cfg: AutoTraderConfig = serde_json::from_str("{}").unwrap();
        assert!(cfg.dry_run);
        assert_eq!(cfg.universe_name, "kospi_top30");
        assert_eq!(cfg.risk_limits.max_daily_trades, 10);
    }

    #[test]
    fn deserialise_partial_json_fills_defaults() {
        let json = r#"{ "dry_run": false, "risk_limits": { "max_daily_trades": 3 } }"#;
        let cfg: AutoTraderConfig = serde_json::from_str(json).unwrap();
        assert!(!cfg.dry_run);
        assert_eq!(cfg.risk_limits.max_daily_trades, 3);
        assert!((cfg.risk_limits.max_position_pct - 0.2).abs() < f64::EPSILON);
        assert_eq!(cfg.max_notional_krw, 5_000_000);
    }

    #[test]
    fn roundtrip_serialisation() {
        let cfg = AutoTraderConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let cfg2: AutoTraderConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(cfg.universe_name, cfg2.universe_name);
        assert_eq!(cfg.risk_limits.max_daily_trades, cfg2.risk_limits.max_daily_trades);
        assert_eq!(cfg.dry_run, cfg2.dry_run);
    }
}
