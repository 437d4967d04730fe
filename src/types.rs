// =============================================================================
// Shared types used across the Meridian trading engine
// =============================================================================

use serde::{Deserialize, Serialize};

// =============================================================================
// Symbols
// =============================================================================

/// Whether a symbol trades on the domestic (KRX) or an overseas (US) venue.
///
/// The kind is always derived from the symbol text, never stored: domestic
/// codes are exactly six digits ("005930"), overseas tickers are upper-case
/// letters with an optional dot ("AAPL", "BRK.B").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Domestic,
    Overseas,
}

/// Derive the venue kind from the symbol text. Returns `None` when the text
/// matches neither shape.
pub fn symbol_kind(symbol: &str) -> Option<SymbolKind> {
    if is_domestic_symbol(symbol) {
        Some(SymbolKind::Domestic)
    } else if is_overseas_symbol(symbol) {
        Some(SymbolKind::Overseas)
    } else {
        None
    }
}

/// Domestic symbols are exactly six ASCII digits.
pub fn is_domestic_symbol(symbol: &str) -> bool {
    symbol.len() == 6 && symbol.bytes().all(|b| b.is_ascii_digit())
}

/// Overseas tickers are one or more upper-case letters / dots.
pub fn is_overseas_symbol(symbol: &str) -> bool {
    !symbol.is_empty() && symbol.bytes().all(|b| b.is_ascii_uppercase() || b == b'.')
}

/// Overseas exchange tag carried by every overseas quote and order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Exchange {
    Nasd,
    Nyse,
    Amex,
}

impl Exchange {
    /// Wire code expected by the broker API.
    pub fn as_code(&self) -> &'static str {
        match self {
            Self::Nasd => "NASD",
            Self::Nyse => "NYSE",
            Self::Amex => "AMEX",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "NASD" => Some(Self::Nasd),
            "NYSE" => Some(Self::Nyse),
            "AMEX" => Some(Self::Amex),
            _ => None,
        }
    }
}

impl std::fmt::Display for Exchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_code())
    }
}

// =============================================================================
// Quotes
// =============================================================================

/// Most-recent-price snapshot for a symbol. Never cached; re-fetched at every
/// decision point.
#[derive(Debug, Clone, Serialize)]
pub struct Quote {
    pub symbol: String,
    pub name: String,
    /// Current price in the symbol's trading currency (KRW or USD).
    pub price: f64,
    /// Percent change against the prior close.
    pub prior_day_change_pct: f64,
    /// Intraday high.
    pub high: f64,
    /// Intraday low.
    pub low: f64,
    /// PER from the quote feed; absent for some overseas symbols.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub per: Option<f64>,
    /// PBR from the quote feed; absent for some overseas symbols.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pbr: Option<f64>,
}

// =============================================================================
// Signals
// =============================================================================

/// Discrete trade signal derived from the composite score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalType {
    StrongBuy,
    Buy,
    Hold,
    Sell,
    StrongSell,
}

impl SignalType {
    pub fn is_buy(&self) -> bool {
        matches!(self, Self::StrongBuy | Self::Buy)
    }

    pub fn is_sell(&self) -> bool {
        matches!(self, Self::StrongSell | Self::Sell)
    }
}

impl std::fmt::Display for SignalType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::StrongBuy => "strong_buy",
            Self::Buy => "buy",
            Self::Hold => "hold",
            Self::Sell => "sell",
            Self::StrongSell => "strong_sell",
        };
        f.write_str(s)
    }
}

/// Full per-symbol signal with its component breakdown.
#[derive(Debug, Clone, Serialize)]
pub struct TradeSignal {
    pub symbol: String,
    pub name: String,
    pub signal_type: SignalType,
    /// Composite score in [-100, +100].
    pub score: f64,
    pub sentiment_score: f64,
    pub quality_score: f64,
    pub technical_score: f64,
    pub reason: String,
    pub recommended_action: String,
}

/// Compact form of a signal for cycle results and history entries.
#[derive(Debug, Clone, Serialize)]
pub struct SignalBrief {
    pub symbol: String,
    pub name: String,
    pub signal_type: SignalType,
    pub score: f64,
    pub reason: String,
}

impl From<&TradeSignal> for SignalBrief {
    fn from(s: &TradeSignal) -> Self {
        Self {
            symbol: s.symbol.clone(),
            name: s.name.clone(),
            signal_type: s.signal_type,
            score: s.score,
            reason: s.reason.clone(),
        }
    }
}

// =============================================================================
// Orders / account
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "buy",
            Self::Sell => "sell",
        }
    }
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Broker acknowledgement of a placed order.
#[derive(Debug, Clone, Serialize)]
pub struct OrderReceipt {
    /// Broker-assigned order number.
    pub order_no: String,
    /// Broker-side order timestamp (HHMMSS as returned on the wire).
    pub order_time: String,
}

/// A held position from the balance inquiry.
#[derive(Debug, Clone, Serialize)]
pub struct Position {
    pub symbol: String,
    pub name: String,
    pub quantity: u32,
    pub avg_cost: f64,
    pub current_price: f64,
    pub pnl_amount: f64,
    pub pnl_pct: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BalanceSummary {
    /// Deposited cash.
    pub cash: f64,
    /// Total account evaluation (cash + positions).
    pub total_value: f64,
}

/// Account balance: held positions plus the evaluation summary.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Balance {
    pub positions: Vec<Position>,
    pub summary: BalanceSummary,
}

impl Balance {
    /// Sum of the evaluated value of all held positions.
    pub fn position_value(&self) -> f64 {
        self.positions
            .iter()
            .map(|p| p.current_price * f64::from(p.quantity))
            .sum()
    }
}

// =============================================================================
// News urgency
// =============================================================================

/// Urgency a headline was assigned by the news analyser. Ordered so that the
/// maximum over a batch is meaningful.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Low,
    Medium,
    High,
    Critical,
}

impl Urgency {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }
}

// =============================================================================
// Cycle outputs
// =============================================================================

/// Sentiment block embedded in every cycle result.
#[derive(Debug, Clone, Serialize)]
pub struct SentimentSummary {
    pub score: i32,
    pub classification: String,
    pub buy_multiplier: f64,
    pub recommendation: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hybrid_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub news_urgency: Option<Urgency>,
}

/// One executed (or simulated) order inside a cycle.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionRecord {
    pub symbol: String,
    pub name: String,
    pub action: OrderSide,
    pub quantity: u32,
    pub price: f64,
    pub notional: f64,
    pub dry_run: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_no: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Outcome of one full trading cycle.
#[derive(Debug, Clone, Serialize)]
pub struct CycleResult {
    /// ISO 8601 timestamp of the cycle start.
    pub timestamp: String,
    pub sentiment: SentimentSummary,
    /// Number of symbols that produced a signal this cycle.
    pub scanned: usize,
    pub buy_signals: Vec<SignalBrief>,
    pub sell_signals: Vec<SignalBrief>,
    pub executed_buys: Vec<ExecutionRecord>,
    pub executed_sells: Vec<ExecutionRecord>,
    pub dry_run: bool,
    /// Per-symbol failures that were skipped without aborting the cycle.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

/// Terminal status of a scheduled tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CycleStatus {
    Completed,
    Skipped,
    Error,
}

/// One entry in the scheduler's bounded cycle history.
#[derive(Debug, Clone, Serialize)]
pub struct CycleRecord {
    pub timestamp: String,
    pub status: CycleStatus,
    pub kr_market_open: bool,
    pub us_market_open: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cycle_result: Option<CycleResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domestic_symbol_shape() {
        assert!(is_domestic_symbol("005930"));
        assert!(!is_domestic_symbol("05930"));
        assert!(!is_domestic_symbol("0059300"));
        assert!(!is_domestic_symbol("00593A"));
        assert!(!is_domestic_symbol(""));
    }

    #[test]
    fn overseas_symbol_shape() {
        assert!(is_overseas_symbol("AAPL"));
        assert!(is_overseas_symbol("BRK.B"));
        assert!(!is_overseas_symbol("aapl"));
        assert!(!is_overseas_symbol("005930"));
        assert!(!is_overseas_symbol(""));
    }

    #[test]
    fn kind_is_derived_never_ambiguous() {
        assert_eq!(symbol_kind("005930"), Some(SymbolKind::Domestic));
        assert_eq!(symbol_kind("TSLA"), Some(SymbolKind::Overseas));
        assert_eq!(symbol_kind("12AB"), None);
    }

    #[test]
    fn exchange_codes_round_trip() {
        for exch in [Exchange::Nasd, Exchange::Nyse, Exchange::Amex] {
            assert_eq!(Exchange::from_code(exch.as_code()), Some(exch));
        }
        assert_eq!(Exchange::from_code("LSE"), None);
    }

    #[test]
    fn urgency_ordering_supports_max() {
        assert!(Urgency::Critical > Urgency::High);
        assert!(Urgency::High > Urgency::Medium);
        assert!(Urgency::Medium > Urgency::Low);
        let max = [Urgency::Low, Urgency::Critical, Urgency::Medium]
            .into_iter()
            .max();
        assert_eq!(max, Some(Urgency::Critical));
    }

    #[test]
    fn signal_type_serialises_snake_case() {
        let json = serde_json::to_string(&SignalType::StrongBuy).unwrap();
        assert_eq!(json, "\"strong_buy\"");
        assert_eq!(SignalType::StrongSell.to_string(), "strong_sell");
    }

    #[test]
    fn balance_position_value_sums_holdings() {
        let balance = Balance {
            positions: vec![
                Position {
                    symbol: "005930".into(),
                    name: "Samsung Electronics".into(),
                    quantity: 10,
                    avg_cost: 70_000.0,
                    current_price: 75_000.0,
                    pnl_amount: 50_000.0,
                    pnl_pct: 7.1,
                },
                Position {
                    symbol: "000660".into(),
                    name: "SK hynix".into(),
                    quantity: 2,
                    avg_cost: 180_000.0,
                    current_price: 200_000.0,
                    pnl_amount: 40_000.0,
                    pnl_pct: 11.1,
                },
            ],
            summary: BalanceSummary::default(),
        };
        assert!((balance.position_value() - 1_150_000.0).abs() < 1e-9);
    }
}
