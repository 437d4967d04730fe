// =============================================================================
// Test doubles shared by the trader and scheduler test modules
// =============================================================================

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::broker::Broker;
use crate::error::{AppError, AppResult};
use crate::sentiment::fear_greed::{
    buy_multiplier, classify_score, market_condition, recommendation, MarketSentimentResult,
    SentimentSnapshot,
};
use crate::sentiment::hybrid::{normalize_fear_greed, HybridSentiment, SentimentFeed};
use crate::types::{Balance, Exchange, OrderReceipt, OrderSide, Quote, Urgency};

/// One order recorded by the mock broker.
#[derive(Debug, Clone)]
pub struct PlacedOrder {
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: u32,
    pub price: Option<f64>,
}

/// In-memory broker: configurable quotes and balance, order log, per-symbol
/// rejection injection.
pub struct MockBroker {
    quotes: Mutex<HashMap<String, Quote>>,
    balance: Mutex<Balance>,
    orders: Mutex<Vec<PlacedOrder>>,
    failing: Mutex<HashSet<String>>,
    quote_calls: AtomicU32,
}

impl MockBroker {
    pub fn new() -> Self {
        Self {
            quotes: Mutex::new(HashMap::new()),
            balance: Mutex::new(Balance::default()),
            orders: Mutex::new(Vec::new()),
            failing: Mutex::new(HashSet::new()),
            quote_calls: AtomicU32::new(0),
        }
    }

    pub fn set_quote(&self, quote: Quote) {
        self.quotes.lock().insert(quote.symbol.clone(), quote);
    }

    pub fn set_balance(&self, balance: Balance) {
        *self.balance.lock() = balance;
    }

    /// Make order placement for `symbol` fail with an order rejection.
    pub fn fail_orders_for(&self, symbol: &str) {
        self.failing.lock().insert(symbol.to_string());
    }

    pub fn placed_orders(&self) -> Vec<PlacedOrder> {
        self.orders.lock().clone()
    }

    pub fn quote_calls(&self) -> u32 {
        self.quote_calls.load(Ordering::Relaxed)
    }

    fn lookup_quote(&self, symbol: &str) -> AppResult<Quote> {
        self.quote_calls.fetch_add(1, Ordering::Relaxed);
        self.quotes
            .lock()
            .get(symbol)
            .cloned()
            .ok_or_else(|| AppError::broker(format!("no quote configured for {symbol}")))
    }

    fn record_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: u32,
        price: Option<f64>,
    ) -> AppResult<OrderReceipt> {
        if self.failing.lock().contains(symbol) {
            return Err(AppError::order(format!("order rejected for {symbol}")));
        }
        let mut orders = self.orders.lock();
        orders.push(PlacedOrder { symbol: symbol.to_string(), side, quantity, price });
        Ok(OrderReceipt {
            order_no: format!("{:010}", orders.len()),
            order_time: "121052".to_string(),
        })
    }
}

#[async_trait]
impl Broker for MockBroker {
    async fn quote(&self, code: &str) -> AppResult<Quote> {
        self.lookup_quote(code)
    }

    async fn quote_overseas(&self, ticker: &str, _exchange: Exchange) -> AppResult<Quote> {
        self.lookup_quote(ticker)
    }

    async fn place_order(
        &self,
        code: &str,
        side: OrderSide,
        quantity: u32,
        price: Option<u32>,
    ) -> AppResult<OrderReceipt> {
        self.record_order(code, side, quantity, price.map(f64::from))
    }

    async fn place_overseas_order(
        &self,
        ticker: &str,
        _exchange: Exchange,
        side: OrderSide,
        quantity: u32,
        price: f64,
    ) -> AppResult<OrderReceipt> {
        self.record_order(ticker, side, quantity, Some(price))
    }

    async fn balance(&self) -> AppResult<Balance> {
        Ok(self.balance.lock().clone())
    }

    async fn overseas_balance(&self) -> AppResult<Balance> {
        Ok(Balance::default())
    }
}

/// Fixed sentiment feed driven by a single fear/greed score.
pub struct MockSentimentFeed {
    score: i32,
    news_urgency: Option<Urgency>,
}

impl MockSentimentFeed {
    pub fn with_score(score: i32) -> Self {
        Self { score, news_urgency: None }
    }

    pub fn urgency(mut self, urgency: Urgency) -> Self {
        self.news_urgency = Some(urgency);
        self
    }

    fn snapshot(&self) -> SentimentSnapshot {
        SentimentSnapshot {
            score: self.score,
            classification: classify_score(self.score),
            timestamp: chrono::Utc::now(),
            source: "cnn",
        }
    }
}

#[async_trait]
impl SentimentFeed for MockSentimentFeed {
    async fn market(&self) -> AppResult<MarketSentimentResult> {
        Ok(MarketSentimentResult {
            fear_greed: self.snapshot(),
            buy_multiplier: buy_multiplier(self.score),
            market_condition: market_condition(self.score),
            recommendation: recommendation(self.score),
        })
    }

    async fn hybrid(&self) -> AppResult<HybridSentiment> {
        let numeric_score = normalize_fear_greed(self.score);
        Ok(HybridSentiment {
            hybrid_score: numeric_score,
            numeric_score,
            news_score: None,
            numeric_weight: 1.0,
            news_weight: 0.0,
            news_available: false,
            news_urgency: self.news_urgency,
            fear_greed: self.snapshot(),
        })
    }
}
