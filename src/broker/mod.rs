// =============================================================================
// Broker gateway — trait seam plus the KIS REST client implementation
// =============================================================================

pub mod client;

use async_trait::async_trait;

use crate::error::AppResult;
use crate::types::{Balance, Exchange, OrderReceipt, OrderSide, Quote};

pub use client::KisClient;

/// Brokerage operations the trading engine consumes. The production
/// implementation is [`KisClient`]; tests substitute an in-memory broker.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Domestic quote by 6-digit code.
    async fn quote(&self, code: &str) -> AppResult<Quote>;

    /// Overseas quote by ticker and exchange.
    async fn quote_overseas(&self, ticker: &str, exchange: Exchange) -> AppResult<Quote>;

    /// Domestic cash order. `price = None` places a market order.
    async fn place_order(
        &self,
        code: &str,
        side: OrderSide,
        quantity: u32,
        price: Option<u32>,
    ) -> AppResult<OrderReceipt>;

    /// Overseas order; a limit price is mandatory.
    async fn place_overseas_order(
        &self,
        ticker: &str,
        exchange: Exchange,
        side: OrderSide,
        quantity: u32,
        price: f64,
    ) -> AppResult<OrderReceipt>;

    /// Domestic account balance.
    async fn balance(&self) -> AppResult<Balance>;

    /// Overseas account balance.
    async fn overseas_balance(&self) -> AppResult<Balance>;
}
