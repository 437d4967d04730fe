// =============================================================================
// Central application state — Meridian trading engine
// =============================================================================
//
// Ties the engine components together for the HTTP control surface. The
// operator config lives behind an `ArcSwap`: handlers replace it atomically,
// cycles snapshot it once at entry.
// =============================================================================

use std::sync::Arc;
use std::time::Instant;

use arc_swap::ArcSwap;

use crate::broker::Broker;
use crate::config::AutoTraderConfig;
use crate::scheduler::AutoTraderScheduler;
use crate::sentiment::SentimentFeed;
use crate::trader::AutoTrader;
use crate::universe::UniverseManager;

/// Shared state handed to every request handler via `Arc<AppState>`.
pub struct AppState {
    pub config: Arc<ArcSwap<AutoTraderConfig>>,
    pub universe: Arc<UniverseManager>,
    pub trader: Arc<AutoTrader>,
    pub scheduler: Arc<AutoTraderScheduler>,
    /// Engine start instant, for uptime reporting.
    pub start_time: Instant,
}

impl AppState {
    pub fn new(broker: Arc<dyn Broker>, sentiment: Arc<dyn SentimentFeed>) -> Self {
        let config = Arc::new(ArcSwap::from_pointee(AutoTraderConfig::default()));
        let universe = Arc::new(UniverseManager::new());
        let trader = Arc::new(AutoTrader::new(
            broker,
            sentiment,
            universe.clone(),
            config.clone(),
        ));
        let scheduler = Arc::new(AutoTraderScheduler::new(trader.clone()));

        Self {
            config,
            universe,
            trader,
            scheduler,
            start_time: Instant::now(),
        }
    }
}
