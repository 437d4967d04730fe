// =============================================================================
// Market sentiment — numeric fear/greed index, RSS news, LLM scoring,
// and the hybrid fusion consumed by the trading cycle
// =============================================================================

pub mod fear_greed;
pub mod hybrid;
pub mod news_collector;
pub mod news_llm;

pub use fear_greed::{FearGreedIndex, MarketSentimentResult};
pub use hybrid::{HybridSentiment, HybridSentimentAnalyzer, SentimentFeed};
