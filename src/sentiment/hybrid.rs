// =============================================================================
// Hybrid sentiment — numeric fear/greed fused with LLM-scored news
// =============================================================================
//
// The numeric index is remapped from [0, 100] to [-100, +100] and combined
// with the news score under configurable weights. Any failure on the news
// side collapses the weights to numeric-only; the cycle never fails because
// news was unavailable.
// =============================================================================

use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::AppResult;
use crate::sentiment::fear_greed::{FearGreedIndex, MarketSentimentResult, SentimentSnapshot};
use crate::sentiment::news_collector::NewsCollector;
use crate::sentiment::news_llm::NewsSentimentAnalyzer;
use crate::types::Urgency;

const CACHE_TTL: Duration = Duration::from_secs(600);
const DEFAULT_NUMERIC_WEIGHT: f64 = 0.5;
const DEFAULT_NEWS_WEIGHT: f64 = 0.5;

// =============================================================================
// Data types
// =============================================================================

/// Fused sentiment produced once per cycle.
#[derive(Debug, Clone, Serialize)]
pub struct HybridSentiment {
    /// Weighted combination, clamped to [-100, +100].
    pub hybrid_score: f64,
    /// Remapped numeric component in [-100, +100].
    pub numeric_score: f64,
    /// News component when available.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub news_score: Option<f64>,
    pub numeric_weight: f64,
    pub news_weight: f64,
    pub news_available: bool,
    /// Highest urgency among the analysed headlines.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub news_urgency: Option<Urgency>,
    /// Raw fear/greed reading behind the numeric component.
    pub fear_greed: SentimentSnapshot,
}

// =============================================================================
// Seam
// =============================================================================

/// Sentiment inputs the cycle engine consumes. The production implementation
/// talks to the fear/greed endpoints and the news stack; tests substitute a
/// fixed feed.
#[async_trait]
pub trait SentimentFeed: Send + Sync {
    /// Numeric index with derived buy multiplier and labels.
    async fn market(&self) -> AppResult<MarketSentimentResult>;

    /// Fused hybrid sentiment for the cycle.
    async fn hybrid(&self) -> AppResult<HybridSentiment>;
}

// =============================================================================
// Pure combination
// =============================================================================

/// Remap a [0, 100] fear/greed score to [-100, +100] with 50 as neutral.
pub fn normalize_fear_greed(score: i32) -> f64 {
    f64::from(score - 50) * 2.0
}

/// Weighted combination of the numeric and news components. Returns the
/// clamped hybrid score plus the effective weights; a missing news score
/// collapses to numeric-only.
pub fn combine(
    numeric_score: f64,
    news_score: Option<f64>,
    numeric_weight: f64,
    news_weight: f64,
) -> (f64, f64, f64) {
    match news_score {
        Some(news) => {
            let hybrid = numeric_weight * numeric_score + news_weight * news;
            (hybrid.clamp(-100.0, 100.0), numeric_weight, news_weight)
        }
        None => (numeric_score.clamp(-100.0, 100.0), 1.0, 0.0),
    }
}

// =============================================================================
// Analyser
// =============================================================================

/// Production sentiment feed: fear/greed index plus the optional news stack.
pub struct HybridSentimentAnalyzer {
    fear_greed: FearGreedIndex,
    collector: NewsCollector,
    /// Absent when no LLM API key is configured; the hybrid then always runs
    /// numeric-only.
    news: Option<NewsSentimentAnalyzer>,
    numeric_weight: f64,
    news_weight: f64,
    cache: Mutex<Option<(HybridSentiment, Instant)>>,
}

impl HybridSentimentAnalyzer {
    pub fn new(news: Option<NewsSentimentAnalyzer>) -> Self {
        Self {
            fear_greed: FearGreedIndex::new(),
            collector: NewsCollector::new(),
            news,
            numeric_weight: DEFAULT_NUMERIC_WEIGHT,
            news_weight: DEFAULT_NEWS_WEIGHT,
            cache: Mutex::new(None),
        }
    }

    /// Build from the environment: the news path activates only when
    /// `OPENAI_API_KEY` is set.
    pub fn from_env() -> Self {
        let news = match std::env::var("OPENAI_API_KEY") {
            Ok(key) if !key.is_empty() => Some(NewsSentimentAnalyzer::new(key)),
            _ => None,
        };
        Self::new(news)
    }

    pub async fn analyze(&self) -> AppResult<HybridSentiment> {
        if let Some(cached) = self.cached() {
            return Ok(cached);
        }

        let fg = self.fear_greed.fetch().await?;
        let numeric_score = normalize_fear_greed(fg.score);

        let mut news_score = None;
        let mut news_urgency = None;
        if let Some(analyzer) = &self.news {
            let headlines = self.collector.fetch_headlines().await;
            if !headlines.is_empty() {
                match analyzer.analyze(&headlines).await {
                    Ok(result) => {
                        news_score = Some(f64::from(result.overall_score));
                        news_urgency = result.max_urgency();
                    }
                    Err(err) => {
                        warn!(error = %err, "news sentiment failed, falling back to numeric only");
                    }
                }
            }
        }

        let news_available = news_score.is_some();
        let (hybrid_score, numeric_weight, news_weight) =
            combine(numeric_score, news_score, self.numeric_weight, self.news_weight);

        info!(
            hybrid_score,
            numeric_score,
            news_available,
            news_urgency = ?news_urgency,
            "hybrid sentiment resolved"
        );

        let result = HybridSentiment {
            hybrid_score,
            numeric_score,
            news_score,
            numeric_weight,
            news_weight,
            news_available,
            news_urgency,
            fear_greed: fg,
        };
        *self.cache.lock() = Some((result.clone(), Instant::now()));
        Ok(result)
    }

    fn cached(&self) -> Option<HybridSentiment> {
        let cache = self.cache.lock();
        match cache.as_ref() {
            Some((result, at)) if at.elapsed() < CACHE_TTL => Some(result.clone()),
            _ => None,
        }
    }
}

#[async_trait]
impl SentimentFeed for HybridSentimentAnalyzer {
    async fn market(&self) -> AppResult<MarketSentimentResult> {
        self.fear_greed.analyze().await
    }

    async fn hybrid(&self) -> AppResult<HybridSentiment> {
        self.analyze().await
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_maps_endpoints() {
        assert!((normalize_fear_greed(0) + 100.0).abs() < f64::EPSILON);
        assert!((normalize_fear_greed(50) - 0.0).abs() < f64::EPSILON);
        assert!((normalize_fear_greed(100) - 100.0).abs() < f64::EPSILON);
        assert!((normalize_fear_greed(10) + 80.0).abs() < f64::EPSILON);
    }

    #[test]
    fn combine_weighted_both_components() {
        let (hybrid, w_num, w_news) = combine(-80.0, Some(40.0), 0.5, 0.5);
        assert!((hybrid + 20.0).abs() < f64::EPSILON);
        assert!((w_num - 0.5).abs() < f64::EPSILON);
        assert!((w_news - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn combine_collapses_without_news() {
        let (hybrid, w_num, w_news) = combine(-80.0, None, 0.5, 0.5);
        assert!((hybrid + 80.0).abs() < f64::EPSILON);
        assert!((w_num - 1.0).abs() < f64::EPSILON);
        assert!((w_news - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn combine_clamps_extremes() {
        let (hybrid, _, _) = combine(100.0, Some(100.0), 1.0, 1.0);
        assert!((hybrid - 100.0).abs() < f64::EPSILON);
        let (hybrid, _, _) = combine(-100.0, Some(-100.0), 1.0, 1.0);
        assert!((hybrid + 100.0).abs() < f64::EPSILON);
    }
}
