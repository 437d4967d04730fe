// =============================================================================
// Fear & Greed index — numeric market sentiment with a fallback source
// =============================================================================
//
// The CNN endpoint is primary; alternative.me is the fallback with a
// different schema (string integer, seconds epoch). Results are cached for
// ten minutes; entries past the TTL refresh on first access.
// =============================================================================

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{AppError, AppResult};

const CNN_URL: &str = "https://production.dataviz.cnn.io/index/fearandgreed/graphdata";
const ALTERNATIVE_URL: &str = "https://api.alternative.me/fng/?limit=1";

const CACHE_TTL: Duration = Duration::from_secs(600);
const USER_AGENT: &str = "meridian-trader/1.0";

// =============================================================================
// Classification
// =============================================================================

/// Sentiment bucket, a pure step function of the integer score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Classification {
    #[serde(rename = "Extreme Fear")]
    ExtremeFear,
    Fear,
    Neutral,
    Greed,
    #[serde(rename = "Extreme Greed")]
    ExtremeGreed,
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::ExtremeFear => "Extreme Fear",
            Self::Fear => "Fear",
            Self::Neutral => "Neutral",
            Self::Greed => "Greed",
            Self::ExtremeGreed => "Extreme Greed",
        };
        f.write_str(s)
    }
}

/// Classify a fear/greed score. Right-open intervals; out-of-range input is
/// clamped into [0, 100].
pub fn classify_score(score: i32) -> Classification {
    let score = score.clamp(0, 100);
    match score {
        0..=24 => Classification::ExtremeFear,
        25..=44 => Classification::Fear,
        45..=54 => Classification::Neutral,
        55..=74 => Classification::Greed,
        _ => Classification::ExtremeGreed,
    }
}

/// Buy-strength multiplier applied to position sizing. Extreme fear buys
/// aggressively; extreme greed stops buying entirely.
pub fn buy_multiplier(score: i32) -> f64 {
    let score = score.clamp(0, 100);
    match score {
        0..=24 => 1.5,
        25..=44 => 1.2,
        45..=54 => 1.0,
        55..=74 => 0.5,
        _ => 0.0,
    }
}

/// Coarse market condition label.
pub fn market_condition(score: i32) -> &'static str {
    let score = score.clamp(0, 100);
    match score {
        0..=24 => "oversold",
        25..=74 => "neutral",
        _ => "overbought",
    }
}

/// Operator-facing recommendation label.
pub fn recommendation(score: i32) -> &'static str {
    let score = score.clamp(0, 100);
    match score {
        0..=24 => "aggressive_buy",
        25..=44 => "buy",
        45..=54 => "hold",
        55..=74 => "reduce",
        _ => "stop_buy",
    }
}

// =============================================================================
// Data types
// =============================================================================

/// One fetched fear/greed reading.
#[derive(Debug, Clone, Serialize)]
pub struct SentimentSnapshot {
    pub score: i32,
    pub classification: Classification,
    pub timestamp: DateTime<Utc>,
    pub source: &'static str,
}

/// Numeric sentiment with derived trading hints.
#[derive(Debug, Clone, Serialize)]
pub struct MarketSentimentResult {
    pub fear_greed: SentimentSnapshot,
    pub buy_multiplier: f64,
    pub market_condition: &'static str,
    pub recommendation: &'static str,
}

// =============================================================================
// FearGreedIndex
// =============================================================================

/// Fetches the fear/greed index with fallback and TTL caching.
pub struct FearGreedIndex {
    http: reqwest::Client,
    cnn_url: String,
    alternative_url: String,
    cache: Mutex<Option<(SentimentSnapshot, Instant)>>,
}

impl FearGreedIndex {
    pub fn new() -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("failed to build reqwest client");
        Self {
            http,
            cnn_url: CNN_URL.to_string(),
            alternative_url: ALTERNATIVE_URL.to_string(),
            cache: Mutex::new(None),
        }
    }

    /// Fetch the current index, serving from the cache when fresh.
    pub async fn fetch(&self) -> AppResult<SentimentSnapshot> {
        if let Some(cached) = self.cached() {
            debug!(score = cached.score, "returning cached fear/greed index");
            return Ok(cached);
        }

        let snapshot = self.fetch_fresh().await?;
        *self.cache.lock() = Some((snapshot.clone(), Instant::now()));
        Ok(snapshot)
    }

    /// Full numeric analysis: index plus multiplier / condition /
    /// recommendation labels.
    pub async fn analyze(&self) -> AppResult<MarketSentimentResult> {
        let fg = self.fetch().await?;
        let result = MarketSentimentResult {
            buy_multiplier: buy_multiplier(fg.score),
            market_condition: market_condition(fg.score),
            recommendation: recommendation(fg.score),
            fear_greed: fg,
        };
        info!(
            score = result.fear_greed.score,
            classification = %result.fear_greed.classification,
            multiplier = result.buy_multiplier,
            recommendation = result.recommendation,
            "market sentiment analysed"
        );
        Ok(result)
    }

    fn cached(&self) -> Option<SentimentSnapshot> {
        let cache = self.cache.lock();
        match cache.as_ref() {
            Some((snapshot, at)) if at.elapsed() < CACHE_TTL => Some(snapshot.clone()),
            _ => None,
        }
    }

    async fn fetch_fresh(&self) -> AppResult<SentimentSnapshot> {
        match self.fetch_cnn().await {
            Ok(snapshot) => Ok(snapshot),
            Err(err) => {
                warn!(error = %err, "CNN fear/greed fetch failed, using alternative.me");
                self.fetch_alternative().await
            }
        }
    }

    async fn fetch_cnn(&self) -> AppResult<SentimentSnapshot> {
        let body: Value = self
            .http
            .get(&self.cnn_url)
            .header("User-Agent", USER_AGENT)
            .send()
            .await
            .map_err(|e| AppError::data_collection(format!("CNN fear/greed request failed: {e}")))?
            .error_for_status()
            .map_err(|e| AppError::data_collection(format!("CNN fear/greed returned error: {e}")))?
            .json()
            .await
            .map_err(|e| AppError::data_collection(format!("CNN fear/greed parse failed: {e}")))?;
        parse_cnn(&body)
    }

    async fn fetch_alternative(&self) -> AppResult<SentimentSnapshot> {
        let body: Value = self
            .http
            .get(&self.alternative_url)
            .send()
            .await
            .map_err(|e| AppError::data_collection(format!("alternative.me request failed: {e}")))?
            .error_for_status()
            .map_err(|e| AppError::data_collection(format!("alternative.me returned error: {e}")))?
            .json()
            .await
            .map_err(|e| AppError::data_collection(format!("alternative.me parse failed: {e}")))?;
        parse_alternative(&body)
    }
}

impl Default for FearGreedIndex {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse the CNN graphdata schema: float score under `fear_and_greed.score`,
/// millisecond epoch timestamp.
pub fn parse_cnn(body: &Value) -> AppResult<SentimentSnapshot> {
    let node = &body["fear_and_greed"];
    let score = node["score"]
        .as_f64()
        .ok_or_else(|| AppError::data_collection("CNN response missing fear_and_greed.score"))?;
    let score = (score.round() as i32).clamp(0, 100);

    let timestamp = node["timestamp"]
        .as_i64()
        .and_then(DateTime::from_timestamp_millis)
        .unwrap_or_else(Utc::now);

    Ok(SentimentSnapshot {
        score,
        classification: classify_score(score),
        timestamp,
        source: "cnn",
    })
}

/// Parse the alternative.me schema: string integer under `data[0].value`,
/// seconds epoch timestamp (also a string).
pub fn parse_alternative(body: &Value) -> AppResult<SentimentSnapshot> {
    let entry = &body["data"][0];
    let score: i32 = entry["value"]
        .as_str()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| AppError::data_collection("alternative.me response missing data[0].value"))?;
    let score = score.clamp(0, 100);

    let timestamp = entry["timestamp"]
        .as_str()
        .and_then(|s| s.parse::<i64>().ok())
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .unwrap_or_else(Utc::now);

    Ok(SentimentSnapshot {
        score,
        classification: classify_score(score),
        timestamp,
        source: "alternative",
    })
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_boundaries_are_right_open() {
        assert_eq!(classify_score(0), Classification::ExtremeFear);
        assert_eq!(classify_score(24), Classification::ExtremeFear);
        assert_eq!(classify_score(25), Classification::Fear);
        assert_eq!(classify_score(44), Classification::Fear);
        assert_eq!(classify_score(45), Classification::Neutral);
        assert_eq!(classify_score(54), Classification::Neutral);
        assert_eq!(classify_score(55), Classification::Greed);
        assert_eq!(classify_score(74), Classification::Greed);
        assert_eq!(classify_score(75), Classification::ExtremeGreed);
        assert_eq!(classify_score(100), Classification::ExtremeGreed);
    }

    #[test]
    fn out_of_range_scores_are_clamped() {
        assert_eq!(classify_score(-10), Classification::ExtremeFear);
        assert_eq!(classify_score(150), Classification::ExtremeGreed);
        assert!((buy_multiplier(-10) - 1.5).abs() < f64::EPSILON);
        assert!((buy_multiplier(150) - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn buy_multiplier_steps() {
        assert!((buy_multiplier(10) - 1.5).abs() < f64::EPSILON);
        assert!((buy_multiplier(25) - 1.2).abs() < f64::EPSILON);
        assert!((buy_multiplier(45) - 1.0).abs() < f64::EPSILON);
        assert!((buy_multiplier(55) - 0.5).abs() < f64::EPSILON);
        assert!((buy_multiplier(75) - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn buy_multiplier_is_monotone_non_increasing() {
        let mut prev = f64::INFINITY;
        for score in 0..=100 {
            let m = buy_multiplier(score);
            assert!(m <= prev, "multiplier increased at score {score}");
            prev = m;
        }
    }

    #[test]
    fn condition_and_recommendation_labels() {
        assert_eq!(market_condition(10), "oversold");
        assert_eq!(market_condition(50), "neutral");
        assert_eq!(market_condition(80), "overbought");
        assert_eq!(recommendation(10), "aggressive_buy");
        assert_eq!(recommendation(30), "buy");
        assert_eq!(recommendation(50), "hold");
        assert_eq!(recommendation(60), "reduce");
        assert_eq!(recommendation(90), "stop_buy");
    }

    #[test]
    fn parse_cnn_schema() {
        let body = serde_json::json!({
            "fear_and_greed": {
                "score": 38.6,
                "timestamp": 1_700_000_000_000_i64,
            }
        });
        let snapshot = parse_cnn(&body).unwrap();
        assert_eq!(snapshot.score, 39);
        assert_eq!(snapshot.classification, Classification::Fear);
        assert_eq!(snapshot.source, "cnn");
        assert_eq!(snapshot.timestamp.timestamp(), 1_700_000_000);
    }

    #[test]
    fn parse_cnn_missing_score_fails() {
        let body = serde_json::json!({ "fear_and_greed": {} });
        assert!(parse_cnn(&body).is_err());
    }

    #[test]
    fn parse_alternative_schema() {
        let body = serde_json::json!({
            "data": [{ "value": "72", "timestamp": "1700000000" }]
        });
        let snapshot = parse_alternative(&body).unwrap();
        assert_eq!(snapshot.score, 72);
        assert_eq!(snapshot.classification, Classification::Greed);
        assert_eq!(snapshot.source, "alternative");
        assert_eq!(snapshot.timestamp.timestamp(), 1_700_000_000);
    }

    #[test]
    fn parse_alternative_empty_fails() {
        let body = serde_json::json!({ "data": [] });
        assert!(parse_alternative(&body).is_err());
    }

    #[test]
    fn classification_serialises_display_names() {
        let json = serde_json::to_string(&Classification::ExtremeFear).unwrap();
        assert_eq!(json, "\"Extreme Fear\"");
        let json = serde_json::to_string(&Classification::Neutral).unwrap();
        assert_eq!(json, "\"Neutral\"");
    }
}
