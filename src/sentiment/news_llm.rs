// =============================================================================
// LLM news sentiment — headline batch scoring via a chat-completions endpoint
// =============================================================================
//
// The analyser sends the current headline batch to an OpenAI-compatible
// chat-completions endpoint and expects a JSON object with a fixed schema
// (overall_score, market_impact_summary, analyses[]). Scores are clamped on
// parse; results are cached for ten minutes.
// =============================================================================

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error};

use crate::error::{AppError, AppResult};
use crate::sentiment::news_collector::NewsHeadline;
use crate::types::Urgency;

const DEFAULT_BASE_URL: &str = "https://api.openai.com";
const DEFAULT_MODEL: &str = "gpt-4o-mini";
const CACHE_TTL: Duration = Duration::from_secs(600);

const SYSTEM_PROMPT: &str = r#"You are a financial news analyst. Analyze the given news headlines and assess their potential impact on the stock market.

For each headline, provide:
- impact_score: integer from -100 (very negative) to +100 (very positive) for market impact
- category: one of "geopolitical", "monetary", "earnings", "trade", "regulation", "other"
- affected_sectors: list of affected market sectors
- urgency: one of "low", "medium", "high", "critical"
- reasoning: brief explanation (1-2 sentences)

Also provide:
- overall_score: integer from -100 to +100 representing overall market sentiment
- market_impact_summary: 2-3 sentence summary of overall market impact

Respond in JSON format with this exact structure:
{
  "overall_score": 0,
  "market_impact_summary": "...",
  "analyses": [
    {
      "title": "...",
      "impact_score": 0,
      "category": "...",
      "affected_sectors": ["..."],
      "urgency": "...",
      "reasoning": "..."
    }
  ]
}"#;

// =============================================================================
// Data types
// =============================================================================

/// Analysis of a single headline.
#[derive(Debug, Clone, Serialize)]
pub struct HeadlineAnalysis {
    pub title: String,
    pub impact_score: i32,
    pub category: String,
    pub affected_sectors: Vec<String>,
    pub urgency: Urgency,
    pub reasoning: String,
}

/// Aggregated news sentiment for a headline batch.
#[derive(Debug, Clone, Serialize)]
pub struct NewsSentimentResult {
    pub overall_score: i32,
    pub analyses: Vec<HeadlineAnalysis>,
    pub category_scores: HashMap<String, f64>,
    pub market_impact_summary: String,
}

impl NewsSentimentResult {
    /// Highest urgency across the batch, `None` when no analyses exist.
    pub fn max_urgency(&self) -> Option<Urgency> {
        self.analyses.iter().map(|a| a.urgency).max()
    }
}

// =============================================================================
// Analyser
// =============================================================================

pub struct NewsSentimentAnalyzer {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    cache: Mutex<Option<(NewsSentimentResult, Instant)>>,
}

impl NewsSentimentAnalyzer {
    pub fn new(api_key: String) -> Self {
        let model =
            std::env::var("NEWS_LLM_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        Self {
            // The upstream client default timeout applies; none is forced here.
            http: reqwest::Client::new(),
            api_key,
            model,
            base_url: DEFAULT_BASE_URL.to_string(),
            cache: Mutex::new(None),
        }
    }

    /// Analyse a headline batch, serving from the cache when fresh. An empty
    /// batch short-circuits to a neutral result without an API call.
    pub async fn analyze(&self, headlines: &[NewsHeadline]) -> AppResult<NewsSentimentResult> {
        if let Some(cached) = self.cached() {
            debug!("returning cached news sentiment");
            return Ok(cached);
        }

        if headlines.is_empty() {
            return Ok(NewsSentimentResult {
                overall_score: 0,
                analyses: Vec::new(),
                category_scores: HashMap::new(),
                market_impact_summary: "no headlines to analyse".to_string(),
            });
        }

        let result = self.analyze_fresh(headlines).await?;
        *self.cache.lock() = Some((result.clone(), Instant::now()));
        Ok(result)
    }

    fn cached(&self) -> Option<NewsSentimentResult> {
        let cache = self.cache.lock();
        match cache.as_ref() {
            Some((result, at)) if at.elapsed() < CACHE_TTL => Some(result.clone()),
            _ => None,
        }
    }

    async fn analyze_fresh(&self, headlines: &[NewsHeadline]) -> AppResult<NewsSentimentResult> {
        let headline_list = headlines
            .iter()
            .map(|h| format!("- {} (source: {})", h.title, h.source))
            .collect::<Vec<_>>()
            .join("\n");

        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": format!("Analyze these news headlines:\n\n{headline_list}") },
            ],
            "response_format": { "type": "json_object" },
            "temperature": 0.3,
        });

        let response: Value = self
            .http
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "news LLM request failed");
                AppError::data_collection(format!("news LLM request failed: {e}"))
            })?
            .error_for_status()
            .map_err(|e| AppError::data_collection(format!("news LLM returned error: {e}")))?
            .json()
            .await
            .map_err(|e| AppError::data_collection(format!("news LLM response parse failed: {e}")))?;

        let content = response["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or("{}");
        let data: Value = serde_json::from_str(content)
            .map_err(|e| AppError::data_collection(format!("news LLM returned invalid JSON: {e}")))?;

        Ok(parse_response(&data))
    }
}

/// Map the model's JSON object to a result, clamping every score and
/// defaulting malformed fields instead of failing the batch.
pub fn parse_response(data: &Value) -> NewsSentimentResult {
    let mut analyses = Vec::new();
    if let Some(items) = data["analyses"].as_array() {
        for item in items {
            let impact = item["impact_score"].as_i64().unwrap_or(0) as i32;
            let urgency = item["urgency"]
                .as_str()
                .and_then(Urgency::parse)
                .unwrap_or(Urgency::Low);
            let affected_sectors = item["affected_sectors"]
                .as_array()
                .map(|arr| {
                    arr.iter()
                        .filter_map(|v| v.as_str().map(|s| s.to_string()))
                        .collect()
                })
                .unwrap_or_default();

            analyses.push(HeadlineAnalysis {
                title: item["title"].as_str().unwrap_or_default().to_string(),
                impact_score: impact.clamp(-100, 100),
                category: item["category"].as_str().unwrap_or("other").to_string(),
                affected_sectors,
                urgency,
                reasoning: item["reasoning"].as_str().unwrap_or_default().to_string(),
            });
        }
    }

    let mut category_scores: HashMap<String, f64> = HashMap::new();
    let mut category_counts: HashMap<String, u32> = HashMap::new();
    for a in &analyses {
        *category_scores.entry(a.category.clone()).or_default() += f64::from(a.impact_score);
        *category_counts.entry(a.category.clone()).or_default() += 1;
    }
    for (category, total) in category_scores.iter_mut() {
        *total /= f64::from(category_counts[category]);
    }

    let overall = data["overall_score"].as_i64().unwrap_or(0) as i32;

    NewsSentimentResult {
        overall_score: overall.clamp(-100, 100),
        analyses,
        category_scores,
        market_impact_summary: data["market_impact_summary"]
            .as_str()
            .unwrap_or_default()
            .to_string(),
    }
}
