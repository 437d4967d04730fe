// =============================================================================
// Composite signal engine — from sentiment, quality, and technicals
// =============================================================================
//
// Score layout, each component clamped before the final clamp to [-100, +100]:
//
//   sentiment   -30 .. +30   contrarian: fear raises the score
//   quality       0 or +25   eligible screening result only
//   technical   -35 .. +35   RSI proxy (±20) + Bollinger %B proxy (±15)
//
// An ineligible screening result short-circuits to Hold with a zero score —
// no amount of sentiment or momentum can make a value trap a buy.
// =============================================================================

use crate::screener::ScreeningResult;
use crate::sentiment::HybridSentiment;
use crate::types::{Quote, SignalType, TradeSignal};

/// Flat bonus for an eligible (undervalued) screening result.
const QUALITY_BONUS: f64 = 25.0;

/// Sentiment contribution in [-30, +30].
///
/// With a hybrid reading the sign is inverted: deep fear (negative hybrid)
/// becomes a positive buy contribution. The numeric-only fallback applies the
/// same contrarian slope to the raw index.
pub fn sentiment_component(hybrid: Option<&HybridSentiment>, numeric_score: i32) -> f64 {
    match hybrid {
        Some(h) => -h.hybrid_score / 100.0 * 30.0,
        None => (f64::from(50 - numeric_score) * 0.6).clamp(-30.0, 30.0),
    }
}

/// Technical contribution in [-35, +35], derived from the current quote.
pub fn technical_component(quote: &Quote) -> f64 {
    // RSI proxy from the prior-day change: a -5% day reads oversold (+20),
    // a +5% day reads overbought (-20).
    let rsi_score = (-quote.prior_day_change_pct * 4.0).clamp(-20.0, 20.0);

    // Bollinger %B proxy from the intraday range: price at the low (+15),
    // price at the high (-15). Degenerate ranges contribute nothing.
    let bollinger_score = if quote.high > quote.low && quote.low > 0.0 {
        let pct_b = (quote.price - quote.low) / (quote.high - quote.low);
        ((0.5 - pct_b) * 30.0).clamp(-15.0, 15.0)
    } else {
        0.0
    };

    rsi_score + bollinger_score
}

/// Map a composite score to its signal bucket.
pub fn score_to_signal(score: f64) -> SignalType {
    if score > 70.0 {
        SignalType::StrongBuy
    } else if score > 35.0 {
        SignalType::Buy
    } else if score < -60.0 {
        SignalType::StrongSell
    } else if score < -20.0 {
        SignalType::Sell
    } else {
        SignalType::Hold
    }
}

/// Suggested quantity for a buy at `price` under the per-symbol notional cap.
pub fn suggested_buy_quantity(max_notional: u64, price: f64) -> u32 {
    if price <= 0.0 {
        return 1;
    }
    ((max_notional as f64 / price).floor() as u32).max(1)
}

/// Hold signal for a symbol that failed screening.
pub fn hold_signal(screening: &ScreeningResult) -> TradeSignal {
    TradeSignal {
        symbol: screening.symbol.clone(),
        name: screening.name.clone(),
        signal_type: SignalType::Hold,
        score: 0.0,
        sentiment_score: 0.0,
        quality_score: 0.0,
        technical_score: 0.0,
        reason: format!("excluded: {}", screening.reason),
        recommended_action: "hold".to_string(),
    }
}

/// Build the composite signal for an eligible symbol.
pub fn build_signal(
    screening: &ScreeningResult,
    hybrid: Option<&HybridSentiment>,
    numeric_score: i32,
    quote: &Quote,
    max_notional: u64,
) -> TradeSignal {
    if !screening.eligible {
        return hold_signal(screening);
    }

    let sentiment_score = sentiment_component(hybrid, numeric_score);
    let quality_score = QUALITY_BONUS;
    let technical_score = technical_component(quote);

    let total = (sentiment_score + quality_score + technical_score).clamp(-100.0, 100.0);
    let signal_type = score_to_signal(total);

    let recommended_action = match signal_type {
        SignalType::StrongBuy | SignalType::Buy => {
            let qty = suggested_buy_quantity(max_notional, quote.price);
            format!("buy {qty} @ {:.0}", quote.price)
        }
        SignalType::Sell | SignalType::StrongSell => format!("sell @ {:.0}", quote.price),
        SignalType::Hold => "hold".to_string(),
    };

    let reason = format!(
        "total {total:.1} (sentiment {sentiment_score:+.1}, quality {quality_score:+.1}, technical {technical_score:+.1})",
    );

    TradeSignal {
        symbol: screening.symbol.clone(),
        name: screening.name.clone(),
        signal_type,
        score: total,
        sentiment_score,
        quality_score,
        technical_score,
        reason,
        recommended_action,
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::screener::Quality;
    use crate::sentiment::fear_greed::{classify_score, SentimentSnapshot};

    fn hybrid(score: f64) -> HybridSentiment {
        HybridSentiment {
            hybrid_score: score,
            numeric_score: score,
            news_score: None,
            numeric_weight: 1.0,
            news_weight: 0.0,
            news_available: false,
            news_urgency: None,
            fear_greed: SentimentSnapshot {
                score: 50,
                classification: classify_score(50),
                timestamp: chrono::Utc::now(),
                source: "cnn",
            },
        }
    }

    fn quote(price: f64, change_pct: f64, high: f64, low: f64) -> Quote {
        Quote {
            symbol: "005930".into(),
            name: "Samsung Electronics".into(),
            price,
            prior_day_change_pct: change_pct,
            high,
            low,
            per: Some(8.0),
            pbr: Some(1.0),
        }
    }

    fn eligible_screening() -> ScreeningResult {
        ScreeningResult {
            symbol: "005930".into(),
            name: "Samsung Electronics".into(),
            quality: Quality::Undervalued,
            quality_score: 80.0,
            reason: "undervalued".into(),
            eligible: true,
        }
    }

    fn ineligible_screening() -> ScreeningResult {
        ScreeningResult {
            symbol: "051910".into(),
            name: "LG Chem".into(),
            quality: Quality::ValueTrap,
            quality_score: 30.0,
            reason: "value trap: ROE 2.0% < 5%".into(),
            eligible: false,
        }
    }

    #[test]
    fn sentiment_is_contrarian() {
        let fear = hybrid(-80.0);
        assert!((sentiment_component(Some(&fear), 50) - 24.0).abs() < 1e-9);
        let greed = hybrid(80.0);
        assert!((sentiment_component(Some(&greed), 50) + 24.0).abs() < 1e-9);
    }

    #[test]
    fn sentiment_numeric_fallback() {
        // score 10 -> (50 - 10) * 0.6 = 24
        assert!((sentiment_component(None, 10) - 24.0).abs() < 1e-9);
        // score 100 -> -30 (within the cap)
        assert!((sentiment_component(None, 100) + 30.0).abs() < 1e-9);
    }

    #[test]
    fn technical_bounds() {
        // Huge drop, price at the low: both proxies max out at +20 and +15.
        let q = quote(90.0, -10.0, 100.0, 90.0);
        assert!((technical_component(&q) - 35.0).abs() < 1e-9);

        // Huge rally, price at the high: both proxies floor at -20 and -15.
        let q = quote(110.0, 10.0, 110.0, 100.0);
        assert!((technical_component(&q) + 35.0).abs() < 1e-9);
    }

    #[test]
    fn technical_degenerate_range_contributes_zero() {
        let q = quote(100.0, 0.0, 100.0, 100.0);
        assert!((technical_component(&q) - 0.0).abs() < 1e-9);
        let q = quote(100.0, 0.0, 0.0, 0.0);
        assert!((technical_component(&q) - 0.0).abs() < 1e-9);
    }

    #[test]
    fn score_mapping_is_monotone() {
        let order = |s: SignalType| match s {
            SignalType::StrongBuy => 4,
            SignalType::Buy => 3,
            SignalType::Hold => 2,
            SignalType::Sell => 1,
            SignalType::StrongSell => 0,
        };
        let mut prev = 4;
        let mut score = 100.0;
        while score >= -100.0 {
            let rank = order(score_to_signal(score));
            assert!(rank <= prev, "signal rank increased as score fell at {score}");
            prev = rank;
            score -= 0.5;
        }
    }

    #[test]
    fn score_mapping_boundaries() {
        assert_eq!(score_to_signal(70.1), SignalType::StrongBuy);
        assert_eq!(score_to_signal(70.0), SignalType::Buy);
        assert_eq!(score_to_signal(35.1), SignalType::Buy);
        assert_eq!(score_to_signal(35.0), SignalType::Hold);
        assert_eq!(score_to_signal(-20.0), SignalType::Hold);
        assert_eq!(score_to_signal(-20.1), SignalType::Sell);
        assert_eq!(score_to_signal(-60.0), SignalType::Sell);
        assert_eq!(score_to_signal(-60.1), SignalType::StrongSell);
    }

    #[test]
    fn strong_buy_on_extreme_fear() {
        // Fear/greed 10 -> hybrid -80 -> sentiment +24; eligible -> +25;
        // prior day -5% and price at the low -> technical +35. Total 84.
        let h = hybrid(-80.0);
        let q = quote(95.0, -5.0, 100.0, 95.0);
        let signal = build_signal(&eligible_screening(), Some(&h), 10, &q, 5_000_000);
        assert_eq!(signal.signal_type, SignalType::StrongBuy);
        assert!((signal.score - 84.0).abs() < 1e-9);
        assert!(signal.recommended_action.starts_with("buy "));
    }

    #[test]
    fn ineligible_short_circuits_to_hold() {
        let h = hybrid(-80.0);
        let q = quote(95.0, -5.0, 100.0, 95.0);
        let signal = build_signal(&ineligible_screening(), Some(&h), 10, &q, 5_000_000);
        assert_eq!(signal.signal_type, SignalType::Hold);
        assert!((signal.score - 0.0).abs() < f64::EPSILON);
        assert!((signal.sentiment_score - 0.0).abs() < f64::EPSILON);
        assert!(signal.reason.contains("excluded"));
        assert_eq!(signal.recommended_action, "hold");
    }

    #[test]
    fn suggested_quantity_respects_cap() {
        assert_eq!(suggested_buy_quantity(5_000_000, 70_000.0), 71);
        assert_eq!(suggested_buy_quantity(5_000_000, 10_000_000.0), 1);
        assert_eq!(suggested_buy_quantity(5_000_000, 0.0), 1);
    }

    #[test]
    fn total_score_is_clamped() {
        // Even with every component pinned positive the score stays ≤ 100.
        let h = hybrid(-100.0);
        let q = quote(90.0, -10.0, 100.0, 90.0);
        let signal = build_signal(&eligible_screening(), Some(&h), 0, &q, 5_000_000);
        assert!(signal.score <= 100.0);
        assert_eq!(signal.signal_type, SignalType::StrongBuy);
    }
}
