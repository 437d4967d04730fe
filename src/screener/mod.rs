// =============================================================================
// Stock screener — PER-based quality classification
// =============================================================================
//
// A low PER is only attractive when the underlying business justifies it.
// Every symbol is sorted into one of three buckets:
//
//   1. undervalued              — genuinely cheap, the only eligible bucket
//   2. value_trap               — cheap because the business is deteriorating
//   3. poor_shareholder_return  — cheap and the cash never reaches holders
//
// The quality score (0–100) is computed for every symbol regardless of the
// bucket, so the dashboard can rank ineligible names too.
// =============================================================================

pub mod stock_data;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::types::{symbol_kind, Quote, SymbolKind};

// =============================================================================
// Data types
// =============================================================================

/// Per-symbol fundamentals assembled from the quote feed (PER/PBR) and the
/// static financials table. Read-only at cycle time.
#[derive(Debug, Clone)]
pub struct StockFundamentals {
    pub symbol: String,
    pub name: String,
    pub per: f64,
    pub pbr: f64,
    pub roe: f64,
    pub dividend_yield: f64,
    pub operating_margin: f64,
    pub revenue_growth_yoy: f64,
    pub sector: String,
    pub sector_avg_per: f64,
    pub sector_avg_operating_margin: f64,
    pub has_buyback: bool,
}

/// Screening bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quality {
    Undervalued,
    ValueTrap,
    PoorShareholderReturn,
}

impl std::fmt::Display for Quality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Undervalued => "undervalued",
            Self::ValueTrap => "value_trap",
            Self::PoorShareholderReturn => "poor_shareholder_return",
        };
        f.write_str(s)
    }
}

/// Outcome of screening one symbol.
#[derive(Debug, Clone, Serialize)]
pub struct ScreeningResult {
    pub symbol: String,
    pub name: String,
    pub quality: Quality,
    /// 0–100, rounded to one decimal.
    pub quality_score: f64,
    pub reason: String,
    /// True iff `quality == Undervalued`.
    pub eligible: bool,
}

// =============================================================================
// Configuration
// =============================================================================

/// Sector benchmark values (percent units for the margin).
#[derive(Debug, Clone, Copy)]
pub struct SectorAverages {
    pub avg_per: f64,
    pub avg_operating_margin: f64,
}

/// All screener thresholds and the two sector-average tables.
#[derive(Debug, Clone)]
pub struct ScreenerConfig {
    /// ROE below this marks a cheap symbol as a value trap.
    pub value_trap_roe_threshold: f64,
    /// ROE above this is required for the undervalued bucket.
    pub undervalued_roe_threshold: f64,
    /// "PER is low" means PER < sector average × this ratio.
    pub per_discount_ratio: f64,
    /// Dividend yield below this (without buybacks) marks poor return.
    pub poor_return_dividend_threshold: f64,
    /// Domestic sector benchmarks.
    pub sector_defaults: HashMap<&'static str, SectorAverages>,
    /// US sector benchmarks (US valuations run richer).
    pub us_sector_defaults: HashMap<&'static str, SectorAverages>,
}

fn sector_table(rows: &[(&'static str, f64, f64)]) -> HashMap<&'static str, SectorAverages> {
    rows.iter()
        .map(|&(sector, avg_per, avg_operating_margin)| {
            (sector, SectorAverages { avg_per, avg_operating_margin })
        })
        .collect()
}

impl Default for ScreenerConfig {
    fn default() -> Self {
        Self {
            value_trap_roe_threshold: 5.0,
            undervalued_roe_threshold: 10.0,
            per_discount_ratio: 0.7,
            poor_return_dividend_threshold: 1.0,
            sector_defaults: sector_table(&[
                ("Semiconductor", 15.0, 20.0),
                ("Bio", 40.0, 10.0),
                ("Auto", 8.0, 7.0),
                ("Finance", 6.0, 25.0),
                ("Chemicals", 10.0, 8.0),
                ("IT", 25.0, 15.0),
                ("Telecom", 10.0, 12.0),
                ("Energy", 8.0, 5.0),
                ("Consumer", 12.0, 10.0),
                ("Healthcare", 25.0, 15.0),
                ("Other", 12.0, 10.0),
            ]),
            us_sector_defaults: sector_table(&[
                ("Semiconductor", 25.0, 30.0),
                ("Bio", 50.0, 15.0),
                ("Auto", 15.0, 10.0),
                ("Finance", 12.0, 35.0),
                ("Chemicals", 15.0, 12.0),
                ("IT", 30.0, 25.0),
                ("Telecom", 12.0, 15.0),
                ("Energy", 10.0, 10.0),
                ("Consumer", 22.0, 12.0),
                ("Healthcare", 22.0, 20.0),
                ("Other", 18.0, 12.0),
            ]),
        }
    }
}

impl ScreenerConfig {
    const FALLBACK: SectorAverages = SectorAverages { avg_per: 12.0, avg_operating_margin: 10.0 };

    /// Benchmark for a sector, branching on the symbol's venue.
    pub fn sector_averages(&self, sector: &str, kind: SymbolKind) -> SectorAverages {
        let table = match kind {
            SymbolKind::Domestic => &self.sector_defaults,
            SymbolKind::Overseas => &self.us_sector_defaults,
        };
        table
            .get(sector)
            .or_else(|| table.get("Other"))
            .copied()
            .unwrap_or(Self::FALLBACK)
    }
}

// =============================================================================
// Screener
// =============================================================================

pub struct StockScreener {
    config: ScreenerConfig,
}

impl StockScreener {
    pub fn new(config: ScreenerConfig) -> Self {
        Self { config }
    }

    /// Assemble fundamentals for a symbol from its fresh quote and the static
    /// reference tables.
    pub fn fundamentals_from_quote(&self, quote: &Quote) -> StockFundamentals {
        let kind = symbol_kind(&quote.symbol).unwrap_or(SymbolKind::Domestic);
        let sector = stock_data::sector_of(&quote.symbol);
        let averages = self.config.sector_averages(sector, kind);
        let fin = stock_data::financials_of(&quote.symbol);

        StockFundamentals {
            symbol: quote.symbol.clone(),
            name: quote.name.clone(),
            per: quote.per.unwrap_or(0.0),
            pbr: quote.pbr.unwrap_or(0.0),
            roe: fin.roe,
            dividend_yield: fin.dividend_yield,
            operating_margin: fin.operating_margin,
            revenue_growth_yoy: fin.revenue_growth_yoy,
            sector: sector.to_string(),
            sector_avg_per: averages.avg_per,
            sector_avg_operating_margin: averages.avg_operating_margin,
            has_buyback: stock_data::has_buyback(&quote.symbol),
        }
    }

    /// Classify a symbol. Rules are evaluated in order; the first match wins.
    pub fn evaluate(&self, f: &StockFundamentals) -> ScreeningResult {
        let cfg = &self.config;
        let score = self.quality_score(f);

        let per_low = f.per > 0.0 && f.per < f.sector_avg_per * cfg.per_discount_ratio;

        // 1) Value trap: cheap, but the business is weak or shrinking.
        if per_low && (f.roe < cfg.value_trap_roe_threshold || f.revenue_growth_yoy < 0.0) {
            let mut reasons = Vec::new();
            if f.roe < cfg.value_trap_roe_threshold {
                reasons.push(format!("ROE {:.1}% < {}%", f.roe, cfg.value_trap_roe_threshold));
            }
            if f.revenue_growth_yoy < 0.0 {
                reasons.push(format!("revenue shrinking {:.1}%", f.revenue_growth_yoy));
            }
            return self.result(f, Quality::ValueTrap, score, format!("value trap: {}", reasons.join(", ")));
        }

        // 2) Genuinely undervalued: cheap with the metrics to back it up.
        if per_low
            && f.roe > cfg.undervalued_roe_threshold
            && f.operating_margin > f.sector_avg_operating_margin
            && f.revenue_growth_yoy > 0.0
        {
            let reason = format!(
                "undervalued: PER {:.1} < sector avg {:.1} x {:.0}%, ROE {:.1}%, margin {:.1}%, growth {:.1}%",
                f.per,
                f.sector_avg_per,
                cfg.per_discount_ratio * 100.0,
                f.roe,
                f.operating_margin,
                f.revenue_growth_yoy,
            );
            return self.result(f, Quality::Undervalued, score, reason);
        }

        // 3) Poor shareholder return: cheap, but the cash stays in the firm.
        if per_low && f.dividend_yield < cfg.poor_return_dividend_threshold && !f.has_buyback {
            let reason = format!(
                "poor shareholder return: dividend yield {:.1}% < {}%, no buyback history",
                f.dividend_yield, cfg.poor_return_dividend_threshold,
            );
            return self.result(f, Quality::PoorShareholderReturn, score, reason);
        }

        // 4) Default: the PER discount condition was not met.
        self.result(
            f,
            Quality::PoorShareholderReturn,
            score,
            "PER discount not met or weak shareholder return".to_string(),
        )
    }

    /// Quality score 0–100, independent of the bucket.
    ///
    /// PER relative value 30, ROE 25, operating margin vs sector 20,
    /// revenue growth 15, dividend yield 10. Each component clamps before
    /// summation; the total rounds to one decimal.
    pub fn quality_score(&self, f: &StockFundamentals) -> f64 {
        let mut score = 0.0;

        // PER relative value: ratio 0.5 -> full 30, ratio 1.5+ -> 0.
        if f.sector_avg_per > 0.0 && f.per > 0.0 {
            let per_ratio = f.per / f.sector_avg_per;
            score += (30.0 * (1.5 - per_ratio)).clamp(0.0, 30.0);
        }

        // ROE: 15%+ -> full 25.
        score += (f.roe / 15.0 * 25.0).clamp(0.0, 25.0);

        // Operating margin vs sector: 2x sector -> full 20.
        if f.sector_avg_operating_margin > 0.0 {
            let margin_ratio = f.operating_margin / f.sector_avg_operating_margin;
            score += (margin_ratio * 10.0).clamp(0.0, 20.0);
        }

        // Revenue growth: -10% -> 0, +20% -> full 15.
        score += ((f.revenue_growth_yoy + 10.0) / 30.0 * 15.0).clamp(0.0, 15.0);

        // Dividend yield: 5%+ -> full 10.
        score += (f.dividend_yield / 5.0 * 10.0).clamp(0.0, 10.0);

        (score * 10.0).round() / 10.0
    }

    fn result(
        &self,
        f: &StockFundamentals,
        quality: Quality,
        quality_score: f64,
        reason: String,
    ) -> ScreeningResult {
        ScreeningResult {
            symbol: f.symbol.clone(),
            name: f.name.clone(),
            quality,
            quality_score,
            reason,
            eligible: quality == Quality::Undervalued,
        }
    }
}

impl Default for StockScreener {
    fn default() -> Self {
        Self::new(ScreenerConfig::default())
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn fundamentals(per: f64, roe: f64, margin: f64, growth: f64, dividend: f64) -> StockFundamentals {
        StockFundamentals {
            symbol: "005930".into(),
            name: "Samsung Electronics".into(),
            per,
            pbr: 1.0,
            roe,
            dividend_yield: dividend,
            operating_margin: margin,
            revenue_growth_yoy: growth,
            sector: "Semiconductor".into(),
            sector_avg_per: 15.0,
            sector_avg_operating_margin: 20.0,
            has_buyback: false,
        }
    }

    #[test]
    fn value_trap_on_low_roe() {
        let screener = StockScreener::default();
        // PER 5 < 15 * 0.7, ROE 3 < 5 -> trap.
        let result = screener.evaluate(&fundamentals(5.0, 3.0, 25.0, 5.0, 2.0));
        assert_eq!(result.quality, Quality::ValueTrap);
        assert!(!result.eligible);
        assert!(result.reason.contains("value trap"));
    }

    #[test]
    fn value_trap_on_shrinking_revenue() {
        let screener = StockScreener::default();
        let result = screener.evaluate(&fundamentals(5.0, 12.0, 25.0, -5.0, 2.0));
        assert_eq!(result.quality, Quality::ValueTrap);
        assert!(result.reason.contains("revenue shrinking"));
    }

    #[test]
    fn undervalued_when_all_conditions_hold() {
        let screener = StockScreener::default();
        // PER 8 < 10.5, ROE 20 > 10, margin 30 > 20, growth 45 > 0.
        let result = screener.evaluate(&fundamentals(8.0, 20.0, 30.0, 45.0, 1.2));
        assert_eq!(result.quality, Quality::Undervalued);
        assert!(result.eligible);
    }

    #[test]
    fn poor_return_on_low_dividend() {
        let screener = StockScreener::default();
        // Cheap, decent ROE, but margin below sector so not undervalued, and
        // dividend under 1% with no buyback.
        let result = screener.evaluate(&fundamentals(8.0, 12.0, 15.0, 5.0, 0.3));
        assert_eq!(result.quality, Quality::PoorShareholderReturn);
        assert!(!result.eligible);
        assert!(result.reason.contains("dividend"));
    }

    #[test]
    fn default_bucket_when_per_not_discounted() {
        let screener = StockScreener::default();
        let result = screener.evaluate(&fundamentals(14.0, 20.0, 30.0, 45.0, 3.0));
        assert_eq!(result.quality, Quality::PoorShareholderReturn);
        assert!(result.reason.contains("PER discount not met"));
    }

    #[test]
    fn eligible_iff_undervalued() {
        let screener = StockScreener::default();
        for per in [3.0, 8.0, 14.0, 20.0] {
            for roe in [2.0, 8.0, 12.0, 20.0] {
                for growth in [-5.0, 0.0, 10.0] {
                    for dividend in [0.0, 0.5, 2.0] {
                        let result =
                            screener.evaluate(&fundamentals(per, roe, 25.0, growth, dividend));
                        assert_eq!(result.eligible, result.quality == Quality::Undervalued);
                    }
                }
            }
        }
    }

    #[test]
    fn quality_score_maxes_at_100() {
        let screener = StockScreener::default();
        // PER ratio 0.5 -> 30, ROE 15+ -> 25, margin 2x -> 20, growth 20+ -> 15,
        // dividend 5+ -> 10.
        let score = screener.quality_score(&fundamentals(7.5, 20.0, 45.0, 30.0, 6.0));
        assert!((score - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn quality_score_zero_floor() {
        let screener = StockScreener::default();
        // PER ratio 2.0 -> 0, negative everything else.
        let score = screener.quality_score(&fundamentals(30.0, -5.0, -3.0, -20.0, 0.0));
        assert!((score - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn quality_score_midpoints() {
        let screener = StockScreener::default();
        // PER ratio 1.0 -> 15; ROE 7.5 -> 12.5; margin ratio 1.0 -> 10;
        // growth 5 -> 7.5; dividend 2.5 -> 5. Total 50.0.
        let score = screener.quality_score(&fundamentals(15.0, 7.5, 20.0, 5.0, 2.5));
        assert!((score - 50.0).abs() < 1e-9);
    }

    #[test]
    fn quality_score_rounds_to_one_decimal() {
        let screener = StockScreener::default();
        let score = screener.quality_score(&fundamentals(11.0, 7.0, 13.0, 3.0, 1.7));
        assert!((score * 10.0 - (score * 10.0).round()).abs() < 1e-9);
    }

    #[test]
    fn fundamentals_from_quote_uses_tables() {
        let screener = StockScreener::default();
        let quote = Quote {
            symbol: "000660".into(),
            name: "SK hynix".into(),
            price: 200_000.0,
            prior_day_change_pct: -1.0,
            high: 205_000.0,
            low: 195_000.0,
            per: Some(8.0),
            pbr: Some(1.5),
        };
        let f = screener.fundamentals_from_quote(&quote);
        assert_eq!(f.sector, "Semiconductor");
        assert!((f.roe - 20.0).abs() < f64::EPSILON);
        assert!((f.sector_avg_per - 15.0).abs() < f64::EPSILON);
        assert!((f.per - 8.0).abs() < f64::EPSILON);
    }

    #[test]
    fn overseas_sector_benchmarks_differ() {
        let cfg = ScreenerConfig::default();
        let kr = cfg.sector_averages("Semiconductor", SymbolKind::Domestic);
        let us = cfg.sector_averages("Semiconductor", SymbolKind::Overseas);
        assert!((kr.avg_per - 15.0).abs() < f64::EPSILON);
        assert!((us.avg_per - 25.0).abs() < f64::EPSILON);
    }
}
