// =============================================================================
// Static reference data — sector mapping and semi-static financials
// =============================================================================
//
// The quote feed only carries PER/PBR. ROE, dividend yield, operating margin
// and revenue growth come from this table (approximate values from recent
// filings; refreshed out of band). Symbols not listed fall back to zeroes and
// the "Other" sector.
// =============================================================================

use crate::types::Exchange;

/// Semi-static per-symbol financial metrics (percent units).
#[derive(Debug, Clone, Copy, Default)]
pub struct SymbolFinancials {
    pub roe: f64,
    pub dividend_yield: f64,
    pub operating_margin: f64,
    pub revenue_growth_yoy: f64,
}

/// Sector tag for a symbol. Unknown symbols map to "Other".
pub fn sector_of(symbol: &str) -> &'static str {
    match symbol {
        // KOSPI top 30
        "005930" | "000660" | "009150" => "Semiconductor",
        "207940" => "Bio",
        "005380" | "000270" | "012330" => "Auto",
        "105560" | "055550" | "032830" | "086790" | "316140" => "Finance",
        "051910" | "005490" | "003550" | "034730" | "003670" => "Chemicals",
        "035420" | "035720" | "259960" | "018260" => "IT",
        "030200" => "Telecom",
        "373220" | "006400" | "015760" | "096770" | "034020" => "Energy",
        "066570" | "028260" | "033780" => "Consumer",
        // US top 30
        "AAPL" | "MSFT" | "GOOGL" | "META" | "CSCO" | "ACN" => "IT",
        "AMZN" | "WMT" | "PG" | "HD" | "PEP" | "KO" | "COST" | "MCD" => "Consumer",
        "NVDA" | "AVGO" => "Semiconductor",
        "TSLA" => "Auto",
        "BRK.B" | "V" | "JPM" | "MA" => "Finance",
        "UNH" | "JNJ" | "MRK" | "ABBV" | "LLY" | "TMO" | "DHR" => "Healthcare",
        "XOM" | "CVX" => "Energy",
        _ => "Other",
    }
}

/// Exchange tag for an overseas ticker. Unlisted tickers default to NASD.
pub fn exchange_of(ticker: &str) -> Exchange {
    match ticker {
        "AAPL" | "MSFT" | "GOOGL" | "AMZN" | "NVDA" | "META" | "TSLA" | "AVGO" | "COST"
        | "CSCO" | "PEP" => Exchange::Nasd,
        "TMO" | "ACN" | "MCD" | "DHR" | "BRK.B" | "UNH" | "JNJ" | "V" | "XOM" | "JPM"
        | "WMT" | "PG" | "MA" | "HD" | "CVX" | "MRK" | "ABBV" | "LLY" | "KO" => Exchange::Nyse,
        _ => Exchange::Nasd,
    }
}

/// Buyback history flag. No symbol in the current tables carries one.
pub fn has_buyback(_symbol: &str) -> bool {
    false
}

/// Financial metrics for a symbol, zeroed when unknown.
#[rustfmt::skip]
pub fn financials_of(symbol: &str) -> SymbolFinancials {
    let (roe, dividend_yield, operating_margin, revenue_growth_yoy) = match symbol {
        // KOSPI top 30: roe %, dividend yield %, operating margin %, revenue YoY %
        "005930" => (8.5, 2.1, 15.0, 5.0),
        "000660" => (20.0, 1.2, 30.0, 45.0),
        "373220" => (5.0, 0.0, 8.0, 20.0),
        "207940" => (7.0, 0.0, 20.0, 15.0),
        "005380" => (12.0, 3.5, 9.0, 8.0),
        "006400" => (3.0, 0.0, 5.0, -10.0),
        "051910" => (2.0, 3.0, 4.0, -5.0),
        "035420" => (10.0, 0.5, 20.0, 10.0),
        "000270" => (18.0, 4.0, 11.0, 7.0),
        "005490" => (6.0, 4.0, 5.0, -3.0),
        "035720" => (3.0, 0.0, 8.0, -2.0),
        "105560" => (10.0, 5.0, 30.0, 5.0),
        "055550" => (9.0, 4.5, 28.0, 4.0),
        "003550" => (6.0, 2.5, 8.0, 3.0),
        "034730" => (4.0, 2.0, 6.0, -1.0),
        "032830" => (5.0, 3.5, 15.0, 2.0),
        "015760" => (-5.0, 0.0, -3.0, 5.0),
        "066570" => (8.0, 2.0, 5.0, 3.0),
        "003670" => (-8.0, 0.0, -5.0, -20.0),
        "086790" => (9.0, 5.0, 27.0, 4.0),
        "028260" => (5.0, 1.5, 6.0, 2.0),
        "012330" => (6.0, 3.0, 7.0, 5.0),
        "096770" => (2.0, 1.0, 3.0, -8.0),
        "259960" => (15.0, 0.0, 35.0, 20.0),
        "034020" => (1.0, 0.0, 2.0, 15.0),
        "018260" => (12.0, 2.0, 10.0, 5.0),
        "316140" => (8.0, 6.0, 25.0, 3.0),
        "009150" => (7.0, 2.5, 10.0, 5.0),
        "033780" => (10.0, 5.0, 15.0, 3.0),
        "030200" => (4.0, 5.0, 10.0, 1.0),
        // US top 30
        "AAPL" => (160.0, 0.5, 33.0, 5.0),
        "MSFT" => (38.0, 0.7, 45.0, 16.0),
        "GOOGL" => (30.0, 0.5, 32.0, 14.0),
        "AMZN" => (22.0, 0.0, 10.0, 12.0),
        "NVDA" => (115.0, 0.0, 62.0, 120.0),
        "META" => (33.0, 0.4, 40.0, 22.0),
        "TSLA" => (20.0, 0.0, 8.0, 2.0),
        "BRK.B" => (16.0, 0.0, 18.0, 8.0),
        "UNH" => (25.0, 1.3, 8.5, 10.0),
        "JNJ" => (20.0, 3.0, 22.0, 4.0),
        "V" => (47.0, 0.8, 67.0, 10.0),
        "XOM" => (18.0, 3.3, 14.0, -5.0),
        "JPM" => (17.0, 2.2, 38.0, 12.0),
        "WMT" => (20.0, 1.3, 4.5, 6.0),
        "PG" => (30.0, 2.4, 23.0, 3.0),
        "MA" => (170.0, 0.6, 58.0, 12.0),
        "HD" => (1500.0, 2.5, 15.0, 3.0),
        "CVX" => (12.0, 4.2, 12.0, -8.0),
        "MRK" => (35.0, 2.8, 30.0, 7.0),
        "ABBV" => (60.0, 3.5, 30.0, 5.0),
        "LLY" => (55.0, 0.7, 30.0, 35.0),
        "PEP" => (50.0, 2.8, 15.0, 2.0),
        "KO" => (40.0, 3.0, 30.0, 3.0),
        "COST" => (28.0, 0.6, 3.5, 8.0),
        "AVGO" => (30.0, 1.3, 45.0, 44.0),
        "TMO" => (13.0, 0.3, 22.0, 5.0),
        "CSCO" => (28.0, 2.8, 30.0, -6.0),
        "ACN" => (28.0, 1.5, 16.0, 3.0),
        "MCD" => (0.0, 2.3, 45.0, 2.0),
        "DHR" => (8.0, 0.5, 25.0, -3.0),
        _ => (0.0, 0.0, 0.0, 0.0),
    };
    SymbolFinancials { roe, dividend_yield, operating_margin, revenue_growth_yoy }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::universe::{KOSPI_TOP30, US_TOP30};

    #[test]
    fn every_universe_symbol_has_a_sector() {
        for symbol in KOSPI_TOP30.iter().chain(US_TOP30.iter()) {
            assert_ne!(sector_of(symbol), "Other", "missing sector for {symbol}");
        }
        assert_eq!(sector_of("999999"), "Other");
    }

    #[test]
    fn every_us_symbol_has_an_exchange() {
        for symbol in US_TOP30 {
            // Just checking the mapping resolves; NASD is also the fallback.
            let _ = exchange_of(symbol);
        }
        assert_eq!(exchange_of("TMO"), Exchange::Nyse);
        assert_eq!(exchange_of("AAPL"), Exchange::Nasd);
        assert_eq!(exchange_of("ZZZZ"), Exchange::Nasd);
    }

    #[test]
    fn financials_lookup() {
        let f = financials_of("000660");
        assert!((f.roe - 20.0).abs() < f64::EPSILON);
        assert!((f.revenue_growth_yoy - 45.0).abs() < f64::EPSILON);

        let unknown = financials_of("999999");
        assert_eq!(unknown.roe, 0.0);
        assert_eq!(unknown.operating_margin, 0.0);
    }
}
