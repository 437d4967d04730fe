// =============================================================================
// Symbol universes — named sets of symbols the engine scans each cycle
// =============================================================================

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::Serialize;
use tracing::info;

/// KOSPI market-cap top 30.
pub const KOSPI_TOP30: [&str; 30] = [
    "005930", // Samsung Electronics
    "000660", // SK hynix
    "373220", // LG Energy Solution
    "207940", // Samsung Biologics
    "005380", // Hyundai Motor
    "006400", // Samsung SDI
    "051910", // LG Chem
    "035420", // NAVER
    "000270", // Kia
    "005490", // POSCO Holdings
    "035720", // Kakao
    "105560", // KB Financial
    "055550", // Shinhan Financial
    "003550", // LG Corp
    "034730", // SK Inc
    "032830", // Samsung Life
    "015760", // KEPCO
    "066570", // LG Electronics
    "003670", // POSCO Future M
    "086790", // Hana Financial
    "028260", // Samsung C&T
    "012330", // Hyundai Mobis
    "096770", // SK Innovation
    "259960", // Krafton
    "034020", // Doosan Enerbility
    "018260", // Samsung SDS
    "316140", // Woori Financial
    "009150", // Samsung Electro-Mechanics
    "033780", // KT&G
    "030200", // KT
];

/// US market-cap top 30.
pub const US_TOP30: [&str; 30] = [
    "AAPL", "MSFT", "GOOGL", "AMZN", "NVDA", "META", "TSLA", "BRK.B", "UNH", "JNJ",
    "V", "XOM", "JPM", "WMT", "PG", "MA", "HD", "CVX", "MRK", "ABBV", "LLY", "PEP",
    "KO", "COST", "AVGO", "TMO", "CSCO", "ACN", "MCD", "DHR",
];

/// A named set of symbols.
#[derive(Debug, Clone, Serialize)]
pub struct StockUniverse {
    pub name: String,
    pub symbols: Vec<String>,
    pub description: String,
}

/// Registry of universes: built-in presets plus operator-defined sets.
pub struct UniverseManager {
    universes: RwLock<HashMap<String, StockUniverse>>,
}

impl UniverseManager {
    pub fn new() -> Self {
        let mut universes = HashMap::new();
        universes.insert(
            "kospi_top30".to_string(),
            StockUniverse {
                name: "kospi_top30".to_string(),
                symbols: KOSPI_TOP30.iter().map(|s| s.to_string()).collect(),
                description: "KOSPI market-cap top 30".to_string(),
            },
        );
        universes.insert(
            "us_top30".to_string(),
            StockUniverse {
                name: "us_top30".to_string(),
                symbols: US_TOP30.iter().map(|s| s.to_string()).collect(),
                description: "US market-cap top 30".to_string(),
            },
        );
        universes.insert(
            "default_watchlist".to_string(),
            StockUniverse {
                name: "default_watchlist".to_string(),
                symbols: KOSPI_TOP30[..10].iter().map(|s| s.to_string()).collect(),
                description: "Default watchlist (KOSPI top 10)".to_string(),
            },
        );
        Self { universes: RwLock::new(universes) }
    }

    /// Look up a universe by name. Returns a snapshot copy.
    pub fn get(&self, name: &str) -> Option<StockUniverse> {
        self.universes.read().get(name).cloned()
    }

    pub fn list(&self) -> Vec<StockUniverse> {
        self.universes.read().values().cloned().collect()
    }

    /// Add a symbol to a universe. Returns false when the universe is unknown.
    pub fn add_symbol(&self, universe_name: &str, symbol: &str) -> bool {
        let mut universes = self.universes.write();
        let Some(universe) = universes.get_mut(universe_name) else {
            return false;
        };
        if !universe.symbols.iter().any(|s| s == symbol) {
            universe.symbols.push(symbol.to_string());
            info!(symbol, universe = universe_name, "symbol added to universe");
        }
        true
    }

    /// Remove a symbol from a universe. Returns false when the universe is
    /// unknown.
    pub fn remove_symbol(&self, universe_name: &str, symbol: &str) -> bool {
        let mut universes = self.universes.write();
        let Some(universe) = universes.get_mut(universe_name) else {
            return false;
        };
        if let Some(pos) = universe.symbols.iter().position(|s| s == symbol) {
            universe.symbols.remove(pos);
            info!(symbol, universe = universe_name, "symbol removed from universe");
        }
        true
    }

    /// Create (or replace) a universe.
    pub fn create(&self, name: &str, symbols: Vec<String>, description: &str) -> StockUniverse {
        let universe = StockUniverse {
            name: name.to_string(),
            symbols,
            description: description.to_string(),
        };
        info!(name, count = universe.symbols.len(), "universe created");
        self.universes.write().insert(name.to_string(), universe.clone());
        universe
    }
}

impl Default for UniverseManager {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_exist() {
        let mgr = UniverseManager::new();
        assert_eq!(mgr.get("kospi_top30").unwrap().symbols.len(), 30);
        assert_eq!(mgr.get("us_top30").unwrap().symbols.len(), 30);
        assert_eq!(mgr.get("default_watchlist").unwrap().symbols.len(), 10);
        assert!(mgr.get("nope").is_none());
    }

    #[test]
    fn add_and_remove_symbol() {
        let mgr = UniverseManager::new();
        assert!(mgr.add_symbol("default_watchlist", "000990"));
        assert!(mgr
            .get("default_watchlist")
            .unwrap()
            .symbols
            .contains(&"000990".to_string()));

        // Adding twice does not duplicate.
        assert!(mgr.add_symbol("default_watchlist", "000990"));
        let count = mgr
            .get("default_watchlist")
            .unwrap()
            .symbols
            .iter()
            .filter(|s| *s == "000990")
            .count();
        assert_eq!(count, 1);

        assert!(mgr.remove_symbol("default_watchlist", "000990"));
        assert!(!mgr
            .get("default_watchlist")
            .unwrap()
            .symbols
            .contains(&"000990".to_string()));

        assert!(!mgr.add_symbol("unknown", "000990"));
        assert!(!mgr.remove_symbol("unknown", "000990"));
    }

    #[test]
    fn create_custom_universe() {
        let mgr = UniverseManager::new();
        mgr.create("pair", vec!["005930".into(), "000660".into()], "test pair");
        let u = mgr.get("pair").unwrap();
        assert_eq!(u.symbols, vec!["005930", "000660"]);
        assert_eq!(u.description, "test pair");
    }
}
