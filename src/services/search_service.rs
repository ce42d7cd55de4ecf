//! Search Service
//!
//! Free-text search over the balance and position collections.
//!
//! The balance collection is scanned first and scanning stops as soon as the
//! running match count reaches the cap, so a query that saturates the cap on
//! balances never looks at positions. That favours latency over fairness
//! between the two collections.

use crate::types::{Record, RecordCollections};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Fields checked before the full scan, in priority order
pub const COMMON_FIELDS: [&str; 5] = [
    "accountNumber",
    "symbol",
    "accountName",
    "id",
    "securityDescription",
];

/// Result of a free-text search
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResults {
    pub balance: Vec<Record>,
    pub positions: Vec<Record>,
    /// Match count, reported as exactly the cap when the cap was reached
    pub total_results: usize,
    pub capped: bool,
}

impl SearchResults {
    pub fn is_empty(&self) -> bool {
        self.total_results == 0
    }
}

/// Free-text record search
pub struct SearchService;

impl SearchService {
    /// Search both collections for `query`, returning at most `cap` records
    pub fn search(collections: &RecordCollections, query: &str, cap: usize) -> SearchResults {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() || cap == 0 {
            return SearchResults::default();
        }

        let mut balance = Vec::new();
        let mut positions = Vec::new();

        Self::scan(&collections.balance, &needle, cap, &mut balance);

        let remaining = cap - balance.len();
        if remaining > 0 {
            Self::scan(&collections.positions, &needle, remaining, &mut positions);
        }

        let matched = balance.len() + positions.len();
        let capped = matched >= cap;

        debug!(
            "SearchService::search - query={} balance={} positions={} capped={}",
            needle,
            balance.len(),
            positions.len(),
            capped
        );

        SearchResults {
            balance,
            positions,
            total_results: if capped { cap } else { matched },
            capped,
        }
    }

    /// Case-insensitive substring test against one record.
    ///
    /// `needle` must already be lowercased.
    pub fn record_matches(record: &Record, needle: &str) -> bool {
        for field in COMMON_FIELDS {
            if let Some(value) = record.get(field) {
                if value.to_string().to_lowercase().contains(needle) {
                    return true;
                }
            }
        }

        record
            .fields()
            .filter(|(name, value)| !COMMON_FIELDS.contains(name) && !value.is_null())
            .any(|(_, value)| value.to_string().to_lowercase().contains(needle))
    }

    fn scan(records: &[Record], needle: &str, limit: usize, out: &mut Vec<Record>) {
        for record in records {
            if out.len() >= limit {
                break;
            }
            if Self::record_matches(record, needle) {
                out.push(record.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn balance(account: &str, name: &str, value: f64) -> Record {
        Record::new()
            .with("accountNumber", account)
            .with("accountName", name)
            .with("portfolioValue", value)
    }

    fn position(account: &str, symbol: &str, description: &str) -> Record {
        Record::new()
            .with("accountNumber", account)
            .with("symbol", symbol)
            .with("securityDescription", description)
    }

    #[test]
    fn test_blank_query_returns_nothing() {
        let collections = RecordCollections::new(vec![balance("12345", "Smith IRA", 1.0)], vec![]);

        for query in ["", "   ", "\t"] {
            let results = SearchService::search(&collections, query, 10);
            assert_eq!(results.total_results, 0);
            assert!(results.balance.is_empty());
        }
    }

    #[test]
    fn test_account_number_match() {
        let collections = RecordCollections::new(
            vec![balance("12345", "Smith IRA", 150000.0), balance("99999", "Jones", 1.0)],
            vec![],
        );

        let results = SearchService::search(&collections, "12345", 100);
        assert_eq!(results.total_results, 1);
        assert_eq!(results.balance.len(), 1);
        assert!(!results.capped);
    }

    #[test]
    fn test_case_insensitive_and_fallback_fields() {
        let collections = RecordCollections::new(
            vec![balance("1", "Smith IRA", 150000.0)],
            vec![position("1", "AAPL", "Apple Inc").with("securityType", "Equity")],
        );

        assert_eq!(SearchService::search(&collections, "smith", 10).total_results, 1);
        assert_eq!(SearchService::search(&collections, "aapl", 10).total_results, 1);
        // securityType is not a common field, found by the full scan
        assert_eq!(SearchService::search(&collections, "equity", 10).positions.len(), 1);
        // numeric fields are matched on their display form
        assert_eq!(SearchService::search(&collections, "150000", 10).balance.len(), 1);
    }

    #[test]
    fn test_cap_never_exceeded() {
        let balances: Vec<Record> = (0..20).map(|i| balance(&format!("10{}", i), "Trust", 1.0)).collect();
        let positions: Vec<Record> = (0..20).map(|i| position(&format!("10{}", i), "TRST", "Trust Co")).collect();
        let collections = RecordCollections::new(balances, positions);

        for cap in [1, 5, 19, 20, 21, 39, 40, 100] {
            let results = SearchService::search(&collections, "trust", cap);
            assert!(results.total_results <= cap);
            assert!(results.balance.len() + results.positions.len() <= cap);
        }
    }

    #[test]
    fn test_cap_reached_on_balance_skips_positions() {
        let balances: Vec<Record> = (0..5).map(|i| balance(&i.to_string(), "Trust", 1.0)).collect();
        let positions = vec![position("1", "TRST", "Trust Co")];
        let collections = RecordCollections::new(balances, positions);

        let results = SearchService::search(&collections, "trust", 5);
        assert_eq!(results.balance.len(), 5);
        assert!(results.positions.is_empty());
        assert_eq!(results.total_results, 5);
        assert!(results.capped);
    }

    #[test]
    fn test_cap_spills_into_positions() {
        let balances: Vec<Record> = (0..3).map(|i| balance(&i.to_string(), "Trust", 1.0)).collect();
        let positions: Vec<Record> = (0..3).map(|i| position(&i.to_string(), "TRST", "Trust Co")).collect();
        let collections = RecordCollections::new(balances, positions);

        let results = SearchService::search(&collections, "trust", 4);
        assert_eq!(results.balance.len(), 3);
        assert_eq!(results.positions.len(), 1);
        assert_eq!(results.total_results, 4);
    }

    #[test]
    fn test_no_match_reports_zero() {
        let collections = RecordCollections::new(vec![balance("12345", "Smith IRA", 1.0)], vec![]);
        let results = SearchService::search(&collections, "zzz", 10);
        assert!(results.is_empty());
        assert!(!results.capped);
    }
}
