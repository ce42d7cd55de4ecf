//! Suggestion Service
//!
//! Ranked autocomplete built from four sources: the recent list, popular
//! query counts, distinct values found in the live record collections, and
//! shape heuristics on the query itself.

use crate::config::SearchConfig;
use crate::db::{KeyValueStore, SUGGESTIONS_KEY};
use crate::error::Result;
use crate::services::similarity::similarity;
use crate::types::{Record, RecordCollections};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Fixed terms offered when the query is empty
const EXAMPLE_FIELDS: [&str; 2] = ["Account", "Symbol"];

/// Data-derived candidates kept per category
const PER_CATEGORY_LIMIT: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionCategory {
    Recent,
    Popular,
    Account,
    Symbol,
    Field,
    Value,
    Pattern,
}

impl SuggestionCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            SuggestionCategory::Recent => "recent",
            SuggestionCategory::Popular => "popular",
            SuggestionCategory::Account => "account",
            SuggestionCategory::Symbol => "symbol",
            SuggestionCategory::Field => "field",
            SuggestionCategory::Value => "value",
            SuggestionCategory::Pattern => "pattern",
        }
    }
}

/// How a candidate matched the query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionType {
    Exact,
    Prefix,
    Fuzzy,
    Pattern,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestionMetadata {
    /// Times used, or records the value was found in
    pub count: usize,
}

/// A ranked autocomplete candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Suggestion {
    pub id: String,
    pub text: String,
    pub category: SuggestionCategory,
    #[serde(rename = "type")]
    pub kind: SuggestionType,
    pub relevance_score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<SuggestionMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Per-call generation options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SuggestionOptions {
    pub max_suggestions: usize,
    pub include_recent_searches: bool,
    pub include_popular_searches: bool,
    pub include_data_suggestions: bool,
    pub include_pattern_suggestions: bool,
    pub fuzzy_threshold: f64,
}

impl Default for SuggestionOptions {
    fn default() -> Self {
        Self {
            max_suggestions: 8,
            include_recent_searches: true,
            include_popular_searches: true,
            include_data_suggestions: true,
            include_pattern_suggestions: true,
            fuzzy_threshold: 0.6,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestionStatistics {
    pub recent_search_count: usize,
    pub popular_search_count: usize,
    pub total_searches: u64,
}

/// Persisted form of the recent list and popular counts
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct UsageSnapshot {
    recent_searches: Vec<String>,
    popular_searches: Vec<(String, u64)>,
}

/// Distinct values extracted from one snapshot of the record collections
struct DataCache {
    balance: Arc<Vec<Record>>,
    positions: Arc<Vec<Record>>,
    built_at: Instant,
    accounts: Vec<(String, usize)>,
    symbols: Vec<(String, usize)>,
    security_types: Vec<(String, usize)>,
}

impl DataCache {
    fn build(collections: &RecordCollections) -> Self {
        Self {
            balance: collections.balance.clone(),
            positions: collections.positions.clone(),
            built_at: Instant::now(),
            accounts: extract_unique_values(&collections.balance, &["accountNumber", "accountName"]),
            symbols: extract_unique_values(&collections.positions, &["symbol", "securityDescription"]),
            security_types: extract_unique_values(&collections.positions, &["securityType"]),
        }
    }

    /// Stale once the collections were replaced or resized, or after `ttl`
    fn is_fresh(&self, collections: &RecordCollections, ttl: Duration) -> bool {
        Arc::ptr_eq(&self.balance, &collections.balance)
            && Arc::ptr_eq(&self.positions, &collections.positions)
            && self.balance.len() == collections.balance.len()
            && self.positions.len() == collections.positions.len()
            && self.built_at.elapsed() <= ttl
    }
}

/// Autocomplete engine with persisted usage signals
pub struct SuggestionEngine {
    usage: Mutex<UsageSnapshot>,
    cache: Mutex<Option<DataCache>>,
    store: Arc<dyn KeyValueStore>,
    max_recent: usize,
    max_popular: usize,
    cache_ttl: Duration,
}

impl SuggestionEngine {
    pub fn new(store: Arc<dyn KeyValueStore>, config: &SearchConfig) -> Self {
        let mut usage = Self::load(store.as_ref());
        usage.enforce_bounds(config.max_recent_suggestions, config.max_popular_suggestions);

        info!(
            "SuggestionEngine loaded {} recent, {} popular searches",
            usage.recent_searches.len(),
            usage.popular_searches.len()
        );

        Self {
            usage: Mutex::new(usage),
            cache: Mutex::new(None),
            store,
            max_recent: config.max_recent_suggestions,
            max_popular: config.max_popular_suggestions,
            cache_ttl: config.suggestion_cache_ttl(),
        }
    }

    /// Produce ranked suggestions for `query`
    pub fn generate(
        &self,
        query: &str,
        collections: &RecordCollections,
        options: &SuggestionOptions,
    ) -> Vec<Suggestion> {
        self.refresh_cache(collections);

        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return self.empty_query_suggestions(options.max_suggestions);
        }

        let mut suggestions = Vec::new();

        if options.include_recent_searches {
            suggestions.extend(self.recent_suggestions(&query));
        }
        if options.include_popular_searches {
            suggestions.extend(self.popular_suggestions(&query));
        }
        if options.include_data_suggestions {
            suggestions.extend(self.data_suggestions(&query, options.fuzzy_threshold));
        }
        if options.include_pattern_suggestions {
            suggestions.extend(pattern_suggestions(&query));
        }

        let mut suggestions = dedupe(suggestions);
        suggestions.sort_by(|a, b| {
            b.relevance_score
                .partial_cmp(&a.relevance_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        suggestions.truncate(options.max_suggestions);

        debug!("SuggestionEngine::generate - query={} suggestions={}", query, suggestions.len());
        suggestions
    }

    /// Record a search in the recent list and popular counts
    pub fn record(&self, query: &str) {
        let query = query.trim();
        if query.is_empty() {
            return;
        }

        let mut usage = self.usage.lock();

        usage.recent_searches.retain(|s| s != query);
        usage.recent_searches.insert(0, query.to_string());

        match usage.popular_searches.iter_mut().find(|(s, _)| s == query) {
            Some((_, count)) => *count += 1,
            None => usage.popular_searches.push((query.to_string(), 1)),
        }
        usage.enforce_bounds(self.max_recent, self.max_popular);

        self.persist(&usage);
    }

    /// Drop recent and popular data plus the data cache
    pub fn clear(&self) {
        *self.usage.lock() = UsageSnapshot::default();
        *self.cache.lock() = None;

        if let Err(e) = self.store.remove(SUGGESTIONS_KEY) {
            warn!("Failed to clear suggestion data: {}", e);
        }
    }

    pub fn statistics(&self) -> SuggestionStatistics {
        let usage = self.usage.lock();
        SuggestionStatistics {
            recent_search_count: usage.recent_searches.len(),
            popular_search_count: usage.popular_searches.len(),
            total_searches: usage.popular_searches.iter().map(|(_, n)| n).sum(),
        }
    }

    pub fn recent_searches(&self) -> Vec<String> {
        self.usage.lock().recent_searches.clone()
    }

    // ========================================================================
    // Private Helper Methods
    // ========================================================================

    fn refresh_cache(&self, collections: &RecordCollections) {
        let mut cache = self.cache.lock();
        let fresh = cache
            .as_ref()
            .map_or(false, |c| c.is_fresh(collections, self.cache_ttl));

        if !fresh {
            debug!("Rebuilding suggestion data cache ({} records)", collections.len());
            *cache = Some(DataCache::build(collections));
        }
    }

    fn empty_query_suggestions(&self, max: usize) -> Vec<Suggestion> {
        let usage = self.usage.lock();
        let mut suggestions = Vec::new();

        for (i, search) in usage.recent_searches.iter().take(3).enumerate() {
            suggestions.push(Suggestion {
                id: format!("recent-{}", i),
                text: search.clone(),
                category: SuggestionCategory::Recent,
                kind: SuggestionType::Exact,
                relevance_score: 100.0 - i as f64 * 10.0,
                metadata: None,
                description: Some("Recent search".to_string()),
            });
        }

        for (i, (search, count)) in top_by_count(&usage.popular_searches).take(3).enumerate() {
            suggestions.push(popular_suggestion(format!("popular-{}", i), search, *count, 90.0 - i as f64 * 5.0));
        }

        for (i, field) in EXAMPLE_FIELDS.iter().enumerate() {
            suggestions.push(Suggestion {
                id: format!("field-{}", i),
                text: field.to_string(),
                category: SuggestionCategory::Field,
                kind: SuggestionType::Exact,
                relevance_score: 80.0 - i as f64 * 5.0,
                metadata: None,
                description: Some("Common search term".to_string()),
            });
        }

        suggestions.truncate(max);
        suggestions
    }

    fn recent_suggestions(&self, query: &str) -> Vec<Suggestion> {
        let usage = self.usage.lock();
        usage
            .recent_searches
            .iter()
            .filter(|s| s.to_lowercase().contains(query))
            .take(2)
            .enumerate()
            .map(|(i, search)| Suggestion {
                id: format!("recent-{}", search),
                text: search.clone(),
                category: SuggestionCategory::Recent,
                kind: SuggestionType::Exact,
                relevance_score: 95.0 - i as f64 * 5.0,
                metadata: None,
                description: Some("Recent search".to_string()),
            })
            .collect()
    }

    fn popular_suggestions(&self, query: &str) -> Vec<Suggestion> {
        let usage = self.usage.lock();
        top_by_count(&usage.popular_searches)
            .filter(|(s, _)| s.to_lowercase().contains(query))
            .take(2)
            .enumerate()
            .map(|(i, (search, count))| {
                popular_suggestion(format!("popular-{}", search), search, *count, 85.0 - i as f64 * 5.0)
            })
            .collect()
    }

    fn data_suggestions(&self, query: &str, threshold: f64) -> Vec<Suggestion> {
        let cache = self.cache.lock();
        let Some(cache) = cache.as_ref() else {
            return Vec::new();
        };

        let mut suggestions = value_suggestions(&cache.accounts, query, SuggestionCategory::Account, threshold);
        suggestions.extend(value_suggestions(&cache.symbols, query, SuggestionCategory::Symbol, threshold));
        suggestions.extend(value_suggestions(&cache.security_types, query, SuggestionCategory::Field, threshold));
        suggestions
    }

    fn persist(&self, usage: &UsageSnapshot) {
        if let Err(e) = self.try_persist(usage) {
            warn!("Failed to save suggestion data: {}", e);
        }
    }

    fn try_persist(&self, usage: &UsageSnapshot) -> Result<()> {
        self.store.save(SUGGESTIONS_KEY, &serde_json::to_string(usage)?)
    }

    fn load(store: &dyn KeyValueStore) -> UsageSnapshot {
        let loaded = store.load(SUGGESTIONS_KEY).and_then(|raw| match raw {
            Some(raw) => Ok(serde_json::from_str::<UsageSnapshot>(&raw)?),
            None => Ok(UsageSnapshot::default()),
        });

        loaded.unwrap_or_else(|e| {
            warn!("Failed to load suggestion data, starting empty: {}", e);
            UsageSnapshot::default()
        })
    }
}

impl UsageSnapshot {
    /// Cap both lists; popular keeps the highest counts, ties in insertion order
    fn enforce_bounds(&mut self, max_recent: usize, max_popular: usize) {
        self.recent_searches.truncate(max_recent);
        if self.popular_searches.len() > max_popular {
            self.popular_searches.sort_by(|a, b| b.1.cmp(&a.1));
            self.popular_searches.truncate(max_popular);
        }
    }
}

/// Popular entries by descending count; ties keep insertion order
fn top_by_count(popular: &[(String, u64)]) -> impl Iterator<Item = &(String, u64)> {
    let mut sorted: Vec<&(String, u64)> = popular.iter().collect();
    sorted.sort_by(|a, b| b.1.cmp(&a.1));
    sorted.into_iter()
}

fn popular_suggestion(id: String, search: &str, count: u64, score: f64) -> Suggestion {
    Suggestion {
        id,
        text: search.to_string(),
        category: SuggestionCategory::Popular,
        kind: SuggestionType::Exact,
        relevance_score: score,
        metadata: Some(SuggestionMetadata { count: count as usize }),
        description: Some(format!("Used {} times", count)),
    }
}

/// Distinct trimmed string values of `fields`, with occurrence counts, in
/// first-seen order
fn extract_unique_values(records: &[Record], fields: &[&str]) -> Vec<(String, usize)> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut values: Vec<(String, usize)> = Vec::new();

    for record in records {
        for field in fields {
            let Some(text) = record.get(field).and_then(|v| v.as_str()) else {
                continue;
            };
            let text = text.trim();
            if text.is_empty() {
                continue;
            }

            match index.get(text) {
                Some(&i) => values[i].1 += 1,
                None => {
                    index.insert(text.to_string(), values.len());
                    values.push((text.to_string(), 1));
                }
            }
        }
    }

    values
}

/// Score distinct values against `query`, keeping the best few.
///
/// `query` must already be lowercased.
fn value_suggestions(
    values: &[(String, usize)],
    query: &str,
    category: SuggestionCategory,
    threshold: f64,
) -> Vec<Suggestion> {
    let mut suggestions: Vec<Suggestion> = values
        .iter()
        .filter_map(|(value, count)| {
            let lowered = value.to_lowercase();
            let score = similarity(value, query);
            let contains = lowered.contains(query);
            if score < threshold && !contains {
                return None;
            }

            let kind = if lowered.starts_with(query) {
                SuggestionType::Prefix
            } else if contains {
                SuggestionType::Exact
            } else {
                SuggestionType::Fuzzy
            };

            Some(Suggestion {
                id: format!("{}-{}", category.as_str(), value),
                text: value.clone(),
                category,
                kind,
                relevance_score: score * 100.0 + *count as f64 * 0.1,
                metadata: Some(SuggestionMetadata { count: *count }),
                description: Some(format!(
                    "Found in {} record{}",
                    count,
                    if *count == 1 { "" } else { "s" }
                )),
            })
        })
        .collect();

    suggestions.sort_by(|a, b| {
        b.relevance_score
            .partial_cmp(&a.relevance_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    suggestions.truncate(PER_CATEGORY_LIMIT);
    suggestions
}

/// Shape heuristics: account digits, ticker letters, currency amounts.
///
/// `query` must already be lowercased.
fn pattern_suggestions(query: &str) -> Vec<Suggestion> {
    let mut suggestions = Vec::new();
    let pattern = |id: String, text: String, score: f64, description: &str| Suggestion {
        id,
        text,
        category: SuggestionCategory::Pattern,
        kind: SuggestionType::Pattern,
        relevance_score: score,
        metadata: None,
        description: Some(description.to_string()),
    };

    if query.chars().all(|c| c.is_ascii_digit()) {
        suggestions.push(pattern(
            format!("pattern-account-{}", query),
            format!("Account {}*", query),
            70.0,
            "Search accounts starting with these digits",
        ));
    }

    if (1..=5).contains(&query.len()) && query.chars().all(|c| c.is_ascii_alphabetic()) {
        suggestions.push(pattern(
            format!("pattern-symbol-{}", query),
            format!("{}*", query.to_uppercase()),
            75.0,
            "Search symbols starting with these letters",
        ));
    }

    if query.chars().all(|c| c.is_ascii_digit() || matches!(c, '$' | ',' | '.')) {
        suggestions.push(pattern(
            format!("pattern-amount-{}", query),
            format!("Amount ≥ {}", query),
            65.0,
            "Search amounts greater than or equal to this value",
        ));
    }

    suggestions
}

/// Keep the first suggestion for each `(lowercased text, category)` pair
fn dedupe(suggestions: Vec<Suggestion>) -> Vec<Suggestion> {
    let mut seen = HashSet::new();
    suggestions
        .into_iter()
        .filter(|s| seen.insert((s.text.to_lowercase(), s.category)))
        .collect()
}
