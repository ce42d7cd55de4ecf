//! History Service
//!
//! Bounded, persisted log of past searches plus per-query aggregate
//! statistics ("patterns") used for popularity ranking and suggestions.
//!
//! Mutations are written to the key-value store through a debounced task so
//! a burst of searches results in a single write. A process exit inside the
//! debounce window can lose the latest entries.

use crate::config::SearchConfig;
use crate::db::{KeyValueStore, HISTORY_KEY, PATTERNS_KEY};
use crate::error::Result;
use crate::scheduler::Debouncer;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Export format version
pub const EXPORT_VERSION: &str = "1.0";

/// Rough classification of a query by its shape
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryCategory {
    Account,
    Position,
    Symbol,
    #[default]
    General,
}

impl QueryCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryCategory::Account => "account",
            QueryCategory::Position => "position",
            QueryCategory::Symbol => "symbol",
            QueryCategory::General => "general",
        }
    }
}

/// How a search was initiated
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchSource {
    #[default]
    Manual,
    Suggestion,
    Recent,
    Filter,
}

/// One past search invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: String,
    pub query: String,
    pub timestamp: DateTime<Utc>,
    pub result_count: usize,
    /// Milliseconds
    pub execution_time: f64,
    #[serde(default)]
    pub category: QueryCategory,
    #[serde(default)]
    pub filters: Vec<String>,
    pub successful: bool,
    #[serde(default)]
    pub source: SearchSource,
}

/// Aggregate statistics for one exact query string
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchPattern {
    pub pattern: String,
    pub frequency: u32,
    pub last_used: DateTime<Utc>,
    pub avg_result_count: f64,
    pub success_rate: f64,
    #[serde(default)]
    pub category: QueryCategory,
}

/// Filter options for listing raw history
#[derive(Debug, Clone, Default)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
    pub category: Option<QueryCategory>,
    pub successful: Option<bool>,
    pub source: Option<SearchSource>,
    pub since: Option<DateTime<Utc>>,
}

/// Aggregate view over the whole history
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Statistics {
    pub total_searches: usize,
    pub unique_queries: usize,
    pub avg_result_count: f64,
    pub most_popular_queries: Vec<HistoryEntry>,
    pub recent_queries: Vec<HistoryEntry>,
    pub search_patterns: Vec<SearchPattern>,
    /// Percentage of searches with at least one result
    pub success_rate: f64,
    pub avg_execution_time: f64,
    pub category_counts: BTreeMap<String, usize>,
    /// Searches per UTC day (`YYYY-MM-DD`) over the last seven days
    pub daily_search_counts: BTreeMap<String, usize>,
}

/// Outcome of an import, reported to the user instead of an error
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportResult {
    pub success: bool,
    pub message: String,
    pub imported_count: usize,
}

impl ImportResult {
    fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            imported_count: 0,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExportPayload {
    history: Vec<HistoryEntry>,
    patterns: Vec<(String, SearchPattern)>,
    exported_at: DateTime<Utc>,
    version: String,
}

#[derive(Debug, Default)]
struct HistoryData {
    /// Newest first
    entries: Vec<HistoryEntry>,
    /// Keyed by exact query string, kept in insertion order
    patterns: Vec<SearchPattern>,
}

/// Per-query accumulator used by popularity ranking
struct QueryStats<'a> {
    count: usize,
    latest: &'a HistoryEntry,
    avg_result_count: f64,
    last_used: DateTime<Utc>,
}

/// Persisted search history with popularity analytics
pub struct HistoryStore {
    data: Arc<Mutex<HistoryData>>,
    store: Arc<dyn KeyValueStore>,
    debouncer: Debouncer,
    max_history: usize,
    max_patterns: usize,
}

impl HistoryStore {
    /// Create the store and load any persisted history.
    ///
    /// A corrupt snapshot is discarded and the store starts empty.
    pub fn new(store: Arc<dyn KeyValueStore>, config: &SearchConfig) -> Self {
        let data = Self::load(store.as_ref(), config.max_history, config.max_patterns);

        info!(
            "HistoryStore loaded {} entries, {} patterns",
            data.entries.len(),
            data.patterns.len()
        );

        Self {
            data: Arc::new(Mutex::new(data)),
            store,
            debouncer: Debouncer::new("history-persist", config.persist_debounce()),
            max_history: config.max_history,
            max_patterns: config.max_patterns,
        }
    }

    /// Record a completed search
    pub fn record(
        &self,
        query: &str,
        result_count: usize,
        execution_time: f64,
        filters: &[String],
        source: SearchSource,
    ) -> HistoryEntry {
        let now = Utc::now();
        let query = query.trim().to_string();

        let entry = HistoryEntry {
            id: format!("search_{}_{}", now.timestamp_millis(), &Uuid::new_v4().simple().to_string()[..9]),
            category: categorize_query(&query),
            query,
            timestamp: now,
            result_count,
            execution_time,
            filters: filters.to_vec(),
            successful: result_count > 0,
            source,
        };

        debug!(
            "HistoryStore::record - query={} results={} category={}",
            entry.query,
            result_count,
            entry.category.as_str()
        );

        {
            let mut data = self.data.lock();
            data.entries.insert(0, entry.clone());
            data.entries.truncate(self.max_history);
            Self::update_patterns(&mut data.patterns, &entry, self.max_patterns);
        }

        self.schedule_persist();
        entry
    }

    /// List raw history, newest first
    pub fn history(&self, query: &HistoryQuery) -> Vec<HistoryEntry> {
        let data = self.data.lock();
        let matching = data.entries.iter().filter(|e| {
            query.category.map_or(true, |c| e.category == c)
                && query.successful.map_or(true, |s| e.successful == s)
                && query.source.map_or(true, |s| e.source == s)
                && query.since.map_or(true, |since| e.timestamp >= since)
        });

        match query.limit {
            Some(limit) => matching.take(limit).cloned().collect(),
            None => matching.cloned().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.lock().entries.is_empty()
    }

    /// Current pattern table, in insertion order
    pub fn patterns(&self) -> Vec<SearchPattern> {
        self.data.lock().patterns.clone()
    }

    /// Most recent successful searches, de-duplicated case-insensitively
    pub fn recent_unique(&self, limit: usize) -> Vec<HistoryEntry> {
        let data = self.data.lock();
        Self::recent_unique_in(&data.entries, limit)
    }

    /// Highest scoring searches by frequency, result volume and recency
    pub fn popular(&self, limit: usize) -> Vec<HistoryEntry> {
        let data = self.data.lock();
        Self::popular_in(&data.entries, limit, Utc::now())
    }

    /// Past queries that complete `partial`
    pub fn suggestions_for(&self, partial: &str, limit: usize) -> Vec<String> {
        let partial = partial.trim().to_lowercase();
        if partial.is_empty() || limit == 0 {
            return Vec::new();
        }

        let data = self.data.lock();
        let mut seen = HashSet::new();
        let mut suggestions = Vec::new();
        let mut push = |query: &str, suggestions: &mut Vec<String>| {
            if seen.insert(query.to_string()) {
                suggestions.push(query.to_string());
            }
        };

        for entry in data.entries.iter().filter(|e| e.successful) {
            if entry.query.to_lowercase().starts_with(&partial) {
                push(&entry.query, &mut suggestions);
            }
        }

        for pattern in &data.patterns {
            if pattern.pattern.to_lowercase().contains(&partial) {
                push(&pattern.pattern, &mut suggestions);
            }
        }

        // Word-level completions only when the cheaper passes came up short
        if suggestions.len() < limit {
            for entry in data.entries.iter().filter(|e| e.successful) {
                let lowered = entry.query.to_lowercase();
                let completes_word = lowered
                    .split_whitespace()
                    .any(|word| word.starts_with(&partial) && word != partial);
                if completes_word {
                    push(&entry.query, &mut suggestions);
                }
            }
        }

        suggestions.truncate(limit);
        suggestions
    }

    /// Aggregate statistics over the whole history
    pub fn statistics(&self) -> Statistics {
        let now = Utc::now();
        let data = self.data.lock();
        let entries = &data.entries;
        let total = entries.len();

        let unique_queries = entries
            .iter()
            .map(|e| e.query.to_lowercase())
            .collect::<HashSet<_>>()
            .len();

        let mut category_counts = BTreeMap::new();
        for entry in entries {
            *category_counts.entry(entry.category.as_str().to_string()).or_insert(0) += 1;
        }

        let week_ago = now - Duration::days(7);
        let mut daily_search_counts = BTreeMap::new();
        for entry in entries.iter().filter(|e| e.timestamp >= week_ago) {
            let day = entry.timestamp.format("%Y-%m-%d").to_string();
            *daily_search_counts.entry(day).or_insert(0) += 1;
        }

        let mean = |sum: f64| if total > 0 { sum / total as f64 } else { 0.0 };
        let successful = entries.iter().filter(|e| e.successful).count();

        Statistics {
            total_searches: total,
            unique_queries,
            avg_result_count: mean(entries.iter().map(|e| e.result_count as f64).sum()),
            most_popular_queries: Self::popular_in(entries, 5, now),
            recent_queries: Self::recent_unique_in(entries, 10),
            search_patterns: data.patterns.iter().take(10).cloned().collect(),
            success_rate: mean(successful as f64 * 100.0),
            avg_execution_time: mean(entries.iter().map(|e| e.execution_time).sum()),
            category_counts,
            daily_search_counts,
        }
    }

    /// Drop all history and patterns
    pub fn clear(&self) {
        info!("HistoryStore::clear");
        {
            let mut data = self.data.lock();
            data.entries.clear();
            data.patterns.clear();
        }
        self.flush();
    }

    /// Drop entries older than `days`, returns how many were removed
    pub fn clear_older_than(&self, days: i64) -> usize {
        let cutoff = Utc::now() - Duration::days(days);
        let removed = {
            let mut data = self.data.lock();
            let before = data.entries.len();
            data.entries.retain(|e| e.timestamp >= cutoff);
            before - data.entries.len()
        };

        if removed > 0 {
            info!("Cleared {} search history entries older than {} days", removed, days);
            self.flush();
        }

        removed
    }

    /// Serialize the full history and pattern table
    pub fn export_all(&self) -> Result<String> {
        let data = self.data.lock();
        let payload = ExportPayload {
            history: data.entries.clone(),
            patterns: data
                .patterns
                .iter()
                .map(|p| (p.pattern.clone(), p.clone()))
                .collect(),
            exported_at: Utc::now(),
            version: EXPORT_VERSION.to_string(),
        };

        Ok(serde_json::to_string_pretty(&payload)?)
    }

    /// Merge an exported snapshot into this store.
    ///
    /// Entries with the wrong shape or an id already present are skipped.
    pub fn import_all(&self, serialized: &str) -> ImportResult {
        let payload: Value = match serde_json::from_str(serialized) {
            Ok(value) => value,
            Err(e) => return ImportResult::failed(format!("Import failed: {}", e)),
        };

        let Some(history) = payload.get("history").and_then(Value::as_array) else {
            return ImportResult::failed("Invalid data format");
        };

        let imported = {
            let mut data = self.data.lock();
            let mut known: HashSet<String> = data.entries.iter().map(|e| e.id.clone()).collect();
            let mut imported = 0;

            for entry in history.iter().filter_map(parse_entry) {
                if known.insert(entry.id.clone()) {
                    data.entries.push(entry);
                    imported += 1;
                }
            }

            if let Some(patterns) = payload.get("patterns").and_then(Value::as_array) {
                for (key, pattern) in patterns.iter().filter_map(parse_pattern_pair) {
                    match data.patterns.iter_mut().find(|p| p.pattern == key) {
                        Some(existing) => *existing = pattern,
                        None => data.patterns.push(pattern),
                    }
                }
                Self::enforce_pattern_bound(&mut data.patterns, self.max_patterns);
            }

            data.entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
            data.entries.truncate(self.max_history);
            imported
        };

        self.flush();
        info!("Imported {} search history entries", imported);

        ImportResult {
            success: true,
            message: format!("Successfully imported {} search entries", imported),
            imported_count: imported,
        }
    }

    /// Write pending changes now and cancel the debounced write
    pub fn flush(&self) {
        self.debouncer.cancel();
        let data = self.data.lock();
        Self::persist(&data, self.store.as_ref());
    }

    /// Whether a debounced write is waiting
    pub fn has_pending_write(&self) -> bool {
        self.debouncer.is_pending()
    }

    // ========================================================================
    // Private Helper Methods
    // ========================================================================

    fn schedule_persist(&self) {
        let data = self.data.clone();
        let store = self.store.clone();

        let scheduled = self.debouncer.schedule(move || {
            let data = data.lock();
            Self::persist(&data, store.as_ref());
        });

        // No runtime to host the timer; write through
        if !scheduled {
            let data = self.data.lock();
            Self::persist(&data, self.store.as_ref());
        }
    }

    fn persist(data: &HistoryData, store: &dyn KeyValueStore) {
        match Self::try_persist(data, store) {
            Ok(()) => debug!("Persisted {} history entries", data.entries.len()),
            Err(e) => warn!("Failed to save search history: {}", e),
        }
    }

    fn try_persist(data: &HistoryData, store: &dyn KeyValueStore) -> Result<()> {
        let history = serde_json::to_string(&data.entries)?;
        store.save(HISTORY_KEY, &history)?;

        let patterns: Vec<(&str, &SearchPattern)> =
            data.patterns.iter().map(|p| (p.pattern.as_str(), p)).collect();
        store.save(PATTERNS_KEY, &serde_json::to_string(&patterns)?)?;

        Ok(())
    }

    fn load(store: &dyn KeyValueStore, max_history: usize, max_patterns: usize) -> HistoryData {
        match Self::try_load(store) {
            Ok(mut data) => {
                data.entries.truncate(max_history);
                Self::enforce_pattern_bound(&mut data.patterns, max_patterns);
                data
            }
            Err(e) => {
                warn!("Failed to load search history, starting empty: {}", e);
                HistoryData::default()
            }
        }
    }

    fn try_load(store: &dyn KeyValueStore) -> Result<HistoryData> {
        let mut data = HistoryData::default();

        if let Some(raw) = store.load(HISTORY_KEY)? {
            let parsed: Value = serde_json::from_str(&raw)?;
            if let Some(items) = parsed.as_array() {
                data.entries = items.iter().filter_map(parse_entry).collect();
            }
        }

        if let Some(raw) = store.load(PATTERNS_KEY)? {
            let parsed: Vec<(String, SearchPattern)> = serde_json::from_str(&raw)?;
            data.patterns = parsed.into_iter().map(|(_, p)| p).collect();
        }

        Ok(data)
    }

    fn update_patterns(patterns: &mut Vec<SearchPattern>, entry: &HistoryEntry, max_patterns: usize) {
        match patterns.iter_mut().find(|p| p.pattern == entry.query) {
            Some(pattern) => {
                pattern.frequency += 1;
                pattern.last_used = entry.timestamp;
                // Pairwise mean, not a running average
                pattern.avg_result_count = (pattern.avg_result_count + entry.result_count as f64) / 2.0;
                pattern.success_rate =
                    pattern.success_rate * 0.9 + if entry.successful { 0.1 } else { 0.0 };
            }
            None => patterns.push(SearchPattern {
                pattern: entry.query.clone(),
                frequency: 1,
                last_used: entry.timestamp,
                avg_result_count: entry.result_count as f64,
                success_rate: if entry.successful { 1.0 } else { 0.0 },
                category: entry.category,
            }),
        }

        Self::enforce_pattern_bound(patterns, max_patterns);
    }

    /// Keep the most frequent patterns; ties keep their insertion order
    fn enforce_pattern_bound(patterns: &mut Vec<SearchPattern>, max_patterns: usize) {
        if patterns.len() > max_patterns {
            patterns.sort_by(|a, b| b.frequency.cmp(&a.frequency));
            patterns.truncate(max_patterns);
        }
    }

    fn recent_unique_in(entries: &[HistoryEntry], limit: usize) -> Vec<HistoryEntry> {
        let mut seen = HashSet::new();
        entries
            .iter()
            .filter(|e| e.successful)
            .filter(|e| seen.insert(e.query.to_lowercase()))
            .take(limit)
            .cloned()
            .collect()
    }

    fn popular_in(entries: &[HistoryEntry], limit: usize, now: DateTime<Utc>) -> Vec<HistoryEntry> {
        let mut order: Vec<String> = Vec::new();
        let mut stats: HashMap<String, QueryStats<'_>> = HashMap::new();

        for entry in entries {
            let key = entry.query.to_lowercase();
            match stats.get_mut(&key) {
                Some(stat) => {
                    stat.count += 1;
                    stat.avg_result_count = (stat.avg_result_count + entry.result_count as f64) / 2.0;
                    if entry.timestamp > stat.last_used {
                        stat.latest = entry;
                        stat.last_used = entry.timestamp;
                    }
                }
                None => {
                    order.push(key.clone());
                    stats.insert(
                        key,
                        QueryStats {
                            count: 1,
                            latest: entry,
                            avg_result_count: entry.result_count as f64,
                            last_used: entry.timestamp,
                        },
                    );
                }
            }
        }

        let mut scored: Vec<(f64, &HistoryEntry)> = order
            .iter()
            .filter_map(|key| stats.get(key))
            .filter(|stat| stat.latest.successful)
            .map(|stat| {
                let score = popularity_score(stat.count, stat.avg_result_count, stat.last_used, now);
                (score, stat.latest)
            })
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.into_iter().take(limit).map(|(_, e)| e.clone()).collect()
    }
}

/// Classify a query: digits are accounts, short words are ticker symbols,
/// and a few keywords pick position or account searches
pub fn categorize_query(query: &str) -> QueryCategory {
    let lower = query.trim().to_lowercase();

    if !lower.is_empty() && lower.chars().all(|c| c.is_ascii_digit()) {
        return QueryCategory::Account;
    }
    if (1..=5).contains(&lower.len()) && lower.chars().all(|c| c.is_ascii_lowercase()) {
        return QueryCategory::Symbol;
    }
    if ["position", "stock", "bond"].iter().any(|k| lower.contains(k)) {
        return QueryCategory::Position;
    }
    if ["account", "balance"].iter().any(|k| lower.contains(k)) {
        return QueryCategory::Account;
    }

    QueryCategory::General
}

/// `ln(count + 1) * ln(avg_results + 1) * exp(-days_since_last_use / 30)`
pub fn popularity_score(
    count: usize,
    avg_result_count: f64,
    last_used: DateTime<Utc>,
    now: DateTime<Utc>,
) -> f64 {
    let days_since = (now - last_used).num_milliseconds() as f64 / 86_400_000.0;
    let frequency = (count as f64 + 1.0).ln();
    let results = (avg_result_count + 1.0).ln();
    let recency = (-days_since / 30.0).exp();

    frequency * results * recency
}

/// Accept an entry only when the required fields have the right JSON types
fn parse_entry(value: &Value) -> Option<HistoryEntry> {
    let well_formed = value.get("id").map_or(false, Value::is_string)
        && value.get("query").map_or(false, Value::is_string)
        && value.get("timestamp").map_or(false, Value::is_string)
        && value.get("resultCount").map_or(false, Value::is_number)
        && value.get("executionTime").map_or(false, Value::is_number)
        && value.get("successful").map_or(false, Value::is_boolean);

    if !well_formed {
        return None;
    }

    serde_json::from_value(value.clone()).ok()
}

fn parse_pattern_pair(value: &Value) -> Option<(String, SearchPattern)> {
    let pair = value.as_array()?;
    let key = pair.first()?.as_str()?.to_string();
    let pattern = pair.get(1)?;

    if !pattern.get("frequency").map_or(false, Value::is_number) {
        return None;
    }

    let mut pattern: SearchPattern = serde_json::from_value(pattern.clone()).ok()?;
    pattern.pattern = key.clone();
    Some((key, pattern))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;

    fn new_store() -> (HistoryStore, Arc<MemoryStore>) {
        let kv = Arc::new(MemoryStore::new());
        let history = HistoryStore::new(kv.clone(), &SearchConfig::default());
        (history, kv)
    }

    fn record(history: &HistoryStore, query: &str, results: usize) -> HistoryEntry {
        history.record(query, results, 1.5, &[], SearchSource::Manual)
    }

    #[test]
    fn test_categorize_query() {
        assert_eq!(categorize_query("12345"), QueryCategory::Account);
        assert_eq!(categorize_query("AAPL"), QueryCategory::Symbol);
        assert_eq!(categorize_query("a"), QueryCategory::Symbol);
        assert_eq!(categorize_query("apple"), QueryCategory::Symbol);
        assert_eq!(categorize_query("stocks"), QueryCategory::Position);
        assert_eq!(categorize_query("bond fund"), QueryCategory::Position);
        assert_eq!(categorize_query("my account"), QueryCategory::Account);
        assert_eq!(categorize_query("cash balance"), QueryCategory::Account);
        assert_eq!(categorize_query("Smith IRA"), QueryCategory::General);
        assert_eq!(categorize_query(""), QueryCategory::General);
    }

    #[test]
    fn test_record_builds_entry() {
        let (history, _) = new_store();

        let entry = history.record("  12345 ", 1, 2.0, &["portfolioValue".to_string()], SearchSource::Suggestion);
        assert_eq!(entry.query, "12345");
        assert_eq!(entry.category, QueryCategory::Account);
        assert!(entry.successful);
        assert!(entry.id.starts_with("search_"));
        assert_eq!(entry.filters, vec!["portfolioValue".to_string()]);

        let failed = record(&history, "nothing", 0);
        assert!(!failed.successful);

        // newest first
        let all = history.history(&HistoryQuery::default());
        assert_eq!(all[0].id, failed.id);
        assert_eq!(all[1].id, entry.id);
    }

    #[test]
    fn test_history_bound_keeps_most_recent() {
        let (history, _) = new_store();

        for i in 0..1005 {
            record(&history, &format!("query {}", i), 1);
        }

        assert_eq!(history.len(), 1000);
        let all = history.history(&HistoryQuery::default());
        assert_eq!(all.first().unwrap().query, "query 1004");
        assert_eq!(all.last().unwrap().query, "query 5");
    }

    #[test]
    fn test_pattern_updates() {
        let (history, _) = new_store();

        record(&history, "AAPL", 10);
        record(&history, "AAPL", 20);
        record(&history, "AAPL", 0);

        let patterns = history.patterns();
        assert_eq!(patterns.len(), 1);
        let pattern = &patterns[0];
        assert_eq!(pattern.frequency, 3);
        // ((10 + 20) / 2 + 0) / 2
        assert!((pattern.avg_result_count - 7.5).abs() < 1e-9);
        // 1.0 -> 0.9 + 0.1 -> 0.9
        assert!((pattern.success_rate - 0.9).abs() < 1e-9);
        assert_eq!(pattern.category, QueryCategory::Symbol);
    }

    #[test]
    fn test_pattern_bound_evicts_lowest_frequency() {
        let (history, _) = new_store();

        record(&history, "keeper", 1);
        record(&history, "keeper", 1);
        for i in 0..60 {
            record(&history, &format!("once {}", i), 1);
        }

        let patterns = history.patterns();
        assert_eq!(patterns.len(), 50);
        assert!(patterns.iter().any(|p| p.pattern == "keeper"));
    }

    #[test]
    fn test_recent_unique() {
        let (history, _) = new_store();

        record(&history, "AAPL", 3);
        record(&history, "msft", 0);
        record(&history, "aapl", 2);
        record(&history, "Smith", 1);

        let recent = history.recent_unique(10);
        let queries: Vec<&str> = recent.iter().map(|e| e.query.as_str()).collect();
        assert_eq!(queries, vec!["Smith", "aapl"]);

        assert_eq!(history.recent_unique(1).len(), 1);
    }

    #[test]
    fn test_popularity_recency_monotonic() {
        let now = Utc::now();
        let recent = popularity_score(3, 10.0, now - Duration::days(1), now);
        let older = popularity_score(3, 10.0, now - Duration::days(20), now);
        assert!(recent >= older);

        let same = popularity_score(3, 10.0, now, now);
        assert!((same - 4f64.ln() * 11f64.ln()).abs() < 1e-9);
    }

    #[test]
    fn test_popular_ranks_frequency_and_skips_failures() {
        let (history, _) = new_store();

        for _ in 0..4 {
            record(&history, "AAPL", 5);
        }
        record(&history, "bonds", 5);
        record(&history, "ghost", 0);
        record(&history, "ghost", 0);

        let popular = history.popular(5);
        let queries: Vec<&str> = popular.iter().map(|e| e.query.as_str()).collect();
        assert_eq!(queries, vec!["AAPL", "bonds"]);
    }

    #[test]
    fn test_suggestions_for() {
        let (history, _) = new_store();

        record(&history, "Smith IRA", 2);
        record(&history, "smith trust", 1);
        record(&history, "Jones Roth IRA", 1);
        record(&history, "Smithfield", 0);

        assert!(history.suggestions_for("  ", 5).is_empty());

        let suggestions = history.suggestions_for("smi", 10);
        assert!(suggestions.contains(&"Smith IRA".to_string()));
        assert!(suggestions.contains(&"smith trust".to_string()));
        // present through the pattern table even though it found nothing
        assert!(suggestions.contains(&"Smithfield".to_string()));

        // word-level match
        let suggestions = history.suggestions_for("ro", 10);
        assert_eq!(suggestions, vec!["Jones Roth IRA".to_string()]);

        assert_eq!(history.suggestions_for("s", 1).len(), 1);
    }

    #[test]
    fn test_statistics() {
        let (history, _) = new_store();

        record(&history, "12345", 4);
        record(&history, "AAPL", 2);
        record(&history, "aapl", 0);

        let stats = history.statistics();
        assert_eq!(stats.total_searches, 3);
        assert_eq!(stats.unique_queries, 2);
        assert!((stats.avg_result_count - 2.0).abs() < 1e-9);
        assert!((stats.success_rate - 200.0 / 3.0).abs() < 1e-9);
        assert!((stats.avg_execution_time - 1.5).abs() < 1e-9);
        assert_eq!(stats.category_counts.get("symbol"), Some(&2));
        assert_eq!(stats.category_counts.get("account"), Some(&1));
        assert_eq!(stats.daily_search_counts.values().sum::<usize>(), 3);
    }

    #[test]
    fn test_statistics_empty() {
        let (history, _) = new_store();
        let stats = history.statistics();
        assert_eq!(stats.total_searches, 0);
        assert_eq!(stats.avg_result_count, 0.0);
        assert_eq!(stats.success_rate, 0.0);
    }

    #[test]
    fn test_history_query_filters() {
        let (history, _) = new_store();

        record(&history, "12345", 1);
        history.record("AAPL", 0, 1.0, &[], SearchSource::Suggestion);
        record(&history, "MSFT", 3);

        let symbols = history.history(&HistoryQuery {
            category: Some(QueryCategory::Symbol),
            ..Default::default()
        });
        assert_eq!(symbols.len(), 2);

        let failed = history.history(&HistoryQuery {
            successful: Some(false),
            ..Default::default()
        });
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].query, "AAPL");

        let from_suggestions = history.history(&HistoryQuery {
            source: Some(SearchSource::Suggestion),
            ..Default::default()
        });
        assert_eq!(from_suggestions.len(), 1);

        let limited = history.history(&HistoryQuery {
            limit: Some(1),
            since: Some(Utc::now() - Duration::hours(1)),
            ..Default::default()
        });
        assert_eq!(limited.len(), 1);
    }

    #[test]
    fn test_clear_and_clear_older_than() {
        let (history, kv) = new_store();

        record(&history, "AAPL", 1);
        assert_eq!(history.clear_older_than(30), 0);

        // Backdate through an import
        let old = serde_json::json!({
            "history": [{
                "id": "search_old",
                "query": "old",
                "timestamp": (Utc::now() - Duration::days(40)).to_rfc3339(),
                "resultCount": 1,
                "executionTime": 1.0,
                "successful": true
            }]
        });
        assert!(history.import_all(&old.to_string()).success);
        assert_eq!(history.len(), 2);

        assert_eq!(history.clear_older_than(30), 1);
        assert_eq!(history.len(), 1);

        history.clear();
        assert!(history.is_empty());
        assert!(history.patterns().is_empty());
        assert_eq!(kv.load(HISTORY_KEY).unwrap().as_deref(), Some("[]"));
    }

    #[test]
    fn test_export_import_round_trip() {
        let (history, _) = new_store();
        record(&history, "AAPL", 3);
        record(&history, "12345", 1);
        record(&history, "nothing", 0);

        let exported = history.export_all().unwrap();
        let before: Vec<String> = history
            .history(&HistoryQuery::default())
            .into_iter()
            .map(|e| e.id)
            .collect();

        // Into a fresh store
        let (fresh, _) = new_store();
        let result = fresh.import_all(&exported);
        assert!(result.success);
        assert_eq!(result.imported_count, 3);
        let restored: Vec<String> = fresh
            .history(&HistoryQuery::default())
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(restored, before);
        assert_eq!(fresh.patterns().len(), 3);

        // Into itself: every id is already present
        let result = history.import_all(&exported);
        assert!(result.success);
        assert_eq!(result.imported_count, 0);
        assert_eq!(history.len(), 3);
    }

    #[test]
    fn test_import_skips_invalid_entries() {
        let (history, _) = new_store();

        let payload = serde_json::json!({
            "history": [
                {"id": "a", "query": "AAPL", "timestamp": Utc::now().to_rfc3339(), "resultCount": 1, "executionTime": 2, "successful": true},
                {"id": "b", "query": "MSFT", "timestamp": Utc::now().to_rfc3339(), "resultCount": "1", "executionTime": 2, "successful": true},
                {"id": 3, "query": "GOOG", "timestamp": Utc::now().to_rfc3339(), "resultCount": 1, "executionTime": 2, "successful": true},
                {"id": "c", "query": "TSLA", "timestamp": "yesterday", "resultCount": 1, "executionTime": 2, "successful": true},
                "garbage"
            ],
            "patterns": [["AAPL", {"pattern": "AAPL", "frequency": 2, "lastUsed": Utc::now().to_rfc3339(), "avgResultCount": 1.0, "successRate": 1.0}], ["bad", {}]]
        });

        let result = history.import_all(&payload.to_string());
        assert!(result.success);
        assert_eq!(result.imported_count, 1);
        assert_eq!(history.patterns().len(), 1);
    }

    #[test]
    fn test_import_malformed_payload() {
        let (history, _) = new_store();

        let result = history.import_all("{not json");
        assert!(!result.success);
        assert!(result.message.starts_with("Import failed"));

        let result = history.import_all(r#"{"history": "nope"}"#);
        assert!(!result.success);
        assert_eq!(result.message, "Invalid data format");
        assert_eq!(result.imported_count, 0);
    }

    #[test]
    fn test_persists_without_runtime_and_reloads() {
        let (history, kv) = new_store();
        record(&history, "AAPL", 2);

        // Outside a runtime the write goes straight through
        assert!(kv.load(HISTORY_KEY).unwrap().is_some());

        let reloaded = HistoryStore::new(kv.clone(), &SearchConfig::default());
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded.patterns()[0].pattern, "AAPL");
    }

    #[test]
    fn test_load_applies_pattern_bound() {
        let kv = Arc::new(MemoryStore::new());
        let now = Utc::now();
        let patterns: Vec<(String, SearchPattern)> = (0..60)
            .map(|i| {
                let key = format!("query {}", i);
                let pattern = SearchPattern {
                    pattern: key.clone(),
                    frequency: if i == 59 { 5 } else { 1 },
                    last_used: now,
                    avg_result_count: 1.0,
                    success_rate: 1.0,
                    category: QueryCategory::General,
                };
                (key, pattern)
            })
            .collect();
        kv.save(PATTERNS_KEY, &serde_json::to_string(&patterns).unwrap()).unwrap();

        let history = HistoryStore::new(kv, &SearchConfig::default());
        let loaded = history.patterns();
        assert_eq!(loaded.len(), 50);
        // highest frequency survives even though it was stored last
        assert_eq!(loaded[0].pattern, "query 59");
    }

    #[test]
    fn test_corrupt_snapshot_discarded() {
        let kv = Arc::new(MemoryStore::new());
        kv.save(HISTORY_KEY, "[{broken").unwrap();
        kv.save(PATTERNS_KEY, "[]").unwrap();

        let history = HistoryStore::new(kv, &SearchConfig::default());
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn test_debounced_persist_collapses_burst() {
        let kv = Arc::new(MemoryStore::new());
        let config = SearchConfig {
            persist_debounce_ms: 30,
            ..SearchConfig::default()
        };
        let history = HistoryStore::new(kv.clone(), &config);

        record(&history, "AAPL", 1);
        record(&history, "MSFT", 1);
        assert!(history.has_pending_write());
        assert!(kv.load(HISTORY_KEY).unwrap().is_none());

        tokio::time::sleep(std::time::Duration::from_millis(120)).await;
        assert!(!history.has_pending_write());

        let saved: Vec<HistoryEntry> = serde_json::from_str(&kv.load(HISTORY_KEY).unwrap().unwrap()).unwrap();
        assert_eq!(saved.len(), 2);
    }

    #[tokio::test]
    async fn test_flush_writes_immediately() {
        let kv = Arc::new(MemoryStore::new());
        let config = SearchConfig {
            persist_debounce_ms: 10_000,
            ..SearchConfig::default()
        };
        let history = HistoryStore::new(kv.clone(), &config);

        record(&history, "AAPL", 1);
        assert!(kv.load(HISTORY_KEY).unwrap().is_none());

        history.flush();
        assert!(!history.has_pending_write());
        assert!(kv.load(HISTORY_KEY).unwrap().is_some());
    }
}
