//! Search Orchestrator
//!
//! Public coordinator over the search, filter, history and suggestion
//! services. Holds the current query, results, filters and saved filter sets
//! in a [`SearchState`] that only changes through [`reduce`].
//!
//! Free-text results and the filtered view are computed independently. The
//! orchestrator never intersects them; the host picks which one to show.

mod reducer;

pub use reducer::{reduce, Limits, SearchAction, SearchState};

use crate::config::SearchConfig;
use crate::db::{KeyValueStore, PREFERENCES_KEY};
use crate::error::{AppError, Result};
use crate::scheduler::Debouncer;
use crate::services::{
    FilterService, FilteredView, HistoryStore, ImportResult, SearchResults, SearchService,
    SearchSource, Statistics, Suggestion, SuggestionEngine, SuggestionOptions,
    SuggestionStatistics,
};
use crate::types::{FilterCondition, RecordCollections, SavedFilterSet};
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Stamp handed out by [`SearchOrchestrator::begin_search`]
#[derive(Debug, Clone)]
pub struct SearchTicket {
    sequence: u64,
    query: String,
    started: Instant,
}

impl SearchTicket {
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn query(&self) -> &str {
        &self.query
    }
}

/// Persisted recent queries and saved filter sets
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct Preferences {
    search_history: Vec<String>,
    saved_filters: Vec<SavedFilterSet>,
}

struct Holder {
    state: SearchState,
    /// Sequence of the most recently started search
    latest: u64,
}

struct Inner {
    holder: Mutex<Holder>,
    records: RwLock<RecordCollections>,
    history: HistoryStore,
    suggestions: SuggestionEngine,
    store: Arc<dyn KeyValueStore>,
    config: SearchConfig,
    limits: Limits,
    search_debouncer: Debouncer,
}

/// Search engine facade; cheap to clone, clones share state
#[derive(Clone)]
pub struct SearchOrchestrator {
    inner: Arc<Inner>,
}

impl SearchOrchestrator {
    /// Build the engine over `store`, restoring persisted history,
    /// suggestion data and preferences
    pub fn new(store: Arc<dyn KeyValueStore>, config: SearchConfig) -> Self {
        let history = HistoryStore::new(store.clone(), &config);
        let suggestions = SuggestionEngine::new(store.clone(), &config);
        let limits = Limits::from(&config);

        let preferences = Self::load_preferences(store.as_ref());
        let state = reduce(
            SearchState::default(),
            SearchAction::RestorePreferences {
                recent_queries: preferences.search_history,
                saved_filters: preferences.saved_filters,
            },
            limits,
        );

        Self {
            inner: Arc::new(Inner {
                holder: Mutex::new(Holder { state, latest: 0 }),
                records: RwLock::new(RecordCollections::default()),
                history,
                suggestions,
                store,
                search_debouncer: Debouncer::new("search-input", config.search_debounce()),
                limits,
                config,
            }),
        }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.inner.config
    }

    pub fn history(&self) -> &HistoryStore {
        &self.inner.history
    }

    pub fn suggestions(&self) -> &SuggestionEngine {
        &self.inner.suggestions
    }

    // ========================================================================
    // Records
    // ========================================================================

    /// Replace the record collections the engine searches over.
    ///
    /// The filtered view is recomputed; existing search results are kept
    /// until the next search.
    pub fn set_records(&self, collections: RecordCollections) {
        info!(
            "Records updated: {} balance, {} positions",
            collections.balance.len(),
            collections.positions.len()
        );
        *self.inner.records.write() = collections;
        self.refresh_filtered_view();
    }

    pub fn records(&self) -> RecordCollections {
        self.inner.records.read().clone()
    }

    // ========================================================================
    // Free-text search
    // ========================================================================

    /// Update the live query and search it after the input goes quiet.
    ///
    /// A blank query clears the results immediately. Without a tokio runtime
    /// the search runs inline.
    pub fn set_query(&self, text: &str) {
        self.dispatch(SearchAction::SetQuery(text.to_string()));

        if text.trim().is_empty() {
            self.inner.search_debouncer.cancel();
            self.perform_search(text, SearchSource::Manual);
            return;
        }

        let this = self.clone();
        let query = text.to_string();
        let scheduled = self.inner.search_debouncer.schedule(move || {
            this.perform_search(&query, SearchSource::Manual);
        });

        if !scheduled {
            self.perform_search(text, SearchSource::Manual);
        }
    }

    /// Whether a debounced search is waiting for the input to go quiet
    pub fn has_pending_search(&self) -> bool {
        self.inner.search_debouncer.is_pending()
    }

    /// Run a search now. Returns the results if they were applied, `None` if
    /// a newer search started in the meantime.
    ///
    /// A search picked from a suggestion, the recent list or a filter
    /// supersedes any debounced typing search still waiting to fire.
    pub fn perform_search(&self, query: &str, source: SearchSource) -> Option<SearchResults> {
        if source != SearchSource::Manual && self.inner.search_debouncer.cancel() {
            debug!("Cancelled pending typed search in favour of {:?} search", source);
        }

        let ticket = self.begin_search(query);
        let records = self.records();
        let results = SearchService::search(&records, query, self.inner.config.result_cap);

        if self.complete_search(&ticket, results.clone(), source) {
            Some(results)
        } else {
            None
        }
    }

    /// Start a search: stamps it as the latest and marks the engine busy
    pub fn begin_search(&self, query: &str) -> SearchTicket {
        let mut holder = self.inner.holder.lock();
        holder.latest += 1;

        let mut state = std::mem::take(&mut holder.state);
        state = reduce(state, SearchAction::SetQuery(query.to_string()), self.inner.limits);
        if !query.trim().is_empty() {
            state = reduce(state, SearchAction::SetSearching(true), self.inner.limits);
        }
        holder.state = state;

        SearchTicket {
            sequence: holder.latest,
            query: query.to_string(),
            started: Instant::now(),
        }
    }

    /// Apply results for `ticket` unless a newer search has started.
    ///
    /// Applied non-blank searches are recorded in the history, the
    /// suggestion engine and the recent query list.
    pub fn complete_search(
        &self,
        ticket: &SearchTicket,
        results: SearchResults,
        source: SearchSource,
    ) -> bool {
        let result_count = results.total_results;
        let filter_fields: Vec<String> = {
            let mut holder = self.inner.holder.lock();
            if holder.latest != ticket.sequence {
                debug!(
                    "Discarding stale results for '{}' (ticket {}, latest {})",
                    ticket.query, ticket.sequence, holder.latest
                );
                return false;
            }

            let state = std::mem::take(&mut holder.state);
            holder.state = reduce(state, SearchAction::SetResults(results), self.inner.limits);
            holder.state.active_filters.iter().map(|f| f.field.clone()).collect()
        };

        let query = ticket.query.trim();
        if query.is_empty() {
            return true;
        }

        let execution_time = ticket.started.elapsed().as_secs_f64() * 1000.0;
        self.inner
            .history
            .record(query, result_count, execution_time, &filter_fields, source);
        self.inner.suggestions.record(query);

        if self.dispatch_tracked(SearchAction::AddToHistory(ticket.query.clone())) {
            self.persist_preferences();
        }

        true
    }

    /// Clear query, results and filters, keeping history and saved filters.
    /// Any search in flight is dropped.
    pub fn reset_search(&self) {
        self.inner.search_debouncer.cancel();
        let mut holder = self.inner.holder.lock();
        holder.latest += 1;
        let state = std::mem::take(&mut holder.state);
        holder.state = reduce(state, SearchAction::ResetSearch, self.inner.limits);
    }

    // ========================================================================
    // Filters
    // ========================================================================

    /// Add a condition, replacing any on the same field
    pub fn add_filter(&self, condition: FilterCondition) {
        debug!("add_filter - field={} operator={:?}", condition.field, condition.operator);
        self.dispatch(SearchAction::AddFilter(condition));
        self.refresh_filtered_view();
    }

    pub fn remove_filter(&self, field: &str) {
        self.dispatch(SearchAction::RemoveFilter(field.to_string()));
        self.refresh_filtered_view();
    }

    /// Replace the active condition on `field`; no-op if none is active
    pub fn update_filter(&self, field: &str, condition: FilterCondition) {
        self.dispatch(SearchAction::UpdateFilter {
            field: field.to_string(),
            condition,
        });
        self.refresh_filtered_view();
    }

    pub fn clear_all_filters(&self) {
        self.dispatch(SearchAction::ClearAllFilters);
    }

    /// Save the active conditions under `name`. No-op without active filters.
    pub fn save_filter_set(&self, name: &str) -> Option<SavedFilterSet> {
        let conditions = self.inner.holder.lock().state.active_filters.clone();
        if conditions.is_empty() {
            return None;
        }

        let now = Utc::now();
        let filter = SavedFilterSet {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            conditions,
            created_at: now,
            last_used: now,
            use_count: 0,
        };

        info!("Saving filter set '{}' ({} conditions)", filter.name, filter.conditions.len());
        self.dispatch(SearchAction::SaveFilter(filter.clone()));
        self.persist_preferences();
        Some(filter)
    }

    /// Make a saved set the active conditions. Returns false for an unknown id.
    pub fn load_filter_set(&self, id: &str) -> bool {
        self.try_load_filter_set(id).is_ok()
    }

    pub fn try_load_filter_set(&self, id: &str) -> Result<()> {
        if !self.has_saved_filter(id) {
            return Err(AppError::NotFound(format!("Saved filter {}", id)));
        }

        self.dispatch(SearchAction::LoadSavedFilter {
            id: id.to_string(),
            now: Utc::now(),
        });
        self.refresh_filtered_view();
        self.persist_preferences();
        Ok(())
    }

    /// Returns false for an unknown id
    pub fn delete_filter_set(&self, id: &str) -> bool {
        self.try_delete_filter_set(id).is_ok()
    }

    pub fn try_delete_filter_set(&self, id: &str) -> Result<()> {
        if !self.has_saved_filter(id) {
            return Err(AppError::NotFound(format!("Saved filter {}", id)));
        }

        self.dispatch(SearchAction::DeleteSavedFilter(id.to_string()));
        self.persist_preferences();
        Ok(())
    }

    // ========================================================================
    // Suggestions, history, statistics
    // ========================================================================

    pub fn generate_suggestions(&self, query: &str, options: &SuggestionOptions) -> Vec<Suggestion> {
        let records = self.records();
        self.inner.suggestions.generate(query, &records, options)
    }

    pub fn statistics(&self) -> Statistics {
        self.inner.history.statistics()
    }

    pub fn suggestion_statistics(&self) -> SuggestionStatistics {
        self.inner.suggestions.statistics()
    }

    pub fn export_history(&self) -> Result<String> {
        self.inner.history.export_all()
    }

    pub fn import_history(&self, serialized: &str) -> ImportResult {
        self.inner.history.import_all(serialized)
    }

    /// Forget the search history, suggestion data and recent query list
    pub fn clear_history(&self) {
        self.inner.history.clear();
        self.inner.suggestions.clear();
        self.dispatch(SearchAction::ClearHistory);
        self.persist_preferences();
    }

    pub fn clear_older_than(&self, days: i64) -> usize {
        self.inner.history.clear_older_than(days)
    }

    // ========================================================================
    // State accessors
    // ========================================================================

    /// Snapshot of the full state
    pub fn state(&self) -> SearchState {
        self.inner.holder.lock().state.clone()
    }

    pub fn query(&self) -> String {
        self.inner.holder.lock().state.query.clone()
    }

    pub fn results(&self) -> SearchResults {
        self.inner.holder.lock().state.results.clone()
    }

    pub fn filtered_view(&self) -> FilteredView {
        self.inner.holder.lock().state.filtered.clone()
    }

    pub fn active_filters(&self) -> Vec<FilterCondition> {
        self.inner.holder.lock().state.active_filters.clone()
    }

    pub fn saved_filters(&self) -> Vec<SavedFilterSet> {
        self.inner.holder.lock().state.saved_filters.clone()
    }

    pub fn recent_queries(&self) -> Vec<String> {
        self.inner.holder.lock().state.recent_queries.clone()
    }

    pub fn highlight_term(&self) -> String {
        self.inner.holder.lock().state.highlight_term.clone()
    }

    pub fn set_highlight_term(&self, term: &str) {
        self.dispatch(SearchAction::SetHighlightTerm(term.to_string()));
    }

    pub fn is_searching(&self) -> bool {
        self.inner.holder.lock().state.is_searching
    }

    pub fn has_active_filters(&self) -> bool {
        self.inner.holder.lock().state.has_active_filters()
    }

    pub fn has_search_results(&self) -> bool {
        self.inner.holder.lock().state.has_search_results()
    }

    pub fn is_filtering(&self) -> bool {
        self.inner.holder.lock().state.is_filtering()
    }

    /// Write pending history and preferences now
    pub fn flush(&self) {
        self.inner.search_debouncer.cancel();
        self.inner.history.flush();
        self.persist_preferences();
    }

    // ========================================================================
    // Private Helper Methods
    // ========================================================================

    fn dispatch(&self, action: SearchAction) {
        let mut holder = self.inner.holder.lock();
        let state = std::mem::take(&mut holder.state);
        holder.state = reduce(state, action, self.inner.limits);
    }

    /// Dispatch and report whether the persisted part of the state changed
    fn dispatch_tracked(&self, action: SearchAction) -> bool {
        let mut holder = self.inner.holder.lock();
        let before = holder.state.recent_queries.clone();
        let state = std::mem::take(&mut holder.state);
        holder.state = reduce(state, action, self.inner.limits);
        holder.state.recent_queries != before
    }

    fn has_saved_filter(&self, id: &str) -> bool {
        self.inner
            .holder
            .lock()
            .state
            .saved_filters
            .iter()
            .any(|f| f.id == id)
    }

    fn refresh_filtered_view(&self) {
        let conditions = self.active_filters();
        let view = if conditions.is_empty() {
            FilteredView::default()
        } else {
            let records = self.records();
            FilterService::apply(&records, &conditions)
        };
        self.dispatch(SearchAction::SetFilteredView(view));
    }

    fn persist_preferences(&self) {
        let preferences = {
            let holder = self.inner.holder.lock();
            Preferences {
                search_history: holder.state.recent_queries.clone(),
                saved_filters: holder.state.saved_filters.clone(),
            }
        };

        let result = serde_json::to_string(&preferences)
            .map_err(AppError::from)
            .and_then(|json| self.inner.store.save(PREFERENCES_KEY, &json));

        if let Err(e) = result {
            warn!("Failed to save search preferences: {}", e);
        }
    }

    fn load_preferences(store: &dyn KeyValueStore) -> Preferences {
        let loaded = store.load(PREFERENCES_KEY).and_then(|raw| match raw {
            Some(raw) => Ok(serde_json::from_str::<Preferences>(&raw)?),
            None => Ok(Preferences::default()),
        });

        loaded.unwrap_or_else(|e| {
            warn!("Failed to load search preferences: {}", e);
            Preferences::default()
        })
    }
}
