//! Search state machine
//!
//! `reduce` is a pure `(state, action) -> state` transition. The orchestrator
//! owns the only mutable copy and swaps it on every dispatch.

use crate::config::SearchConfig;
use crate::services::{FilteredView, SearchResults};
use crate::types::{FilterCondition, SavedFilterSet};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// List bounds applied by the reducer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub max_recent_queries: usize,
    pub max_saved_filters: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self::from(&SearchConfig::default())
    }
}

impl From<&SearchConfig> for Limits {
    fn from(config: &SearchConfig) -> Self {
        Self {
            max_recent_queries: config.max_recent_queries,
            max_saved_filters: config.max_saved_filters,
        }
    }
}

/// Everything the host renders
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchState {
    pub query: String,
    pub results: SearchResults,
    pub is_searching: bool,
    pub active_filters: Vec<FilterCondition>,
    pub filtered: FilteredView,
    /// Newest first
    pub recent_queries: Vec<String>,
    /// Newest first
    pub saved_filters: Vec<SavedFilterSet>,
    pub highlight_term: String,
}

impl SearchState {
    pub fn has_active_filters(&self) -> bool {
        !self.active_filters.is_empty()
    }

    pub fn has_search_results(&self) -> bool {
        self.results.total_results > 0
    }

    /// A query is typed or at least one filter is active
    pub fn is_filtering(&self) -> bool {
        self.has_active_filters() || !self.query.is_empty()
    }
}

#[derive(Debug, Clone)]
pub enum SearchAction {
    /// Update the live query and the highlight term
    SetQuery(String),
    SetSearching(bool),
    /// Replace the result set and clear the searching flag
    SetResults(SearchResults),
    /// Add a condition, replacing any existing one on the same field
    AddFilter(FilterCondition),
    RemoveFilter(String),
    UpdateFilter {
        field: String,
        condition: FilterCondition,
    },
    ClearAllFilters,
    SetFilteredView(FilteredView),
    AddToHistory(String),
    ClearHistory,
    SaveFilter(SavedFilterSet),
    DeleteSavedFilter(String),
    LoadSavedFilter {
        id: String,
        now: DateTime<Utc>,
    },
    /// Install persisted preferences as-is
    RestorePreferences {
        recent_queries: Vec<String>,
        saved_filters: Vec<SavedFilterSet>,
    },
    SetHighlightTerm(String),
    /// Back to initial state, keeping recent queries and saved filters
    ResetSearch,
}

/// Apply one action
pub fn reduce(mut state: SearchState, action: SearchAction, limits: Limits) -> SearchState {
    match action {
        SearchAction::SetQuery(query) => {
            state.highlight_term = query.clone();
            state.query = query;
        }
        SearchAction::SetSearching(searching) => state.is_searching = searching,
        SearchAction::SetResults(results) => {
            state.results = results;
            state.is_searching = false;
        }
        SearchAction::AddFilter(condition) => {
            match state.active_filters.iter_mut().find(|f| f.field == condition.field) {
                Some(existing) => *existing = condition,
                None => state.active_filters.push(condition),
            }
        }
        SearchAction::RemoveFilter(field) => state.active_filters.retain(|f| f.field != field),
        SearchAction::UpdateFilter { field, condition } => {
            if let Some(existing) = state.active_filters.iter_mut().find(|f| f.field == field) {
                *existing = condition;
            }
        }
        SearchAction::ClearAllFilters => {
            state.active_filters.clear();
            state.filtered = FilteredView::default();
            state.highlight_term.clear();
        }
        SearchAction::SetFilteredView(view) => state.filtered = view,
        SearchAction::AddToHistory(query) => {
            if !query.trim().is_empty() && !state.recent_queries.contains(&query) {
                state.recent_queries.insert(0, query);
                state.recent_queries.truncate(limits.max_recent_queries);
            }
        }
        SearchAction::ClearHistory => state.recent_queries.clear(),
        SearchAction::SaveFilter(filter) => {
            state.saved_filters.insert(0, filter);
            state.saved_filters.truncate(limits.max_saved_filters);
        }
        SearchAction::DeleteSavedFilter(id) => state.saved_filters.retain(|f| f.id != id),
        SearchAction::LoadSavedFilter { id, now } => {
            if let Some(filter) = state.saved_filters.iter_mut().find(|f| f.id == id) {
                filter.last_used = now;
                filter.use_count += 1;
                state.active_filters = filter.conditions.clone();
            }
        }
        SearchAction::RestorePreferences {
            recent_queries,
            saved_filters,
        } => {
            state.recent_queries = recent_queries;
            state.saved_filters = saved_filters;
        }
        SearchAction::SetHighlightTerm(term) => state.highlight_term = term,
        SearchAction::ResetSearch => {
            state = SearchState {
                recent_queries: std::mem::take(&mut state.recent_queries),
                saved_filters: std::mem::take(&mut state.saved_filters),
                ..SearchState::default()
            };
        }
    }

    state
}
