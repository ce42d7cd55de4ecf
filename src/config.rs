//! Engine configuration

use crate::db::{KeyValueStore, CONFIG_KEY};
use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

/// Tunable bounds and delays for the search engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Maximum records returned by one free-text search
    pub result_cap: usize,
    /// Input inactivity before a typed query is searched
    pub search_debounce_ms: u64,
    /// Quiet period before history mutations are written out
    pub persist_debounce_ms: u64,
    pub max_history: usize,
    pub max_patterns: usize,
    pub max_saved_filters: usize,
    /// Recent query list kept by the orchestrator
    pub max_recent_queries: usize,
    /// Recent list kept by the suggestion engine
    pub max_recent_suggestions: usize,
    pub max_popular_suggestions: usize,
    /// Age after which the suggestion data cache is rebuilt
    pub suggestion_cache_ttl_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            result_cap: 1000,
            search_debounce_ms: 300,
            persist_debounce_ms: 500,
            max_history: 1000,
            max_patterns: 50,
            max_saved_filters: 20,
            max_recent_queries: 10,
            max_recent_suggestions: 10,
            max_popular_suggestions: 20,
            suggestion_cache_ttl_secs: 300,
        }
    }
}

impl SearchConfig {
    /// Load the stored configuration, falling back to defaults when the
    /// value is missing or unreadable
    pub fn load(store: &dyn KeyValueStore) -> Self {
        match store.load(CONFIG_KEY) {
            Ok(Some(raw)) => match serde_json::from_str::<SearchConfig>(&raw) {
                Ok(config) => config,
                Err(e) => {
                    warn!("Discarding unreadable search config: {}", e);
                    Self::default()
                }
            },
            Ok(None) => Self::default(),
            Err(e) => {
                warn!("Failed to load search config: {}", e);
                Self::default()
            }
        }
    }

    /// Persist this configuration after validating it
    pub fn save(&self, store: &dyn KeyValueStore) -> Result<()> {
        self.validate()?;
        store.save(CONFIG_KEY, &serde_json::to_string(self)?)
    }

    /// Reject bounds that would make the engine drop everything
    pub fn validate(&self) -> Result<()> {
        let bounds = [
            ("result_cap", self.result_cap),
            ("max_history", self.max_history),
            ("max_patterns", self.max_patterns),
            ("max_saved_filters", self.max_saved_filters),
        ];

        for (name, value) in bounds {
            if value == 0 {
                return Err(AppError::Config(format!("{} must be greater than zero", name)));
            }
        }

        Ok(())
    }

    pub fn search_debounce(&self) -> Duration {
        Duration::from_millis(self.search_debounce_ms)
    }

    pub fn persist_debounce(&self) -> Duration {
        Duration::from_millis(self.persist_debounce_ms)
    }

    pub fn suggestion_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.suggestion_cache_ttl_secs)
    }
}
