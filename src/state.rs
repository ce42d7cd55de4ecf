//! Engine state management
//!
//! Explicit owner of the storage backend and the search orchestrator.
//! Construct once at startup, call [`EngineState::shutdown`] before exit so
//! debounced writes are not lost.

use crate::config::SearchConfig;
use crate::db::{KeyValueStore, SqliteStore};
use crate::error::Result;
use crate::orchestrator::SearchOrchestrator;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Database file created inside the data directory
pub const DATABASE_FILE: &str = "search.db";

/// Engine state shared with the host
pub struct EngineState {
    /// Durable key-value storage
    pub store: Arc<dyn KeyValueStore>,

    /// Search, filter, history and suggestion coordinator
    pub orchestrator: SearchOrchestrator,

    /// Data directory, `None` for hosts that supply their own store
    pub data_dir: Option<PathBuf>,
}

impl EngineState {
    /// Open (or create) the SQLite store under `data_dir` and restore the
    /// engine from it
    pub fn new(data_dir: impl AsRef<Path>) -> Result<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();

        // Create data directory if it doesn't exist
        std::fs::create_dir_all(&data_dir)?;

        tracing::info!("Data directory: {:?}", data_dir);

        let store: Arc<dyn KeyValueStore> = Arc::new(SqliteStore::new(&data_dir.join(DATABASE_FILE))?);
        let mut state = Self::with_store(store);
        state.data_dir = Some(data_dir);
        Ok(state)
    }

    /// Build the engine over a caller-supplied store
    pub fn with_store(store: Arc<dyn KeyValueStore>) -> Self {
        let config = SearchConfig::load(store.as_ref());
        let orchestrator = SearchOrchestrator::new(store.clone(), config);

        tracing::info!("Search engine initialized");

        Self {
            store,
            orchestrator,
            data_dir: None,
        }
    }

    pub fn config(&self) -> &SearchConfig {
        self.orchestrator.config()
    }

    /// Flush debounced writes
    pub fn shutdown(&self) {
        tracing::info!("Flushing search engine state");
        self.orchestrator.flush();
    }
}
