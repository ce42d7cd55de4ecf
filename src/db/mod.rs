//! Durable key-value persistence
//!
//! The engine only needs `load(key)` / `save(key, value)`. SQLite backs the
//! store in a running application; `MemoryStore` is used for tests and for
//! hosts that handle durability themselves.

pub mod sqlite;

use crate::error::Result;
use parking_lot::RwLock;
use std::collections::HashMap;

pub use sqlite::SqliteStore;

/// Key under which the search history log is stored
pub const HISTORY_KEY: &str = "search_history";
/// Key under which the search pattern table is stored
pub const PATTERNS_KEY: &str = "search_patterns";
/// Key under which the suggestion engine's recent/popular lists are stored
pub const SUGGESTIONS_KEY: &str = "suggestion_engine";
/// Key under which recent queries and saved filter sets are stored
pub const PREFERENCES_KEY: &str = "search_preferences";
/// Key under which the engine configuration is stored
pub const CONFIG_KEY: &str = "search_config";

/// Durable string storage keyed by name
pub trait KeyValueStore: Send + Sync {
    /// Load a value, `None` if the key was never written
    fn load(&self, key: &str) -> Result<Option<String>>;

    /// Insert or replace a value
    fn save(&self, key: &str, value: &str) -> Result<()>;

    /// Delete a value if present
    fn remove(&self, key: &str) -> Result<()>;
}

/// In-process store with no durability
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn load(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.read().get(key).cloned())
    }

    fn save(&self, key: &str, value: &str) -> Result<()> {
        self.values.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.values.write().remove(key);
        Ok(())
    }
}
