//! Services Layer
//!
//! Search, filter, history and suggestion logic. Services are plain structs
//! with no knowledge of how the caller schedules work; the orchestrator
//! composes them.
//!
//! # Architecture
//!
//! ```text
//! Host UI --> SearchOrchestrator ──┬──> SearchService ──────┐
//!                                  ├──> FilterService ──────┤
//!                                  ├──> HistoryStore ───────┼──> KeyValueStore
//!                                  └──> SuggestionEngine ───┘
//! ```
//!
//! # Services
//!
//! - `SearchService` - Capped free-text search over both collections
//! - `FilterService` - Typed filter condition evaluation
//! - `HistoryStore` - Bounded search history, patterns, popularity
//! - `SuggestionEngine` - Ranked autocomplete
//! - `similarity` - Edit-distance string similarity

pub mod filter_service;
pub mod history_service;
pub mod search_service;
pub mod similarity;
pub mod suggestion_service;

// Re-export commonly used types and services
pub use filter_service::{FilterService, FilteredView};
pub use history_service::{
    HistoryEntry, HistoryQuery, HistoryStore, ImportResult, QueryCategory, SearchPattern,
    SearchSource, Statistics,
};
pub use search_service::{SearchResults, SearchService};
pub use suggestion_service::{
    Suggestion, SuggestionCategory, SuggestionEngine, SuggestionOptions, SuggestionStatistics,
    SuggestionType,
};
