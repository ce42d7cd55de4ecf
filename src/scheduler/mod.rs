//! Scheduler module for the search engine
//!
//! Handles delayed tasks including:
//! - Debounced search execution while the user is typing
//! - Debounced history writes after bursts of mutations

mod debounce;

pub use debounce::Debouncer;
