//! Portfolio Search - search, filter and suggestion engine
//!
//! Free-text search over imported account balances and positions, typed
//! filter conditions, a persisted search history with popularity scoring,
//! and ranked autocomplete.

pub mod config;
pub mod db;
pub mod error;
pub mod orchestrator;
pub mod scheduler;
pub mod services;
pub mod state;
pub mod types;

pub use config::SearchConfig;
pub use error::{AppError, Result};
pub use orchestrator::SearchOrchestrator;
pub use state::EngineState;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` overrides the default filter. Safe to call more than once.
pub fn init_tracing() {
    let installed = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "portfolio_search=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .is_ok();

    if installed {
        tracing::info!("Starting Portfolio Search...");
    }
}
