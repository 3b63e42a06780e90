//! Structured logging initialization via `tracing`.

use tracing_subscriber::EnvFilter;

/// Filter from `RUST_LOG` when set, else from `default_level` (a level
/// name or full filter directive).
fn filter_for(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Initialize the tracing subscriber.
pub fn init_tracing(default_level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(filter_for(default_level))
        .init();
}
