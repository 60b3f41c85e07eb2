//! Log subscriber setup.

use tracing_subscriber::EnvFilter;

use crate::error::{AgentsError, Result};

/// Installs a fmt subscriber filtered by `RUST_LOG`, defaulting to `info`
/// (or `debug` when `debug_mode`). Fails if a global subscriber is already
/// set.
pub fn init_tracing(debug_mode: bool) -> Result<()> {
    let fallback = if debug_mode { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .map_err(|e| AgentsError::ConfigError {
            message: format!("failed to install tracing subscriber: {}", e),
        })
}
