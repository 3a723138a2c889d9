//! Log subscriber setup

use crate::cache::config::LoggingConfig;
use crate::error::{CacheError, Result};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` overrides the configured level. Calling this more than once in
/// a process returns a [`CacheError::ConfigError`] and leaves the first
/// subscriber in place.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.to_lowercase()));

    let registry = tracing_subscriber::registry().with(env_filter);

    let result = if config.json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer()).try_init()
    };

    result.map_err(|e| CacheError::ConfigError(format!("failed to install log subscriber: {}", e)))
}
