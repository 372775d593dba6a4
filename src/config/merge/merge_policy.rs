//! Merge rules: defaults, override order, conflict handling.

use config::Config;
use config::ConfigBuilder;
use config::ConfigError;

/// Create a Config builder with merge policy defaults applied.
pub fn builder_with_defaults() -> Result<ConfigBuilder<config::builder::DefaultState>, ConfigError>
{
    Config::builder()
        .set_default("cache.stale_time_ms", 1000)?
        .set_default("cache.retry_transient", true)?
        .set_default("cache.retry_delay_ms", 500)?
        .set_default("backend.kind", "memory")?
        .set_default("logging.level", "info")
}
