//! Merge rules: defaults, override order, conflict handling.

use config::Config;
use config::ConfigBuilder;
use config::ConfigError;

/// Create a Config builder with merge policy defaults applied.
pub fn builder_with_defaults() -> Result<ConfigBuilder<config::builder::DefaultState>, ConfigError>
{
    Config::builder()
        .set_default("generation.call_concurrency", 4)?
        .set_default("rate_limit.tokens_per_minute", 90_000)?
        .set_default("storage.backend", "sled")?
        .set_default("storage.sled_path", ".quizgen/store")?
        .set_default("providers.stem.model", "gpt-4o-mini")?
        .set_default("providers.options.model", "gpt-4o-mini")
}
