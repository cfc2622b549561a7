//! Environment source: QUIZGEN__SECTION__KEY, e.g. QUIZGEN__RATE_LIMIT__TOKENS_PER_MINUTE.

use config::builder::DefaultState;
use config::ConfigBuilder;
use config::Environment;

pub fn add_to_builder(builder: ConfigBuilder<DefaultState>) -> ConfigBuilder<DefaultState> {
    builder.add_source(
        Environment::with_prefix("QUIZGEN")
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true),
    )
}
