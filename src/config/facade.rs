//! Configuration loading facade

use super::merge::merge_policy;
use super::sources::{environment, global_file, workspace_file};
use super::QuizgenConfig;
use config::{ConfigError, File};
use std::path::Path;

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration for a workspace.
    ///
    /// Precedence (highest last): defaults, global file, workspace `config/config.toml`,
    /// workspace `config/{QUIZGEN_ENV}.toml`, `QUIZGEN__*` environment variables.
    pub fn load(workspace_root: &Path) -> Result<QuizgenConfig, ConfigError> {
        let builder = merge_policy::builder_with_defaults()?;
        let builder = global_file::add_to_builder(builder)?;
        let builder = workspace_file::add_to_builder(builder, workspace_root)?;
        let builder = environment::add_to_builder(builder);

        builder.build()?.try_deserialize()
    }

    /// Load configuration from one explicit file. Environment variables still apply.
    pub fn load_from_file(path: &Path) -> Result<QuizgenConfig, ConfigError> {
        let builder = merge_policy::builder_with_defaults()?
            .add_source(File::from(path).required(true));
        let builder = environment::add_to_builder(builder);

        builder.build()?.try_deserialize()
    }

    /// Default configuration without touching disk or environment
    pub fn default() -> QuizgenConfig {
        QuizgenConfig::default()
    }

    /// Path of the global configuration file
    pub fn xdg_config_path() -> Option<std::path::PathBuf> {
        global_file::global_config_path()
    }
}
