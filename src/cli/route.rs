//! CLI route: run context and command dispatch.

use crate::cli::parse::Commands;
use crate::cli::presentation::{format_outcome, format_quizzes, format_scan_report};
use crate::concurrency::ShutdownSignal;
use crate::config::{ConfigLoader, QuizgenConfig};
use crate::error::{GenerationError, StorageError};
use crate::generation::{
    CoordinatorSettings, GenerationCoordinator, LlmOptionGenerator, LlmStemGenerator,
};
use crate::rate_limit::TokenBucketLimiter;
use crate::scanner::ScanDriver;
use crate::store::{open_store, SeedData, StoreHandle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Load and validate configuration for a workspace or an explicit file
pub fn load_config(
    workspace_root: &Path,
    config_path: Option<&Path>,
) -> Result<QuizgenConfig, GenerationError> {
    let config = match config_path {
        Some(path) => ConfigLoader::load_from_file(path)?,
        None => ConfigLoader::load(workspace_root)?,
    };

    config.validate().map_err(|errors| {
        let error_msgs: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        GenerationError::ConfigError(error_msgs.join("\n"))
    })?;
    Ok(config)
}

/// Runtime context for CLI execution: configuration, opened store and coordinator.
pub struct RunContext {
    workspace_root: PathBuf,
    store: StoreHandle,
    coordinator: Arc<GenerationCoordinator>,
}

impl RunContext {
    pub async fn new(
        workspace_root: PathBuf,
        config_path: Option<PathBuf>,
        shutdown: ShutdownSignal,
    ) -> Result<Self, GenerationError> {
        let config = load_config(&workspace_root, config_path.as_deref())?;
        let store = open_store(&config.storage, &workspace_root).await?;

        let stem_client = Arc::new(config.providers.stem.build_client()?);
        let option_client = Arc::new(config.providers.options.build_client()?);

        let coordinator = GenerationCoordinator::new(
            store.repository.clone(),
            store.persister.clone(),
            Arc::new(LlmStemGenerator::new(
                stem_client,
                config.providers.stem.completion_options(),
            )),
            Arc::new(LlmOptionGenerator::new(
                option_client,
                config.providers.options.completion_options(),
            )),
            CoordinatorSettings::from_config(&config.generation),
        )
        .with_rate_limiter(Arc::new(TokenBucketLimiter::per_minute(
            config.rate_limit.tokens_per_minute,
        )))
        .with_shutdown(shutdown);

        info!(
            workspace = %workspace_root.display(),
            backend = ?config.storage.backend,
            "Run context initialized"
        );

        Ok(Self {
            workspace_root,
            store,
            coordinator: Arc::new(coordinator),
        })
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    pub async fn execute(&self, command: &Commands) -> Result<String, GenerationError> {
        match command {
            Commands::Scan { format } => {
                let report = ScanDriver::new(self.coordinator.clone()).run_once().await?;
                format_scan_report(&report, format)
            }
            Commands::Generate { group, step } => {
                let outcome = self
                    .coordinator
                    .generate_for_group_and_prev_step(*group, *step)
                    .await?;
                Ok(format_outcome(*group, *step, &outcome))
            }
            Commands::Import { file } => self.handle_import(file),
            Commands::Show {
                group,
                step,
                format,
            } => {
                let quizzes = self.store.repository.list_quizzes(*group, *step).await?;
                format_quizzes(&quizzes, format)
            }
        }
    }

    fn handle_import(&self, file: &Path) -> Result<String, GenerationError> {
        let sled = self.store.sled.as_ref().ok_or_else(|| {
            StorageError::Unsupported("import requires the sled backend".to_string())
        })?;

        let path = if file.is_absolute() {
            file.to_path_buf()
        } else {
            self.workspace_root.join(file)
        };
        let raw = std::fs::read_to_string(&path).map_err(StorageError::from)?;
        let seed: SeedData = serde_json::from_str(&raw).map_err(|e| {
            StorageError::Codec(format!("Invalid seed file {}: {}", path.display(), e))
        })?;

        sled.import(&seed)?;
        Ok(format!(
            "Imported {} groups, {} steps, {} notes",
            seed.groups.len(),
            seed.steps.len(),
            seed.notes.len()
        ))
    }
}
