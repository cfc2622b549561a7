//! Quiz Store
//!
//! Collaborator interfaces for reading study records and writing finished batches, plus the
//! sled and PostgreSQL backends implementing them.

pub mod batch;
pub mod persistence;
pub mod postgres;

pub use persistence::SledQuizStore;
pub use postgres::PgQuizStore;

use crate::config::{StorageBackend, StorageConfig};
use crate::error::StorageError;
use crate::types::{
    FinishedBatch, GroupId, Note, PersistOutcome, QuizWithOptions, StepNumber, StudyGroup,
    StudyStep,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// Read side used by the coordinator, the scanner and the CLI
#[async_trait]
pub trait QuizRepository: Send + Sync {
    async fn find_group(&self, group_id: GroupId) -> Result<Option<StudyGroup>, StorageError>;

    async fn find_step(
        &self,
        group_id: GroupId,
        step: StepNumber,
    ) -> Result<Option<StudyStep>, StorageError>;

    async fn notes_for(&self, group_id: GroupId, step: StepNumber) -> Result<Vec<Note>, StorageError>;

    /// Whether a batch was already written for `(group_id, step)` on `day`
    async fn batch_exists(
        &self,
        group_id: GroupId,
        step: StepNumber,
        day: NaiveDate,
    ) -> Result<bool, StorageError>;

    /// Steps that ended strictly before `today` and have no quiz at all
    async fn due_steps(&self, today: NaiveDate) -> Result<Vec<StudyStep>, StorageError>;

    async fn list_quizzes(
        &self,
        group_id: GroupId,
        step: StepNumber,
    ) -> Result<Vec<QuizWithOptions>, StorageError>;
}

/// Writes one batch in its own isolated unit of work.
///
/// Implementations lock the step record, re-check the day's batch under that lock and
/// either write every row or none.
#[async_trait]
pub trait AtomicPersister: Send + Sync {
    async fn persist_atomic(&self, batch: &FinishedBatch) -> Result<PersistOutcome, StorageError>;
}

/// Collaborator records loaded by `quizgen import`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SeedData {
    #[serde(default)]
    pub groups: Vec<StudyGroup>,
    #[serde(default)]
    pub steps: Vec<StudyStep>,
    #[serde(default)]
    pub notes: Vec<Note>,
}

/// An opened backend, exposed through both collaborator traits
pub struct StoreHandle {
    pub repository: Arc<dyn QuizRepository>,
    pub persister: Arc<dyn AtomicPersister>,
    /// Present for the sled backend, which also accepts seed imports
    pub sled: Option<Arc<SledQuizStore>>,
}

impl StoreHandle {
    pub fn from_sled(store: SledQuizStore) -> Self {
        let store = Arc::new(store);
        Self {
            repository: store.clone(),
            persister: store.clone(),
            sled: Some(store),
        }
    }

    pub fn from_postgres(store: PgQuizStore) -> Self {
        let store = Arc::new(store);
        Self {
            repository: store.clone(),
            persister: store,
            sled: None,
        }
    }
}

/// Open the configured backend. Relative sled paths resolve against `workspace_root`.
pub async fn open_store(
    config: &StorageConfig,
    workspace_root: &Path,
) -> Result<StoreHandle, StorageError> {
    match config.backend {
        StorageBackend::Sled => {
            let path = if config.sled_path.is_absolute() {
                config.sled_path.clone()
            } else {
                workspace_root.join(&config.sled_path)
            };
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            Ok(StoreHandle::from_sled(SledQuizStore::open(&path)?))
        }
        StorageBackend::Postgres => {
            let url = config.database_url.as_deref().ok_or_else(|| {
                StorageError::Backend("storage.database_url is required for postgres".to_string())
            })?;
            Ok(StoreHandle::from_postgres(
                PgQuizStore::connect(url, config.max_connections).await?,
            ))
        }
    }
}
