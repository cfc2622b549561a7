//! The persister's locked re-check catches a batch the pre-check missed

use crate::integration::test_utils::{seed_step, FakeOptions, FakeStems, Harness};
use async_trait::async_trait;
use chrono::NaiveDate;
use quizgen::error::StorageError;
use quizgen::generation::GenerationCoordinator;
use quizgen::store::{QuizRepository, SledQuizStore};
use quizgen::types::{
    GenerationOutcome, GroupId, Note, QuizWithOptions, StepNumber, StudyGroup, StudyStep,
};
use std::sync::Arc;

/// Delegates to sled but always reports "no batch yet", like a writer in another process
/// racing past the pre-check.
struct BlindRepository(Arc<SledQuizStore>);

#[async_trait]
impl QuizRepository for BlindRepository {
    async fn find_group(&self, group_id: GroupId) -> Result<Option<StudyGroup>, StorageError> {
        self.0.find_group(group_id).await
    }

    async fn find_step(
        &self,
        group_id: GroupId,
        step: StepNumber,
    ) -> Result<Option<StudyStep>, StorageError> {
        self.0.find_step(group_id, step).await
    }

    async fn notes_for(&self, group_id: GroupId, step: StepNumber) -> Result<Vec<Note>, StorageError> {
        self.0.notes_for(group_id, step).await
    }

    async fn batch_exists(
        &self,
        _group_id: GroupId,
        _step: StepNumber,
        _day: NaiveDate,
    ) -> Result<bool, StorageError> {
        Ok(false)
    }

    async fn due_steps(&self, today: NaiveDate) -> Result<Vec<StudyStep>, StorageError> {
        self.0.due_steps(today).await
    }

    async fn list_quizzes(
        &self,
        group_id: GroupId,
        step: StepNumber,
    ) -> Result<Vec<QuizWithOptions>, StorageError> {
        self.0.list_quizzes(group_id, step).await
    }
}

#[tokio::test]
async fn test_competing_writer_is_skipped_at_commit() {
    let store = SledQuizStore::temporary().unwrap();
    seed_step(&store, 7, 3, 1);

    // First process writes today's batch.
    let first = Harness::new(store, FakeStems::new(), FakeOptions::new());
    let outcome = first
        .coordinator
        .generate_for_group_and_prev_step(7, 3)
        .await
        .unwrap();
    assert!(outcome.is_persisted());

    // Second process shares the store but has its own locks and a stale pre-check.
    let second = Harness::with_store(first.store.clone(), FakeStems::new(), FakeOptions::new());
    let racing = GenerationCoordinator::new(
        Arc::new(BlindRepository(second.store.clone())),
        second.store.clone(),
        second.stems.clone(),
        second.options.clone(),
        crate::integration::test_utils::fast_settings(),
    )
    .with_clock(second.clock.clone());

    let outcome = racing.generate_for_group_and_prev_step(7, 3).await.unwrap();
    assert_eq!(outcome, GenerationOutcome::SkippedAtCommit);
    assert_eq!(second.stems.calls(), 1);
    assert_eq!(first.store.list_quizzes(7, 3).await.unwrap().len(), 20);
}
