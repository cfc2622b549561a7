//! Sled backend: atomic batch writes, locked re-check and persistence across reopen

use crate::integration::test_utils::{date, seed_step, test_now};
use quizgen::error::StorageError;
use quizgen::store::{AtomicPersister, QuizRepository, SeedData, SledQuizStore};
use quizgen::types::{FinishedBatch, GenerationKey, PersistOutcome, ShuffledOption, StemItem};
use tempfile::TempDir;

fn batch(group_id: i64, step: i32, quizzes: usize) -> FinishedBatch {
    let stems: Vec<StemItem> = (1..=quizzes)
        .map(|i| StemItem {
            id: format!("q{}", i),
            stem: format!("Stem {}", i),
            answer: format!("A{}", i),
        })
        .collect();
    let options = stems
        .iter()
        .map(|s| ShuffledOption {
            id: s.id.clone(),
            choices: [
                "x".to_string(),
                s.answer.clone(),
                "y".to_string(),
                "z".to_string(),
            ],
            answer_index: 1,
        })
        .collect();
    FinishedBatch {
        key: GenerationKey::new(group_id, step, date(2024, 3, 10)),
        created_at: test_now(),
        stems,
        options,
    }
}

#[tokio::test]
async fn test_write_then_skip_same_day() {
    let store = SledQuizStore::temporary().unwrap();
    seed_step(&store, 7, 3, 0);

    let written = store.persist_atomic(&batch(7, 3, 20)).await.unwrap();
    assert_eq!(written, PersistOutcome::Written(20));
    assert!(store.batch_exists(7, 3, date(2024, 3, 10)).await.unwrap());
    assert!(!store.batch_exists(7, 3, date(2024, 3, 11)).await.unwrap());

    let skipped = store.persist_atomic(&batch(7, 3, 20)).await.unwrap();
    assert_eq!(skipped, PersistOutcome::Skipped);

    let quizzes = store.list_quizzes(7, 3).await.unwrap();
    assert_eq!(quizzes.len(), 20);
    for q in &quizzes {
        let answer = q.answer().unwrap();
        assert_eq!(answer.option_number, 2);
        assert_eq!(answer.content, q.quiz.stem.replace("Stem ", "A"));
    }
}

#[tokio::test]
async fn test_invalid_batch_writes_nothing() {
    let store = SledQuizStore::temporary().unwrap();
    seed_step(&store, 7, 3, 0);

    let mut bad = batch(7, 3, 20);
    bad.options.pop();
    let err = store.persist_atomic(&bad).await.unwrap_err();
    assert!(matches!(err, StorageError::InvalidBatch(_)));

    assert!(store.list_quizzes(7, 3).await.unwrap().is_empty());
    assert!(!store.batch_exists(7, 3, date(2024, 3, 10)).await.unwrap());
}

#[tokio::test]
async fn test_unknown_step_aborts_transaction() {
    let store = SledQuizStore::temporary().unwrap();
    seed_step(&store, 7, 3, 0);

    let err = store.persist_atomic(&batch(7, 9, 20)).await.unwrap_err();
    assert!(matches!(err, StorageError::RecordNotFound(_)));
    assert!(store.list_quizzes(7, 9).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_import_and_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("store");

    {
        let store = SledQuizStore::open(&path).unwrap();
        let seed: SeedData = serde_json::from_str(
            r#"{
                "groups": [{"id": 1, "name": "Algorithms"}],
                "steps": [{"group_id": 1, "step": 2, "start_date": "2024-03-01", "end_date": "2024-03-07"}],
                "notes": [
                    {"id": 10, "group_id": 1, "step": 2, "title": "Heaps", "content": "sift down",
                     "created_at": "2024-03-03T08:00:00Z"}
                ]
            }"#,
        )
        .unwrap();
        store.import(&seed).unwrap();
        store.persist_atomic(&batch(1, 2, 20)).await.unwrap();
        store.flush().unwrap();
    }

    let reopened = SledQuizStore::open(&path).unwrap();
    assert_eq!(
        reopened.find_group(1).await.unwrap().unwrap().name,
        "Algorithms"
    );
    assert_eq!(reopened.notes_for(1, 2).await.unwrap().len(), 1);
    assert_eq!(reopened.list_quizzes(1, 2).await.unwrap().len(), 20);
    assert!(reopened.due_steps(date(2024, 3, 10)).await.unwrap().is_empty());
}
