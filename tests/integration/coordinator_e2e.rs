//! End-to-end batch generation over the sled store

use crate::integration::test_utils::{seed_step, test_now, FakeOptions, FakeStems, Harness};
use chrono::Duration;
use quizgen::store::{QuizRepository, SledQuizStore};
use quizgen::types::GenerationOutcome;

#[tokio::test]
async fn test_generates_and_persists_full_batch() {
    let store = SledQuizStore::temporary().unwrap();
    seed_step(&store, 7, 3, 2);
    let harness = Harness::new(store, FakeStems::new(), FakeOptions::new());

    let outcome = harness
        .coordinator
        .generate_for_group_and_prev_step(7, 3)
        .await
        .unwrap();
    assert_eq!(outcome, GenerationOutcome::Persisted { quizzes: 20 });

    let quizzes = harness.store.list_quizzes(7, 3).await.unwrap();
    assert_eq!(quizzes.len(), 20);
    let option_rows: usize = quizzes.iter().map(|q| q.options.len()).sum();
    assert_eq!(option_rows, 80);

    for q in &quizzes {
        assert_eq!(q.quiz.group_id, 7);
        assert_eq!(q.quiz.step, 3);
        assert_eq!(q.quiz.created_at, test_now());

        let numbers: Vec<u8> = q.options.iter().map(|o| o.option_number).collect();
        assert_eq!(numbers, vec![1, 2, 3, 4]);
        assert_eq!(q.options.iter().filter(|o| o.is_answer).count(), 1);

        // "What is item N?" must point at "Answer N"
        let n = q
            .quiz
            .stem
            .trim_start_matches("What is item ")
            .trim_end_matches('?');
        assert_eq!(q.answer().unwrap().content, format!("Answer {}", n));
    }

    assert_eq!(harness.stems.calls(), 1);
    assert_eq!(harness.options.calls(), 1);
    assert_eq!(harness.coordinator.active_locks(), 0);
}

#[tokio::test]
async fn test_merged_notes_reach_stem_stage() {
    let store = SledQuizStore::temporary().unwrap();
    seed_step(&store, 7, 3, 2);
    let harness = Harness::new(store, FakeStems::new(), FakeOptions::new());

    harness
        .coordinator
        .generate_for_group_and_prev_step(7, 3)
        .await
        .unwrap();

    let seen = harness.stems.seen_notes.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert!(seen[0].starts_with("### Note 1: Note 1\n"));
    assert!(seen[0].contains("\n\n---\n\n### Note 2: Note 2\n"));
}

#[tokio::test]
async fn test_second_call_same_day_persists_nothing() {
    let store = SledQuizStore::temporary().unwrap();
    seed_step(&store, 7, 3, 1);
    let harness = Harness::new(store, FakeStems::new(), FakeOptions::new());

    let first = harness
        .coordinator
        .generate_for_group_and_prev_step(7, 3)
        .await
        .unwrap();
    assert!(first.is_persisted());

    let second = harness
        .coordinator
        .generate_for_group_and_prev_step(7, 3)
        .await
        .unwrap();
    assert_eq!(second, GenerationOutcome::AlreadyGenerated);
    assert_eq!(harness.store.list_quizzes(7, 3).await.unwrap().len(), 20);
    assert_eq!(harness.stems.calls(), 1);
}

#[tokio::test]
async fn test_dedup_is_per_calendar_day() {
    let store = SledQuizStore::temporary().unwrap();
    seed_step(&store, 7, 3, 1);
    let harness = Harness::new(store, FakeStems::new(), FakeOptions::new());

    harness
        .coordinator
        .generate_for_group_and_prev_step(7, 3)
        .await
        .unwrap();

    harness.clock.set(test_now() + Duration::days(1));
    let next_day = harness
        .coordinator
        .generate_for_group_and_prev_step(7, 3)
        .await
        .unwrap();
    assert_eq!(next_day, GenerationOutcome::Persisted { quizzes: 20 });
    assert_eq!(harness.store.list_quizzes(7, 3).await.unwrap().len(), 40);
}

#[tokio::test]
async fn test_missing_records_and_empty_notes() {
    let store = SledQuizStore::temporary().unwrap();
    seed_step(&store, 7, 3, 0);
    let harness = Harness::new(store, FakeStems::new(), FakeOptions::new());

    let no_notes = harness
        .coordinator
        .generate_for_group_and_prev_step(7, 3)
        .await
        .unwrap();
    assert_eq!(no_notes, GenerationOutcome::NoNotes);

    let missing_group = harness
        .coordinator
        .generate_for_group_and_prev_step(99, 1)
        .await
        .unwrap();
    assert!(matches!(missing_group, GenerationOutcome::Failed { ref reason } if reason.contains("99")));

    let missing_step = harness
        .coordinator
        .generate_for_group_and_prev_step(7, 4)
        .await
        .unwrap();
    assert!(matches!(missing_step, GenerationOutcome::Failed { .. }));

    assert_eq!(harness.stems.calls(), 0);
}
