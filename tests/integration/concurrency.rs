//! Call-gate bound and per-key serialization under concurrent callers

use crate::integration::test_utils::{seed_step, FakeOptions, FakeStems, Harness, InFlight};
use futures::future::join_all;
use quizgen::store::{QuizRepository, SledQuizStore};
use quizgen::types::GenerationOutcome;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_in_flight_calls_never_exceed_gate_capacity() {
    let store = SledQuizStore::temporary().unwrap();
    for group in 1..=10 {
        seed_step(&store, group, 1, 1);
    }

    let in_flight = Arc::new(InFlight::default());
    let harness = Harness::new(
        store,
        FakeStems::new()
            .with_delay(Duration::from_millis(30))
            .with_in_flight(in_flight.clone()),
        FakeOptions::new()
            .with_delay(Duration::from_millis(30))
            .with_in_flight(in_flight.clone()),
    );

    let calls = (1..=10).map(|group| {
        let coordinator = harness.coordinator.clone();
        tokio::spawn(async move { coordinator.generate_for_group_and_prev_step(group, 1).await })
    });
    let outcomes: Vec<GenerationOutcome> = join_all(calls)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();

    assert!(outcomes.iter().all(GenerationOutcome::is_persisted));
    assert!(in_flight.max() <= 4, "max in flight was {}", in_flight.max());
    assert!(in_flight.max() >= 2, "calls for distinct keys should overlap");
    assert_eq!(harness.stems.calls(), 10);
    assert_eq!(harness.options.calls(), 10);
    assert_eq!(harness.coordinator.active_locks(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_same_key_callers_persist_exactly_once() {
    let store = SledQuizStore::temporary().unwrap();
    seed_step(&store, 7, 3, 1);
    let harness = Harness::new(
        store,
        FakeStems::new().with_delay(Duration::from_millis(20)),
        FakeOptions::new(),
    );

    let calls = (0..5).map(|_| {
        let coordinator = harness.coordinator.clone();
        tokio::spawn(async move { coordinator.generate_for_group_and_prev_step(7, 3).await })
    });
    let outcomes: Vec<GenerationOutcome> = join_all(calls)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();

    let persisted = outcomes.iter().filter(|o| o.is_persisted()).count();
    let already = outcomes
        .iter()
        .filter(|o| **o == GenerationOutcome::AlreadyGenerated)
        .count();
    assert_eq!(persisted, 1);
    assert_eq!(already, 4);
    assert_eq!(harness.stems.calls(), 1);
    assert_eq!(harness.store.list_quizzes(7, 3).await.unwrap().len(), 20);
    assert_eq!(harness.coordinator.active_locks(), 0);
}
