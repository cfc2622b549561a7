//! Scan passes over due steps

use crate::integration::test_utils::{
    date, fast_settings, seed_step, test_now, FakeOptions, FakeStems, Harness,
};
use quizgen::clock::FixedClock;
use quizgen::concurrency::shutdown_channel;
use quizgen::generation::GenerationCoordinator;
use quizgen::scanner::ScanDriver;
use quizgen::store::SledQuizStore;
use quizgen::types::{GenerationOutcome, StudyStep};
use std::sync::Arc;

fn seeded_store() -> SledQuizStore {
    let store = SledQuizStore::temporary().unwrap();
    seed_step(&store, 1, 1, 2);
    seed_step(&store, 2, 1, 0);
    seed_step(&store, 3, 1, 1);
    // Ends today: not due yet
    store
        .put_step(&StudyStep {
            group_id: 3,
            step: 1,
            start_date: date(2024, 3, 4),
            end_date: date(2024, 3, 10),
        })
        .unwrap();
    store
}

#[tokio::test]
async fn test_scan_processes_each_due_step() {
    let harness = Harness::new(seeded_store(), FakeStems::new(), FakeOptions::new());
    let driver = ScanDriver::new(harness.coordinator.clone());

    let report = driver.run_once().await.unwrap();
    assert_eq!(report.candidates, 2);
    assert!(!report.interrupted);
    assert_eq!(report.persisted(), 1);

    let outcome_for = |group| {
        report
            .entries
            .iter()
            .find(|e| e.group_id == group)
            .map(|e| e.outcome.clone())
    };
    assert_eq!(outcome_for(1), Some(GenerationOutcome::Persisted { quizzes: 20 }));
    assert_eq!(outcome_for(2), Some(GenerationOutcome::NoNotes));
    assert_eq!(outcome_for(3), None);

    // Step 1 of group 1 now has quizzes and drops out of the due set
    let again = driver.run_once().await.unwrap();
    assert_eq!(again.candidates, 1);
    assert_eq!(again.entries[0].group_id, 2);
    assert_eq!(harness.stems.calls(), 1);
}

#[tokio::test]
async fn test_scan_continues_past_failures() {
    let harness = Harness::new(
        seeded_store(),
        FakeStems::new().with_mutation(|_, p| p.items.clear()),
        FakeOptions::new(),
    );
    let report = ScanDriver::new(harness.coordinator.clone())
        .run_once()
        .await
        .unwrap();

    assert_eq!(report.entries.len(), 2);
    assert_eq!(report.failed(), 1);
    assert_eq!(report.persisted(), 0);
}

#[tokio::test]
async fn test_triggered_shutdown_stops_scan() {
    let store = Arc::new(seeded_store());
    let (trigger, shutdown) = shutdown_channel();
    let stems = Arc::new(FakeStems::new());
    let coordinator = GenerationCoordinator::new(
        store.clone(),
        store.clone(),
        stems.clone(),
        Arc::new(FakeOptions::new()),
        fast_settings(),
    )
    .with_clock(Arc::new(FixedClock::new(test_now())))
    .with_shutdown(shutdown);

    trigger.trigger();
    let report = ScanDriver::new(Arc::new(coordinator))
        .run_once()
        .await
        .unwrap();

    assert!(report.interrupted);
    assert!(report.entries.is_empty());
    assert_eq!(report.candidates, 2);
    assert_eq!(stems.calls(), 0);
}
