//! Malformed payloads are rejected, retried under the shared policy and reported as failures

use crate::integration::test_utils::{seed_step, FakeOptions, FakeStems, Harness};
use quizgen::clock::Clock;
use quizgen::store::{QuizRepository, SledQuizStore};
use quizgen::types::{GenerationOutcome, OptionPayload, StemItem, StemPayload};

fn expect_failed(outcome: &GenerationOutcome, needle: &str) {
    match outcome {
        GenerationOutcome::Failed { reason } => {
            assert!(reason.contains(needle), "reason {:?} lacks {:?}", reason, needle)
        }
        other => panic!("expected failure containing {:?}, got {:?}", needle, other),
    }
}

async fn run_with_bad_stems(
    mutate: impl Fn(&mut StemPayload) + Send + Sync + 'static,
    needle: &str,
) {
    let store = SledQuizStore::temporary().unwrap();
    seed_step(&store, 7, 3, 1);
    let harness = Harness::new(
        store,
        FakeStems::new().with_mutation(move |_, payload| mutate(payload)),
        FakeOptions::new(),
    );

    let outcome = harness
        .coordinator
        .generate_for_group_and_prev_step(7, 3)
        .await
        .unwrap();

    expect_failed(&outcome, needle);
    assert_eq!(harness.stems.calls(), 3);
    assert_eq!(harness.options.calls(), 0);
    assert!(harness.store.list_quizzes(7, 3).await.unwrap().is_empty());
}

async fn run_with_bad_options(
    mutate: impl Fn(&mut OptionPayload) + Send + Sync + 'static,
    needle: &str,
) {
    let store = SledQuizStore::temporary().unwrap();
    seed_step(&store, 7, 3, 1);
    let harness = Harness::new(
        store,
        FakeStems::new(),
        FakeOptions::new().with_mutation(move |_, payload| mutate(payload)),
    );

    let outcome = harness
        .coordinator
        .generate_for_group_and_prev_step(7, 3)
        .await
        .unwrap();

    expect_failed(&outcome, needle);
    assert_eq!(harness.stems.calls(), 1);
    assert_eq!(harness.options.calls(), 3);
    assert!(harness.store.list_quizzes(7, 3).await.unwrap().is_empty());
    assert!(!harness
        .store
        .batch_exists(7, 3, harness.clock.now().date_naive())
        .await
        .unwrap());
}

#[tokio::test]
async fn test_rejects_nineteen_stems() {
    run_with_bad_stems(|p| drop(p.items.pop()), "has 19 items").await;
}

#[tokio::test]
async fn test_rejects_twenty_one_stems() {
    run_with_bad_stems(
        |p| {
            p.items.push(StemItem {
                id: "q21".into(),
                stem: "Extra?".into(),
                answer: "Extra".into(),
            })
        },
        "has 21 items",
    )
    .await;
}

#[tokio::test]
async fn test_rejects_duplicate_stem_id() {
    run_with_bad_stems(|p| p.items[1].id = "q1".into(), "duplicate stem id 'q1'").await;
}

#[tokio::test]
async fn test_rejects_blank_answer() {
    run_with_bad_stems(|p| p.items[4].answer = "   ".into(), "blank answer").await;
}

#[tokio::test]
async fn test_rejects_unknown_option_id() {
    run_with_bad_options(|p| p.items[0].id = "zz".into(), "unknown stem id 'zz'").await;
}

#[tokio::test]
async fn test_rejects_three_choices() {
    run_with_bad_options(|p| drop(p.items[0].choices.pop()), "has 3 choices").await;
}

#[tokio::test]
async fn test_rejects_five_choices() {
    run_with_bad_options(|p| p.items[0].choices.push("fifth".into()), "has 5 choices").await;
}

#[tokio::test]
async fn test_rejects_choices_equal_after_normalization() {
    run_with_bad_options(
        |p| p.items[0].choices[1] = "  Answer \t 1 ".into(),
        "repeats choice 'Answer 1'",
    )
    .await;
}

#[tokio::test]
async fn test_rejects_256_character_choice() {
    run_with_bad_options(
        |p| p.items[0].choices[2] = "x".repeat(256),
        "256-character choice",
    )
    .await;
}

#[tokio::test]
async fn test_rejects_answer_mismatch() {
    run_with_bad_options(|p| p.items[3].answer_index = 1, "not the canonical answer").await;
}

#[tokio::test]
async fn test_rejects_out_of_range_answer_index() {
    run_with_bad_options(|p| p.items[0].answer_index = 4, "outside [0, 3]").await;
}

#[tokio::test]
async fn test_accepts_255_character_multibyte_choice() {
    let store = SledQuizStore::temporary().unwrap();
    seed_step(&store, 7, 3, 1);
    let harness = Harness::new(
        store,
        FakeStems::new(),
        FakeOptions::new().with_mutation(|_, p| p.items[0].choices[3] = "é".repeat(255)),
    );

    let outcome = harness
        .coordinator
        .generate_for_group_and_prev_step(7, 3)
        .await
        .unwrap();
    assert_eq!(outcome, GenerationOutcome::Persisted { quizzes: 20 });
}

#[tokio::test]
async fn test_recovers_when_retry_returns_valid_payload() {
    let store = SledQuizStore::temporary().unwrap();
    seed_step(&store, 7, 3, 1);
    let harness = Harness::new(
        store,
        FakeStems::new().with_mutation(|call, p| {
            if call == 1 {
                p.items.truncate(5);
            }
        }),
        FakeOptions::new(),
    );

    let outcome = harness
        .coordinator
        .generate_for_group_and_prev_step(7, 3)
        .await
        .unwrap();
    assert_eq!(outcome, GenerationOutcome::Persisted { quizzes: 20 });
    assert_eq!(harness.stems.calls(), 2);
}
