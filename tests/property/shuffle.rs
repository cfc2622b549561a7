//! Shuffling keeps the choice multiset and keeps the answer pointer on the canonical answer

use proptest::prelude::*;
use quizgen::generation::normalize_text;
use quizgen::generation::shuffle::shuffle_with;
use quizgen::types::{OptionItem, StemItem};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashSet;

/// Four distinct non-blank choices (distinct after normalization)
fn distinct_choices() -> impl Strategy<Value = Vec<String>> {
    prop::collection::hash_set("[a-zA-Z0-9]{1,12}( [a-zA-Z0-9]{1,12})?", 4)
        .prop_map(|set| set.into_iter().collect::<Vec<_>>())
}

#[test]
fn test_shuffle_preserves_answer_property() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(
            &(distinct_choices(), 0usize..4, any::<u64>()),
            |(choices, answer_index, seed)| {
                let stem = StemItem {
                    id: "q1".to_string(),
                    stem: "Which one?".to_string(),
                    answer: format!("  {}  ", choices[answer_index]),
                };
                let item = OptionItem {
                    id: "q1".to_string(),
                    choices: choices.clone(),
                    answer_index: answer_index as i64,
                };

                let mut rng = StdRng::seed_from_u64(seed);
                let shuffled = shuffle_with(&mut rng, &stem, &item).unwrap();

                prop_assert!(shuffled.answer_index < 4);
                prop_assert_eq!(
                    normalize_text(&shuffled.choices[shuffled.answer_index]),
                    normalize_text(&stem.answer)
                );

                let before: HashSet<&String> = choices.iter().collect();
                let after: HashSet<&String> = shuffled.choices.iter().collect();
                prop_assert_eq!(before, after);

                Ok(())
            },
        )
        .unwrap();
}

#[test]
fn test_same_seed_same_order_property() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(&(distinct_choices(), any::<u64>()), |(choices, seed)| {
            let stem = StemItem {
                id: "q1".to_string(),
                stem: "Which one?".to_string(),
                answer: choices[0].clone(),
            };
            let item = OptionItem {
                id: "q1".to_string(),
                choices,
                answer_index: 0,
            };

            let first = shuffle_with(&mut StdRng::seed_from_u64(seed), &stem, &item).unwrap();
            let second = shuffle_with(&mut StdRng::seed_from_u64(seed), &stem, &item).unwrap();
            prop_assert_eq!(first, second);

            Ok(())
        })
        .unwrap();
}

#[test]
fn test_normalization_is_idempotent_property() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(&any::<String>(), |text| {
            let once = normalize_text(&text);
            prop_assert_eq!(normalize_text(&once), once.clone());
            prop_assert!(!once.starts_with(' ') && !once.ends_with(' '));
            prop_assert!(!once.contains("  "));
            Ok(())
        })
        .unwrap();
}
