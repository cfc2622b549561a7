//! Randomized reordering of answer choices that keeps the answer pointer correct.

use crate::error::GenerationError;
use crate::generation::validate::normalize_text;
use crate::types::{OptionItem, ShuffledOption, StemItem, CHOICES_PER_QUIZ};
use rand::rngs::OsRng;
use rand::seq::SliceRandom;
use rand::{Rng, RngCore};
use std::collections::HashMap;
use tracing::warn;

/// Where shuffle randomness comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RandomSource {
    /// Operating-system CSPRNG
    Os,
    /// Thread-local CSPRNG seeded from the OS
    ThreadLocal,
}

#[derive(Debug, Clone, Copy)]
pub struct AnswerShuffler {
    source: RandomSource,
}

impl Default for AnswerShuffler {
    fn default() -> Self {
        Self::new()
    }
}

impl AnswerShuffler {
    /// Try the OS generator once; fall back to the thread-local generator if it fails.
    pub fn new() -> Self {
        let mut seed_bytes = [0u8; 8];
        let source = match OsRng.try_fill_bytes(&mut seed_bytes) {
            Ok(()) => RandomSource::Os,
            Err(e) => {
                warn!(error = %e, "OS random source unavailable, using thread-local generator");
                RandomSource::ThreadLocal
            }
        };
        Self { source }
    }

    pub fn source(&self) -> RandomSource {
        self.source
    }

    /// Shuffle every option item, returned in stem order.
    pub fn shuffle_all(
        &self,
        stems: &[StemItem],
        options: &[OptionItem],
    ) -> Result<Vec<ShuffledOption>, GenerationError> {
        let by_id: HashMap<&str, &OptionItem> =
            options.iter().map(|o| (o.id.as_str(), o)).collect();

        stems
            .iter()
            .map(|stem| {
                let item = by_id.get(stem.id.as_str()).ok_or_else(|| {
                    GenerationError::InvariantViolation(format!(
                        "no option item for stem '{}'",
                        stem.id
                    ))
                })?;
                self.shuffle(stem, item)
            })
            .collect()
    }

    pub fn shuffle(
        &self,
        stem: &StemItem,
        item: &OptionItem,
    ) -> Result<ShuffledOption, GenerationError> {
        match self.source {
            RandomSource::Os => shuffle_with(&mut OsRng, stem, item),
            RandomSource::ThreadLocal => shuffle_with(&mut rand::thread_rng(), stem, item),
        }
    }
}

/// Permute `item.choices` with `rng` and re-point the answer at the canonical answer.
pub fn shuffle_with<R: Rng + ?Sized>(
    rng: &mut R,
    stem: &StemItem,
    item: &OptionItem,
) -> Result<ShuffledOption, GenerationError> {
    let canonical = normalize_text(&stem.answer);

    let mut choices = item.choices.clone();
    choices.shuffle(rng);

    let answer_index = choices
        .iter()
        .position(|choice| normalize_text(choice) == canonical)
        .ok_or_else(|| {
            GenerationError::InvariantViolation(format!(
                "canonical answer for '{}' not found among shuffled choices",
                item.id
            ))
        })?;

    let choices: [String; CHOICES_PER_QUIZ] = choices.try_into().map_err(|v: Vec<String>| {
        GenerationError::InvariantViolation(format!(
            "option item '{}' has {} choices after shuffle",
            item.id,
            v.len()
        ))
    })?;

    Ok(ShuffledOption {
        id: item.id.clone(),
        choices,
        answer_index,
    })
}
