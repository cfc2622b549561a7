//! Row layout of one finished batch, shared by every backend.

use crate::error::StorageError;
use crate::types::{FinishedBatch, CHOICES_PER_QUIZ};
use std::collections::HashMap;

/// One option row, before the quiz id is known
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedOption {
    /// 1..=4
    pub option_number: u8,
    pub content: String,
    pub is_answer: bool,
}

/// One quiz row and its four option rows
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedQuiz {
    pub stem: String,
    pub options: Vec<PlannedOption>,
}

/// Pair each stem with its shuffled options, in stem order.
///
/// Option numbers are 1..=4 in shuffled order; only the shuffled answer index is marked.
pub fn plan_rows(batch: &FinishedBatch) -> Result<Vec<PlannedQuiz>, StorageError> {
    if batch.stems.len() != batch.options.len() {
        return Err(StorageError::InvalidBatch(format!(
            "{} stems but {} option sets",
            batch.stems.len(),
            batch.options.len()
        )));
    }

    let by_id: HashMap<&str, _> = batch
        .options
        .iter()
        .map(|o| (o.id.as_str(), o))
        .collect();

    batch
        .stems
        .iter()
        .map(|stem| {
            let shuffled = by_id.get(stem.id.as_str()).ok_or_else(|| {
                StorageError::InvalidBatch(format!("no options for stem '{}'", stem.id))
            })?;
            if shuffled.answer_index >= CHOICES_PER_QUIZ {
                return Err(StorageError::InvalidBatch(format!(
                    "answer index {} out of range for '{}'",
                    shuffled.answer_index, stem.id
                )));
            }

            let options = shuffled
                .choices
                .iter()
                .enumerate()
                .map(|(i, content)| PlannedOption {
                    option_number: (i + 1) as u8,
                    content: content.clone(),
                    is_answer: i == shuffled.answer_index,
                })
                .collect();

            Ok(PlannedQuiz {
                stem: stem.stem.clone(),
                options,
            })
        })
        .collect()
}
