//! Structural and semantic checks on both generation stages' payloads.

use crate::error::ValidationError;
use crate::types::{
    OptionPayload, StemItem, StemPayload, CHOICES_PER_QUIZ, MAX_CHOICE_CHARS, QUIZZES_PER_BATCH,
};
use std::collections::{HashMap, HashSet};
use unicode_normalization::UnicodeNormalization;

/// NFC-compose, trim, and collapse internal whitespace runs to one space.
pub fn normalize_text(text: &str) -> String {
    let composed: String = text.nfc().collect();
    composed.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[derive(Debug, Clone, Copy)]
pub struct PayloadValidator {
    expected_items: usize,
}

impl Default for PayloadValidator {
    fn default() -> Self {
        Self {
            expected_items: QUIZZES_PER_BATCH,
        }
    }
}

impl PayloadValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rule set A: item count, unique non-blank ids, non-blank stem and answer.
    pub fn validate_stems(&self, payload: &StemPayload) -> Result<(), ValidationError> {
        if payload.items.len() != self.expected_items {
            return Err(ValidationError::WrongItemCount {
                stage: "stem",
                expected: self.expected_items,
                actual: payload.items.len(),
            });
        }

        let mut seen = HashSet::new();
        for (index, item) in payload.items.iter().enumerate() {
            if item.id.trim().is_empty() {
                return Err(ValidationError::BlankId { index });
            }
            if !seen.insert(item.id.as_str()) {
                return Err(ValidationError::DuplicateStemId(item.id.clone()));
            }
            if item.stem.trim().is_empty() {
                return Err(ValidationError::BlankStem(item.id.clone()));
            }
            if item.answer.trim().is_empty() {
                return Err(ValidationError::BlankAnswer(item.id.clone()));
            }
        }
        Ok(())
    }

    /// Rule set B plus the answer-consistency check against the validated stems.
    pub fn validate_options(
        &self,
        stems: &[StemItem],
        payload: &OptionPayload,
    ) -> Result<(), ValidationError> {
        if payload.items.len() != self.expected_items {
            return Err(ValidationError::WrongItemCount {
                stage: "option",
                expected: self.expected_items,
                actual: payload.items.len(),
            });
        }

        let answers: HashMap<&str, &str> = stems
            .iter()
            .map(|s| (s.id.as_str(), s.answer.as_str()))
            .collect();
        let mut covered = HashSet::new();

        for item in &payload.items {
            let Some(answer) = answers.get(item.id.as_str()) else {
                return Err(ValidationError::UnknownStemId(item.id.clone()));
            };
            if !covered.insert(item.id.as_str()) {
                return Err(ValidationError::DuplicateOptionId(item.id.clone()));
            }

            if item.choices.len() != CHOICES_PER_QUIZ {
                return Err(ValidationError::WrongChoiceCount {
                    id: item.id.clone(),
                    actual: item.choices.len(),
                });
            }
            if item.answer_index < 0 || item.answer_index >= CHOICES_PER_QUIZ as i64 {
                return Err(ValidationError::AnswerIndexOutOfRange {
                    id: item.id.clone(),
                    index: item.answer_index,
                });
            }

            let mut distinct = HashSet::new();
            for choice in &item.choices {
                let length = choice.chars().count();
                if length > MAX_CHOICE_CHARS {
                    return Err(ValidationError::ChoiceTooLong {
                        id: item.id.clone(),
                        length,
                    });
                }
                let normalized = normalize_text(choice);
                if !distinct.insert(normalized.clone()) {
                    return Err(ValidationError::DuplicateChoice {
                        id: item.id.clone(),
                        choice: normalized,
                    });
                }
            }

            let declared = &item.choices[item.answer_index as usize];
            if normalize_text(declared) != normalize_text(answer) {
                return Err(ValidationError::AnswerMismatch {
                    id: item.id.clone(),
                });
            }
        }
        Ok(())
    }
}
