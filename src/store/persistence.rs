//! Embedded sled backend
//!
//! Trees and keys (all integers big-endian):
//!
//! | tree           | key                                  | value               |
//! |----------------|--------------------------------------|---------------------|
//! | `groups`       | group_id                             | `StudyGroup`        |
//! | `steps`        | group_id, step                       | `StudyStep`         |
//! | `notes`        | group_id, step, note_id              | `Note`              |
//! | `quizzes`      | quiz_id                              | `Quiz`              |
//! | `quiz_index`   | group_id, step, quiz_id              | empty               |
//! | `quiz_options` | quiz_id, option_number               | `QuizOption`        |
//! | `batches`      | group_id, step, day (days from CE)   | batch `created_at`  |
//!
//! A batch commits in one serializable transaction over every tree it touches. The
//! `batches` marker is the per-day uniqueness guard. sled holds an exclusive file lock, so
//! one process owns a database directory at a time.

use crate::error::StorageError;
use crate::store::batch::plan_rows;
use crate::store::{AtomicPersister, QuizRepository, SeedData};
use crate::types::{
    FinishedBatch, GroupId, Note, PersistOutcome, Quiz, QuizId, QuizOption, QuizWithOptions,
    StepNumber, StudyGroup, StudyStep,
};
use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::Transactional;
use std::path::Path;
use tracing::{debug, info};

fn group_key(group_id: GroupId) -> Vec<u8> {
    group_id.to_be_bytes().to_vec()
}

fn step_key(group_id: GroupId, step: StepNumber) -> Vec<u8> {
    let mut key = group_key(group_id);
    key.extend_from_slice(&step.to_be_bytes());
    key
}

fn note_key(group_id: GroupId, step: StepNumber, note_id: i64) -> Vec<u8> {
    let mut key = step_key(group_id, step);
    key.extend_from_slice(&note_id.to_be_bytes());
    key
}

fn quiz_index_key(group_id: GroupId, step: StepNumber, quiz_id: QuizId) -> Vec<u8> {
    let mut key = step_key(group_id, step);
    key.extend_from_slice(&quiz_id.to_be_bytes());
    key
}

fn option_key(quiz_id: QuizId, option_number: u8) -> Vec<u8> {
    let mut key = quiz_id.to_be_bytes().to_vec();
    key.push(option_number);
    key
}

fn batch_key(group_id: GroupId, step: StepNumber, day: NaiveDate) -> Vec<u8> {
    let mut key = step_key(group_id, step);
    key.extend_from_slice(&day.num_days_from_ce().to_be_bytes());
    key
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StorageError> {
    Ok(bincode::serialize(value)?)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StorageError> {
    Ok(bincode::deserialize(bytes)?)
}

fn quiz_id_from_index_key(key: &[u8]) -> Result<QuizId, StorageError> {
    let tail = key
        .len()
        .checked_sub(8)
        .map(|start| &key[start..])
        .ok_or_else(|| StorageError::Codec(format!("short quiz index key: {} bytes", key.len())))?;
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(tail);
    Ok(QuizId::from_be_bytes(bytes))
}

/// Sled-backed quiz store
pub struct SledQuizStore {
    db: sled::Db,
    groups: sled::Tree,
    steps: sled::Tree,
    notes: sled::Tree,
    quizzes: sled::Tree,
    quiz_index: sled::Tree,
    quiz_options: sled::Tree,
    batches: sled::Tree,
}

impl SledQuizStore {
    /// Open (or create) a store in the directory at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = sled::open(path.as_ref()).map_err(|e| {
            StorageError::Backend(format!(
                "Failed to open sled database at {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::from_db(db)
    }

    /// In-memory store that disappears on drop
    pub fn temporary() -> Result<Self, StorageError> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: sled::Db) -> Result<Self, StorageError> {
        Ok(Self {
            groups: db.open_tree("groups")?,
            steps: db.open_tree("steps")?,
            notes: db.open_tree("notes")?,
            quizzes: db.open_tree("quizzes")?,
            quiz_index: db.open_tree("quiz_index")?,
            quiz_options: db.open_tree("quiz_options")?,
            batches: db.open_tree("batches")?,
            db,
        })
    }

    pub fn put_group(&self, group: &StudyGroup) -> Result<(), StorageError> {
        self.groups.insert(group_key(group.id), encode(group)?)?;
        Ok(())
    }

    pub fn put_step(&self, step: &StudyStep) -> Result<(), StorageError> {
        self.steps
            .insert(step_key(step.group_id, step.step), encode(step)?)?;
        Ok(())
    }

    pub fn put_note(&self, note: &Note) -> Result<(), StorageError> {
        self.notes
            .insert(note_key(note.group_id, note.step, note.id), encode(note)?)?;
        Ok(())
    }

    /// Load collaborator records in one pass and flush
    pub fn import(&self, seed: &SeedData) -> Result<(), StorageError> {
        for group in &seed.groups {
            self.put_group(group)?;
        }
        for step in &seed.steps {
            self.put_step(step)?;
        }
        for note in &seed.notes {
            self.put_note(note)?;
        }
        self.flush()?;
        info!(
            groups = seed.groups.len(),
            steps = seed.steps.len(),
            notes = seed.notes.len(),
            "Imported seed data"
        );
        Ok(())
    }

    /// Quizzes for a step, ordered by id
    pub fn quizzes_for(&self, group_id: GroupId, step: StepNumber) -> Result<Vec<Quiz>, StorageError> {
        let mut quizzes = Vec::new();
        for entry in self.quiz_index.scan_prefix(step_key(group_id, step)) {
            let (key, _) = entry?;
            let quiz_id = quiz_id_from_index_key(&key)?;
            if let Some(bytes) = self.quizzes.get(quiz_id.to_be_bytes())? {
                quizzes.push(decode::<Quiz>(&bytes)?);
            }
        }
        Ok(quizzes)
    }

    /// Options for a quiz, ordered by option number
    pub fn options_for(&self, quiz_id: QuizId) -> Result<Vec<QuizOption>, StorageError> {
        self.quiz_options
            .scan_prefix(quiz_id.to_be_bytes())
            .map(|entry| {
                let (_, value) = entry?;
                decode(&value)
            })
            .collect()
    }

    /// Flush all pending writes to disk
    pub fn flush(&self) -> Result<(), StorageError> {
        self.db.flush()?;
        Ok(())
    }

    fn has_quizzes(&self, group_id: GroupId, step: StepNumber) -> Result<bool, StorageError> {
        match self.quiz_index.scan_prefix(step_key(group_id, step)).next() {
            Some(entry) => {
                entry?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl QuizRepository for SledQuizStore {
    async fn find_group(&self, group_id: GroupId) -> Result<Option<StudyGroup>, StorageError> {
        self.groups
            .get(group_key(group_id))?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    async fn find_step(
        &self,
        group_id: GroupId,
        step: StepNumber,
    ) -> Result<Option<StudyStep>, StorageError> {
        self.steps
            .get(step_key(group_id, step))?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    async fn notes_for(&self, group_id: GroupId, step: StepNumber) -> Result<Vec<Note>, StorageError> {
        self.notes
            .scan_prefix(step_key(group_id, step))
            .map(|entry| {
                let (_, value) = entry?;
                decode(&value)
            })
            .collect()
    }

    async fn batch_exists(
        &self,
        group_id: GroupId,
        step: StepNumber,
        day: NaiveDate,
    ) -> Result<bool, StorageError> {
        Ok(self.batches.contains_key(batch_key(group_id, step, day))?)
    }

    async fn due_steps(&self, today: NaiveDate) -> Result<Vec<StudyStep>, StorageError> {
        let mut due = Vec::new();
        for entry in self.steps.iter() {
            let (_, value) = entry?;
            let step: StudyStep = decode(&value)?;
            if step.end_date < today && !self.has_quizzes(step.group_id, step.step)? {
                due.push(step);
            }
        }
        Ok(due)
    }

    async fn list_quizzes(
        &self,
        group_id: GroupId,
        step: StepNumber,
    ) -> Result<Vec<QuizWithOptions>, StorageError> {
        self.quizzes_for(group_id, step)?
            .into_iter()
            .map(|quiz| {
                let options = self.options_for(quiz.id)?;
                Ok(QuizWithOptions { quiz, options })
            })
            .collect()
    }
}

#[async_trait]
impl AtomicPersister for SledQuizStore {
    async fn persist_atomic(&self, batch: &FinishedBatch) -> Result<PersistOutcome, StorageError> {
        let key = batch.key;
        let rows = plan_rows(batch)?;

        // Ids are drawn outside the transaction; a skipped batch leaves gaps, never reuse.
        let mut ids = Vec::with_capacity(rows.len());
        for _ in 0..rows.len() {
            ids.push(self.db.generate_id()? as QuizId);
        }

        // Pre-encode everything so the transaction body only touches sled.
        let mut encoded = Vec::with_capacity(rows.len());
        for (row, quiz_id) in rows.iter().zip(&ids) {
            let quiz = Quiz {
                id: *quiz_id,
                group_id: key.group_id,
                step: key.step,
                stem: row.stem.clone(),
                created_at: batch.created_at,
            };
            let mut options = Vec::with_capacity(row.options.len());
            for option in &row.options {
                let record = QuizOption {
                    quiz_id: *quiz_id,
                    option_number: option.option_number,
                    content: option.content.clone(),
                    is_answer: option.is_answer,
                };
                options.push((option_key(*quiz_id, option.option_number), encode(&record)?));
            }
            encoded.push((*quiz_id, encode(&quiz)?, options));
        }
        let marker = encode(&batch.created_at)?;

        let group_k = group_key(key.group_id);
        let step_k = step_key(key.group_id, key.step);
        let batch_k = batch_key(key.group_id, key.step, key.day);

        let result = (
            &self.groups,
            &self.steps,
            &self.quizzes,
            &self.quiz_index,
            &self.quiz_options,
            &self.batches,
        )
            .transaction(|(groups, steps, quizzes, quiz_index, quiz_options, batches)| {
                if groups.get(&group_k)?.is_none() {
                    return Err(ConflictableTransactionError::Abort(
                        StorageError::RecordNotFound(format!("study group {}", key.group_id)),
                    ));
                }
                // Reading the step and the marker puts both in this transaction's read set.
                if steps.get(&step_k)?.is_none() {
                    return Err(ConflictableTransactionError::Abort(
                        StorageError::RecordNotFound(format!(
                            "study step {} of group {}",
                            key.step, key.group_id
                        )),
                    ));
                }
                if batches.get(&batch_k)?.is_some() {
                    return Ok(PersistOutcome::Skipped);
                }

                for (quiz_id, quiz_bytes, options) in &encoded {
                    quizzes.insert(quiz_id.to_be_bytes().to_vec(), quiz_bytes.clone())?;
                    quiz_index.insert(
                        quiz_index_key(key.group_id, key.step, *quiz_id),
                        Vec::<u8>::new(),
                    )?;
                    for (option_k, option_bytes) in options {
                        quiz_options.insert(option_k.clone(), option_bytes.clone())?;
                    }
                }
                batches.insert(batch_k.clone(), marker.clone())?;
                Ok(PersistOutcome::Written(encoded.len()))
            });

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(TransactionError::Abort(e)) => return Err(e),
            Err(TransactionError::Storage(e)) => return Err(e.into()),
        };

        if let PersistOutcome::Written(count) = outcome {
            self.db.flush_async().await?;
            debug!(
                group_id = key.group_id,
                step = key.step,
                day = %key.day,
                quizzes = count,
                "Batch committed to sled"
            );
        }
        Ok(outcome)
    }
}
