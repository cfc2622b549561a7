//! Core data types shared across the pipeline.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Study group identifier
pub type GroupId = i64;

/// Step number within a study group
pub type StepNumber = i32;

/// Persistent quiz identifier
pub type QuizId = i64;

/// Number of quizzes in one batch
pub const QUIZZES_PER_BATCH: usize = 20;

/// Number of answer choices per quiz
pub const CHOICES_PER_QUIZ: usize = 4;

/// Maximum length of a single choice, in characters
pub const MAX_CHOICE_CHARS: usize = 255;

/// Identifies one batch attempt: (group, step, calendar day).
///
/// Never persisted. Used as the in-process lock key and for the daily dedup check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GenerationKey {
    pub group_id: GroupId,
    pub step: StepNumber,
    pub day: NaiveDate,
}

impl GenerationKey {
    pub fn new(group_id: GroupId, step: StepNumber, day: NaiveDate) -> Self {
        Self { group_id, step, day }
    }

    /// Half-open UTC window `[day 00:00, day+1 00:00)` covering this key's calendar day
    pub fn day_window(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        day_window(self.day)
    }
}

impl fmt::Display for GenerationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "group={} step={} day={}", self.group_id, self.step, self.day)
    }
}

/// Half-open UTC window for a calendar day
pub fn day_window(day: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = day.and_time(NaiveTime::MIN).and_utc();
    (start, start + Duration::days(1))
}

/// Study group record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudyGroup {
    pub id: GroupId,
    pub name: String,
}

/// Study step record. The persister locks this row while writing a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudyStep {
    pub group_id: GroupId,
    pub step: StepNumber,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

/// A study note written by a group member for one step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub id: i64,
    pub group_id: GroupId,
    pub step: StepNumber,
    pub title: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Persisted quiz
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quiz {
    pub id: QuizId,
    pub group_id: GroupId,
    pub step: StepNumber,
    pub stem: String,
    pub created_at: DateTime<Utc>,
}

/// Persisted answer choice, keyed by (quiz_id, option_number)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizOption {
    pub quiz_id: QuizId,
    /// 1..=4
    pub option_number: u8,
    pub content: String,
    pub is_answer: bool,
}

/// A persisted quiz with its options ordered by option number
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizWithOptions {
    pub quiz: Quiz,
    pub options: Vec<QuizOption>,
}

impl QuizWithOptions {
    pub fn answer(&self) -> Option<&QuizOption> {
        self.options.iter().find(|o| o.is_answer)
    }
}

/// Stage-1 item: question stem and its canonical answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StemItem {
    pub id: String,
    pub stem: String,
    #[serde(alias = "canonicalAnswer", alias = "canonical_answer")]
    pub answer: String,
}

/// Stage-2 item as returned by the option generator, before validation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionItem {
    pub id: String,
    pub choices: Vec<String>,
    #[serde(alias = "answerIndex")]
    pub answer_index: i64,
}

/// Stage-1 payload
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StemPayload {
    pub items: Vec<StemItem>,
}

/// Stage-2 payload
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionPayload {
    pub items: Vec<OptionItem>,
}

/// Option set after shuffling: exactly four choices and an in-range answer pointer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShuffledOption {
    pub id: String,
    pub choices: [String; CHOICES_PER_QUIZ],
    pub answer_index: usize,
}

/// Everything the persister needs to write one batch
#[derive(Debug, Clone)]
pub struct FinishedBatch {
    pub key: GenerationKey,
    pub created_at: DateTime<Utc>,
    pub stems: Vec<StemItem>,
    pub options: Vec<ShuffledOption>,
}

/// Result of one persistence unit of work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistOutcome {
    /// Batch written; carries the number of quizzes inserted
    Written(usize),
    /// A batch for the same key already existed under the lock
    Skipped,
}

/// Result of one coordinator invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationOutcome {
    /// A new batch was committed
    Persisted { quizzes: usize },
    /// The in-process pre-check found an existing batch for today
    AlreadyGenerated,
    /// The persister's locked re-check found a batch written by a competing writer
    SkippedAtCommit,
    /// The step has no notes to generate from
    NoNotes,
    /// The attempt was abandoned; it will be reconsidered on the next scan
    Failed { reason: String },
}

impl GenerationOutcome {
    pub fn is_persisted(&self) -> bool {
        matches!(self, GenerationOutcome::Persisted { .. })
    }

    /// Short label for summaries
    pub fn label(&self) -> &'static str {
        match self {
            GenerationOutcome::Persisted { .. } => "persisted",
            GenerationOutcome::AlreadyGenerated => "already-generated",
            GenerationOutcome::SkippedAtCommit => "skipped-at-commit",
            GenerationOutcome::NoNotes => "no-notes",
            GenerationOutcome::Failed { .. } => "failed",
        }
    }
}
