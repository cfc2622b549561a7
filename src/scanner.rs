//! Finds steps that need a quiz batch and walks them through the coordinator.

use crate::error::GenerationError;
use crate::generation::GenerationCoordinator;
use crate::store::QuizRepository;
use crate::types::{GenerationOutcome, GroupId, StepNumber, StudyStep};
use chrono::NaiveDate;
use std::sync::Arc;
use tracing::{info, warn};

/// Read-only query for steps that ended before today and have no quizzes
pub struct StepDueScanner {
    repository: Arc<dyn QuizRepository>,
}

impl StepDueScanner {
    pub fn new(repository: Arc<dyn QuizRepository>) -> Self {
        Self { repository }
    }

    pub async fn find_due(&self, today: NaiveDate) -> Result<Vec<StudyStep>, GenerationError> {
        Ok(self.repository.due_steps(today).await?)
    }
}

/// Outcome of one candidate in a scan pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanEntry {
    pub group_id: GroupId,
    pub step: StepNumber,
    pub outcome: GenerationOutcome,
}

#[derive(Debug, Clone, Default)]
pub struct ScanReport {
    pub entries: Vec<ScanEntry>,
    /// Candidates found by the scanner, including any not reached
    pub candidates: usize,
    /// The pass stopped early on cancellation
    pub interrupted: bool,
}

impl ScanReport {
    pub fn persisted(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.outcome.is_persisted())
            .count()
    }

    pub fn failed(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e.outcome, GenerationOutcome::Failed { .. }))
            .count()
    }
}

/// Sequential outer loop: one coordinator call per due step
pub struct ScanDriver {
    coordinator: Arc<GenerationCoordinator>,
    scanner: StepDueScanner,
}

impl ScanDriver {
    pub fn new(coordinator: Arc<GenerationCoordinator>) -> Self {
        let scanner = StepDueScanner::new(coordinator.repository().clone());
        Self {
            coordinator,
            scanner,
        }
    }

    /// One pass over today's due steps. Per-candidate failures are recorded and the pass
    /// continues; cancellation ends it.
    pub async fn run_once(&self) -> Result<ScanReport, GenerationError> {
        let today = self.coordinator.clock().today();
        let due = self.scanner.find_due(today).await?;
        info!(candidates = due.len(), %today, "Scanning due steps");

        let mut report = ScanReport {
            candidates: due.len(),
            ..ScanReport::default()
        };

        for step in due {
            if self.coordinator.shutdown().is_triggered() {
                report.interrupted = true;
                break;
            }

            match self
                .coordinator
                .generate_for_group_and_prev_step(step.group_id, step.step)
                .await
            {
                Ok(outcome) => report.entries.push(ScanEntry {
                    group_id: step.group_id,
                    step: step.step,
                    outcome,
                }),
                Err(GenerationError::Interrupted) => {
                    warn!(
                        group_id = step.group_id,
                        step = step.step,
                        "Scan interrupted"
                    );
                    report.interrupted = true;
                    break;
                }
                Err(err) => {
                    // The coordinator only surfaces cancellation; keep the pass alive regardless.
                    report.entries.push(ScanEntry {
                        group_id: step.group_id,
                        step: step.step,
                        outcome: GenerationOutcome::Failed {
                            reason: err.to_string(),
                        },
                    });
                }
            }
        }

        info!(
            processed = report.entries.len(),
            persisted = report.persisted(),
            failed = report.failed(),
            interrupted = report.interrupted,
            "Scan finished"
        );
        Ok(report)
    }
}
