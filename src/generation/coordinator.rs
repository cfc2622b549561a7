//! Orchestrates one batch attempt per (group, step, day).
//!
//! Flow inside the per-key lock: daily pre-check, note lookup, stage 1 (stems), stage 2
//! (options), shuffle, then the persister's own locked unit of work. Each external stage
//! requests rate-limit budget once, then runs under the retry policy; every attempt holds one
//! call-gate permit for the duration of the network call only.

use crate::clock::{Clock, SystemClock};
use crate::concurrency::{CallGate, KeyLockTable, ShutdownSignal};
use crate::config::GenerationConfig;
use crate::error::GenerationError;
use crate::generation::{
    AnswerShuffler, ContentAggregator, OptionGenerator, PayloadValidator, RetryPolicy,
    StemGenerator, TokenBudgetEstimator,
};
use crate::rate_limit::{RateLimiter, UnlimitedRateLimiter};
use crate::store::{AtomicPersister, QuizRepository};
use crate::types::{
    FinishedBatch, GenerationKey, GenerationOutcome, GroupId, OptionPayload, PersistOutcome,
    StemItem, StepNumber,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Tunables for a coordinator
#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    pub call_concurrency: usize,
    pub retry: RetryPolicy,
    pub estimator: TokenBudgetEstimator,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self::from_config(&GenerationConfig::default())
    }
}

impl CoordinatorSettings {
    pub fn from_config(config: &GenerationConfig) -> Self {
        Self {
            call_concurrency: config.call_concurrency,
            retry: config.retry.clone(),
            estimator: TokenBudgetEstimator::new(
                config.stem_output_estimate,
                config.option_output_estimate,
            ),
        }
    }
}

pub struct GenerationCoordinator {
    repository: Arc<dyn QuizRepository>,
    persister: Arc<dyn AtomicPersister>,
    stem_generator: Arc<dyn StemGenerator>,
    option_generator: Arc<dyn OptionGenerator>,
    rate_limiter: Arc<dyn RateLimiter>,
    clock: Arc<dyn Clock>,
    shutdown: ShutdownSignal,
    locks: KeyLockTable<GenerationKey>,
    gate: CallGate,
    retry: RetryPolicy,
    estimator: TokenBudgetEstimator,
    validator: PayloadValidator,
    shuffler: AnswerShuffler,
    aggregator: ContentAggregator,
}

impl GenerationCoordinator {
    /// Coordinator with the system clock, no rate limit and no shutdown signal
    pub fn new(
        repository: Arc<dyn QuizRepository>,
        persister: Arc<dyn AtomicPersister>,
        stem_generator: Arc<dyn StemGenerator>,
        option_generator: Arc<dyn OptionGenerator>,
        settings: CoordinatorSettings,
    ) -> Self {
        Self {
            repository,
            persister,
            stem_generator,
            option_generator,
            rate_limiter: Arc::new(UnlimitedRateLimiter),
            clock: Arc::new(SystemClock),
            shutdown: ShutdownSignal::never(),
            locks: KeyLockTable::new(),
            gate: CallGate::new(settings.call_concurrency.max(1)),
            retry: settings.retry,
            estimator: settings.estimator,
            validator: PayloadValidator::new(),
            shuffler: AnswerShuffler::new(),
            aggregator: ContentAggregator,
        }
    }

    pub fn with_rate_limiter(mut self, rate_limiter: Arc<dyn RateLimiter>) -> Self {
        self.rate_limiter = rate_limiter;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_shutdown(mut self, shutdown: ShutdownSignal) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Read access for the scan driver
    pub fn repository(&self) -> &Arc<dyn QuizRepository> {
        &self.repository
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn shutdown(&self) -> &ShutdownSignal {
        &self.shutdown
    }

    /// Live per-key lock entries
    pub fn active_locks(&self) -> usize {
        self.locks.len()
    }

    /// Generate today's batch for `(group_id, step)`.
    ///
    /// Every failure except cancellation is logged and reported as
    /// [`GenerationOutcome::Failed`]; only [`GenerationError::Interrupted`] is returned as an
    /// error.
    pub async fn generate_for_group_and_prev_step(
        &self,
        group_id: GroupId,
        step: StepNumber,
    ) -> Result<GenerationOutcome, GenerationError> {
        // One clock read: the dedup day and the rows' timestamp must agree.
        let now = self.clock.now();
        let key = GenerationKey::new(group_id, step, now.date_naive());
        let _guard = self.locks.lock(key).await;

        match self.run_locked(key, now).await {
            Ok(outcome) => Ok(outcome),
            Err(GenerationError::Interrupted) => {
                warn!(group_id, step, day = %key.day, "Generation interrupted");
                Err(GenerationError::Interrupted)
            }
            Err(err) => {
                error!(
                    group_id,
                    step,
                    day = %key.day,
                    error = %err,
                    "Quiz generation failed"
                );
                Ok(GenerationOutcome::Failed {
                    reason: err.to_string(),
                })
            }
        }
    }

    async fn run_locked(
        &self,
        key: GenerationKey,
        now: DateTime<Utc>,
    ) -> Result<GenerationOutcome, GenerationError> {
        if self
            .repository
            .batch_exists(key.group_id, key.step, key.day)
            .await?
        {
            info!(
                group_id = key.group_id,
                step = key.step,
                day = %key.day,
                "Quizzes already generated today, skipping"
            );
            return Ok(GenerationOutcome::AlreadyGenerated);
        }

        let group = self
            .repository
            .find_group(key.group_id)
            .await?
            .ok_or(GenerationError::GroupNotFound(key.group_id))?;
        self.repository
            .find_step(key.group_id, key.step)
            .await?
            .ok_or(GenerationError::StepNotFound {
                group_id: key.group_id,
                step: key.step,
            })?;

        let notes = self.repository.notes_for(key.group_id, key.step).await?;
        if notes.is_empty() {
            info!(
                group_id = key.group_id,
                step = key.step,
                "No notes for step, skipping"
            );
            return Ok(GenerationOutcome::NoNotes);
        }

        let merged = self.aggregator.merge(&notes);
        let stems = self.generate_stems(key, &group.name, &merged).await?;

        let items_text = serde_json::to_string(&stems).map_err(|e| {
            GenerationError::InvariantViolation(format!("Failed to encode stem items: {}", e))
        })?;
        let options = self.generate_options(key, &stems, &items_text).await?;

        let shuffled = self.shuffler.shuffle_all(&stems, &options.items)?;

        let batch = FinishedBatch {
            key,
            created_at: now,
            stems,
            options: shuffled,
        };

        match self.persister.persist_atomic(&batch).await? {
            PersistOutcome::Written(quizzes) => {
                info!(
                    group_id = key.group_id,
                    step = key.step,
                    day = %key.day,
                    quizzes,
                    "Quiz batch persisted"
                );
                Ok(GenerationOutcome::Persisted { quizzes })
            }
            PersistOutcome::Skipped => {
                info!(
                    group_id = key.group_id,
                    step = key.step,
                    day = %key.day,
                    "Batch already written by another writer, skipping"
                );
                Ok(GenerationOutcome::SkippedAtCommit)
            }
        }
    }

    async fn generate_stems(
        &self,
        key: GenerationKey,
        group_name: &str,
        merged: &str,
    ) -> Result<Vec<StemItem>, GenerationError> {
        let budget = self.estimator.for_stems(merged);
        self.rate_limiter.acquire(budget).await;

        let payload = self
            .retry
            .run("stem", &self.shutdown, |attempt| async move {
                let payload = {
                    let _permit = self.gate.enter().await?;
                    debug!(
                        group_id = key.group_id,
                        step = key.step,
                        attempt,
                        budget,
                        "Calling stem generator"
                    );
                    self.stem_generator
                        .generate(group_name, key.step, merged)
                        .await?
                };
                self.validator.validate_stems(&payload)?;
                Ok(payload)
            })
            .await?;

        Ok(payload.items)
    }

    async fn generate_options(
        &self,
        key: GenerationKey,
        stems: &[StemItem],
        items_text: &str,
    ) -> Result<OptionPayload, GenerationError> {
        let budget = self.estimator.for_options(items_text);
        self.rate_limiter.acquire(budget).await;

        self.retry
            .run("option", &self.shutdown, |attempt| async move {
                let payload = {
                    let _permit = self.gate.enter().await?;
                    debug!(
                        group_id = key.group_id,
                        step = key.step,
                        attempt,
                        budget,
                        "Calling option generator"
                    );
                    self.option_generator.generate(items_text).await?
                };
                self.validator.validate_options(stems, &payload)?;
                Ok(payload)
            })
            .await
    }
}
