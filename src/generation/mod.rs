//! Quiz generation pipeline: note aggregation, budget estimation, the two external generation
//! stages, validation, shuffling and the coordinator tying them together.

pub mod aggregate;
pub mod budget;
pub mod coordinator;
pub mod llm;
pub mod retry;
pub mod shuffle;
pub mod validate;

use crate::error::GenerationError;
use crate::types::{OptionPayload, StemPayload, StepNumber};
use async_trait::async_trait;

pub use aggregate::ContentAggregator;
pub use budget::TokenBudgetEstimator;
pub use coordinator::{CoordinatorSettings, GenerationCoordinator};
pub use llm::{LlmOptionGenerator, LlmStemGenerator};
pub use retry::RetryPolicy;
pub use shuffle::AnswerShuffler;
pub use validate::{normalize_text, PayloadValidator};

/// Stage 1: question stems with canonical answers
#[async_trait]
pub trait StemGenerator: Send + Sync {
    async fn generate(
        &self,
        group_name: &str,
        step: StepNumber,
        merged_notes: &str,
    ) -> Result<StemPayload, GenerationError>;
}

/// Stage 2: four choices and an answer index per stem
#[async_trait]
pub trait OptionGenerator: Send + Sync {
    /// `items_text` is the JSON rendering of the validated stage-1 items.
    async fn generate(&self, items_text: &str) -> Result<OptionPayload, GenerationError>;
}
