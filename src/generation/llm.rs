//! Stem and option generators backed by a chat-completion model.

use crate::error::GenerationError;
use crate::generation::{OptionGenerator, StemGenerator};
use crate::provider::{ChatMessage, CompletionOptions, ModelProviderClient};
use crate::types::{OptionItem, OptionPayload, StemItem, StemPayload, StepNumber, QUIZZES_PER_BATCH};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

const STEM_SYSTEM_PROMPT: &str = "You write multiple-choice quiz questions from study notes. \
Respond with JSON only: {\"items\":[{\"id\":\"q1\",\"stem\":\"...\",\"answer\":\"...\"}]}. \
Ids are q1..qN, unique. Each answer is short and unambiguous.";

const OPTION_SYSTEM_PROMPT: &str = "You write answer choices for quiz questions. \
For every input item, return exactly four distinct choices, one of which is the item's answer \
verbatim. Respond with JSON only: \
{\"items\":[{\"id\":\"q1\",\"choices\":[\"...\",\"...\",\"...\",\"...\"],\"answer_index\":0}]}.";

/// Stage-1 generator
pub struct LlmStemGenerator {
    client: Arc<dyn ModelProviderClient>,
    options: CompletionOptions,
}

impl LlmStemGenerator {
    pub fn new(client: Arc<dyn ModelProviderClient>, options: CompletionOptions) -> Self {
        Self { client, options }
    }
}

#[async_trait]
impl StemGenerator for LlmStemGenerator {
    async fn generate(
        &self,
        group_name: &str,
        step: StepNumber,
        merged_notes: &str,
    ) -> Result<StemPayload, GenerationError> {
        let prompt = format!(
            "Study group: {}\nStep: {}\nWrite exactly {} questions.\n\nNotes:\n{}",
            group_name, step, QUIZZES_PER_BATCH, merged_notes
        );
        let response = self
            .client
            .complete(
                vec![
                    ChatMessage::system(STEM_SYSTEM_PROMPT),
                    ChatMessage::user(prompt),
                ],
                self.options.clone(),
            )
            .await?;

        debug!(
            provider = self.client.provider_name(),
            model = self.client.model_name(),
            completion_tokens = response.usage.completion_tokens,
            "Stem completion received"
        );

        let items: Vec<StemItem> = parse_items(&response.content)?;
        Ok(StemPayload { items })
    }
}

/// Stage-2 generator
pub struct LlmOptionGenerator {
    client: Arc<dyn ModelProviderClient>,
    options: CompletionOptions,
}

impl LlmOptionGenerator {
    pub fn new(client: Arc<dyn ModelProviderClient>, options: CompletionOptions) -> Self {
        Self { client, options }
    }
}

#[async_trait]
impl OptionGenerator for LlmOptionGenerator {
    async fn generate(&self, items_text: &str) -> Result<OptionPayload, GenerationError> {
        let response = self
            .client
            .complete(
                vec![
                    ChatMessage::system(OPTION_SYSTEM_PROMPT),
                    ChatMessage::user(items_text.to_string()),
                ],
                self.options.clone(),
            )
            .await?;

        debug!(
            provider = self.client.provider_name(),
            model = self.client.model_name(),
            completion_tokens = response.usage.completion_tokens,
            "Option completion received"
        );

        let items: Vec<OptionItem> = parse_items(&response.content)?;
        Ok(OptionPayload { items })
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ItemsEnvelope<T> {
    Wrapped { items: Vec<T> },
    Bare(Vec<T>),
}

/// Accepts `{"items": [...]}` or a bare array, optionally inside a markdown code fence.
fn parse_items<T: DeserializeOwned>(content: &str) -> Result<Vec<T>, GenerationError> {
    let body = strip_code_fence(content);
    let envelope: ItemsEnvelope<T> = serde_json::from_str(body).map_err(|e| {
        GenerationError::MalformedResponse(format!("Response is not the expected JSON: {}", e))
    })?;
    Ok(match envelope {
        ItemsEnvelope::Wrapped { items } => items,
        ItemsEnvelope::Bare(items) => items,
    })
}

fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string ("json") on the opening fence line.
    let rest = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}
