//! Conservative token-cost estimates used to request rate-limit budget.

/// Safety margin applied on top of input plus expected output
const SAFETY_FACTOR: f64 = 1.2;

pub const DEFAULT_STEM_OUTPUT_ESTIMATE: u64 = 3000;
pub const DEFAULT_OPTION_OUTPUT_ESTIMATE: u64 = 4000;

/// Character-count heuristic. Never used to reject content.
#[derive(Debug, Clone, Copy)]
pub struct TokenBudgetEstimator {
    pub stem_output_estimate: u64,
    pub option_output_estimate: u64,
}

impl Default for TokenBudgetEstimator {
    fn default() -> Self {
        Self {
            stem_output_estimate: DEFAULT_STEM_OUTPUT_ESTIMATE,
            option_output_estimate: DEFAULT_OPTION_OUTPUT_ESTIMATE,
        }
    }
}

impl TokenBudgetEstimator {
    pub fn new(stem_output_estimate: u64, option_output_estimate: u64) -> Self {
        Self {
            stem_output_estimate,
            option_output_estimate,
        }
    }

    /// `round((chars(input) + fixed_output) * 1.2)`
    pub fn estimate(&self, input: &str, fixed_output: u64) -> u64 {
        let chars = input.chars().count() as u64;
        ((chars + fixed_output) as f64 * SAFETY_FACTOR).round() as u64
    }

    pub fn for_stems(&self, merged_notes: &str) -> u64 {
        self.estimate(merged_notes, self.stem_output_estimate)
    }

    pub fn for_options(&self, items_text: &str) -> u64 {
        self.estimate(items_text, self.option_output_estimate)
    }
}
