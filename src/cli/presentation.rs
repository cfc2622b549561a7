//! CLI presentation: tables and JSON for command results.

use crate::error::GenerationError;
use crate::scanner::ScanReport;
use crate::types::{GenerationOutcome, GroupId, QuizWithOptions, StepNumber};
use comfy_table::presets::UTF8_FULL;
use comfy_table::Table;
use serde_json::json;

fn to_pretty_json(value: &serde_json::Value) -> Result<String, GenerationError> {
    serde_json::to_string_pretty(value)
        .map_err(|e| GenerationError::ConfigError(format!("Failed to render JSON: {}", e)))
}

fn outcome_detail(outcome: &GenerationOutcome) -> String {
    match outcome {
        GenerationOutcome::Persisted { quizzes } => format!("{} quizzes", quizzes),
        GenerationOutcome::Failed { reason } => reason.clone(),
        _ => "-".to_string(),
    }
}

pub fn format_outcome(group_id: GroupId, step: StepNumber, outcome: &GenerationOutcome) -> String {
    let detail = outcome_detail(outcome);
    if detail == "-" {
        format!("group={} step={}: {}", group_id, step, outcome.label())
    } else {
        format!("group={} step={}: {} ({})", group_id, step, outcome.label(), detail)
    }
}

pub fn format_scan_report(report: &ScanReport, format: &str) -> Result<String, GenerationError> {
    if format == "json" {
        let entries: Vec<serde_json::Value> = report
            .entries
            .iter()
            .map(|e| {
                json!({
                    "group_id": e.group_id,
                    "step": e.step,
                    "outcome": e.outcome.label(),
                    "detail": outcome_detail(&e.outcome),
                })
            })
            .collect();
        return to_pretty_json(&json!({
            "candidates": report.candidates,
            "persisted": report.persisted(),
            "failed": report.failed(),
            "interrupted": report.interrupted,
            "entries": entries,
        }));
    }

    if report.entries.is_empty() && !report.interrupted {
        return Ok("No steps due for quiz generation.".to_string());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Group", "Step", "Outcome", "Detail"]);
    for e in &report.entries {
        table.add_row(vec![
            e.group_id.to_string(),
            e.step.to_string(),
            e.outcome.label().to_string(),
            outcome_detail(&e.outcome),
        ]);
    }

    let mut out = table.to_string();
    out.push_str(&format!(
        "\n{} candidates, {} persisted, {} failed",
        report.candidates,
        report.persisted(),
        report.failed()
    ));
    if report.interrupted {
        out.push_str(" (interrupted)");
    }
    Ok(out)
}

pub fn format_quizzes(quizzes: &[QuizWithOptions], format: &str) -> Result<String, GenerationError> {
    if format == "json" {
        let value = serde_json::to_value(quizzes)
            .map_err(|e| GenerationError::ConfigError(format!("Failed to render JSON: {}", e)))?;
        return to_pretty_json(&value);
    }

    if quizzes.is_empty() {
        return Ok("No quizzes found.".to_string());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Quiz", "Stem", "Choices", "Created"]);
    for q in quizzes {
        let choices = q
            .options
            .iter()
            .map(|o| {
                let marker = if o.is_answer { "*" } else { " " };
                format!("{}{}. {}", marker, o.option_number, o.content)
            })
            .collect::<Vec<_>>()
            .join("\n");
        table.add_row(vec![
            q.quiz.id.to_string(),
            q.quiz.stem.clone(),
            choices,
            q.quiz.created_at.to_rfc3339(),
        ]);
    }
    Ok(table.to_string())
}
