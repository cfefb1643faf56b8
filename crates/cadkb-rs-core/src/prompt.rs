//! Rendering of similarity matches for prompt injection.

use crate::knowledge::SimilarOperations;
use crate::solutions::SimilarSolutions;
use std::fmt::Write;

const HEADER: &str = "### Similar Previous Operations:";
const SOLUTIONS_HEADER: &str = "### Potential Solutions for Recent Errors:";

/// Render matches as a markdown list, one line per operation.
///
/// Returns an empty string when there is nothing to show so callers can
/// skip the section entirely.
pub fn format_for_prompt(similar: &SimilarOperations) -> String {
    if similar.matches.is_empty() {
        return String::new();
    }
    let mut out = String::from(HEADER);
    for scored in &similar.matches {
        let record = &scored.record;
        let outcome = match (record.success, record.error_message.as_deref()) {
            (true, _) => "succeeded".to_string(),
            (false, Some(message)) => format!("failed: {message}"),
            (false, None) => "failed".to_string(),
        };
        let _ = write!(
            out,
            "\n- {} ({}) score={:.2}",
            record.operation_type, outcome, scored.score
        );
        if !record.parameters.is_empty() {
            let params = record
                .parameters
                .iter()
                .map(|(key, value)| format!("{key}={value}"))
                .collect::<Vec<_>>()
                .join(", ");
            let _ = write!(out, " [{params}]");
        }
    }
    out
}

/// Render solutions as a markdown list with their steps numbered beneath.
///
/// Empty when nothing matched.
pub fn format_solutions_for_prompt(similar: &SimilarSolutions) -> String {
    if similar.matches.is_empty() {
        return String::new();
    }
    let mut out = String::from(SOLUTIONS_HEADER);
    for scored in &similar.matches {
        let _ = write!(out, "\n- {}", scored.solution.solution);
        for (index, step) in scored.solution.solution_steps.iter().enumerate() {
            let _ = write!(out, "\n  {}. {step}", index + 1);
        }
    }
    out
}
