use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::classifier::{is_system_of_equations, single_letter_tokens};

pub const PLOT_RANGE_QUESTION: &str =
    "What range would you like for the plot? (e.g., from -10 to 10)";

static NUMERIC_RANGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d+\s*to\s*\d+").expect("valid range regex"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClarificationReason {
    AmbiguousVariable(Vec<char>),
    MissingPlotRange,
}

#[derive(Debug, Clone, Default)]
pub struct ClarificationGate {
    pub reasons: Vec<ClarificationReason>,
    pub questions: Vec<String>,
}

impl ClarificationGate {
    pub fn blocked(&self) -> bool {
        !self.questions.is_empty()
    }

    pub fn error_message(&self) -> String {
        format!("Please clarify: {}", self.questions.join("; "))
    }
}

pub fn evaluate_query(query: &str) -> ClarificationGate {
    let lower = query.to_lowercase();
    let mut gate = ClarificationGate::default();

    if lower.contains("solve") && !is_system_of_equations(query) {
        let variables: BTreeSet<char> = single_letter_tokens(query)
            .into_iter()
            .filter(char::is_ascii_lowercase)
            .collect();

        if variables.len() > 1 {
            let listed = variables
                .iter()
                .map(char::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            gate.questions
                .push(format!("Which variable should I solve for: {listed}?"));
            gate.reasons.push(ClarificationReason::AmbiguousVariable(
                variables.into_iter().collect(),
            ));
        }
    }

    if lower.contains("plot")
        && !lower.contains("from")
        && !lower.contains("between")
        && !NUMERIC_RANGE.is_match(&lower)
    {
        gate.questions.push(PLOT_RANGE_QUESTION.to_string());
        gate.reasons.push(ClarificationReason::MissingPlotRange);
    }

    gate
}

/// Questions to ask before dispatching, or `None` when the query is clear.
pub fn requires_clarification(query: &str) -> Option<Vec<String>> {
    let gate = evaluate_query(query);
    if gate.blocked() {
        Some(gate.questions)
    } else {
        None
    }
}
