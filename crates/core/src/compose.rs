use serde_json::{json, Value};

use crate::classifier::contains_any;
use crate::clarify::ClarificationGate;
use crate::models::{
    EducationalContent, Enhancement, FallbackSolution, NormalizedResult, SolveResponse,
};

pub const DEFAULT_KEY_INSIGHT: &str =
    "Solving equations involves isolating the variable using inverse operations.";
pub const DEFAULT_COMMON_MISTAKE: &str =
    "Forgetting to perform the same operation on both sides of the equation.";
pub const DEFAULT_TIP: &str =
    "Always check your solution by substituting it back into the original equation.";
pub const DEFAULT_APPLICATION: &str =
    "Equation solving is used in physics, engineering, and financial calculations.";

pub fn clarification_response(query: &str, gate: &ClarificationGate) -> SolveResponse {
    SolveResponse {
        success: false,
        query: query.to_string(),
        result: json!({}),
        explanation: None,
        steps: None,
        educational_content: None,
        visualizations: None,
        concepts: Vec::new(),
        difficulty: None,
        prerequisites: Vec::new(),
        practice_problems: Vec::new(),
        clarifications: Some(gate.questions.clone()),
        error: Some(gate.error_message()),
    }
}

pub fn failure_response(query: &str, error: impl Into<String>) -> SolveResponse {
    SolveResponse {
        success: false,
        query: query.to_string(),
        result: json!({}),
        explanation: None,
        steps: None,
        educational_content: None,
        visualizations: None,
        concepts: Vec::new(),
        difficulty: None,
        prerequisites: Vec::new(),
        practice_problems: Vec::new(),
        clarifications: None,
        error: Some(error.into()),
    }
}

pub fn fallback_response(query: &str, solution: FallbackSolution) -> SolveResponse {
    SolveResponse {
        success: true,
        query: query.to_string(),
        result: to_value(&solution),
        explanation: solution.explanation.clone(),
        steps: Some(solution.steps.clone()),
        educational_content: solution.educational_content.clone(),
        visualizations: Some(solution.visualizations.clone()),
        concepts: Vec::new(),
        difficulty: None,
        prerequisites: Vec::new(),
        practice_problems: Vec::new(),
        clarifications: None,
        error: None,
    }
}

/// Final response for a request the computation engine handled.
pub fn solved_response(
    query: &str,
    result: &NormalizedResult,
    show_steps: bool,
    enhancement: Option<Enhancement>,
) -> SolveResponse {
    let steps = (show_steps && !result.steps.is_empty()).then(|| result.steps.clone());
    let visualizations =
        (!result.visualizations.is_empty()).then(|| result.visualizations.clone());

    let enhancement = enhancement.unwrap_or_default();
    let explanation = (!enhancement.explanation.is_empty()).then_some(enhancement.explanation);
    let difficulty = (!enhancement.difficulty.is_empty()).then_some(enhancement.difficulty);

    SolveResponse {
        success: true,
        query: query.to_string(),
        result: to_value(result),
        explanation,
        steps,
        educational_content: enhancement.educational_content,
        visualizations,
        concepts: enhancement.concepts,
        difficulty,
        prerequisites: enhancement.prerequisites,
        practice_problems: enhancement.practice_problems,
        clarifications: None,
        error: None,
    }
}

pub fn assess_difficulty(query: &str) -> &'static str {
    let lower = query.to_lowercase();

    if contains_any(&lower, &["basic", "simple", "elementary"]) {
        "beginner"
    } else if contains_any(&lower, &["partial differential", "tensor", "manifold"]) {
        "expert"
    } else if contains_any(&lower, &["differential", "integral", "matrix", "eigenvalue"]) {
        "advanced"
    } else {
        "intermediate"
    }
}

pub fn prerequisites_for(query: &str) -> Vec<String> {
    let lower = query.to_lowercase();
    let table: &[(&str, &[&str])] = &[
        ("integral", &["derivatives", "basic calculus", "functions"]),
        ("derivative", &["limits", "functions", "algebra"]),
        ("matrix", &["linear equations", "vectors", "algebra"]),
        ("differential equation", &["calculus", "derivatives", "integration"]),
        ("limit", &["functions", "continuity", "algebra"]),
    ];

    let mut prerequisites: Vec<String> = Vec::new();
    for (keyword, needs) in table {
        if !lower.contains(keyword) {
            continue;
        }
        for need in *needs {
            if !prerequisites.iter().any(|known| known == need) {
                prerequisites.push(need.to_string());
            }
        }
    }

    prerequisites.truncate(3);
    prerequisites
}

pub fn tips_for(query: &str) -> Vec<String> {
    let lower = query.to_lowercase();

    let tips: &[&str] = if lower.contains("integral") {
        &[
            "Look for substitution opportunities to simplify the integral",
            "Check if integration by parts might be helpful",
        ]
    } else if lower.contains("derivative") {
        &[
            "Apply chain rule carefully for composite functions",
            "Remember the product rule for multiplied functions",
        ]
    } else if lower.contains("solve") {
        &[
            "Isolate the variable step by step",
            "Check your solution by substituting back",
        ]
    } else {
        &[]
    };

    tips.iter().take(2).map(|tip| tip.to_string()).collect()
}

pub fn fallback_explanation(final_answer: Option<&str>) -> String {
    format!(
        "This appears to be a mathematical equation solving problem.\n\n\
         The equation was solved and the result is: {}\n\n\
         For basic algebraic equations like this, the solution typically involves:\n\
         1. Identifying the variable to solve for\n\
         2. Using inverse operations to isolate the variable\n\
         3. Performing the same operation on both sides of the equation\n\n\
         This follows the fundamental principle of algebra that you can perform any \
         operation on an equation as long as you do the same thing to both sides.",
        final_answer.unwrap_or("Unknown")
    )
}

pub fn fallback_concepts() -> Vec<String> {
    ["equation solving", "algebra", "inverse operations"]
        .iter()
        .map(|concept| concept.to_string())
        .collect()
}

pub fn default_summary(student_level: &str) -> String {
    format!("This is a {student_level}-level math problem involving equation solving.")
}

/// Educational content attached to answers from the completion fallback.
pub fn placeholder_educational_content(student_level: &str) -> EducationalContent {
    EducationalContent {
        summary: format!("This is a {student_level}-level mathematical problem."),
        ..EducationalContent::default()
    }
}

fn to_value<T: serde::Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or_else(|_| json!({}))
}
