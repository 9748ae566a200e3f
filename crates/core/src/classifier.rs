use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::{DispatchParams, EvalFormat, QueryType, UpstreamApi};

pub const STEP_KEYWORDS: &[&str] = &[
    "step",
    "steps",
    "show work",
    "derive",
    "proof",
    "explain how",
    "walkthrough",
    "solution process",
    "show me how",
];

pub const PLOT_KEYWORDS: &[&str] = &[
    "plot",
    "graph",
    "visualize",
    "draw",
    "sketch",
    "chart",
    "diagram",
    "curve",
    "function graph",
    "3d plot",
];

pub const ENGINEERING_KEYWORDS: &[&str] = &[
    "circuit",
    "impedance",
    "resistance",
    "capacitor",
    "inductor",
    "frequency",
    "transfer function",
    "bode",
    "nyquist",
    "control",
    "signal",
    "filter",
    "amplifier",
    "voltage",
    "current",
];

pub const CALCULUS_KEYWORDS: &[&str] = &[
    "derivative",
    "integral",
    "limit",
    "differentiate",
    "integrate",
    "d/dx",
    "∫",
    "lim",
    "partial derivative",
    "gradient",
];

pub const COMPLEX_ANALYSIS_KEYWORDS: &[&str] = &[
    "contour integral",
    "residue theorem",
    "complex analysis",
    "analytic function",
    "holomorphic",
    "meromorphic",
    "pole",
    "residue",
    "cauchy",
    "laurent series",
    "complex plane",
    "∮",
    "line integral",
    "path integral",
    "branch cut",
];

const EQUATION_KEYWORDS: &[&str] = &["equation", "solve for"];

pub const SYSTEM_KEYWORDS: &[&str] = &["system", "systems", "simultaneous"];

const PLOT_POD_IDS: &[&str] = &["Plot", "3DPlot", "ContourPlot"];

static SIMPLE_CALCULATION_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"^\d+[\s+\-*/^]+\d+",
        r"^\d+\s*\*\s*10\^\d+",
        r"^sqrt\(",
        r"^log\(",
    ]
    .iter()
    .filter_map(|pattern| Regex::new(pattern).ok())
    .collect()
});

static SYSTEM_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^.*?\bsystems?\b(?:\s+of\s+equations)?\s*:?\s*").expect("valid regex")
});

static AND_SEPARATOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\s+and\s+").expect("valid regex"));

pub fn normalize_text(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Routes a query to a category and the upstream endpoint that serves it.
///
/// Rules are checked in priority order and the first match wins, so a plot
/// request mentioning "steps" is still a plot.
pub fn classify(query: &str) -> (QueryType, UpstreamApi) {
    let lower = query.to_lowercase();

    if contains_any(&lower, PLOT_KEYWORDS) {
        return (QueryType::Plotting, UpstreamApi::LanguageEval);
    }

    if contains_any(&lower, STEP_KEYWORDS) {
        return (QueryType::StepByStepMath, UpstreamApi::ShowSteps);
    }

    if contains_any(&lower, COMPLEX_ANALYSIS_KEYWORDS) {
        return (QueryType::ComplexAnalysis, UpstreamApi::FullResults);
    }

    if contains_any(&lower, ENGINEERING_KEYWORDS) {
        return (QueryType::PhysicsEngineering, UpstreamApi::Llm);
    }

    if contains_any(&lower, CALCULUS_KEYWORDS) {
        return (QueryType::SymbolicMath, UpstreamApi::FullResults);
    }

    if query.contains('=') || contains_any(&lower, EQUATION_KEYWORDS) {
        if is_system_of_equations(query) {
            return (QueryType::EquationSolving, UpstreamApi::FullResults);
        }
        return (QueryType::EquationSolving, UpstreamApi::ShowSteps);
    }

    if is_simple_calculation(query) {
        return (QueryType::SimpleCalculation, UpstreamApi::Llm);
    }

    (QueryType::NaturalLanguage, UpstreamApi::Llm)
}

/// A query is a system when it carries more than one `=` or names itself a
/// system. Comma- or "and"-separated clauses that each hold an `=` are
/// covered by the count.
pub fn is_system_of_equations(query: &str) -> bool {
    if query.matches('=').count() > 1 {
        return true;
    }

    let lower = query.to_lowercase();
    lower
        .split(|c: char| !c.is_alphanumeric())
        .any(|word| SYSTEM_KEYWORDS.contains(&word))
}

pub fn is_simple_calculation(query: &str) -> bool {
    let trimmed = query.trim();
    SIMPLE_CALCULATION_PATTERNS
        .iter()
        .any(|pattern| pattern.is_match(trimmed))
}

pub fn api_params(query_type: QueryType, api: UpstreamApi) -> DispatchParams {
    let mut params = DispatchParams::default();

    match api {
        UpstreamApi::ShowSteps => {
            params.show_steps = true;
            params.formats = vec!["plaintext".to_string()];
        }
        UpstreamApi::FullResults => {
            params.formats = vec!["plaintext".to_string(), "image".to_string()];
            if query_type == QueryType::Plotting {
                params.include_pod_ids = PLOT_POD_IDS.iter().map(|id| id.to_string()).collect();
            }
        }
        UpstreamApi::LanguageEval => {
            params.eval_format = if query_type == QueryType::Plotting {
                EvalFormat::Image
            } else {
                EvalFormat::String
            };
        }
        UpstreamApi::Llm => {
            params.max_chars = Some(10_000);
        }
    }

    params
}

/// Removes a leading "Solve the system:"-style preamble.
pub fn strip_system_preamble(query: &str) -> String {
    SYSTEM_PREFIX.replace(query.trim(), "").trim().to_string()
}

/// Splits a system into its equations on commas, or on the word "and" when
/// no comma is present.
pub fn split_equations(query: &str) -> Vec<String> {
    let clean = strip_system_preamble(query);

    let parts: Vec<&str> = if clean.contains(',') {
        clean.split(',').collect()
    } else if AND_SEPARATOR.is_match(&clean) {
        AND_SEPARATOR.split(&clean).collect()
    } else {
        vec![clean.as_str()]
    };

    parts
        .into_iter()
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// Single-letter alphabetic tokens, e.g. `x` and `y` in `2x + y = 5`.
pub fn single_letter_tokens(text: &str) -> Vec<char> {
    text.split(|c: char| !c.is_ascii_alphabetic())
        .filter_map(|token| {
            let mut chars = token.chars();
            match (chars.next(), chars.next()) {
                (Some(letter), None) => Some(letter),
                _ => None,
            }
        })
        .collect()
}

pub(crate) fn contains_any(input: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| input.contains(needle))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_equation_goes_to_show_steps() {
        for query in ["2x + 3 = 11", "solve 5y - 2 = 8", "x^2 = 16"] {
            assert_eq!(
                classify(query),
                (QueryType::EquationSolving, UpstreamApi::ShowSteps),
                "{query}"
            );
        }
    }

    #[test]
    fn systems_go_to_full_results() {
        for query in [
            "2x + y = 5, x - y = 1",
            "2x + y = 5 and x - y = 1",
            "solve the simultaneous equations",
        ] {
            assert_eq!(
                classify(query),
                (QueryType::EquationSolving, UpstreamApi::FullResults),
                "{query}"
            );
        }
    }

    #[test]
    fn plot_wins_over_steps() {
        assert_eq!(
            classify("plot the steps of y = x^2"),
            (QueryType::Plotting, UpstreamApi::LanguageEval)
        );
    }

    #[test]
    fn calculus_routes() {
        assert_eq!(
            classify("derivative of sin(x)"),
            (QueryType::SymbolicMath, UpstreamApi::FullResults)
        );
        assert_eq!(
            classify("show steps for the derivative of x^2"),
            (QueryType::StepByStepMath, UpstreamApi::ShowSteps)
        );
        assert_eq!(
            classify("contour integral of 1/z around the unit circle"),
            (QueryType::ComplexAnalysis, UpstreamApi::FullResults)
        );
    }

    #[test]
    fn engineering_and_arithmetic_route_to_llm() {
        assert_eq!(
            classify("impedance of a 10 ohm resistor in series with a capacitor"),
            (QueryType::PhysicsEngineering, UpstreamApi::Llm)
        );
        assert_eq!(
            classify("12 * 7"),
            (QueryType::SimpleCalculation, UpstreamApi::Llm)
        );
        assert_eq!(
            classify("sqrt(144)"),
            (QueryType::SimpleCalculation, UpstreamApi::Llm)
        );
        assert_eq!(
            classify("population of france"),
            (QueryType::NaturalLanguage, UpstreamApi::Llm)
        );
    }

    #[test]
    fn splits_equations_after_preamble() {
        assert_eq!(
            split_equations("Solve the system: 2x + y = 5, x - y = 1"),
            vec!["2x + y = 5".to_string(), "x - y = 1".to_string()]
        );
        assert_eq!(
            split_equations("a + b = 3 AND a - b = 1"),
            vec!["a + b = 3".to_string(), "a - b = 1".to_string()]
        );
    }

    #[test]
    fn finds_variables_next_to_coefficients() {
        assert_eq!(single_letter_tokens("2x + 3y = 5"), vec!['x', 'y']);
        assert!(single_letter_tokens("solve this").is_empty());
    }

    #[test]
    fn plotting_params_request_plot_pods() {
        let params = api_params(QueryType::Plotting, UpstreamApi::FullResults);
        assert_eq!(params.include_pod_ids, vec!["Plot", "3DPlot", "ContourPlot"]);

        let eval = api_params(QueryType::Plotting, UpstreamApi::LanguageEval);
        assert_eq!(eval.eval_format, EvalFormat::Image);
    }
}
