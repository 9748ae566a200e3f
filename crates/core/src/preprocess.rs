use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::classifier::{is_system_of_equations, single_letter_tokens, split_equations};
use crate::models::{QueryType, UpstreamApi};

const INTERROGATIVE_PREFIXES: &[&str] = &["what is", "how to", "can you", "please"];

const FILLER_PREFIXES: &[&str] = &[
    "what is the",
    "how to calculate",
    "find the",
    "calculate",
    "what is",
    "how many",
    "how much",
];

static PLOT_ASSIGNMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)y\s*=\s*(.+?)(?:\s+(?:from|between)\s.*)?$").expect("valid plot regex")
});

static PLOT_RANGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:from|between)\s+(-?\d+(?:\.\d+)?)\s+(?:to|and)\s+(-?\d+(?:\.\d+)?)")
        .expect("valid range regex")
});

static SCIENTIFIC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+)e(\d+)").expect("valid scientific regex"));

static EVAL_COMMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\(\*.*?\*\)").expect("valid comment regex"));

static OCR_POWER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([a-zA-Z])(\d+)").expect("valid power regex"));

static OCR_CALL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\w+)\s*\(").expect("valid call regex"));

static OCR_OPERATOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*([+\-*/=])\s*").expect("valid operator regex"));

/// Reshapes a query for the endpoint it was routed to.
pub fn preprocess_for_api(query: &str, query_type: QueryType, api: UpstreamApi) -> String {
    let mut processed = query.trim().to_string();

    if matches!(api, UpstreamApi::LanguageEval | UpstreamApi::FullResults) {
        for prefix in INTERROGATIVE_PREFIXES {
            if let Some(rest) = strip_prefix_ignore_case(&processed, prefix) {
                processed = rest.trim().to_string();
            }
        }
    }

    if query_type == QueryType::EquationSolving && is_system_of_equations(&processed) {
        processed = format_system_query(&processed);
    }

    if query_type == QueryType::Plotting
        && api == UpstreamApi::LanguageEval
        && !processed.starts_with("Plot")
    {
        if let Some(plot) = plot_expression(&processed) {
            processed = plot;
        }
    }

    processed
}

/// `2x + y = 5, x - y = 1` becomes `Solve[{2x + y == 5, x - y == 1}, {x, y}]`.
/// A single equation comes back unchanged.
pub fn format_system_query(query: &str) -> String {
    let equations: Vec<String> = split_equations(query)
        .iter()
        .filter(|equation| equation.contains('='))
        .map(|equation| strip_leading_words(equation))
        .collect();

    if equations.len() < 2 {
        return query.to_string();
    }

    let variables: BTreeSet<char> = equations
        .iter()
        .flat_map(|equation| single_letter_tokens(equation))
        .collect();

    let converted = equations
        .iter()
        .map(|equation| to_equality(equation))
        .collect::<Vec<_>>()
        .join(", ");
    let variables = variables
        .iter()
        .map(char::to_string)
        .collect::<Vec<_>>()
        .join(", ");

    format!("Solve[{{{converted}}}, {{{variables}}}]")
}

/// Strips one filler phrase and expands `6e14` into `6*10^14`.
pub fn simplify_for_compute(query: &str) -> String {
    let trimmed = query.trim();
    let stripped = FILLER_PREFIXES
        .iter()
        .find_map(|prefix| strip_prefix_ignore_case(trimmed, prefix))
        .map(str::trim)
        .unwrap_or(trimmed);

    SCIENTIFIC.replace_all(stripped, "${1}*10^${2}").into_owned()
}

/// Drops `(* ... *)` comments and blank lines, then collapses whitespace.
pub fn clean_eval_code(code: &str) -> String {
    let joined = code
        .lines()
        .map(|line| EVAL_COMMENT.replace_all(line, "").trim().to_string())
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    crate::classifier::normalize_text(&joined)
}

pub fn post_process_ocr_text(text: &str) -> String {
    let replaced = text
        .replace(" x ", "*")
        .replace('÷', "/")
        .replace('×', "*")
        .replace('−', "-")
        .replace('·', "*");

    let powered = OCR_POWER.replace_all(&replaced, "${1}^${2}");
    let called = OCR_CALL.replace_all(&powered, "${1}(");
    let spaced = OCR_OPERATOR.replace_all(&called, " ${1} ");

    crate::classifier::normalize_text(&spaced)
}

fn plot_expression(query: &str) -> Option<String> {
    let function = PLOT_ASSIGNMENT
        .captures(query)?
        .get(1)?
        .as_str()
        .trim()
        .to_string();

    let (min, max) = PLOT_RANGE
        .captures(query)
        .and_then(|caps| Some((caps.get(1)?.as_str(), caps.get(2)?.as_str())))
        .unwrap_or(("-10", "10"));

    Some(format!("Plot[{function}, {{x, {min}, {max}}}]"))
}

fn strip_prefix_ignore_case<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let head = text.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        text.get(prefix.len()..)
    } else {
        None
    }
}

/// Drops instruction words such as "solve" or "find" ahead of the equation.
fn strip_leading_words(equation: &str) -> String {
    let words: Vec<&str> = equation.split_whitespace().collect();
    let start = words
        .iter()
        .position(|word| !(word.len() > 1 && word.chars().all(|c| c.is_ascii_alphabetic())))
        .unwrap_or(0);
    words[start..].join(" ")
}

/// Rewrites bare `=` as `==`, leaving `==`, `<=`, `>=` and `!=` alone.
fn to_equality(equation: &str) -> String {
    let chars: Vec<char> = equation.chars().collect();
    let mut out = String::with_capacity(equation.len() + 2);

    for (index, &ch) in chars.iter().enumerate() {
        let prev = index.checked_sub(1).map(|i| chars[i]);
        let next = chars.get(index + 1).copied();
        let bare = ch == '='
            && !matches!(prev, Some('=' | '<' | '>' | '!'))
            && next != Some('=');
        if bare {
            out.push_str("==");
        } else {
            out.push(ch);
        }
    }

    out
}
