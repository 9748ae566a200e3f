//! Best-effort step synthesis for answers that arrive without a worked
//! solution. Pattern matching only: anything it does not recognise yields an
//! empty list.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::classifier::{is_system_of_equations, split_equations};
use crate::models::Step;

pub const MAX_GENERIC_STEPS: usize = 10;
const MIN_PARAGRAPH_CHARS: usize = 20;

static LINEAR_EQUATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d+\w+\s*[+\-]\s*\d+)\s*=\s*(-?\d+)").expect("valid linear regex")
});

static LINEAR_EQUATION_LOOSE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+\w.*?)=\s*(-?\d+)").expect("valid linear regex"));

static LINEAR_TERMS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d*)\s*([a-zA-Z])\s*(?:([+\-])\s*(\d+))?").expect("valid terms regex")
});

static SYSTEM_ANSWER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"x\s*=\s*(-?\d+(?:\.\d+)?).*?y\s*=\s*(-?\d+(?:\.\d+)?)")
        .expect("valid answer regex")
});

static NUMBERED_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(?:step\s+)?\d+\s*[.):]\s*(.*)$").expect("valid numbered regex")
});

static FINAL_ANSWER_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?im)(?:final answer|answer|result):\s*(.+?)$",
        r"(?im)(?:therefore|thus|hence),?\s*(.+?)$",
        r"(?m)=\s*([^=\n]+?)$",
    ]
    .iter()
    .filter_map(|pattern| Regex::new(pattern).ok())
    .collect()
});

const TEXTBOOK_FIRST: &str = "2x + y = 5";
const TEXTBOOK_SECOND: &str = "x - y = 1";

pub fn synthesize_steps(query: &str, answer: &str) -> Vec<Step> {
    if is_system_of_equations(query) {
        return system_steps(query, answer);
    }
    linear_steps(query)
}

/// Three steps for `a·x + b = c`: restate, move the constant, divide.
pub fn linear_steps(query: &str) -> Vec<Step> {
    let Some(caps) = LINEAR_EQUATION
        .captures(query)
        .or_else(|| LINEAR_EQUATION_LOOSE.captures(query))
    else {
        return Vec::new();
    };

    let (Some(left), Some(right)) = (caps.get(1), caps.get(2)) else {
        return Vec::new();
    };
    let Ok(rhs) = right.as_str().trim().parse::<i64>() else {
        return Vec::new();
    };
    let Some(terms) = LINEAR_TERMS.captures(left.as_str().trim()) else {
        return Vec::new();
    };

    let coefficient = match terms.get(1).map(|m| m.as_str()).unwrap_or("") {
        "" => 1,
        digits => match digits.parse::<i64>() {
            Ok(value) => value,
            Err(_) => return Vec::new(),
        },
    };
    if coefficient == 0 {
        return Vec::new();
    }

    let variable = terms.get(2).map(|m| m.as_str()).unwrap_or("x");
    let constant = match (terms.get(3), terms.get(4)) {
        (Some(sign), Some(digits)) => {
            let Ok(value) = digits.as_str().parse::<i64>() else {
                return Vec::new();
            };
            if sign.as_str() == "-" {
                -value
            } else {
                value
            }
        }
        _ => 0,
    };

    let lhs = format_linear(coefficient, variable, constant);
    let isolated = i128::from(rhs) - i128::from(constant);
    let term = format!("{coefficient}{variable}");
    let solution = exact_quotient(isolated, i128::from(coefficient));

    let move_constant = if constant < 0 {
        format!(
            "Add {} to both sides: {term} = {rhs} + {}",
            -constant, -constant
        )
    } else {
        format!("Subtract {constant} from both sides: {term} = {rhs} - {constant}")
    };

    vec![
        Step::new(
            1,
            format!("Start with the equation: {lhs} = {rhs}"),
            format!("{lhs} = {rhs}"),
        ),
        Step::new(2, move_constant, format!("{term} = {isolated}")),
        Step::new(
            3,
            format!("Divide both sides by {coefficient}: {variable} = {solution}"),
            format!("{variable} = {solution}"),
        ),
    ]
}

/// Elimination walkthrough for two-equation systems. Needs exactly two
/// equations and an answer carrying both `x =` and `y =` values.
pub fn system_steps(query: &str, answer: &str) -> Vec<Step> {
    let equations = split_equations(query);
    let [first, second] = equations.as_slice() else {
        return Vec::new();
    };

    let Some(caps) = SYSTEM_ANSWER.captures(answer) else {
        return Vec::new();
    };
    let (Some(x), Some(y)) = (caps.get(1), caps.get(2)) else {
        return Vec::new();
    };
    let (x, y) = (x.as_str(), y.as_str());

    let mut steps = vec![
        Step::new(
            1,
            format!("Start with the system of equations:\n{first}\n{second}"),
            format!("\\begin{{cases}} {first} \\\\ {second} \\end{{cases}}"),
        ),
        Step::new(
            2,
            format!("Add the equations: ({first}) + ({second})"),
            format!("({first}) + ({second})"),
        ),
    ];

    if first.contains(TEXTBOOK_FIRST) && second.contains(TEXTBOOK_SECOND) {
        steps.push(Step::new(
            3,
            "Add the equations to eliminate y: (2x + y) + (x - y) = 5 + 1",
            "(2x + y) + (x - y) = 5 + 1",
        ));
        steps.push(Step::new(
            4,
            "Combine like terms: 3x + 0y = 6",
            "3x = 6",
        ));
        steps.push(Step::new(
            5,
            "Divide both sides by 3: x = 6/3 = 2",
            "x = \\frac{6}{3} = 2",
        ));
    } else {
        steps.push(Step::new(
            3,
            format!("Solve the system using an appropriate method to get x = {x}"),
            format!("x = {x}"),
        ));
    }

    let number = steps.len() as u32 + 1;
    steps.push(Step::new(
        number,
        format!("Substitute x = {x} into the first equation to solve for y: y = {y}"),
        format!("y = {y}"),
    ));

    steps
}

/// Splits free-form solution text into steps: numbered lines when present,
/// otherwise paragraphs long enough to carry content. Never more than ten.
pub fn steps_from_llm_text(text: &str) -> Vec<Step> {
    let mut numbered: Vec<String> = Vec::new();

    for line in text.lines() {
        if let Some(caps) = NUMBERED_LINE.captures(line) {
            let body = caps.get(1).map(|m| m.as_str().trim()).unwrap_or("");
            numbered.push(body.to_string());
        } else if let Some(current) = numbered.last_mut() {
            let line = line.trim();
            if !line.is_empty() {
                if !current.is_empty() {
                    current.push(' ');
                }
                current.push_str(line);
            }
        }
    }

    let bodies: Vec<String> = if numbered.iter().any(|body| !body.is_empty()) {
        numbered.into_iter().filter(|body| !body.is_empty()).collect()
    } else {
        text.split("\n\n")
            .map(str::trim)
            .filter(|paragraph| paragraph.chars().count() > MIN_PARAGRAPH_CHARS)
            .map(ToString::to_string)
            .collect()
    };

    bodies
        .into_iter()
        .take(MAX_GENERIC_STEPS)
        .enumerate()
        .map(|(index, body)| Step::new(index as u32 + 1, body.clone(), body))
        .collect()
}

pub fn extract_final_answer(text: &str) -> Option<String> {
    FINAL_ANSWER_PATTERNS.iter().find_map(|pattern| {
        pattern
            .captures(text)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().trim().to_string())
            .filter(|answer| !answer.is_empty())
    })
}

fn format_linear(coefficient: i64, variable: &str, constant: i64) -> String {
    match constant {
        0 => format!("{coefficient}{variable}"),
        c if c < 0 => format!("{coefficient}{variable} - {}", -c),
        c => format!("{coefficient}{variable} + {c}"),
    }
}

/// `numerator / denominator` as an integer when it divides evenly, otherwise
/// as a reduced fraction.
fn exact_quotient(numerator: i128, denominator: i128) -> String {
    if numerator % denominator == 0 {
        return (numerator / denominator).to_string();
    }

    let divisor = gcd(numerator.abs(), denominator.abs());
    let (mut num, mut den) = (numerator / divisor, denominator / divisor);
    if den < 0 {
        num = -num;
        den = -den;
    }
    format!("{num}/{den}")
}

fn gcd(mut a: i128, mut b: i128) -> i128 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a.max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_equation_yields_three_steps() {
        let steps = synthesize_steps("2x + 3 = 11", "x = 4");
        assert_eq!(steps.len(), 3);
        assert_eq!(steps[0].math, "2x + 3 = 11");
        assert_eq!(steps[1].math, "2x = 8");
        assert_eq!(steps[2].math, "x = 4");
        assert_eq!(
            steps.iter().map(|step| step.step_number).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }

    #[test]
    fn linear_division_stays_exact() {
        let steps = linear_steps("solve 2x + 3 = 10");
        assert_eq!(steps[2].math, "x = 7/2");

        let steps = linear_steps("4y - 2 = 4");
        assert_eq!(steps[1].math, "4y = 6");
        assert_eq!(steps[2].math, "y = 3/2");
        assert!(steps[1].description.starts_with("Add 2 to both sides"));
    }

    #[test]
    fn non_linear_text_yields_nothing() {
        assert!(linear_steps("what is the capital of france").is_empty());
    }

    #[test]
    fn textbook_system_yields_six_steps() {
        let steps = synthesize_steps("Solve the system: 2x + y = 5, x - y = 1", "x = 2, y = 1");
        assert_eq!(steps.len(), 6);
        let last = steps.last().expect("last step");
        assert_eq!(last.step_number, 6);
        assert_eq!(last.math, "y = 1");
    }

    #[test]
    fn other_systems_yield_four_steps() {
        let steps = synthesize_steps("3x + 2y = 12, x - y = -1", "x = 2 and y = 3");
        assert_eq!(steps.len(), 4);
        assert_eq!(steps[2].math, "x = 2");
        assert_eq!(steps[3].math, "y = 3");
    }

    #[test]
    fn and_separated_system_yields_walkthrough() {
        let steps = synthesize_steps("2x + y = 5 and x - y = 1", "x = 2, y = 1");
        assert_eq!(steps.len(), 6);
        assert_eq!(steps[0].math, "\\begin{cases} 2x + y = 5 \\\\ x - y = 1 \\end{cases}");
        assert_eq!(steps[5].math, "y = 1");
    }

    #[test]
    fn extreme_right_hand_side_does_not_overflow() {
        let steps = linear_steps("2x + 5 = -9223372036854775808");
        assert_eq!(steps[1].math, "2x = -9223372036854775813");
        assert_eq!(steps[2].math, "x = -9223372036854775813/2");

        let steps = linear_steps("3x = -9223372036854775808");
        assert_eq!(steps[2].math, "x = -9223372036854775808/3");
    }

    #[test]
    fn unsupported_systems_yield_nothing() {
        assert!(synthesize_steps("x + y + z = 3, x - y = 1, z = 1", "x = 1, y = 0").is_empty());
        assert!(synthesize_steps("2x + y = 5, x - y = 1", "no solution").is_empty());
    }

    #[test]
    fn numbered_llm_text_becomes_steps() {
        let text = "Here is how.\n1. Subtract 3 from both sides\n2) Divide by 2\nStep 3: Check the result\n  by substituting";
        let steps = steps_from_llm_text(text);
        assert_eq!(steps.len(), 3);
        assert_eq!(steps[1].description, "Divide by 2");
        assert_eq!(steps[2].description, "Check the result by substituting");
    }

    #[test]
    fn paragraph_fallback_skips_short_paragraphs() {
        let text = "Short one.\n\nThis paragraph is long enough to be a step.\n\nAnother paragraph that carries some content.";
        let steps = steps_from_llm_text(text);
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].step_number, 1);
        assert_eq!(steps[1].step_number, 2);
    }

    #[test]
    fn generic_steps_are_capped() {
        let numbered = (1..=25)
            .map(|n| format!("{n}. do thing number {n}"))
            .collect::<Vec<_>>()
            .join("\n");
        assert_eq!(steps_from_llm_text(&numbered).len(), MAX_GENERIC_STEPS);

        let paragraphs = (1..=25)
            .map(|n| format!("Paragraph {n} has plenty of words in it to count."))
            .collect::<Vec<_>>()
            .join("\n\n");
        let steps = steps_from_llm_text(&paragraphs);
        assert_eq!(steps.len(), MAX_GENERIC_STEPS);
        assert_eq!(steps.last().map(|step| step.step_number), Some(10));
    }

    #[test]
    fn final_answer_patterns_in_order() {
        assert_eq!(
            extract_final_answer("Work...\nFinal answer: x = 4\nDone").as_deref(),
            Some("x = 4")
        );
        assert_eq!(
            extract_final_answer("We simplify.\nTherefore, the area is 12").as_deref(),
            Some("the area is 12")
        );
        assert_eq!(extract_final_answer("2 + 2 = 4").as_deref(), Some("4"));
        assert_eq!(extract_final_answer("no conclusion here"), None);
    }
}
