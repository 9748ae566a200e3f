use crate::models::{
    EvalOutput, ImageMeta, LlmAnswer, NormalizedResult, Pod, PodResult, RawUpstreamResult, Step,
    Visualization,
};
use crate::steps::synthesize_steps;

pub const RESULT_POD_ID: &str = "Result";
const STEP_STATE_MARKER: &str = "Step-by-step";
const STEP_LINE_MARKERS: &[&str] = &["Step", "=", "→"];

/// Folds any of the four upstream envelopes into the canonical record.
pub fn normalize(raw: &RawUpstreamResult) -> NormalizedResult {
    match raw {
        RawUpstreamResult::ShowSteps(result) => result.clone(),
        RawUpstreamResult::FullResults(result) => normalize_pods(result),
        RawUpstreamResult::Llm(answer) => normalize_llm(answer),
        RawUpstreamResult::LanguageEval(output) => normalize_eval(output),
    }
}

fn normalize_pods(result: &PodResult) -> NormalizedResult {
    NormalizedResult {
        original_query: result.original_query.clone(),
        success: result.success,
        final_answer: result_answer(&result.pods),
        steps: Vec::new(),
        visualizations: plot_visualizations(&result.pods),
        error: result.error.clone(),
    }
}

fn normalize_llm(answer: &LlmAnswer) -> NormalizedResult {
    NormalizedResult {
        original_query: answer.original_query.clone(),
        success: answer.success,
        final_answer: answer.result.clone(),
        steps: Vec::new(),
        visualizations: Vec::new(),
        error: answer.error.clone(),
    }
}

fn normalize_eval(output: &EvalOutput) -> NormalizedResult {
    let mut visualizations = Vec::new();
    if output.output_type == "image" {
        if let Some(src) = output.output.as_ref().filter(|src| !src.is_empty()) {
            visualizations.push(Visualization {
                title: "Plot".to_string(),
                image: ImageMeta {
                    src: src.clone(),
                    alt: Some(output.original_code.clone()),
                    width: None,
                    height: None,
                },
            });
        }
    }

    NormalizedResult {
        original_query: output.original_code.clone(),
        success: output.success,
        final_answer: output.output.clone(),
        steps: Vec::new(),
        visualizations,
        error: output.error.clone(),
    }
}

/// First subpod plaintext of the `Result` pod, if the upstream returned one.
pub fn result_answer(pods: &[Pod]) -> Option<String> {
    pods.iter()
        .find(|pod| pod.id == RESULT_POD_ID)
        .and_then(|pod| pod.subpods.first())
        .and_then(|subpod| subpod.plaintext.clone())
}

pub fn plot_visualizations(pods: &[Pod]) -> Vec<Visualization> {
    pods.iter()
        .filter(|pod| pod.id != RESULT_POD_ID && pod.id.to_lowercase().contains("plot"))
        .flat_map(|pod| {
            pod.subpods.iter().filter_map(|subpod| {
                subpod.img.clone().map(|image| Visualization {
                    title: pod.title.clone(),
                    image,
                })
            })
        })
        .collect()
}

pub fn has_step_states(pods: &[Pod]) -> bool {
    pods.iter()
        .flat_map(|pod| pod.states.iter())
        .any(|state| state.name.contains(STEP_STATE_MARKER) && state.stepbystep)
}

/// Step lines out of a pod whose subpods hold the expanded solution.
pub fn extract_steps_from_pod(pod: &Pod) -> Vec<Step> {
    let mut steps: Vec<Step> = Vec::new();

    let lines = pod
        .subpods
        .iter()
        .filter_map(|subpod| subpod.plaintext.as_deref())
        .flat_map(str::lines)
        .map(str::trim)
        .filter(|line| !line.is_empty());

    for line in lines {
        if STEP_LINE_MARKERS.iter().any(|marker| line.contains(marker)) {
            let number = steps.len() as u32 + 1;
            steps.push(Step::new(number, line, line));
        }
    }

    steps
}

/// Builds the show-steps record from a pod list: answer and step lines from
/// the `Result` pod, plots from any plot pod, and synthesized steps when the
/// upstream solved the problem without sending any.
pub fn steps_result_from_pods(
    original_query: &str,
    success: bool,
    pods: &[Pod],
) -> NormalizedResult {
    let mut result = NormalizedResult {
        original_query: original_query.to_string(),
        success,
        final_answer: result_answer(pods),
        steps: Vec::new(),
        visualizations: plot_visualizations(pods),
        error: None,
    };

    if let Some(pod) = pods.iter().find(|pod| pod.id == RESULT_POD_ID) {
        if pod
            .states
            .iter()
            .any(|state| state.name.contains(STEP_STATE_MARKER))
        {
            result.steps = extract_steps_from_pod(pod);
        }
    }

    if result.steps.is_empty() && result.success {
        if let Some(answer) = result.final_answer.as_deref() {
            result.steps = synthesize_steps(original_query, answer);
        }
    }

    result
}

/// Best available answer text, used when building prompts.
pub fn extract_solution(result: &NormalizedResult) -> String {
    result
        .final_answer
        .clone()
        .filter(|answer| !answer.trim().is_empty())
        .unwrap_or_else(|| "Solution not available".to_string())
}

/// Renders a result as plain text for a completion prompt.
pub fn format_for_prompt(result: &NormalizedResult) -> String {
    let mut lines = vec![format!("Original Query: {}", result.original_query)];

    if let Some(answer) = &result.final_answer {
        lines.push(format!("Final Answer: {answer}"));
    }

    if result.steps.is_empty() {
        lines.push("\nNote: No detailed steps were provided by the computation engine.".to_string());
    } else {
        lines.push("\nSteps:".to_string());
        for step in &result.steps {
            lines.push(format!("  {}. {}", step.step_number, step.description));
        }
    }

    lines.push(format!(
        "\nComputation Status: {}",
        if result.success { "Successful" } else { "Failed" }
    ));

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EvalOutput, PodState, Subpod};

    fn pod(id: &str, title: &str, plaintext: Option<&str>, img: Option<&str>) -> Pod {
        Pod {
            id: id.to_string(),
            title: title.to_string(),
            position: None,
            subpods: vec![Subpod {
                title: None,
                plaintext: plaintext.map(str::to_string),
                img: img.map(|src| ImageMeta {
                    src: src.to_string(),
                    alt: None,
                    width: Some(300),
                    height: Some(200),
                }),
            }],
            states: Vec::new(),
        }
    }

    #[test]
    fn result_pod_supplies_final_answer() {
        let raw = RawUpstreamResult::FullResults(PodResult {
            original_query: "6 * 7".to_string(),
            success: true,
            pods: vec![
                pod("Input", "Input", Some("6×7"), None),
                pod("Result", "Result", Some("42"), None),
            ],
            ..PodResult::default()
        });

        let normalized = normalize(&raw);
        assert_eq!(normalized.final_answer.as_deref(), Some("42"));
        assert!(normalized.success);
        assert!(normalized.visualizations.is_empty());
    }

    #[test]
    fn plot_pods_become_visualizations() {
        let raw = RawUpstreamResult::FullResults(PodResult {
            original_query: "plot sin x".to_string(),
            success: true,
            pods: vec![
                pod("Plot", "Plots", None, Some("https://img/1.gif")),
                pod("ContourPlot", "Contour", None, Some("https://img/2.gif")),
                pod("Alternate", "Alt", Some("text"), None),
            ],
            ..PodResult::default()
        });

        let normalized = normalize(&raw);
        assert_eq!(normalized.final_answer, None);
        assert_eq!(normalized.visualizations.len(), 2);
        assert_eq!(normalized.visualizations[0].title, "Plots");
        assert_eq!(normalized.visualizations[1].image.src, "https://img/2.gif");
    }

    #[test]
    fn missing_result_pod_is_not_an_error() {
        let raw = RawUpstreamResult::FullResults(PodResult {
            original_query: "something".to_string(),
            success: true,
            pods: vec![pod("Input", "Input", Some("x"), None)],
            ..PodResult::default()
        });

        let normalized = normalize(&raw);
        assert!(normalized.success);
        assert!(normalized.final_answer.is_none());
        assert!(normalized.error.is_none());
    }

    #[test]
    fn image_eval_output_is_a_visualization() {
        let raw = RawUpstreamResult::LanguageEval(EvalOutput {
            original_code: "Plot[x^2, {x, 0, 1}]".to_string(),
            success: true,
            output: Some("https://img/plot.png".to_string()),
            output_type: "image".to_string(),
            ..EvalOutput::default()
        });

        let normalized = normalize(&raw);
        assert_eq!(normalized.visualizations.len(), 1);
        assert_eq!(normalized.final_answer.as_deref(), Some("https://img/plot.png"));
    }

    #[test]
    fn step_states_are_detected() {
        let mut result = pod("Result", "Result", Some("x = 4"), None);
        assert!(!has_step_states(std::slice::from_ref(&result)));

        result.states.push(PodState {
            name: "Step-by-step solution".to_string(),
            input: Some("Result__Step-by-step solution".to_string()),
            stepbystep: true,
        });
        assert!(has_step_states(&[result]));
    }

    #[test]
    fn steps_come_from_the_result_pod() {
        let mut result = pod(
            "Result",
            "Result",
            Some("x = 4\nStep 1: subtract 3\nnoise\nStep 2: divide by 2"),
            None,
        );
        result.states.push(PodState {
            name: "Step-by-step solution".to_string(),
            input: None,
            stepbystep: true,
        });

        let normalized = steps_result_from_pods("2x + 3 = 11", true, &[result]);
        assert_eq!(normalized.final_answer.as_deref(), Some("x = 4"));
        assert_eq!(normalized.steps.len(), 3);
        assert_eq!(normalized.steps[2].description, "Step 2: divide by 2");
    }

    #[test]
    fn steps_are_synthesized_when_missing() {
        let result = pod("Result", "Result", Some("x = 4"), None);
        let normalized = steps_result_from_pods("2x + 3 = 11", true, &[result]);
        assert_eq!(normalized.steps.len(), 3);
        assert_eq!(normalized.steps[2].math, "x = 4");
    }
}
