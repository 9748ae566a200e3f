use mathgate_core::compose::placeholder_educational_content;
use mathgate_core::{extract_final_answer, steps_from_llm_text, ChatMessage, FallbackSolution};
use mathgate_upstream::{CompletionEngine, CompletionOptions};
use tracing::{info, warn};

/// Asks the completion model to solve a query the computation engine could not.
pub async fn solve_with_completion<L>(
    completion: &L,
    query: &str,
    student_level: &str,
    show_steps: bool,
) -> FallbackSolution
where
    L: CompletionEngine,
{
    let system = format!(
        "You are an expert mathematician and educator. Solve the given mathematical problem \
         with clear explanations appropriate for a {student_level} level student.\n\n\
         For complex analysis problems involving contour integrals, residue theorem, etc., provide:\n\
         1. A complete step-by-step solution\n\
         2. Clear explanation of concepts used\n\
         3. Verification of the result when possible\n\
         4. Educational insights about the mathematical concepts\n\n\
         Format your response as a structured solution with clear sections."
    );
    let user = if show_steps {
        format!(
            "Solve this mathematical problem step by step:\n\n{query}\n\n\
             Please provide:\n\
             1. A clear final answer\n\
             2. Step-by-step solution process\n\
             3. Explanation of key concepts used\n\
             4. Any relevant mathematical insights"
        )
    } else {
        format!("Solve this mathematical problem: {query}\n\nProvide a clear answer with brief explanation.")
    };

    match completion
        .complete(
            &[ChatMessage::system(system), ChatMessage::user(user)],
            CompletionOptions::temperature(0.6),
        )
        .await
    {
        Ok(response) => {
            let steps = if show_steps {
                steps_from_llm_text(&response)
            } else {
                Vec::new()
            };
            info!(steps = steps.len(), "completion fallback answered");

            FallbackSolution {
                original_query: query.to_string(),
                success: true,
                final_answer: extract_final_answer(&response),
                explanation: Some(response),
                steps,
                educational_content: Some(placeholder_educational_content(student_level)),
                visualizations: Vec::new(),
                error: None,
            }
        }
        Err(error) => {
            warn!(error = %error, "completion fallback failed");
            FallbackSolution {
                original_query: query.to_string(),
                success: false,
                error: Some(error.to_string()),
                ..FallbackSolution::default()
            }
        }
    }
}
