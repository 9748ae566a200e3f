use std::sync::Arc;

use mathgate_core::compose::{
    assess_difficulty, default_summary, fallback_concepts, fallback_explanation,
    prerequisites_for, tips_for, DEFAULT_APPLICATION, DEFAULT_COMMON_MISTAKE, DEFAULT_KEY_INSIGHT,
};
use mathgate_core::normalizer::{extract_solution, format_for_prompt};
use mathgate_core::{ChatMessage, EducationalContent, Enhancement, NormalizedResult, PracticeProblem};
use mathgate_upstream::{CompletionEngine, CompletionOptions, UpstreamError};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

const MAX_CONCEPTS: usize = 5;
const MAX_INSIGHTS: usize = 3;
const MAX_MISTAKES: usize = 3;
const MAX_APPLICATIONS: usize = 2;
const MAX_PRACTICE_PROBLEMS: usize = 3;
const CONCEPT_CONTEXT_CHARS: usize = 500;

/// Layers tutoring text from the completion model over a computed answer.
///
/// Every call is independent: a failed call is logged and replaced with a
/// fixed default, so enhancement never fails a request.
pub struct ResultEnhancer<L> {
    completion: Arc<L>,
}

impl<L> Clone for ResultEnhancer<L> {
    fn clone(&self) -> Self {
        Self {
            completion: Arc::clone(&self.completion),
        }
    }
}

impl<L> ResultEnhancer<L>
where
    L: CompletionEngine,
{
    pub fn new(completion: Arc<L>) -> Self {
        Self { completion }
    }

    pub async fn enhance(
        &self,
        result: &NormalizedResult,
        original_query: &str,
        student_level: &str,
    ) -> Enhancement {
        let mut enhancement = match self.explain(result, original_query, student_level).await {
            Ok(explanation) => {
                let concepts = self.concepts(&explanation).await;
                Enhancement {
                    explanation,
                    concepts,
                    difficulty: assess_difficulty(original_query).to_string(),
                    prerequisites: prerequisites_for(original_query),
                    ..Enhancement::default()
                }
            }
            Err(error) => {
                warn!(error = %error, "explanation failed; using fallback text");
                Enhancement {
                    explanation: fallback_explanation(result.final_answer.as_deref()),
                    concepts: fallback_concepts(),
                    difficulty: "beginner".to_string(),
                    prerequisites: vec![
                        "basic arithmetic".to_string(),
                        "understanding of variables".to_string(),
                    ],
                    ..Enhancement::default()
                }
            }
        };

        enhancement.educational_content = Some(
            self.educational_content(result, original_query, student_level)
                .await,
        );
        enhancement.practice_problems = self
            .practice_problems(original_query, &enhancement.difficulty)
            .await;

        enhancement
    }

    async fn explain(
        &self,
        result: &NormalizedResult,
        original_query: &str,
        student_level: &str,
    ) -> Result<String, UpstreamError> {
        let system = format!(
            "You are a patient and knowledgeable math tutor explaining to a {student_level} student. \
             Your goal is to make complex mathematical concepts accessible and clear."
        );
        let user = format!(
            "The student asked: \"{original_query}\"\n\n\
             The computation engine provided this result:\n{}\n\n\
             Please provide:\n\
             1. A clear explanation of what the problem is asking\n\
             2. An explanation of the solution method used\n\
             3. What each step means in plain language\n\
             4. Why this approach works\n\
             5. Common mistakes to avoid\n\
             6. A real-world application if relevant\n\n\
             Keep explanations clear but rigorous.",
            format_for_prompt(result)
        );

        self.completion
            .complete(
                &[ChatMessage::system(system), ChatMessage::user(user)],
                CompletionOptions::temperature(0.6),
            )
            .await
    }

    async fn concepts(&self, explanation: &str) -> Vec<String> {
        let excerpt: String = explanation.chars().take(CONCEPT_CONTEXT_CHARS).collect();
        let prompt = format!(
            "Based on this math problem and explanation, list the key mathematical concepts involved.\n\
             Return only a comma-separated list of concepts.\n\nExplanation: {excerpt}..."
        );

        match self
            .completion
            .complete(
                &[
                    ChatMessage::system("You are a mathematics educator."),
                    ChatMessage::user(prompt),
                ],
                CompletionOptions::temperature(0.3).with_max_tokens(100),
            )
            .await
        {
            Ok(response) => response
                .split(',')
                .map(|concept| concept.trim().to_string())
                .filter(|concept| !concept.is_empty())
                .take(MAX_CONCEPTS)
                .collect(),
            Err(error) => {
                warn!(error = %error, "concept extraction failed");
                Vec::new()
            }
        }
    }

    async fn educational_content(
        &self,
        result: &NormalizedResult,
        original_query: &str,
        student_level: &str,
    ) -> EducationalContent {
        let solution = extract_solution(result);

        let summary_prompt = format!(
            "Create a brief summary (2-3 sentences) of this {student_level}-level math problem \
             and its solution:\n\nProblem: {original_query}\nSolution: {solution}"
        );
        let summary = match self
            .completion
            .complete(
                &[
                    ChatMessage::system("You are a concise math educator."),
                    ChatMessage::user(summary_prompt),
                ],
                CompletionOptions::temperature(0.5).with_max_tokens(150),
            )
            .await
        {
            Ok(summary) if !summary.trim().is_empty() => summary.trim().to_string(),
            Ok(_) => default_summary(student_level),
            Err(error) => {
                warn!(error = %error, "summary failed");
                default_summary(student_level)
            }
        };

        let key_insights = self
            .string_list(
                "You are a math educator focused on insights.",
                format!(
                    "List 2-3 key mathematical insights from this problem and solution.\n\
                     Each insight should be one clear sentence.\n\n\
                     Problem: {original_query}\nSolution: {solution}\n\n\
                     Format: Return only a JSON array of strings."
                ),
                0.5,
                MAX_INSIGHTS,
                DEFAULT_KEY_INSIGHT,
            )
            .await;

        let common_mistakes = self
            .string_list(
                "You are a math educator.",
                format!(
                    "List 2-3 common mistakes students make with this type of problem.\n\
                     Be specific and brief.\n\nProblem type: {original_query}\n\n\
                     Format: Return only a JSON array of strings."
                ),
                0.5,
                MAX_MISTAKES,
                DEFAULT_COMMON_MISTAKE,
            )
            .await;

        let real_world_applications = self
            .string_list(
                "You are a math educator connecting math to real life.",
                format!(
                    "List 1-2 real-world applications of this mathematical concept.\n\
                     Be specific and relatable.\n\nConcept from: {original_query}\n\n\
                     Format: Return only a JSON array of strings."
                ),
                0.7,
                MAX_APPLICATIONS,
                DEFAULT_APPLICATION,
            )
            .await;

        EducationalContent {
            summary,
            key_insights,
            common_mistakes,
            tips: tips_for(original_query),
            real_world_applications,
        }
    }

    async fn practice_problems(&self, original_query: &str, difficulty: &str) -> Vec<PracticeProblem> {
        let prompt = format!(
            "Generate 3 practice problems similar to this one.\n\
             Vary the difficulty slightly around {difficulty} level.\n\n\
             Original problem: {original_query}\n\n\
             Format each problem as JSON with fields:\n\
             - problem: The problem statement\n\
             - hint: A helpful hint\n\
             - difficulty: easy/medium/hard\n\n\
             Return a JSON array of 3 problems."
        );

        let problems: Vec<PracticeProblem> = match self
            .json_completion(
                "You are a math problem generator.",
                prompt,
                CompletionOptions::temperature(0.8),
            )
            .await
        {
            Ok(problems) => problems,
            Err(error) => {
                warn!(error = %error, "practice problem generation failed");
                return Vec::new();
            }
        };

        problems
            .into_iter()
            .take(MAX_PRACTICE_PROBLEMS)
            .enumerate()
            .map(|(index, mut problem)| {
                problem.number = index as u32 + 1;
                problem
            })
            .collect()
    }

    async fn string_list(
        &self,
        system: &str,
        prompt: String,
        temperature: f32,
        limit: usize,
        default: &str,
    ) -> Vec<String> {
        match self
            .json_completion::<Vec<String>>(system, prompt, CompletionOptions::temperature(temperature))
            .await
        {
            Ok(mut items) => {
                items.truncate(limit);
                items
            }
            Err(error) => {
                warn!(error = %error, "structured completion failed; using default");
                vec![default.to_string()]
            }
        }
    }

    async fn json_completion<T>(
        &self,
        system: &str,
        prompt: String,
        options: CompletionOptions,
    ) -> Result<T, UpstreamError>
    where
        T: DeserializeOwned,
    {
        let response = self
            .completion
            .complete(&[ChatMessage::system(system), ChatMessage::user(prompt)], options)
            .await?;

        let body = strip_code_fence(&response);
        serde_json::from_str(body).map_err(|error| {
            debug!(response = %response, "completion did not return the expected JSON");
            UpstreamError::Decode(error.to_string())
        })
    }
}

/// Models often wrap JSON in a fenced block.
fn strip_code_fence(response: &str) -> &str {
    let trimmed = response.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}
