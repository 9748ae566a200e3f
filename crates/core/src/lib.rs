pub mod clarify;
pub mod classifier;
pub mod compose;
pub mod models;
pub mod normalizer;
pub mod preprocess;
pub mod steps;

pub use clarify::{evaluate_query, requires_clarification, ClarificationGate};
pub use classifier::{api_params, classify, is_system_of_equations, normalize_text};
pub use compose::{
    clarification_response, failure_response, fallback_response, solved_response,
};
pub use models::*;
pub use normalizer::{has_step_states, normalize, steps_result_from_pods};
pub use preprocess::{post_process_ocr_text, preprocess_for_api, simplify_for_compute};
pub use steps::{extract_final_answer, steps_from_llm_text, synthesize_steps};
