use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DEFAULT_STUDENT_LEVEL: &str = "undergraduate";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    SimpleCalculation,
    StepByStepMath,
    Plotting,
    EquationSolving,
    DataAnalysis,
    PhysicsEngineering,
    SymbolicMath,
    ComplexAnalysis,
    NaturalLanguage,
}

impl QueryType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SimpleCalculation => "simple_calculation",
            Self::StepByStepMath => "step_by_step_math",
            Self::Plotting => "plotting",
            Self::EquationSolving => "equation_solving",
            Self::DataAnalysis => "data_analysis",
            Self::PhysicsEngineering => "physics_engineering",
            Self::SymbolicMath => "symbolic_math",
            Self::ComplexAnalysis => "complex_analysis",
            Self::NaturalLanguage => "natural_language",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpstreamApi {
    Llm,
    FullResults,
    ShowSteps,
    LanguageEval,
}

impl UpstreamApi {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Llm => "llm",
            Self::FullResults => "full_results",
            Self::ShowSteps => "show_steps",
            Self::LanguageEval => "language_eval",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvalFormat {
    #[default]
    String,
    Image,
}

impl EvalFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Image => "image",
        }
    }
}

/// Endpoint-specific knobs chosen alongside the routing decision.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DispatchParams {
    pub show_steps: bool,
    pub formats: Vec<String>,
    pub include_pod_ids: Vec<String>,
    pub eval_format: EvalFormat,
    pub assumptions: Vec<String>,
    pub max_chars: Option<u32>,
    pub pod_index: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolveRequest {
    pub query: String,
    #[serde(default = "default_true")]
    pub show_steps: bool,
    #[serde(default = "default_student_level")]
    pub student_level: String,
    #[serde(default = "default_true")]
    pub include_educational: bool,
}

impl SolveRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            show_steps: true,
            student_level: default_student_level(),
            include_educational: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub step_number: u32,
    pub description: String,
    pub math: String,
}

impl Step {
    pub fn new(step_number: u32, description: impl Into<String>, math: impl Into<String>) -> Self {
        Self {
            step_number,
            description: description.into(),
            math: math.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageMeta {
    #[serde(default)]
    pub src: String,
    #[serde(default)]
    pub alt: Option<String>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Visualization {
    pub title: String,
    pub image: ImageMeta,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodState {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub input: Option<String>,
    #[serde(default)]
    pub stepbystep: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subpod {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub plaintext: Option<String>,
    #[serde(default)]
    pub img: Option<ImageMeta>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pod {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub position: Option<i64>,
    #[serde(default)]
    pub subpods: Vec<Subpod>,
    #[serde(default)]
    pub states: Vec<PodState>,
}

/// Structured endpoint envelope: a list of pods plus upstream status.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PodResult {
    pub original_query: String,
    pub success: bool,
    pub pods: Vec<Pod>,
    #[serde(default)]
    pub assumptions: Value,
    #[serde(default)]
    pub warnings: Value,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmAnswer {
    pub original_query: String,
    pub success: bool,
    pub result: Option<String>,
    #[serde(default)]
    pub assumptions: Vec<String>,
    #[serde(default)]
    pub warnings: Value,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvalOutput {
    pub original_code: String,
    pub success: bool,
    pub output: Option<String>,
    pub output_type: String,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub messages: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizedResult {
    pub original_query: String,
    pub success: bool,
    pub final_answer: Option<String>,
    pub steps: Vec<Step>,
    pub visualizations: Vec<Visualization>,
    pub error: Option<String>,
}

impl NormalizedResult {
    pub fn empty(original_query: impl Into<String>) -> Self {
        Self {
            original_query: original_query.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "api", content = "body", rename_all = "snake_case")]
pub enum RawUpstreamResult {
    Llm(LlmAnswer),
    FullResults(PodResult),
    ShowSteps(NormalizedResult),
    LanguageEval(EvalOutput),
}

impl RawUpstreamResult {
    pub fn success(&self) -> bool {
        match self {
            Self::Llm(answer) => answer.success,
            Self::FullResults(result) => result.success,
            Self::ShowSteps(result) => result.success,
            Self::LanguageEval(output) => output.success,
        }
    }

    pub fn pods(&self) -> &[Pod] {
        match self {
            Self::FullResults(result) => &result.pods,
            _ => &[],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EducationalContent {
    pub summary: String,
    pub key_insights: Vec<String>,
    pub common_mistakes: Vec<String>,
    pub tips: Vec<String>,
    pub real_world_applications: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PracticeProblem {
    #[serde(default)]
    pub number: u32,
    pub problem: String,
    #[serde(default)]
    pub hint: Option<String>,
    #[serde(default = "default_difficulty")]
    pub difficulty: String,
}

/// Everything the enhancer adds on top of a normalized result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Enhancement {
    pub explanation: String,
    pub concepts: Vec<String>,
    pub difficulty: String,
    pub prerequisites: Vec<String>,
    pub educational_content: Option<EducationalContent>,
    pub practice_problems: Vec<PracticeProblem>,
}

/// Answer produced by the completion model when the computation engine
/// had nothing to offer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FallbackSolution {
    pub original_query: String,
    pub success: bool,
    pub final_answer: Option<String>,
    pub explanation: Option<String>,
    pub steps: Vec<Step>,
    pub educational_content: Option<EducationalContent>,
    pub visualizations: Vec<Visualization>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolveResponse {
    pub success: bool,
    pub query: String,
    pub result: Value,
    pub explanation: Option<String>,
    pub steps: Option<Vec<Step>>,
    pub educational_content: Option<EducationalContent>,
    pub visualizations: Option<Vec<Visualization>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub concepts: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub prerequisites: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub practice_problems: Vec<PracticeProblem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clarifications: Option<Vec<String>>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlotRequest {
    pub expression: String,
    #[serde(default = "default_variable")]
    pub variable: String,
    #[serde(default = "default_range_min")]
    pub range_min: f64,
    #[serde(default = "default_range_max")]
    pub range_max: f64,
    #[serde(default = "default_plot_type")]
    pub plot_type: String,
}

impl PlotRequest {
    pub fn new(expression: impl Into<String>) -> Self {
        Self {
            expression: expression.into(),
            variable: default_variable(),
            range_min: default_range_min(),
            range_max: default_range_max(),
            plot_type: default_plot_type(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlotResponse {
    pub success: bool,
    pub expression: String,
    pub plot: Option<String>,
    pub error: Option<String>,
}

fn default_true() -> bool {
    true
}

fn default_student_level() -> String {
    DEFAULT_STUDENT_LEVEL.to_string()
}

fn default_difficulty() -> String {
    "medium".to_string()
}

fn default_variable() -> String {
    "x".to_string()
}

fn default_range_min() -> f64 {
    -10.0
}

fn default_range_max() -> f64 {
    10.0
}

fn default_plot_type() -> String {
    "Plot".to_string()
}
