use mathgate_core::preprocess::{clean_eval_code, simplify_for_compute};
use mathgate_core::{
    steps_result_from_pods, DispatchParams, EvalFormat, EvalOutput, LlmAnswer, NormalizedResult,
    PlotRequest, Pod, PodResult, RawUpstreamResult, UpstreamApi,
};
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde_json::Value;
use tracing::{info, warn};

use crate::config::ComputeConfig;
use crate::error::UpstreamError;
use crate::xml::{parse_eval_response, parse_query_result};

const STEP_BY_STEP_PODSTATE: &str = "Result__Step-by-step solution";
const DEFAULT_FORMATS: &str = "plaintext,image";

/// Response body as the computation service sent it.
#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamBody {
    Json(Value),
    Xml(String),
    Text(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultOutput {
    Json,
    Xml,
}

impl ResultOutput {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Xml => "xml",
        }
    }
}

/// A query for one of the two natural-language endpoints.
#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub api: UpstreamApi,
    pub input: String,
    pub params: DispatchParams,
}

pub trait ComputeEngine: Send + Sync {
    /// Natural-language query against the llm or full_results endpoint.
    async fn query(&self, request: QueryRequest) -> Result<RawUpstreamResult, UpstreamError>;
    async fn solve(&self, input: &str, show_steps: bool)
        -> Result<NormalizedResult, UpstreamError>;
    async fn evaluate(&self, code: &str, format: EvalFormat) -> Result<EvalOutput, UpstreamError>;
    async fn plot(&self, request: &PlotRequest) -> Result<EvalOutput, UpstreamError>;
}

#[derive(Debug, Clone)]
pub struct HttpComputeClient {
    config: ComputeConfig,
    http: Client,
}

impl HttpComputeClient {
    pub fn new(config: ComputeConfig) -> Result<Self, UpstreamError> {
        let http = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.timeout)
            .build()?;
        Ok(Self { config, http })
    }

    async fn get(
        &self,
        url: &str,
        mut params: Vec<(&'static str, String)>,
    ) -> Result<UpstreamBody, UpstreamError> {
        params.push(("appid", self.config.app_id.clone()));

        let response = self
            .http
            .get(url)
            .query(&params)
            .send()
            .await
            .inspect_err(|error| warn!(url = %url, error = %error, "compute request failed"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(url = %url, status = status.as_u16(), "compute request rejected");
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_lowercase();
        let text = response.text().await?;

        classify_body(&content_type, text)
    }

    async fn llm(&self, input: &str, params: &DispatchParams) -> Result<LlmAnswer, UpstreamError> {
        let processed = simplify_for_compute(input);
        let mut query = vec![
            ("input", processed.clone()),
            ("maxchars", params.max_chars.unwrap_or(10_000).to_string()),
        ];
        query.extend(
            params
                .assumptions
                .iter()
                .map(|assumption| ("assumption", assumption.clone())),
        );

        info!(query = %processed, assumptions = params.assumptions.len(), "querying llm endpoint");
        let body = self.get(&self.config.llm_api_url, query).await?;
        Ok(parse_llm_body(body, input))
    }

    async fn full_results(
        &self,
        input: &str,
        output: ResultOutput,
        params: &DispatchParams,
    ) -> Result<PodResult, UpstreamError> {
        let processed = simplify_for_compute(input);
        let formats = if params.formats.is_empty() {
            DEFAULT_FORMATS.to_string()
        } else {
            params.formats.join(",")
        };

        let mut query = vec![
            ("input", processed.clone()),
            ("output", output.as_str().to_string()),
            ("format", formats),
        ];
        query.extend(
            params
                .assumptions
                .iter()
                .map(|assumption| ("assumption", assumption.clone())),
        );
        if let Some(index) = params.pod_index {
            query.push(("podindex", index.to_string()));
        }
        if !params.include_pod_ids.is_empty() {
            query.push(("includepodid", params.include_pod_ids.join("|")));
        }

        info!(query = %processed, output = output.as_str(), "querying full results endpoint");
        let body = self.get(&self.config.full_results_url, query).await?;
        parse_pod_body(body, input)
    }
}

impl ComputeEngine for HttpComputeClient {
    async fn query(&self, request: QueryRequest) -> Result<RawUpstreamResult, UpstreamError> {
        match request.api {
            UpstreamApi::FullResults => self
                .full_results(&request.input, ResultOutput::Json, &request.params)
                .await
                .map(RawUpstreamResult::FullResults),
            _ => {
                let answer = self.llm(&request.input, &request.params).await?;
                let retry = !answer.success
                    && !answer.assumptions.is_empty()
                    && request.params.assumptions.is_empty();
                if !retry {
                    return Ok(RawUpstreamResult::Llm(answer));
                }

                let mut params = request.params.clone();
                params.assumptions = vec![answer.assumptions[0].clone()];
                info!(assumption = %params.assumptions[0], "retrying with first assumption");
                self.llm(&request.input, &params)
                    .await
                    .map(RawUpstreamResult::Llm)
            }
        }
    }

    async fn solve(
        &self,
        input: &str,
        show_steps: bool,
    ) -> Result<NormalizedResult, UpstreamError> {
        let processed = simplify_for_compute(input);
        let podstate = if show_steps {
            STEP_BY_STEP_PODSTATE.to_string()
        } else {
            String::new()
        };
        let query = vec![
            ("input", processed.clone()),
            ("output", "json".to_string()),
            ("format", "plaintext".to_string()),
            ("includepodid", "Result".to_string()),
            ("podstate", podstate),
        ];

        info!(query = %processed, show_steps, "querying show steps endpoint");
        let body = self.get(&self.config.show_steps_url, query).await?;
        let pods = parse_pod_body(body, input)?;

        let mut result = steps_result_from_pods(input, pods.success, &pods.pods);
        result.error = pods.error;
        Ok(result)
    }

    async fn evaluate(&self, code: &str, format: EvalFormat) -> Result<EvalOutput, UpstreamError> {
        let clean = clean_eval_code(code);
        let query = vec![
            ("input", clean.clone()),
            ("format", format.as_str().to_string()),
            ("timeout", self.config.eval_timeout_seconds.to_string()),
        ];

        info!(code_length = clean.len(), format = format.as_str(), "evaluating code");
        let body = self.get(&self.config.language_eval_url, query).await?;
        Ok(parse_eval_body(body, code, format))
    }

    async fn plot(&self, request: &PlotRequest) -> Result<EvalOutput, UpstreamError> {
        let query = format!(
            "plot {} from {} to {}",
            request.expression, request.range_min, request.range_max
        );
        let params = DispatchParams {
            formats: vec!["image".to_string()],
            ..DispatchParams::default()
        };

        let result = self
            .full_results(&query, ResultOutput::Xml, &params)
            .await?;

        let output = if result.success {
            plot_image(&result.pods)
        } else {
            None
        };

        Ok(EvalOutput {
            original_code: query,
            success: result.success,
            output,
            output_type: if result.success { "image_url" } else { "text" }.to_string(),
            error: result.error,
            messages: Vec::new(),
        })
    }
}

pub fn classify_body(content_type: &str, text: String) -> Result<UpstreamBody, UpstreamError> {
    if content_type.contains("json") {
        serde_json::from_str(&text)
            .map(UpstreamBody::Json)
            .map_err(|error| UpstreamError::Decode(error.to_string()))
    } else if content_type.contains("xml") {
        Ok(UpstreamBody::Xml(text))
    } else {
        Ok(UpstreamBody::Text(text))
    }
}

/// The llm endpoint answers with either a JSON envelope or plain text.
pub fn parse_llm_body(body: UpstreamBody, original_query: &str) -> LlmAnswer {
    let mut answer = LlmAnswer {
        original_query: original_query.to_string(),
        ..LlmAnswer::default()
    };

    match body {
        UpstreamBody::Json(value) => {
            if let Some(result) = value.get("result").filter(|result| !result.is_null()) {
                answer.success = true;
                answer.result = Some(value_text(result));
            }
            if let Some(assumptions) = value.get("assumptions").and_then(Value::as_array) {
                answer.assumptions = assumptions.iter().map(value_text).collect();
            }
            if let Some(warnings) = value.get("warnings") {
                answer.warnings = warnings.clone();
            }
            answer.error = value
                .get("error")
                .filter(|error| !error.is_null() && *error != &Value::Bool(false))
                .map(value_text);
        }
        UpstreamBody::Text(text) | UpstreamBody::Xml(text) => {
            let text = text.trim();
            if !text.is_empty() {
                answer.success = true;
                answer.result = Some(text.to_string());
            }
        }
    }

    answer
}

/// Pods out of a `queryresult` envelope in either JSON or XML.
pub fn parse_pod_body(body: UpstreamBody, original_query: &str) -> Result<PodResult, UpstreamError> {
    match body {
        UpstreamBody::Json(value) => {
            let Some(query_result) = value.get("queryresult") else {
                return Err(UpstreamError::Decode("missing queryresult".to_string()));
            };

            Ok(PodResult {
                original_query: original_query.to_string(),
                success: query_result
                    .get("success")
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
                pods: pods_from_json(query_result.get("pods")),
                assumptions: query_result
                    .get("assumptions")
                    .cloned()
                    .unwrap_or_else(|| Value::Array(Vec::new())),
                warnings: query_result
                    .get("warnings")
                    .cloned()
                    .unwrap_or_else(|| Value::Array(Vec::new())),
                error: json_error_message(query_result.get("error")),
            })
        }
        UpstreamBody::Xml(xml) => Ok(parse_query_result(&xml, original_query)),
        UpstreamBody::Text(text) => Err(UpstreamError::Decode(format!(
            "expected a queryresult document, got {} bytes of text",
            text.len()
        ))),
    }
}

pub fn parse_eval_body(body: UpstreamBody, original_code: &str, format: EvalFormat) -> EvalOutput {
    let mut output = EvalOutput {
        original_code: original_code.to_string(),
        output_type: format.as_str().to_string(),
        ..EvalOutput::default()
    };

    match body {
        UpstreamBody::Text(text) => {
            output.success = true;
            output.output = Some(text);
        }
        UpstreamBody::Xml(xml) => {
            let parsed = parse_eval_response(&xml, format == EvalFormat::Image);
            output.success = parsed.success;
            output.output = parsed.output;
            output.error = parsed.error;
        }
        UpstreamBody::Json(value) => match value.get("error").filter(|error| !error.is_null()) {
            Some(error) => output.error = Some(value_text(error)),
            None => {
                output.success = true;
                output.output = Some(
                    value
                        .get("result")
                        .map(value_text)
                        .unwrap_or_else(|| value.to_string()),
                );
            }
        },
    }

    output
}

fn pods_from_json(pods: Option<&Value>) -> Vec<Pod> {
    let Some(pods) = pods.and_then(Value::as_array) else {
        return Vec::new();
    };

    pods.iter()
        .filter_map(|pod| match serde_json::from_value::<Pod>(pod.clone()) {
            Ok(pod) => Some(pod),
            Err(error) => {
                warn!(error = %error, "skipping malformed pod");
                None
            }
        })
        .collect()
}

fn json_error_message(error: Option<&Value>) -> Option<String> {
    match error? {
        Value::Bool(false) | Value::Null => None,
        Value::Bool(true) => Some("Unknown error".to_string()),
        Value::Object(object) => object
            .get("msg")
            .map(value_text)
            .or_else(|| Some("Unknown error".to_string())),
        other => Some(value_text(other)),
    }
}

/// Image from a plot pod, falling back to the first image anywhere.
fn plot_image(pods: &[Pod]) -> Option<String> {
    let image_of = |pod: &Pod| {
        pod.subpods
            .iter()
            .filter_map(|subpod| subpod.img.as_ref())
            .find(|img| !img.src.is_empty())
            .map(|img| img.src.clone())
    };

    pods.iter()
        .filter(|pod| pod.id.to_lowercase().contains("plot"))
        .find_map(image_of)
        .or_else(|| pods.iter().find_map(image_of))
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn body_kind_follows_content_type() {
        assert!(matches!(
            classify_body("application/json; charset=utf-8", "{}".to_string()),
            Ok(UpstreamBody::Json(_))
        ));
        assert!(matches!(
            classify_body("text/xml", "<a/>".to_string()),
            Ok(UpstreamBody::Xml(_))
        ));
        assert!(matches!(
            classify_body("text/plain", "42".to_string()),
            Ok(UpstreamBody::Text(_))
        ));
        assert!(matches!(
            classify_body("application/json", "not json".to_string()),
            Err(UpstreamError::Decode(_))
        ));
    }

    #[test]
    fn llm_text_body_is_the_result() {
        let answer = parse_llm_body(UpstreamBody::Text("Result: 42\n".to_string()), "6*7");
        assert!(answer.success);
        assert_eq!(answer.result.as_deref(), Some("Result: 42"));
    }

    #[test]
    fn llm_json_without_result_keeps_assumptions() {
        let answer = parse_llm_body(
            UpstreamBody::Json(json!({
                "assumptions": ["*C.pi-_*Movie-", "*C.pi-_*MathematicalConstant-"],
                "error": false
            })),
            "pi",
        );
        assert!(!answer.success);
        assert_eq!(answer.assumptions.len(), 2);
        assert!(answer.error.is_none());
    }

    #[test]
    fn json_pods_are_typed() {
        let body = UpstreamBody::Json(json!({
            "queryresult": {
                "success": true,
                "error": false,
                "pods": [
                    {
                        "title": "Result",
                        "id": "Result",
                        "position": 200,
                        "subpods": [{ "title": "", "plaintext": "42" }],
                        "states": [{ "name": "Step-by-step solution", "input": "Result__Step-by-step solution", "stepbystep": true }]
                    },
                    {
                        "title": "Plot",
                        "id": "Plot",
                        "subpods": [{ "img": { "src": "https://img/p.gif", "alt": "p", "width": 300, "height": 120 } }]
                    }
                ]
            }
        }));

        let result = parse_pod_body(body, "6*7").expect("pods");
        assert!(result.success);
        assert_eq!(result.pods.len(), 2);
        assert!(result.pods[0].states[0].stepbystep);
        assert_eq!(plot_image(&result.pods).as_deref(), Some("https://img/p.gif"));
    }

    #[test]
    fn json_error_object_becomes_message() {
        let body = UpstreamBody::Json(json!({
            "queryresult": { "success": false, "error": { "code": "1", "msg": "Invalid appid" } }
        }));
        let result = parse_pod_body(body, "q").expect("pods");
        assert_eq!(result.error.as_deref(), Some("Invalid appid"));
        assert!(result.pods.is_empty());
    }

    #[test]
    fn eval_text_and_json_bodies() {
        let text = parse_eval_body(
            UpstreamBody::Text("{x -> 2}".to_string()),
            "Solve[x == 2, x]",
            EvalFormat::String,
        );
        assert!(text.success);
        assert_eq!(text.output.as_deref(), Some("{x -> 2}"));

        let failed = parse_eval_body(
            UpstreamBody::Json(json!({ "error": "timeout" })),
            "Pause[100]",
            EvalFormat::String,
        );
        assert!(!failed.success);
        assert_eq!(failed.error.as_deref(), Some("timeout"));
    }
}
