pub mod enhancer;
pub mod fallback;

use std::sync::Arc;
use std::time::Instant;

use mathgate_core::preprocess::post_process_ocr_text;
use mathgate_core::steps::system_steps;
use mathgate_core::{
    api_params, clarification_response, classify, evaluate_query, failure_response,
    fallback_response, has_step_states, is_system_of_equations, normalize, normalize_text,
    preprocess_for_api, solved_response, NormalizedResult, PlotRequest, PlotResponse,
    RawUpstreamResult, SolveRequest, SolveResponse, Step,
};
use mathgate_observability::AppMetrics;
use mathgate_upstream::{dispatch, CompletionEngine, ComputeEngine, UpstreamError};
use tracing::{info, instrument, warn};

pub use enhancer::ResultEnhancer;
pub use fallback::solve_with_completion;

/// Query label used when a request arrived as an image.
pub const IMAGE_QUERY_LABEL: &str = "[Image]";

/// Runs a single math request end to end: classify, gate, dispatch,
/// normalize, add steps, then enhance.
pub struct SolverAgent<C, L> {
    compute: Arc<C>,
    completion: Arc<L>,
    enhancer: ResultEnhancer<L>,
    metrics: Arc<AppMetrics>,
}

impl<C, L> Clone for SolverAgent<C, L> {
    fn clone(&self) -> Self {
        Self {
            compute: Arc::clone(&self.compute),
            completion: Arc::clone(&self.completion),
            enhancer: self.enhancer.clone(),
            metrics: Arc::clone(&self.metrics),
        }
    }
}

impl<C, L> SolverAgent<C, L>
where
    C: ComputeEngine,
    L: CompletionEngine,
{
    pub fn new(compute: Arc<C>, completion: Arc<L>, metrics: Arc<AppMetrics>) -> Self {
        Self {
            enhancer: ResultEnhancer::new(Arc::clone(&completion)),
            compute,
            completion,
            metrics,
        }
    }

    pub fn metrics(&self) -> &Arc<AppMetrics> {
        &self.metrics
    }

    #[instrument(skip(self, request), fields(student_level = %request.student_level))]
    pub async fn handle_solve(&self, request: SolveRequest) -> SolveResponse {
        let started = Instant::now();
        self.metrics.inc_request();

        let response = self.solve(&request).await;

        self.metrics.observe_latency(started.elapsed());
        info!(
            success = response.success,
            steps = response.steps.as_ref().map_or(0, Vec::len),
            clarifications = response.clarifications.as_ref().map_or(0, Vec::len),
            "solve handled"
        );
        response
    }

    /// Solves text recovered from an uploaded image.
    pub async fn handle_extracted_text(
        &self,
        raw_text: &str,
        mut request: SolveRequest,
    ) -> SolveResponse {
        let query = post_process_ocr_text(raw_text);
        if query.is_empty() {
            return failure_response(
                IMAGE_QUERY_LABEL,
                "Failed to parse image: no mathematical content found",
            );
        }

        info!(query = %query, "extracted query from image");
        request.query = query;
        self.handle_solve(request).await
    }

    #[instrument(skip(self, request), fields(expression = %request.expression))]
    pub async fn handle_plot(&self, request: PlotRequest) -> Result<PlotResponse, UpstreamError> {
        let started = Instant::now();
        self.metrics.inc_request();

        let output = self.compute.plot(&request).await.inspect_err(|error| {
            self.metrics.inc_upstream_failure();
            warn!(error = %error, kind = error.kind(), "plot request failed");
        })?;

        self.metrics.observe_latency(started.elapsed());
        info!(success = output.success, "plot handled");

        Ok(PlotResponse {
            success: output.success,
            expression: request.expression,
            plot: output.output,
            error: output.error,
        })
    }

    async fn solve(&self, request: &SolveRequest) -> SolveResponse {
        let query = normalize_text(&request.query);
        let (query_type, api) = classify(&query);

        let gate = evaluate_query(&query);
        if gate.blocked() {
            self.metrics.inc_clarification();
            info!(questions = gate.questions.len(), "clarification required");
            return clarification_response(&request.query, &gate);
        }

        let params = api_params(query_type, api);
        let processed = preprocess_for_api(&query, query_type, api);
        info!(
            query_type = query_type.as_str(),
            api = api.as_str(),
            processed = %processed,
            "query routed"
        );

        let raw = match dispatch(self.compute.as_ref(), api, &processed, &params).await {
            Ok(raw) => raw,
            Err(error) => {
                self.metrics.inc_upstream_failure();
                warn!(error = %error, kind = error.kind(), "computation request failed");
                return failure_response(&request.query, error.to_string());
            }
        };

        if !raw.success() && raw.pods().is_empty() {
            info!("computation engine returned nothing; trying completion fallback");
            self.metrics.inc_llm_fallback();
            let solution = solve_with_completion(
                self.completion.as_ref(),
                &query,
                &request.student_level,
                request.show_steps,
            )
            .await;
            if solution.success {
                return fallback_response(&request.query, solution);
            }
        }

        let mut normalized = normalize(&raw);
        if !normalized.success {
            let error = normalized
                .error
                .clone()
                .unwrap_or_else(|| "The computation engine could not answer this query".to_string());
            return failure_response(&request.query, error);
        }

        if let Some(steps) = self.fetch_steps(&raw, &normalized, &query).await {
            normalized.steps = steps;
        }

        let enhancement = if request.include_educational {
            Some(
                self.enhancer
                    .enhance(&normalized, &query, &request.student_level)
                    .await,
            )
        } else {
            None
        };

        solved_response(&request.query, &normalized, request.show_steps, enhancement)
    }

    /// Step-by-step state on a pod means the engine can walk through the
    /// answer; fetch it against the original wording. Systems without it
    /// get a synthesized walkthrough.
    async fn fetch_steps(
        &self,
        raw: &RawUpstreamResult,
        normalized: &NormalizedResult,
        original_query: &str,
    ) -> Option<Vec<Step>> {
        let pods = raw.pods();
        if pods.is_empty() {
            return None;
        }

        if has_step_states(pods) {
            info!("step-by-step solution available; fetching");
            match self.compute.solve(original_query, true).await {
                Ok(result) if !result.steps.is_empty() => return Some(result.steps),
                Ok(_) => {}
                Err(error) => warn!(error = %error, "failed to fetch step-by-step solution"),
            }
        }

        if is_system_of_equations(original_query) {
            let answer = normalized.final_answer.as_deref()?;
            let steps = system_steps(original_query, answer);
            if !steps.is_empty() {
                self.metrics.add_synthesized_steps(steps.len());
                return Some(steps);
            }
        }

        None
    }
}
