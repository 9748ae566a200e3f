use mathgate_core::{DispatchParams, RawUpstreamResult, UpstreamApi};
use tracing::debug;

use crate::compute::{ComputeEngine, QueryRequest};
use crate::error::UpstreamError;

/// Calls the endpoint named by `api` and tags the body with it.
pub async fn dispatch<E>(
    engine: &E,
    api: UpstreamApi,
    query: &str,
    params: &DispatchParams,
) -> Result<RawUpstreamResult, UpstreamError>
where
    E: ComputeEngine,
{
    debug!(api = api.as_str(), "dispatching query");

    match api {
        UpstreamApi::Llm | UpstreamApi::FullResults => {
            engine
                .query(QueryRequest {
                    api,
                    input: query.to_string(),
                    params: params.clone(),
                })
                .await
        }
        UpstreamApi::ShowSteps => engine
            .solve(query, params.show_steps)
            .await
            .map(RawUpstreamResult::ShowSteps),
        UpstreamApi::LanguageEval => engine
            .evaluate(query, params.eval_format)
            .await
            .map(RawUpstreamResult::LanguageEval),
    }
}
