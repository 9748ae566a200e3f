use std::env;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::extract::{DefaultBodyLimit, Json, Multipart, State};
use axum::http::{header, HeaderValue, Method, Request, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{body::Body, Router};
use mathgate_agents::{SolverAgent, IMAGE_QUERY_LABEL};
use mathgate_core::{failure_response, PlotRequest, SolveRequest};
use mathgate_observability::AppMetrics;
use mathgate_upstream::{
    CompletionConfig, ComputeConfig, HttpCompletionClient, HttpComputeClient, HttpOcrClient,
    OcrConfig,
};
use serde::Serialize;
use serde_json::json;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

pub const SERVICE_NAME: &str = "mathgate";
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
const DEFAULT_BIND: &str = "0.0.0.0:8000";

pub type MathAgent = SolverAgent<HttpComputeClient, HttpCompletionClient>;

#[derive(Clone)]
pub struct ApiState {
    pub agent: Arc<MathAgent>,
    pub metrics: Arc<AppMetrics>,
    pub ocr: Arc<HttpOcrClient>,
    pub completion_configured: bool,
    pub allowed_origins: Arc<Vec<String>>,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: String,
    pub allowed_origins: Vec<String>,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self {
            bind: env::var("MATHGATE_BIND").unwrap_or_else(|_| DEFAULT_BIND.to_string()),
            allowed_origins: parse_allowed_origins(env::var("MATHGATE_ALLOWED_ORIGINS").ok()),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            allowed_origins: parse_allowed_origins(None),
        }
    }
}

/// Every collaborator the service talks to, resolved once at startup.
#[derive(Debug, Clone, Default)]
pub struct AppSettings {
    pub compute: ComputeConfig,
    pub completion: CompletionConfig,
    pub ocr: OcrConfig,
    pub server: ServerConfig,
}

impl AppSettings {
    pub fn from_env() -> Self {
        Self {
            compute: ComputeConfig::from_env(),
            completion: CompletionConfig::from_env(),
            ocr: OcrConfig::from_env(),
            server: ServerConfig::from_env(),
        }
    }
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    timestamp_utc: String,
    metrics: mathgate_observability::MetricsSnapshot,
    capabilities: HealthCapabilities,
}

#[derive(Debug, Serialize)]
struct HealthCapabilities {
    completion_fallback: bool,
    image_upload: bool,
}

pub fn build_app(settings: AppSettings) -> Result<Router> {
    let metrics = AppMetrics::shared();

    if settings.compute.app_id.is_empty() {
        warn!("MATHGATE_APP_ID is not set; computation requests will be rejected upstream");
    }
    let completion_configured = settings.completion.is_configured();

    let compute = HttpComputeClient::new(settings.compute)
        .context("failed to build computation client")?;
    let completion = HttpCompletionClient::new(settings.completion)
        .context("failed to build completion client")?;
    let ocr = HttpOcrClient::new(settings.ocr).context("failed to build OCR client")?;

    let agent = Arc::new(SolverAgent::new(
        Arc::new(compute),
        Arc::new(completion),
        metrics.clone(),
    ));

    let state = ApiState {
        agent,
        metrics,
        ocr: Arc::new(ocr),
        completion_configured,
        allowed_origins: Arc::new(settings.server.allowed_origins),
    };

    Ok(build_router(state))
}

pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/api/v1/math/solve", post(solve))
        .route("/api/v1/math/plot", post(plot))
        .route("/api/v1/math/solve-image", post(solve_image))
        .layer(build_cors_layer(&state.allowed_origins))
        .layer(middleware::from_fn(security_headers_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .with_state(state)
}

async fn index() -> impl IntoResponse {
    Json(json!({
        "service": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "solve": "POST /api/v1/math/solve",
            "plot": "POST /api/v1/math/plot",
            "solve_image": "POST /api/v1/math/solve-image",
            "health": "GET /health"
        }
    }))
}

async fn health(State(state): State<ApiState>) -> impl IntoResponse {
    let payload = HealthResponse {
        status: "ok",
        service: SERVICE_NAME,
        timestamp_utc: chrono::Utc::now().to_rfc3339(),
        metrics: state.metrics.snapshot(),
        capabilities: HealthCapabilities {
            completion_fallback: state.completion_configured,
            image_upload: state.ocr.is_configured(),
        },
    };
    (StatusCode::OK, Json(payload))
}

/// Always 200: failures travel in the body as `success: false`.
async fn solve(State(state): State<ApiState>, Json(request): Json<SolveRequest>) -> Response {
    let response = if request.query.trim().is_empty() {
        failure_response("", "query must not be empty")
    } else {
        state.agent.handle_solve(request).await
    };
    (StatusCode::OK, Json(response)).into_response()
}

async fn plot(State(state): State<ApiState>, Json(request): Json<PlotRequest>) -> Response {
    if request.expression.trim().is_empty() {
        return bad_request("empty_expression", "expression must not be empty");
    }

    match state.agent.handle_plot(request).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(error) => (
            StatusCode::BAD_GATEWAY,
            Json(json!({
                "error": "plot_failed",
                "message": error.to_string()
            })),
        )
            .into_response(),
    }
}

async fn solve_image(State(state): State<ApiState>, mut multipart: Multipart) -> Response {
    let mut request = SolveRequest::new(String::new());
    let mut upload: Option<(Vec<u8>, String)> = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(error) => return bad_request("invalid_multipart", &error.to_string()),
        };
        let name = field.name().unwrap_or_default().to_string();

        if name == "file" {
            let content_type = field.content_type().unwrap_or_default().to_string();
            if !content_type.starts_with("image/") {
                return bad_request("invalid_file", "File must be an image");
            }
            match field.bytes().await {
                Ok(bytes) => upload = Some((bytes.to_vec(), content_type)),
                Err(error) => return bad_request("invalid_multipart", &error.to_string()),
            }
            continue;
        }

        let value = match field.text().await {
            Ok(value) => value,
            Err(error) => return bad_request("invalid_multipart", &error.to_string()),
        };
        match name.as_str() {
            "show_steps" => request.show_steps = parse_form_bool(&value, request.show_steps),
            "include_educational" => {
                request.include_educational = parse_form_bool(&value, request.include_educational)
            }
            "student_level" if !value.trim().is_empty() => {
                request.student_level = value.trim().to_string()
            }
            _ => {}
        }
    }

    let Some((image, content_type)) = upload else {
        return bad_request("missing_file", "multipart field `file` is required");
    };

    info!(bytes = image.len(), content_type = %content_type, "parsing image for mathematical content");
    let text = match state.ocr.extract_text(image, &content_type).await {
        Ok(text) => text,
        Err(error) => {
            state.metrics.inc_upstream_failure();
            warn!(error = %error, kind = error.kind(), "image text extraction failed");
            let response =
                failure_response(IMAGE_QUERY_LABEL, format!("Failed to parse image: {error}"));
            return (StatusCode::OK, Json(response)).into_response();
        }
    };

    let response = state.agent.handle_extracted_text(&text, request).await;
    (StatusCode::OK, Json(response)).into_response()
}

fn bad_request(error: &str, message: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({
            "error": error,
            "message": message
        })),
    )
        .into_response()
}

fn parse_form_bool(value: &str, default: bool) -> bool {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => true,
        "false" | "0" | "no" | "off" => false,
        _ => default,
    }
}

fn parse_allowed_origins(raw: Option<String>) -> Vec<String> {
    let default_origins = [
        "http://localhost:3000",
        "http://127.0.0.1:3000",
        "http://localhost:7860",
        "http://127.0.0.1:7860",
    ];

    raw.map(|value| {
        value
            .split(',')
            .map(|origin| origin.trim().trim_end_matches('/').to_string())
            .filter(|origin| !origin.is_empty())
            .collect::<Vec<_>>()
    })
    .unwrap_or_else(|| {
        default_origins
            .iter()
            .map(|value| value.to_string())
            .collect()
    })
}

fn build_cors_layer(allowed_origins: &Arc<Vec<String>>) -> CorsLayer {
    let origins = allowed_origins
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect::<Vec<_>>();
    let origins = if origins.is_empty() {
        vec![HeaderValue::from_static("http://localhost:3000")]
    } else {
        origins
    };

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .allow_credentials(true)
}

async fn security_headers_middleware(request: Request<Body>, next: Next) -> Response {
    let mut response = next.run(request).await;

    response.headers_mut().insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    response.headers_mut().insert(
        header::HeaderName::from_static("x-frame-options"),
        HeaderValue::from_static("DENY"),
    );
    response.headers_mut().insert(
        header::HeaderName::from_static("referrer-policy"),
        HeaderValue::from_static("strict-origin-when-cross-origin"),
    );
    response.headers_mut().insert(
        header::HeaderName::from_static("permissions-policy"),
        HeaderValue::from_static("camera=(), microphone=(), geolocation=()"),
    );
    response.headers_mut().insert(
        header::HeaderName::from_static("content-security-policy"),
        HeaderValue::from_static("default-src 'none'; frame-ancestors 'none'; base-uri 'none'"),
    );

    response
}

#[cfg(test)]
mod tests {
    use super::{parse_allowed_origins, parse_form_bool};

    #[test]
    fn form_booleans_accept_common_spellings() {
        assert!(parse_form_bool("true", false));
        assert!(parse_form_bool(" On ", false));
        assert!(!parse_form_bool("0", true));
        assert!(parse_form_bool("maybe", true));
    }

    #[test]
    fn allowed_origins_are_trimmed() {
        let origins = parse_allowed_origins(Some(
            "https://math.example/ , ,http://localhost:5173".to_string(),
        ));
        assert_eq!(origins, vec!["https://math.example", "http://localhost:5173"]);
        assert_eq!(parse_allowed_origins(None).len(), 4);
    }
}
