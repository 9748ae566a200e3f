use std::collections::HashMap;

use axum::body::{to_bytes, Body};
use axum::extract::Query;
use axum::http::{header, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use mathgate_api::{build_app, AppSettings, ServerConfig};
use mathgate_upstream::{CompletionConfig, ComputeConfig, OcrConfig};
use serde_json::{json, Value};
use tower::ServiceExt;

const APP_ID: &str = "test-app";
const BOUNDARY: &str = "mathgate-boundary";

/// Stands in for the computation service, the completion API and the OCR
/// service on one ephemeral port.
async fn spawn_upstream() -> String {
    let router = Router::new()
        .route("/v2/query", get(mock_query))
        .route("/v1/llm-api", get(mock_llm))
        .route("/v1/query", get(mock_eval))
        .route("/chat/completions", post(mock_completion))
        .route("/ocr", post(mock_ocr));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    format!("http://{addr}")
}

async fn mock_query(Query(params): Query<HashMap<String, String>>) -> Response {
    if params.get("appid").map(String::as_str) != Some(APP_ID) {
        return (StatusCode::FORBIDDEN, "invalid appid").into_response();
    }
    let input = params.get("input").cloned().unwrap_or_default();

    if params.get("output").map(String::as_str) == Some("xml") {
        let xml = r#"<queryresult success="true" error="false">
            <pod title="Plot" id="Plot" position="200">
              <subpod title=""><img src="https://mock.local/plot.gif" alt="plot" width="360" height="220"/></subpod>
            </pod>
          </queryresult>"#;
        return ([(header::CONTENT_TYPE, "text/xml")], xml).into_response();
    }

    if params.contains_key("podstate") {
        return Json(json!({
            "queryresult": {
                "success": true,
                "error": false,
                "pods": [{
                    "id": "Result",
                    "title": "Result",
                    "states": [{"name": "Step-by-step solution", "stepbystep": true}],
                    "subpods": [
                        {"title": "", "plaintext": "x = 4"},
                        {
                            "title": "Possible intermediate steps",
                            "plaintext": "Step 1: Subtract 3 from both sides\n2x = 8\nStep 2: Divide both sides by 2"
                        }
                    ]
                }]
            }
        }))
        .into_response();
    }

    if input.starts_with("Solve[") {
        return Json(json!({
            "queryresult": {
                "success": true,
                "error": false,
                "pods": [
                    {"id": "Input", "title": "Input interpretation", "subpods": [{"plaintext": input}]},
                    {"id": "Result", "title": "Result", "subpods": [{"plaintext": "x = 2 and y = 1"}]}
                ]
            }
        }))
        .into_response();
    }

    Json(json!({"queryresult": {"success": false, "error": false, "pods": []}})).into_response()
}

async fn mock_llm(Query(params): Query<HashMap<String, String>>) -> Response {
    if params.get("appid").map(String::as_str) != Some(APP_ID) {
        return (StatusCode::FORBIDDEN, "invalid appid").into_response();
    }
    Json(json!({
        "result": null,
        "assumptions": [],
        "error": "input was not understood"
    }))
    .into_response()
}

async fn mock_eval() -> Response {
    ([(header::CONTENT_TYPE, "text/plain")], "42").into_response()
}

async fn mock_completion(Json(payload): Json<Value>) -> Json<Value> {
    assert!(payload.get("model").is_some());
    Json(json!({
        "choices": [{
            "message": {
                "role": "assistant",
                "content": "1. Recall what the question asks.\n2. Reduce it to arithmetic.\nFinal answer: 42"
            }
        }]
    }))
}

async fn mock_ocr() -> Json<Value> {
    Json(json!({"text": "2x + 3 = 11"}))
}

fn settings(base: &str) -> AppSettings {
    AppSettings {
        compute: ComputeConfig::with_base_url(base, APP_ID),
        completion: CompletionConfig {
            api_key: Some("test-key".to_string()),
            base_url: base.to_string(),
            ..CompletionConfig::default()
        },
        ocr: OcrConfig {
            url: Some(format!("{base}/ocr")),
            ..OcrConfig::default()
        },
        server: ServerConfig::default(),
    }
}

async fn app() -> Router {
    let base = spawn_upstream().await;
    build_app(settings(&base)).expect("app should build")
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn multipart_upload(content_type: &str, fields: &[(&str, &str)]) -> Request<Body> {
    let mut body = String::new();
    for (name, value) in fields {
        body.push_str(&format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
        ));
    }
    body.push_str(&format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"problem.png\"\r\n\
         Content-Type: {content_type}\r\n\r\nnot-really-pixels\r\n--{BOUNDARY}--\r\n"
    ));

    Request::builder()
        .method("POST")
        .uri("/api/v1/math/solve-image")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

async fn json_body(response: Response) -> Value {
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn health_reports_service_and_capabilities() {
    let app = app().await;

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
    assert_eq!(response.headers()["x-content-type-options"], "nosniff");

    let parsed = json_body(response).await;
    assert_eq!(parsed["status"], "ok");
    assert_eq!(parsed["service"], "mathgate");
    assert_eq!(parsed["capabilities"]["completion_fallback"], true);
    assert_eq!(parsed["capabilities"]["image_upload"], true);
    assert!(parsed["metrics"]["requests_total"].is_u64());
}

#[tokio::test]
async fn index_lists_math_endpoints() {
    let app = app().await;

    let response = app
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let parsed = json_body(response).await;
    assert_eq!(parsed["endpoints"]["solve"], "POST /api/v1/math/solve");
}

#[tokio::test]
async fn single_equation_returns_engine_steps() {
    let app = app().await;

    let response = app
        .oneshot(post_json(
            "/api/v1/math/solve",
            json!({"query": "solve 2x + 3 = 11", "include_educational": false}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let parsed = json_body(response).await;
    assert_eq!(parsed["success"], true);
    assert_eq!(parsed["result"]["final_answer"], "x = 4");
    let steps = parsed["steps"].as_array().expect("steps requested");
    assert!(steps
        .iter()
        .any(|step| step["description"] == "Step 1: Subtract 3 from both sides"));
}

#[tokio::test]
async fn steps_are_omitted_when_not_requested() {
    let app = app().await;

    let response = app
        .oneshot(post_json(
            "/api/v1/math/solve",
            json!({
                "query": "solve 2x + 3 = 11",
                "show_steps": false,
                "include_educational": false
            }),
        ))
        .await
        .unwrap();

    let parsed = json_body(response).await;
    assert_eq!(parsed["success"], true);
    assert!(parsed["steps"].is_null());
}

#[tokio::test]
async fn system_of_equations_gets_synthesized_walkthrough() {
    let app = app().await;

    let response = app
        .oneshot(post_json(
            "/api/v1/math/solve",
            json!({
                "query": "solve the system: 2x + y = 5, x - y = 1",
                "include_educational": false
            }),
        ))
        .await
        .unwrap();

    let parsed = json_body(response).await;
    assert_eq!(parsed["success"], true);
    assert_eq!(parsed["result"]["final_answer"], "x = 2 and y = 1");
    let steps = parsed["steps"].as_array().expect("synthesized steps");
    assert_eq!(steps.len(), 6);
    assert_eq!(steps[5]["math"], "y = 1");
}

#[tokio::test]
async fn ambiguous_query_asks_for_clarification() {
    let app = app().await;

    let response = app
        .oneshot(post_json("/api/v1/math/solve", json!({"query": "solve for x or y"})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let parsed = json_body(response).await;
    assert_eq!(parsed["success"], false);
    assert_eq!(
        parsed["error"],
        "Please clarify: Which variable should I solve for: x, y?"
    );
    assert_eq!(parsed["clarifications"].as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn unanswered_query_falls_back_to_completion_model() {
    let app = app().await;

    let response = app
        .oneshot(post_json(
            "/api/v1/math/solve",
            json!({"query": "what is the meaning of life", "include_educational": false}),
        ))
        .await
        .unwrap();

    let parsed = json_body(response).await;
    assert_eq!(parsed["success"], true);
    assert_eq!(parsed["result"]["final_answer"], "42");
    assert_eq!(parsed["steps"].as_array().map(Vec::len), Some(2));
    assert!(parsed["explanation"]
        .as_str()
        .unwrap()
        .contains("Final answer: 42"));
}

#[tokio::test]
async fn plot_returns_image_url() {
    let app = app().await;

    let response = app
        .oneshot(post_json(
            "/api/v1/math/plot",
            json!({"expression": "sin(x)", "range_min": -3.14, "range_max": 3.14}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let parsed = json_body(response).await;
    assert_eq!(parsed["success"], true);
    assert_eq!(parsed["expression"], "sin(x)");
    assert_eq!(parsed["plot"], "https://mock.local/plot.gif");
}

#[tokio::test]
async fn plot_transport_failure_is_bad_gateway() {
    let app = build_app(settings("http://127.0.0.1:1")).expect("app should build");

    let response = app
        .oneshot(post_json("/api/v1/math/plot", json!({"expression": "x^2"})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let parsed = json_body(response).await;
    assert_eq!(parsed["error"], "plot_failed");
}

#[tokio::test]
async fn solve_transport_failure_stays_in_body() {
    let app = build_app(settings("http://127.0.0.1:1")).expect("app should build");

    let response = app
        .oneshot(post_json(
            "/api/v1/math/solve",
            json!({"query": "solve 2x + 3 = 11", "include_educational": false}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let parsed = json_body(response).await;
    assert_eq!(parsed["success"], false);
    assert!(parsed["error"].as_str().is_some());
}

#[tokio::test]
async fn image_upload_rejects_non_images() {
    let app = app().await;

    let response = app
        .oneshot(multipart_upload("text/plain", &[]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let parsed = json_body(response).await;
    assert_eq!(parsed["message"], "File must be an image");
}

#[tokio::test]
async fn image_upload_solves_extracted_text() {
    let app = app().await;

    let response = app
        .oneshot(multipart_upload(
            "image/png",
            &[("show_steps", "true"), ("include_educational", "false")],
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let parsed = json_body(response).await;
    assert_eq!(parsed["success"], true);
    assert_eq!(parsed["query"], "2x + 3 = 11");
    assert_eq!(parsed["result"]["final_answer"], "x = 4");
}
