//! Integration tests for the eval API endpoints.

use axum::body::Body;
use std::sync::Arc;
use tower::ServiceExt;

use verdict_core::invoker::StubInvoker;
use verdict_core::judge::FixedJudge;
use verdict_core::store::EvalStore;
use verdict_server::auth::ApiKeyAuth;
use verdict_server::routes::{AppState, api_router};

fn make_state(api_key: Option<&str>, judge_score: f64) -> AppState {
    AppState {
        store: Arc::new(EvalStore::open_in_memory().unwrap()),
        invoker: Arc::new(StubInvoker),
        judge: Arc::new(FixedJudge::new(judge_score, "fixed for tests")),
        auth: ApiKeyAuth::new(api_key.map(str::to_string)),
    }
}

fn get_request(uri: &str, api_key: Option<&str>) -> axum::http::Request<Body> {
    let mut builder = axum::http::Request::builder().uri(uri);
    if let Some(key) = api_key {
        builder = builder.header("x-api-key", key);
    }
    builder.body(Body::empty()).unwrap()
}

fn post_request(
    uri: &str,
    body: serde_json::Value,
    api_key: Option<&str>,
) -> axum::http::Request<Body> {
    let mut builder = axum::http::Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(key) = api_key {
        builder = builder.header("x-api-key", key);
    }
    builder
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

async fn send(
    state: AppState,
    request: axum::http::Request<Body>,
) -> (axum::http::StatusCode, serde_json::Value) {
    let app = api_router(state);
    let resp = app.oneshot(request).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), 1_000_000).await.unwrap();
    let json: serde_json::Value =
        serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, json)
}

fn smoke_payload() -> serde_json::Value {
    serde_json::json!({
        "prompt": "You are a helpful, concise assistant.",
        "target_model": "stub-ci-model",
        "pass_threshold": 0.75,
        "test_cases": [
            { "input": "Hello", "expected_output": "Input: Hello" }
        ]
    })
}

// --- /health ---

#[tokio::test]
async fn test_health_is_open() {
    let (status, json) = send(make_state(Some("secret"), 1.0), get_request("/health", None)).await;
    assert_eq!(status, 200);
    assert_eq!(json["status"], "ok");
}

// --- auth ---

#[tokio::test]
async fn test_eval_routes_reject_missing_key() {
    let state = make_state(Some("secret"), 1.0);
    let (status, json) = send(state, post_request("/v1/evals/run", smoke_payload(), None)).await;
    assert_eq!(status, 401);
    assert_eq!(json["detail"], "Invalid or missing API key.");
}

#[tokio::test]
async fn test_eval_routes_reject_wrong_key() {
    let state = make_state(Some("secret"), 1.0);
    let (status, _) = send(state, get_request("/v1/evals", Some("nope"))).await;
    assert_eq!(status, 401);
}

#[tokio::test]
async fn test_open_mode_requires_no_key() {
    let state = make_state(None, 1.0);
    let (status, _) = send(state, get_request("/v1/evals", None)).await;
    assert_eq!(status, 200);
}

// --- POST /v1/evals/run ---

#[tokio::test]
async fn test_run_eval_returns_full_report() {
    let state = make_state(Some("secret"), 1.0);
    let (status, json) = send(
        state,
        post_request("/v1/evals/run", smoke_payload(), Some("secret")),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(json["overall_pass"], true);
    assert_eq!(json["total_cases"], 1);
    assert_eq!(json["passed_cases"], 1);
    assert_eq!(json["average_score"], 1.0);
    assert_eq!(json["pass_threshold"], 0.75);
    let results = json["results"].as_array().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["heuristic_score"], 1.0);
    assert_eq!(results[0]["judge_score"], 1.0);
    assert_eq!(results[0]["passed"], true);
}

#[tokio::test]
async fn test_run_eval_rejects_bad_threshold() {
    let state = make_state(None, 1.0);
    let mut payload = smoke_payload();
    payload["pass_threshold"] = serde_json::json!(1.5);
    let (status, json) = send(state, post_request("/v1/evals/run", payload, None)).await;
    assert_eq!(status, 422);
    assert!(json["detail"].as_str().unwrap().contains("pass_threshold"));
}

#[tokio::test]
async fn test_run_eval_defaults_threshold() {
    let state = make_state(None, 0.9);
    let mut payload = smoke_payload();
    payload.as_object_mut().unwrap().remove("pass_threshold");
    // No expected_output: heuristic 0.5, judge 0.9 -> combined 0.7 < 0.75
    payload["test_cases"] = serde_json::json!([{ "input": "Hello" }]);
    let (status, json) = send(state, post_request("/v1/evals/run", payload, None)).await;
    assert_eq!(status, 200);
    assert_eq!(json["pass_threshold"], 0.75);
    assert_eq!(json["overall_pass"], false);
}

// --- GET /v1/evals and /v1/evals/{id} ---

#[tokio::test]
async fn test_list_and_detail_round_trip() {
    let state = make_state(None, 1.0);

    let (status, report) = send(
        state.clone(),
        post_request("/v1/evals/run", smoke_payload(), None),
    )
    .await;
    assert_eq!(status, 200);
    let run_id = report["run_id"].as_str().unwrap().to_string();

    let (status, listing) = send(state.clone(), get_request("/v1/evals?limit=10", None)).await;
    assert_eq!(status, 200);
    assert_eq!(listing["total"], 1);
    assert_eq!(listing["items"][0]["id"].as_str().unwrap(), run_id);
    assert_eq!(listing["items"][0]["status"], "completed");

    let (status, detail) = send(state, get_request(&format!("/v1/evals/{run_id}"), None)).await;
    assert_eq!(status, 200);
    assert_eq!(detail["prompt"], "You are a helpful, concise assistant.");
    assert_eq!(detail["results"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_get_unknown_run_is_404() {
    let state = make_state(None, 1.0);
    let id = uuid::Uuid::new_v4();
    let (status, json) = send(state, get_request(&format!("/v1/evals/{id}"), None)).await;
    assert_eq!(status, 404);
    assert!(json["detail"].as_str().unwrap().contains("No run"));
}
