//! HTTP routes for the eval API.
//!
//! Thin plumbing around the pipeline: request validation and auth happen
//! here, before orchestration begins; everything else is delegated to
//! `verdict_core`.

use axum::{
    Json, Router,
    extract::{Path, Query, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

use verdict_core::error::EvalError;
use verdict_core::invoker::TargetInvoker;
use verdict_core::judge::Judge;
use verdict_core::runner::EvalRunner;
use verdict_core::store::EvalStore;
use verdict_core::types::{RunDetail, RunReport, RunRequest, RunSummary};

use crate::auth::ApiKeyAuth;

/// Shared state for all handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<EvalStore>,
    pub invoker: Arc<dyn TargetInvoker>,
    pub judge: Arc<dyn Judge>,
    pub auth: ApiKeyAuth,
}

/// Build the API router: eval routes behind the API-key check, health open.
pub fn api_router(state: AppState) -> Router {
    let evals = Router::new()
        .route("/v1/evals/run", post(run_eval))
        .route("/v1/evals", get(list_runs))
        .route("/v1/evals/{id}", get(get_run))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            require_api_key,
        ));

    Router::new()
        .route("/health", get(health))
        .merge(evals)
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

/// Error envelope returned by every failing handler.
enum ApiError {
    Unauthorized,
    NotFound(String),
    Validation(String),
    Upstream(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "Invalid or missing API key.".to_string(),
            ),
            ApiError::NotFound(detail) => (StatusCode::NOT_FOUND, detail),
            ApiError::Validation(detail) => (StatusCode::UNPROCESSABLE_ENTITY, detail),
            ApiError::Upstream(detail) => (StatusCode::BAD_GATEWAY, detail),
            ApiError::Internal(detail) => (StatusCode::INTERNAL_SERVER_ERROR, detail),
        };
        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

impl From<EvalError> for ApiError {
    fn from(err: EvalError) -> Self {
        match err {
            EvalError::Validation(detail) => ApiError::Validation(detail),
            EvalError::Invocation(e) => {
                warn!(error = %e, "Run aborted by target model invocation failure");
                ApiError::Upstream(format!("Target model invocation failed: {e}"))
            }
            other => {
                warn!(error = %other, "Eval run failed");
                ApiError::Internal(format!("Eval run failed: {other}"))
            }
        }
    }
}

async fn require_api_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let presented = request
        .headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok());
    if !state.auth.validate(presented) {
        return ApiError::Unauthorized.into_response();
    }
    next.run(request).await
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn run_eval(
    State(state): State<AppState>,
    Json(request): Json<RunRequest>,
) -> Result<Json<RunReport>, ApiError> {
    request.validate()?;
    let runner = EvalRunner::new(&state.store, state.invoker.as_ref(), state.judge.as_ref());
    let report = runner.run(&request).await?;
    Ok(Json(report))
}

#[derive(Debug, Deserialize)]
struct ListParams {
    #[serde(default = "default_limit")]
    limit: u64,
    #[serde(default)]
    offset: u64,
}

fn default_limit() -> u64 {
    20
}

#[derive(Debug, Serialize)]
struct RunListResponse {
    items: Vec<RunSummary>,
    total: u64,
    limit: u64,
    offset: u64,
}

async fn list_runs(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<RunListResponse>, ApiError> {
    let limit = params.limit.min(200);
    let (items, total) = state
        .store
        .list_runs(limit, params.offset)
        .map_err(|e| ApiError::Internal(format!("Failed to list runs: {e}")))?;
    Ok(Json(RunListResponse {
        items,
        total,
        limit,
        offset: params.offset,
    }))
}

async fn get_run(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<RunDetail>, ApiError> {
    let detail = state
        .store
        .get_run(id)
        .map_err(|e| ApiError::Internal(format!("Failed to load run: {e}")))?;
    match detail {
        Some(detail) => Ok(Json(detail)),
        None => Err(ApiError::NotFound(format!("No run with id {id}"))),
    }
}
