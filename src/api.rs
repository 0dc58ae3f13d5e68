//! HTTP routes over [`JobService`].
//!
//! | method | path                | handler          |
//! |--------|---------------------|------------------|
//! | POST   | `/startpentest`     | [`start_pentest`]|
//! | GET    | `/result/:job_id`   | [`get_result`]   |
//! | GET    | `/health`           | [`health`]       |
//!
//! Errors are rendered as `{"detail": "..."}` through the `IntoResponse`
//! implementation on [`JobError`]; malformed request bodies get the same
//! shape.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::{AllowHeaders, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

use crate::error::{AppError, JobError};
use crate::service::{Health, JobService};
use crate::state_machine::JobRecord;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<JobService>,
}

#[derive(Debug, Deserialize)]
pub struct RunRequest {
    pub target: String,
    /// Optional per-job limit in seconds; capped at the configured ceiling.
    #[serde(default)]
    pub timeout: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RunResponse {
    pub job_id: String,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    detail: String,
}

impl IntoResponse for JobError {
    fn into_response(self) -> Response {
        let (status, detail) = match &self {
            JobError::InvalidInput | JobError::InvalidTimeout => {
                (StatusCode::BAD_REQUEST, self.to_string())
            }
            JobError::NotFound(_) => (StatusCode::NOT_FOUND, "job_id not found".to_string()),
            JobError::ShuttingDown => (StatusCode::SERVICE_UNAVAILABLE, self.to_string()),
            JobError::DuplicateId(_) | JobError::InvalidTransition { .. } => {
                error!(error = %self, "internal job error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            }
        };
        if status.is_client_error() {
            warn!(status = status.as_u16(), %detail, "request rejected");
        }
        (status, Json(ErrorBody { detail })).into_response()
    }
}

fn rejection_response(rejection: JsonRejection) -> Response {
    let status = rejection.status();
    let detail = rejection.body_text();
    warn!(status = status.as_u16(), %detail, "request body rejected");
    (status, Json(ErrorBody { detail })).into_response()
}

/// Build the router with CORS restricted to `cors_origin`.
pub fn router(service: Arc<JobService>, cors_origin: &str) -> Result<Router, AppError> {
    let origin = HeaderValue::from_str(cors_origin)
        .map_err(|_| AppError::Config(format!("invalid CORS origin: {cors_origin}")))?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(AllowHeaders::mirror_request());

    Ok(Router::new()
        .route("/startpentest", post(start_pentest))
        .route("/result/:job_id", get(get_result))
        .route("/health", get(health))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { service }))
}

pub async fn start_pentest(
    State(state): State<AppState>,
    payload: Result<Json<RunRequest>, JsonRejection>,
) -> Result<Json<RunResponse>, Response> {
    let Json(req) = payload.map_err(rejection_response)?;
    let submitted = match req.timeout {
        Some(secs) => state
            .service
            .submit_with_limit(&req.target, Duration::from_secs(secs)),
        None => state.service.submit(&req.target),
    };
    let job_id = submitted.map_err(IntoResponse::into_response)?;
    Ok(Json(RunResponse { job_id }))
}

pub async fn get_result(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<JobRecord>, JobError> {
    Ok(Json(state.service.query(&job_id)?))
}

pub async fn health(State(state): State<AppState>) -> Json<Health> {
    Json(state.service.health())
}
