use std::sync::Arc;

use axum::{
    Json, Router,
    body::Body,
    extract::{Path, State, rejection::JsonRejection},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use checkloop_common::{Artifact, RunConfig, RunRecord, RunRequest, seq};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::stream;
use crate::errors::WorkflowError;
use crate::runtime::Runtime;

pub struct AppState {
    pub runtime: Arc<Runtime>,
    /// Runs that currently have a stream driving them.
    pub active_streams: DashMap<String, ()>,
}

impl AppState {
    pub fn new(runtime: Arc<Runtime>) -> Self {
        Self {
            runtime,
            active_streams: DashMap::new(),
        }
    }
}

pub type SharedState = Arc<AppState>;

// ── Error handling ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(serde_json::json!({"error": message}))).into_response()
    }
}

impl From<WorkflowError> for ApiError {
    fn from(err: WorkflowError) -> Self {
        match err {
            WorkflowError::Validation(msg) => ApiError::BadRequest(msg),
            WorkflowError::RunNotFound { .. } => ApiError::NotFound(err.to_string()),
            other => {
                warn!(error = %other, "Request failed");
                ApiError::Internal(other.to_string())
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

// ── Payloads ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRunBody {
    #[serde(default, deserialize_with = "seq::ordered")]
    pub input_refs: Vec<String>,
    #[serde(default)]
    pub generation_prompt: String,
    #[serde(default)]
    pub review_prompt: String,
    #[serde(default)]
    pub guidelines: String,
    #[serde(default, deserialize_with = "seq::ordered")]
    pub reference_refs: Vec<String>,
    #[serde(default)]
    pub config: RunConfig,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunAck {
    pub run_id: String,
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FileAck {
    pub id: String,
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/files", post(register_file))
        .route("/api/runs", post(submit_run))
        .route("/api/runs/{id}", get(get_run))
        .route("/api/runs/{id}/events", get(stream::run_events))
        .route("/api/runs/{id}/stop", post(stop_run))
        .route("/api/objects/{*path}", get(get_object))
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn health_check() -> &'static str {
    "ok"
}

async fn register_file(
    State(state): State<SharedState>,
    body: Result<Json<Artifact>, JsonRejection>,
) -> Result<(StatusCode, Json<FileAck>), ApiError> {
    let Json(artifact) = body?;
    let file = state.runtime.files.register(artifact).await?;
    let id = file.id.unwrap_or_default();
    Ok((StatusCode::CREATED, Json(FileAck { id })))
}

async fn submit_run(
    State(state): State<SharedState>,
    body: Result<Json<SubmitRunBody>, JsonRejection>,
) -> Result<Json<RunAck>, ApiError> {
    let Json(body) = body?;
    if body.input_refs.is_empty() {
        return Err(ApiError::BadRequest(
            "inputRefs must contain at least one file id".into(),
        ));
    }
    if body.generation_prompt.trim().is_empty() {
        return Err(ApiError::BadRequest("generationPrompt must not be empty".into()));
    }
    if body.review_prompt.trim().is_empty() {
        return Err(ApiError::BadRequest("reviewPrompt must not be empty".into()));
    }

    let files = &state.runtime.files;
    let request = RunRequest {
        inputs: files.resolve(&body.input_refs).await?,
        references: files.resolve(&body.reference_refs).await?,
        generation_prompt: body.generation_prompt,
        review_prompt: body.review_prompt,
        guidelines: body.guidelines,
        config: body.config,
    };
    let record = state.runtime.submit(request).await?;
    info!(run_id = %record.run_id, "Run submitted");
    Ok(Json(RunAck {
        run_id: record.run_id,
        status: "started".into(),
    }))
}

async fn get_run(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<RunRecord>, ApiError> {
    state
        .runtime
        .registry
        .get(&id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Run {} not found", id)))
}

async fn stop_run(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<RunAck>, ApiError> {
    state.runtime.registry.request_stop(&id).await?;
    Ok(Json(RunAck {
        run_id: id,
        status: "stopped".into(),
    }))
}

async fn get_object(
    State(state): State<SharedState>,
    Path(path): Path<String>,
) -> Result<Response, ApiError> {
    let object = state
        .runtime
        .objects
        .get(&path)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Object {} not found", path)))?;
    Ok(([(header::CONTENT_TYPE, object.content_type)], Body::from(object.bytes)).into_response())
}
