//! Admin HTTP API for staging selections and polling pipeline progress.
//!
//! Every response is JSON carrying an explicit `ok` flag. Several soft
//! failures (unresolved items, summary not written yet) still answer 200,
//! so callers branch on `ok` rather than on the status code.
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::Config;
use crate::lookup::ArticleLookup;
use crate::model::{items_from_submission, SelectionBatch, SubmissionError};
use crate::pipeline::resolve_checkpoint;
use crate::runner::run_attach;
use crate::stage::{StageError, StageMode, Stager};
use crate::status::{latest_summary, tail_log, DEFAULT_TAIL_LINES, MAX_TAIL_LINES};

/// State shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub stager: Arc<Stager>,
    pub lookup: Arc<dyn ArticleLookup>,
}

impl AppState {
    pub fn new(cfg: Config, lookup: Arc<dyn ArticleLookup>) -> Self {
        let stager = Stager::new(cfg.checkpoint_path());
        Self {
            cfg: Arc::new(cfg),
            stager: Arc::new(stager),
            lookup,
        }
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error(transparent)]
    Submission(#[from] SubmissionError),
    #[error(transparent)]
    Stage(#[from] StageError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        ApiError::Internal(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadRequest(_) | ApiError::Submission(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Stage(StageError::Unresolved { .. }) => StatusCode::CONFLICT,
            ApiError::Stage(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let message = match &self {
            ApiError::Internal(err) => format!("{:#}", err),
            other => other.to_string(),
        };
        if status.is_server_error() {
            error!(error = %message, "request failed");
        }
        (status, Json(json!({ "ok": false, "error": message }))).into_response()
    }
}

/// `{ "ok": ..., <body fields> }`
#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    pub ok: bool,
    #[serde(flatten)]
    pub body: T,
}

#[derive(Debug, Default, Deserialize)]
pub struct PollQuery {
    since: Option<String>,
    lines: Option<String>,
}

impl PollQuery {
    fn since_ms(&self) -> i64 {
        self.since
            .as_deref()
            .and_then(|s| s.trim().parse::<i64>().ok())
            .unwrap_or(0)
    }

    fn line_count(&self) -> usize {
        self.lines
            .as_deref()
            .and_then(|s| s.trim().parse::<usize>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_TAIL_LINES)
            .min(MAX_TAIL_LINES)
    }
}

#[derive(Debug, Default, Deserialize)]
struct ResolveRequest {
    #[serde(rename = "dryRun", default)]
    dry_run: bool,
}

fn parse_json(body: &Bytes) -> Result<Value, ApiError> {
    serde_json::from_slice(body)
        .map_err(|err| ApiError::BadRequest(format!("invalid JSON body: {}", err)))
}

/// POST /api/selection/stage - record the submitted selection as-is.
pub async fn stage_selection(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let items = items_from_submission(parse_json(&body)?)?;
    let mut batch = SelectionBatch::new(items);
    let receipt = state.stager.stage(&mut batch, StageMode::AcceptPartial).await?;
    Ok(Json(json!({
        "ok": true,
        "path": receipt.path,
        "count": receipt.count,
    })))
}

/// POST /api/selection/resolve - reconcile the checkpoint and write it back
/// when complete.
pub async fn resolve_selection(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let request: ResolveRequest = if body.iter().all(u8::is_ascii_whitespace) {
        ResolveRequest::default()
    } else {
        serde_json::from_value(parse_json(&body)?)
            .map_err(|err| ApiError::BadRequest(format!("invalid resolve request: {}", err)))?
    };
    if !tokio::fs::try_exists(state.stager.path()).await.unwrap_or(false) {
        return Err(ApiError::NotFound(format!(
            "no staged selection at {}",
            state.stager.path().display()
        )));
    }

    let outcome = resolve_checkpoint(
        &state.stager,
        state.lookup.as_ref(),
        &state.cfg.reconcile,
        request.dry_run,
    )
    .await
    .map_err(|err| match err.downcast::<StageError>() {
        Ok(stage) => ApiError::Stage(stage),
        Err(err) => ApiError::Internal(err),
    })?;
    info!(
        complete = outcome.is_complete(),
        written = outcome.written.is_some(),
        "resolve request handled"
    );

    let report = &outcome.report;
    Ok(Json(json!({
        "ok": outcome.is_complete(),
        "written": outcome.written.is_some(),
        "path": outcome.written.as_ref().map(|r| &r.path),
        "count": report.total,
        "resolved": report.resolved,
        "unresolved": report.unresolved,
        "ambiguous": report.ambiguous,
        "lookupFailures": report.lookup_failures,
        "skipped": report.skipped,
    })))
}

/// GET /api/pipeline/summary?since=<ms>
pub async fn summary_poll(
    State(state): State<AppState>,
    Query(query): Query<PollQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let poll = latest_summary(
        &state.cfg.summary_dir(),
        &state.cfg.pipeline.summary_prefix,
        query.since_ms(),
    )
    .await?;
    Ok(Json(Envelope { ok: true, body: poll }))
}

/// GET /api/pipeline/log?since=<ms>&lines=<n>
pub async fn log_poll(
    State(state): State<AppState>,
    Query(query): Query<PollQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let tail = tail_log(&state.cfg.log_sources(), query.since_ms(), query.line_count()).await?;
    Ok(Json(Envelope { ok: true, body: tail }))
}

/// POST /api/pipeline/attach - run the attach command under the kill timeout.
pub async fn attach_run(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let command = &state.cfg.pipeline.attach_command;
    if command.is_empty() {
        return Err(ApiError::BadRequest("no attach command configured".into()));
    }
    let log_path = state.cfg.log_sources().preferred;
    let outcome = run_attach(command, &log_path, state.cfg.attach_timeout()).await?;
    Ok(Json(Envelope {
        ok: outcome.succeeded(),
        body: outcome,
    }))
}

/// GET /health
pub async fn health() -> Json<Value> {
    Json(json!({ "ok": true, "version": env!("CARGO_PKG_VERSION") }))
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/selection/stage", post(stage_selection))
        .route("/api/selection/resolve", post(resolve_selection))
        .route("/api/pipeline/summary", get(summary_poll))
        .route("/api/pipeline/log", get(log_poll))
        .route("/api/pipeline/attach", post(attach_run))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
