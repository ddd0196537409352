//! HTTP boundary: `POST /automate`, `POST /recover`, `GET /status`.
//!
//! Workflows run on their own task so that a panic escaping the orchestrator
//! becomes a 500 naming the phase it happened in, instead of a dropped
//! connection.

use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use color_eyre::eyre::{Result, eyre};
use leadpipe_core::{HistoryStats, Pipeline, ProgressReporter, WorkflowOptions};
use leadpipe_shared::{Phase, PracticeId, RecoveryPhase, WorkflowResult};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::task::JoinError;
use tracing::{error, info, warn};

/// `POST /automate` body: one `url` or a list of `urls`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AutomateRequest {
    url: Option<String>,
    urls: Option<Vec<String>>,
    provision: Option<bool>,
}

/// `POST /recover` body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecoverRequest {
    practice_id: String,
    phase: String,
}

/// `GET /status` body: history counters plus the store's lead count.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusReport {
    #[serde(flatten)]
    history: HistoryStats,
    /// `None` when no store is configured or it cannot be reached.
    stored_leads: Option<u64>,
}

/// Build the router over a shared pipeline.
pub(crate) fn router(pipeline: Arc<Pipeline>) -> Router {
    Router::new()
        .route("/automate", post(automate))
        .route("/recover", post(recover))
        .route("/status", get(status))
        .with_state(pipeline)
}

/// Bind `addr` and serve until the process is stopped.
pub(crate) async fn serve(pipeline: Arc<Pipeline>, addr: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| eyre!("cannot bind {addr}: {e}"))?;
    info!(%addr, "HTTP server listening");
    println!("Listening on http://{addr}");
    axum::serve(listener, router(pipeline)).await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn automate(
    State(pipeline): State<Arc<Pipeline>>,
    payload: std::result::Result<Json<AutomateRequest>, JsonRejection>,
) -> Response {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => return rejection_response(rejection),
    };
    let options = WorkflowOptions {
        provision: request.provision.unwrap_or(pipeline.config().provision),
    };
    let tracker = Arc::new(PhaseTracker::default());

    if let Some(urls) = request.urls.filter(|urls| !urls.is_empty()) {
        info!(targets = urls.len(), "batch requested");
        let reporter = tracker.clone();
        let task = tokio::spawn(async move { pipeline.run_batch(&urls, &options, reporter.as_ref()).await });
        return match task.await {
            Ok(results) => Json(results).into_response(),
            Err(e) => panic_response(e, &tracker),
        };
    }

    let Some(url) = request.url.filter(|url| !url.trim().is_empty()) else {
        return error_response(StatusCode::BAD_REQUEST, "request must include 'url' or 'urls'");
    };

    info!(%url, "workflow requested");
    let reporter = tracker.clone();
    let task = tokio::spawn(async move { pipeline.run_workflow(&url, &options, reporter.as_ref()).await });
    match task.await {
        Ok(Ok(result)) => Json(result).into_response(),
        Ok(Err(e)) if e.is_input_error() => error_response(StatusCode::BAD_REQUEST, &e.to_string()),
        Ok(Err(e)) => {
            error!(error = %e, "workflow failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string())
        }
        Err(e) => panic_response(e, &tracker),
    }
}

async fn recover(
    State(pipeline): State<Arc<Pipeline>>,
    payload: std::result::Result<Json<RecoverRequest>, JsonRejection>,
) -> Response {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => return rejection_response(rejection),
    };
    let phase: RecoveryPhase = match request.phase.parse() {
        Ok(phase) => phase,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, &e.to_string()),
    };
    let practice_id = request.practice_id.trim();
    if practice_id.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "practiceId is required");
    }

    let outcome = pipeline.recover(&PracticeId::from_raw(practice_id), phase).await;
    Json(outcome).into_response()
}

async fn status(State(pipeline): State<Arc<Pipeline>>) -> Response {
    let report = StatusReport {
        history: pipeline.history().stats().await,
        stored_leads: pipeline.persister().stored_count().await,
    };
    Json(report).into_response()
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

/// Malformed bodies are input errors, whatever axum would have answered.
fn rejection_response(rejection: JsonRejection) -> Response {
    warn!(status = %rejection.status(), "rejected request body");
    error_response(StatusCode::BAD_REQUEST, &rejection.body_text())
}

fn panic_response(e: JoinError, tracker: &PhaseTracker) -> Response {
    let phase = tracker
        .current()
        .map_or_else(|| "orchestrator".to_string(), |p| p.to_string());
    error!(%phase, error = %e, "workflow task aborted");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": format!("workflow aborted: {e}"), "phase": phase })),
    )
        .into_response()
}

// ---------------------------------------------------------------------------
// Phase tracking
// ---------------------------------------------------------------------------

/// Remembers the last phase entered, for 500 diagnostics.
#[derive(Default)]
struct PhaseTracker {
    current: Mutex<Option<Phase>>,
}

impl PhaseTracker {
    fn current(&self) -> Option<Phase> {
        self.current.lock().map(|p| *p).unwrap_or_else(|poisoned| *poisoned.into_inner())
    }
}

impl ProgressReporter for PhaseTracker {
    fn phase(&self, _target: &str, phase: Phase) {
        match self.current.lock() {
            Ok(mut current) => *current = Some(phase),
            Err(_) => warn!(%phase, "phase tracker lock poisoned"),
        }
    }

    fn window(&self, _index: usize, _total: usize, _size: usize) {}

    fn done(&self, _result: &WorkflowResult) {}
}
