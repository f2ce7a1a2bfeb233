use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use panelwatch_core::errors::PipelineError;
use panelwatch_core::model::{RunOutcome, RunTrigger};
use panelwatch_core::query::QueryInterpreter;
use panelwatch_core::RunCoordinator;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

pub const RECENT_LIMIT: u32 = 50;
const BUSY_MESSAGE: &str = "Analysis is already running. Try again in a moment.";

#[derive(Clone)]
pub struct AppState {
    pub coordinator: RunCoordinator,
    pub query: Arc<QueryInterpreter>,
}

impl AppState {
    pub fn new(coordinator: RunCoordinator, query: QueryInterpreter) -> Self {
        Self {
            coordinator,
            query: Arc::new(query),
        }
    }
}

/// Primary routes plus the `/api/*` names the dashboard front-end already calls.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/latest-record", get(latest_record))
        .route("/records", get(records))
        .route("/run", post(run))
        .route("/ask", post(ask))
        .route("/api/health", get(health))
        .route("/api/latest-analysis", get(latest_record))
        .route("/api/analyses", get(records))
        .route("/api/run-analysis", post(run))
        .route("/api/ask-vlm", post(ask))
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "ok": true }))
}

async fn latest_record(State(state): State<AppState>) -> Response {
    match state.coordinator.store().latest_record() {
        Ok(Some(rec)) => Json(rec).into_response(),
        Ok(None) => error_body(StatusCode::NOT_FOUND, "No analyses yet", "not_found"),
        Err(e) => internal(e),
    }
}

async fn records(State(state): State<AppState>) -> Response {
    match state.coordinator.store().recent_records(RECENT_LIMIT) {
        Ok(rows) => Json(rows).into_response(),
        Err(e) => internal(e),
    }
}

async fn run(State(state): State<AppState>) -> Response {
    match state.coordinator.try_run(RunTrigger::OnDemand).await {
        Ok(RunOutcome::Completed(rec)) => Json(*rec).into_response(),
        Ok(RunOutcome::AlreadyRunning) => {
            error_body(StatusCode::CONFLICT, BUSY_MESSAGE, "already_running")
        }
        Err(e) => pipeline_error(&e),
    }
}

#[derive(Debug, Default, Deserialize)]
struct AskBody {
    #[serde(default)]
    question: Option<String>,
}

async fn ask(
    State(state): State<AppState>,
    body: Result<Json<AskBody>, JsonRejection>,
) -> Response {
    let question = match body {
        Ok(Json(body)) => body.question.unwrap_or_default(),
        Err(rejection) => {
            return error_body(StatusCode::BAD_REQUEST, &rejection.body_text(), "invalid_body")
        }
    };
    match state.query.ask(&question).await {
        Ok(answer) => Json(json!({ "answer": answer })).into_response(),
        Err(PipelineError::EmptyQuestion) => {
            error_body(StatusCode::BAD_REQUEST, "Question is required", "empty_question")
        }
        Err(e) => pipeline_error(&e),
    }
}

fn status_for(err: &PipelineError) -> StatusCode {
    match err {
        PipelineError::NavigationTimeout { .. } | PipelineError::ReadinessTimeout(_) => {
            StatusCode::GATEWAY_TIMEOUT
        }
        PipelineError::ModelTransport { .. } | PipelineError::ModelEmptyResponse => {
            StatusCode::BAD_GATEWAY
        }
        PipelineError::EmptyQuestion => StatusCode::BAD_REQUEST,
        PipelineError::Render { .. } | PipelineError::CaptureIo { .. } | PipelineError::Storage(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn pipeline_error(err: &PipelineError) -> Response {
    error_body(status_for(err), &err.to_string(), err.code())
}

fn internal(err: anyhow::Error) -> Response {
    tracing::error!(event = "store_read_failed", error = %format!("{:#}", err));
    error_body(
        StatusCode::INTERNAL_SERVER_ERROR,
        &format!("{:#}", err),
        "storage_failure",
    )
}

fn error_body(status: StatusCode, message: &str, code: &str) -> Response {
    (status, Json(json!({ "error": message, "code": code }))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn failures_map_to_gateway_statuses() {
        assert_eq!(
            status_for(&PipelineError::ReadinessTimeout(Duration::from_secs(90))),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            status_for(&PipelineError::model_status(500, "overloaded")),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_for(&PipelineError::Storage("disk full".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
