//! HTTP route handlers.

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        Json,
    },
    routing::{get, post},
    Router,
};
use futures::stream::{Stream, StreamExt};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::llm::{LlmClient, OpenRouterClient};
use crate::orchestrator::{Orchestrator, OrchestratorError, RunStarted};
use crate::progress::ProgressEvent;
use crate::task::{Task, TaskId};

use super::types::*;

/// Shared application state.
pub struct AppState {
    pub orchestrator: Orchestrator,
}

/// Start the HTTP server.
pub async fn serve(config: Config) -> anyhow::Result<()> {
    let llm: Arc<dyn LlmClient> = Arc::new(OpenRouterClient::new(
        config.api_key.clone(),
        config.request_timeout,
    )?);

    let state = Arc::new(AppState {
        orchestrator: Orchestrator::new(config.clone(), llm),
    });

    let app = router(Arc::clone(&state));

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on {}", addr);

    let shutdown_state = Arc::clone(&state);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal(shutdown_state).await;
        })
        .await?;

    Ok(())
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/config/prompts", get(get_prompts))
        .route("/api/extract/:doc", get(get_tasks))
        .route("/api/workflow/translate/:doc", post(start_translate))
        .route("/api/workflow/cancel/:doc", post(cancel_translate))
        .route("/api/tasks/:doc/:task_id/correct", post(submit_correction))
        .route("/api/progress/:doc", get(stream_progress))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Wait for SIGINT/SIGTERM, then signal every active run to stop at its next task boundary.
async fn shutdown_signal(state: Arc<AppState>) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    let cancelled = state.orchestrator.cancel_all().await;
    if cancelled == 0 {
        tracing::info!("Shutdown signal received, no active runs");
    } else {
        tracing::info!("Shutdown signal received, cancelled {} active run(s)", cancelled);
    }
}

fn api_error(err: OrchestratorError) -> (StatusCode, String) {
    let status = match &err {
        OrchestratorError::AlreadyRunning(_) => StatusCode::CONFLICT,
        OrchestratorError::NotExtracted { .. }
        | OrchestratorError::NoSnapshot(_)
        | OrchestratorError::TaskNotFound { .. } => StatusCode::NOT_FOUND,
        OrchestratorError::InvalidCorrection(_) => StatusCode::BAD_REQUEST,
        OrchestratorError::Io { .. } | OrchestratorError::Store(_) => {
            tracing::error!("{}", err);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, err.to_string())
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let config = state.orchestrator.config();
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        fast_model: config.fast_profile.model.clone(),
        correction_model: config.strong_profile.model.clone(),
        active_runs: state.orchestrator.active_runs().await,
    })
}

/// System prompt of every strategy, for display.
async fn get_prompts(
    State(state): State<Arc<AppState>>,
) -> Json<BTreeMap<&'static str, &'static str>> {
    Json(state.orchestrator.prompts())
}

/// Task list of a document (persisted, or a preview built from the extracted text).
async fn get_tasks(
    State(state): State<Arc<AppState>>,
    Path(doc): Path<String>,
) -> Result<Json<Vec<Task>>, (StatusCode, String)> {
    state
        .orchestrator
        .tasks(&doc)
        .await
        .map(Json)
        .map_err(api_error)
}

async fn start_translate(
    State(state): State<Arc<AppState>>,
    Path(doc): Path<String>,
) -> Result<Json<RunStarted>, (StatusCode, String)> {
    state
        .orchestrator
        .start_run(&doc)
        .await
        .map(Json)
        .map_err(api_error)
}

async fn cancel_translate(
    State(state): State<Arc<AppState>>,
    Path(doc): Path<String>,
) -> Json<CancelResponse> {
    let cancelled = state.orchestrator.request_cancel(&doc).await;
    Json(CancelResponse {
        document_id: crate::orchestrator::sanitize_document_id(&doc),
        cancelled,
    })
}

async fn submit_correction(
    State(state): State<Arc<AppState>>,
    Path((doc, task_id)): Path<(String, TaskId)>,
    Json(req): Json<CorrectionRequest>,
) -> Result<Json<Task>, (StatusCode, String)> {
    state
        .orchestrator
        .submit_correction(&doc, task_id, &req.hint)
        .await
        .map(Json)
        .map_err(api_error)
}

/// Stream snapshot updates as SSE until the document is complete.
async fn stream_progress(
    State(state): State<Arc<AppState>>,
    Path(doc): Path<String>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = state
        .orchestrator
        .subscribe_progress(&doc)
        .map(|event| Ok(sse_event(&event)));

    Sse::new(stream).keep_alive(KeepAlive::default())
}

fn sse_event(event: &ProgressEvent) -> Event {
    let encoded = match event {
        ProgressEvent::Snapshot(update) => Event::default().event(event.name()).json_data(update),
        ProgressEvent::Done(counts) => Event::default().event(event.name()).json_data(counts),
    };
    encoded.unwrap_or_else(|e| Event::default().event("error").data(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskError;

    #[test]
    fn test_error_status_mapping() {
        let (status, _) = api_error(OrchestratorError::AlreadyRunning("paper".into()));
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = api_error(OrchestratorError::NoSnapshot("paper".into()));
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, message) =
            api_error(OrchestratorError::InvalidCorrection(TaskError::EmptyHint));
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(message.starts_with("Invalid correction"));
    }
}
