//! Axum route handlers for the Generation API.

use std::convert::Infallible;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::Stream;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::errors::AppError;
use crate::state::AppState;

const KEEP_ALIVE_SECS: u64 = 15;

#[derive(Debug, Serialize)]
pub struct GenerateAccepted {
    pub status: &'static str,
}

/// POST /api/v1/projects/:id/generate
///
/// Validates readiness synchronously (422 not ready, 409 already running), then
/// runs the generation in the background and answers 202 immediately.
pub async fn handle_generate(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
) -> Result<(StatusCode, Json<GenerateAccepted>), AppError> {
    state.orchestrator.start(project_id).await?;
    info!("Generation started for project {project_id}");

    Ok((
        StatusCode::ACCEPTED,
        Json(GenerateAccepted {
            status: "generating",
        }),
    ))
}

/// GET /api/v1/projects/:id/generation-status
///
/// Server-sent events for the project's current run. Each event is named after
/// its kind and carries the payload as JSON. The stream ends after `complete`
/// or a non-recoverable `error`.
pub async fn handle_generation_status(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    state
        .store
        .get_project(project_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Project {project_id} not found")))?;

    let mut subscription = state.progress.subscribe(project_id);

    let stream = async_stream::stream! {
        while let Some(event) = subscription.recv().await {
            let data = serde_json::to_string(&event).unwrap_or_default();
            yield Ok(Event::default().event(event.kind()).data(data));
            if event.is_terminal() {
                break;
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new().interval(Duration::from_secs(KEEP_ALIVE_SECS)),
    ))
}
