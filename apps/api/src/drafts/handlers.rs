use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use uuid::Uuid;

use crate::drafts::export::{render_markdown, upload_export};
use crate::errors::AppError;
use crate::models::draft::Draft;
use crate::models::project::Project;
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportResponse {
    pub draft_id: Uuid,
    pub key: String,
}

async fn load_current_draft(state: &AppState, project_id: Uuid) -> Result<(Project, Draft), AppError> {
    let project = state
        .store
        .get_project(project_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Project {project_id} not found")))?;

    let draft = state
        .store
        .current_draft(project_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Project {project_id} has no draft yet")))?;

    Ok((project, draft))
}

/// GET /api/v1/projects/:id/draft
///
/// The project's current draft, sections in template order.
pub async fn handle_get_draft(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
) -> Result<Json<Draft>, AppError> {
    let (_, draft) = load_current_draft(&state, project_id).await?;
    Ok(Json(draft))
}

/// POST /api/v1/projects/:id/draft/export
///
/// Renders the current draft to Markdown and stores it at
/// `exports/{projectId}/{draftId}.md`.
pub async fn handle_export_draft(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
) -> Result<Json<ExportResponse>, AppError> {
    let (project, draft) = load_current_draft(&state, project_id).await?;

    let markdown = render_markdown(&project, &draft);
    let key = upload_export(&state.s3, &state.config.s3_bucket, project_id, draft.id, markdown)
        .await
        .map_err(|e| AppError::S3(e.to_string()))?;

    Ok(Json(ExportResponse {
        draft_id: draft.id,
        key,
    }))
}
