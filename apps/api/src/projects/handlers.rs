use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::drafts::export::delete_exports;
use crate::errors::AppError;
use crate::models::project::{NewProject, Project, ProjectStatus, SectionConfig};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionMappingRequest {
    pub section_mapping: Vec<SectionConfig>,
    #[serde(default)]
    pub global_instructions: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetTemplateRequest {
    pub template_id: Uuid,
}

async fn load_project(state: &AppState, project_id: Uuid) -> Result<Project, AppError> {
    state
        .store
        .get_project(project_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Project {project_id} not found")))
}

/// Configuration changes are rejected mid-run: the orchestrator holds a snapshot.
fn ensure_not_generating(project: &Project) -> Result<(), AppError> {
    if project.status == ProjectStatus::Generating {
        return Err(AppError::Conflict(format!(
            "Project {} is generating; try again when the run finishes",
            project.id
        )));
    }
    Ok(())
}

/// POST /api/v1/projects
pub async fn handle_create_project(
    State(state): State<AppState>,
    Json(request): Json<NewProject>,
) -> Result<(StatusCode, Json<Project>), AppError> {
    request.validate().map_err(AppError::Validation)?;

    let project = state.store.create_project(request).await?;
    info!("Created project {} ({:?}, {:?})", project.id, project.mode, project.purpose);

    Ok((StatusCode::CREATED, Json(project)))
}

/// GET /api/v1/projects/:id
pub async fn handle_get_project(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
) -> Result<Json<Project>, AppError> {
    Ok(Json(load_project(&state, project_id).await?))
}

/// DELETE /api/v1/projects/:id
///
/// Removes the project with its drafts, then its exported files.
pub async fn handle_delete_project(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let project = load_project(&state, project_id).await?;
    ensure_not_generating(&project)?;

    if !state.store.delete_project(project_id).await? {
        return Err(AppError::NotFound(format!("Project {project_id} not found")));
    }

    // Best effort: the project record is already gone.
    if let Err(e) = delete_exports(&state.s3, &state.config.s3_bucket, project_id).await {
        warn!("Could not delete exports of project {project_id}: {e:#}");
    }

    info!("Deleted project {project_id}");
    Ok(StatusCode::NO_CONTENT)
}

/// PUT /api/v1/projects/:id/section-mapping
pub async fn handle_update_section_mapping(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    Json(request): Json<SectionMappingRequest>,
) -> Result<Json<Project>, AppError> {
    if let Some(id) = Project::duplicate_section_id(&request.section_mapping) {
        return Err(AppError::Validation(format!(
            "duplicate templateSectionId '{id}'"
        )));
    }
    if request
        .section_mapping
        .iter()
        .any(|s| s.template_section_title.trim().is_empty())
    {
        return Err(AppError::Validation(
            "templateSectionTitle cannot be empty".to_string(),
        ));
    }

    let project = load_project(&state, project_id).await?;
    ensure_not_generating(&project)?;

    state
        .store
        .update_section_mapping(
            project_id,
            request.section_mapping,
            request.global_instructions,
        )
        .await?;

    Ok(Json(load_project(&state, project_id).await?))
}

/// PUT /api/v1/projects/:id/template
pub async fn handle_set_template(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    Json(request): Json<SetTemplateRequest>,
) -> Result<Json<Project>, AppError> {
    let project = load_project(&state, project_id).await?;
    ensure_not_generating(&project)?;

    state
        .store
        .set_template(project_id, request.template_id)
        .await?;

    Ok(Json(load_project(&state, project_id).await?))
}
