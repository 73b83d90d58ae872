use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    Json,
};
use bytes::Bytes;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::document::SourceDocument;
use crate::models::project::ProjectStatus;
use crate::state::AppState;

const FILE_FIELD: &str = "file";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentUploadResponse {
    pub document: SourceDocument,
}

/// POST /api/v1/projects/:id/documents
///
/// Multipart upload (field `file`). The PDF is analyzed on a blocking thread and
/// the resulting document is attached to the project.
pub async fn handle_upload_document(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<DocumentUploadResponse>), AppError> {
    let project = state
        .store
        .get_project(project_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Project {project_id} not found")))?;
    if project.status == ProjectStatus::Generating {
        return Err(AppError::Conflict(
            "Documents cannot be added while the project is generating".to_string(),
        ));
    }

    let mut upload: Option<(String, Bytes)> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Invalid multipart body: {e}")))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let filename = field
            .file_name()
            .map(str::to_string)
            .unwrap_or_else(|| "document.pdf".to_string());
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::Validation(format!("Could not read upload: {e}")))?;
        upload = Some((filename, bytes));
        break;
    }

    let (filename, bytes) = upload
        .ok_or_else(|| AppError::Validation(format!("Missing '{FILE_FIELD}' field")))?;
    if bytes.is_empty() {
        return Err(AppError::Validation("Uploaded file is empty".to_string()));
    }

    let analyzer = state.analyzer.clone();
    let document = tokio::task::spawn_blocking(move || analyzer.analyze(&filename, &bytes))
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Document analysis task failed: {e}")))?
        .map_err(|e| AppError::Analysis(e.to_string()))?;

    info!(
        "Analyzed '{}' for project {}: {} sections, {} references, {} warnings",
        document.filename,
        project_id,
        document.extracted_content.sections.len(),
        document.references.len(),
        document.parsing_warnings.len()
    );

    state.store.add_document(project_id, document.clone()).await?;

    Ok((
        StatusCode::CREATED,
        Json(DocumentUploadResponse { document }),
    ))
}
