use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use tracing::info;
use uuid::Uuid;

use crate::models::document::{ExtractedContent, Reference, SourceDocument};
use crate::models::draft::{AggregatedReference, Draft, DraftSection};
use crate::models::project::{
    GenerationProgress, NewProject, Project, ProjectStatus, SectionConfig,
};
use crate::store::ProjectStore;

#[derive(Debug, FromRow)]
struct ProjectRow {
    id: Uuid,
    name: String,
    mode: String,
    purpose: String,
    status: String,
    section_mapping: Json<Vec<SectionConfig>>,
    global_instructions: Option<String>,
    template_id: Option<Uuid>,
    document_ids: Vec<Uuid>,
    progress: Option<Json<GenerationProgress>>,
    last_error: Option<String>,
    current_draft_id: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ProjectRow> for Project {
    type Error = anyhow::Error;

    fn try_from(row: ProjectRow) -> Result<Self> {
        Ok(Project {
            id: row.id,
            name: row.name,
            mode: enum_from_text(&row.mode)?,
            purpose: enum_from_text(&row.purpose)?,
            status: row.status.parse()?,
            section_mapping: row.section_mapping.0,
            global_instructions: row.global_instructions,
            template_id: row.template_id,
            document_ids: row.document_ids,
            progress: row.progress.map(|p| p.0),
            last_error: row.last_error,
            current_draft_id: row.current_draft_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct DocumentRow {
    id: Uuid,
    filename: String,
    extracted_content: Json<ExtractedContent>,
    references: Json<Vec<Reference>>,
    parsing_warnings: Vec<String>,
    created_at: DateTime<Utc>,
}

impl From<DocumentRow> for SourceDocument {
    fn from(row: DocumentRow) -> Self {
        SourceDocument {
            id: row.id,
            filename: row.filename,
            extracted_content: row.extracted_content.0,
            references: row.references.0,
            parsing_warnings: row.parsing_warnings,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct DraftRow {
    id: Uuid,
    project_id: Uuid,
    references: Json<Vec<AggregatedReference>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct DraftSectionRow {
    template_section_id: String,
    template_section_title: String,
    position: i32,
    content: String,
    source_refs: Vec<Uuid>,
    warnings: Vec<String>,
}

impl From<DraftSectionRow> for DraftSection {
    fn from(row: DraftSectionRow) -> Self {
        DraftSection {
            template_section_id: row.template_section_id,
            template_section_title: row.template_section_title,
            position: usize::try_from(row.position).unwrap_or_default(),
            content: row.content,
            source_refs: row.source_refs,
            warnings: row.warnings,
        }
    }
}

/// Snake-case enums are stored as their serde text form.
fn enum_to_text<T: Serialize>(value: &T) -> Result<String> {
    match serde_json::to_value(value)? {
        serde_json::Value::String(s) => Ok(s),
        other => Err(anyhow::anyhow!("expected a string enum, got {other}")),
    }
}

fn enum_from_text<T: DeserializeOwned>(text: &str) -> Result<T> {
    serde_json::from_value(serde_json::Value::String(text.to_string()))
        .with_context(|| format!("unrecognised enum value '{text}'"))
}

/// PostgreSQL-backed store. Schema lives in `migrations/`.
pub struct PgProjectStore {
    pool: PgPool,
}

impl PgProjectStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProjectStore for PgProjectStore {
    async fn create_project(&self, new: NewProject) -> Result<Project> {
        let row = sqlx::query_as::<_, ProjectRow>(
            r#"
            INSERT INTO projects
                (id, name, mode, purpose, status, section_mapping, global_instructions, template_id)
            VALUES ($1, $2, $3, $4, 'draft', $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&new.name)
        .bind(enum_to_text(&new.mode)?)
        .bind(enum_to_text(&new.purpose)?)
        .bind(Json(&new.section_mapping))
        .bind(&new.global_instructions)
        .bind(new.template_id)
        .fetch_one(&self.pool)
        .await?;

        info!("Created project {} ({})", row.id, row.name);
        row.try_into()
    }

    async fn get_project(&self, id: Uuid) -> Result<Option<Project>> {
        sqlx::query_as::<_, ProjectRow>("SELECT * FROM projects WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Project::try_from)
            .transpose()
    }

    async fn delete_project(&self, id: Uuid) -> Result<bool> {
        // drafts and draft_sections go with it via ON DELETE CASCADE
        let result = sqlx::query("DELETE FROM projects WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn update_section_mapping(
        &self,
        id: Uuid,
        mapping: Vec<SectionConfig>,
        global_instructions: Option<String>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE projects
            SET section_mapping = $2, global_instructions = $3, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(Json(&mapping))
        .bind(global_instructions)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_template(&self, id: Uuid, template_id: Uuid) -> Result<bool> {
        let result =
            sqlx::query("UPDATE projects SET template_id = $2, updated_at = NOW() WHERE id = $1")
                .bind(id)
                .bind(template_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn add_document(&self, project_id: Uuid, document: SourceDocument) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO source_documents
                (id, filename, extracted_content, "references", parsing_warnings, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(document.id)
        .bind(&document.filename)
        .bind(Json(&document.extracted_content))
        .bind(Json(&document.references))
        .bind(&document.parsing_warnings)
        .bind(document.created_at)
        .execute(&mut *tx)
        .await?;

        let attached = sqlx::query(
            r#"
            UPDATE projects
            SET document_ids = array_append(document_ids, $2), updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(project_id)
        .bind(document.id)
        .execute(&mut *tx)
        .await?;

        if attached.rows_affected() == 0 {
            anyhow::bail!("project {project_id} not found");
        }

        tx.commit().await?;
        info!(
            "Attached document {} ({}) to project {}",
            document.id, document.filename, project_id
        );
        Ok(())
    }

    async fn list_documents(&self, project_id: Uuid) -> Result<Vec<SourceDocument>> {
        let rows = sqlx::query_as::<_, DocumentRow>(
            r#"
            SELECT d.*
            FROM projects p
            CROSS JOIN LATERAL unnest(p.document_ids) WITH ORDINALITY AS u(doc_id, ord)
            JOIN source_documents d ON d.id = u.doc_id
            WHERE p.id = $1
            ORDER BY u.ord
            "#,
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(SourceDocument::from).collect())
    }

    async fn begin_generation(&self, id: Uuid, total_sections: usize) -> Result<bool> {
        // Conditional UPDATE is the run guard: only one caller can win the transition.
        let result = sqlx::query(
            r#"
            UPDATE projects
            SET status = 'generating', progress = $2, last_error = NULL, updated_at = NOW()
            WHERE id = $1 AND status <> 'generating'
            "#,
        )
        .bind(id)
        .bind(Json(GenerationProgress::started(total_sections)))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn update_progress(&self, id: Uuid, progress: &GenerationProgress) -> Result<()> {
        sqlx::query("UPDATE projects SET progress = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(Json(progress))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn finish_generation(&self, id: Uuid, progress: &GenerationProgress) -> Result<()> {
        sqlx::query(
            "UPDATE projects SET status = $2, progress = $3, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(ProjectStatus::Ready.as_str())
        .bind(Json(progress))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn rollback_generation(&self, id: Uuid, error: &str) -> Result<()> {
        sqlx::query(
            "UPDATE projects SET status = $2, last_error = $3, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(ProjectStatus::Draft.as_str())
        .bind(error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn create_draft(&self, project_id: Uuid) -> Result<Draft> {
        let draft = Draft::new(project_id);
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO drafts (id, project_id, created_at, updated_at) VALUES ($1, $2, $3, $3)",
        )
        .bind(draft.id)
        .bind(project_id)
        .bind(draft.created_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE projects SET current_draft_id = $2, updated_at = NOW() WHERE id = $1")
            .bind(project_id)
            .bind(draft.id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(draft)
    }

    async fn save_draft_section(&self, draft_id: Uuid, section: &DraftSection) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO draft_sections
                (draft_id, template_section_id, template_section_title, position,
                 content, source_refs, warnings, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, NOW())
            ON CONFLICT (draft_id, template_section_id) DO UPDATE
            SET template_section_title = EXCLUDED.template_section_title,
                position = EXCLUDED.position,
                content = EXCLUDED.content,
                source_refs = EXCLUDED.source_refs,
                warnings = EXCLUDED.warnings,
                updated_at = NOW()
            "#,
        )
        .bind(draft_id)
        .bind(&section.template_section_id)
        .bind(&section.template_section_title)
        .bind(i32::try_from(section.position).context("section position overflow")?)
        .bind(&section.content)
        .bind(&section.source_refs)
        .bind(&section.warnings)
        .execute(&self.pool)
        .await?;

        sqlx::query("UPDATE drafts SET updated_at = NOW() WHERE id = $1")
            .bind(draft_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn save_references(
        &self,
        draft_id: Uuid,
        references: &[AggregatedReference],
    ) -> Result<()> {
        sqlx::query(r#"UPDATE drafts SET "references" = $2, updated_at = NOW() WHERE id = $1"#)
            .bind(draft_id)
            .bind(Json(references))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn current_draft(&self, project_id: Uuid) -> Result<Option<Draft>> {
        let draft = sqlx::query_as::<_, DraftRow>(
            r#"
            SELECT d.*
            FROM drafts d
            JOIN projects p ON p.current_draft_id = d.id
            WHERE p.id = $1
            "#,
        )
        .bind(project_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(draft) = draft else {
            return Ok(None);
        };

        let sections = sqlx::query_as::<_, DraftSectionRow>(
            r#"
            SELECT template_section_id, template_section_title, position,
                   content, source_refs, warnings
            FROM draft_sections
            WHERE draft_id = $1
            ORDER BY position
            "#,
        )
        .bind(draft.id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(Draft {
            id: draft.id,
            project_id: draft.project_id,
            sections: sections.into_iter().map(DraftSection::from).collect(),
            references: draft.references.0,
            created_at: draft.created_at,
            updated_at: draft.updated_at,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::project::{ProjectMode, Purpose};

    #[test]
    fn test_enum_text_round_trip() {
        assert_eq!(enum_to_text(&Purpose::LiteratureReview).unwrap(), "literature_review");
        let mode: ProjectMode = enum_from_text("multi").unwrap();
        assert_eq!(mode, ProjectMode::Multi);
    }

    #[test]
    fn test_enum_from_unknown_text_fails() {
        assert!(enum_from_text::<Purpose>("poem").is_err());
    }
}
