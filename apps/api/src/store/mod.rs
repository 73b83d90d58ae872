//! Project / document / draft persistence.
//!
//! The orchestrator and handlers only see `Arc<dyn ProjectStore>`. Two backends:
//! `PgProjectStore` (PostgreSQL via sqlx) and `MemoryStore` (local development and tests).

use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use crate::models::document::SourceDocument;
use crate::models::draft::{AggregatedReference, Draft, DraftSection};
use crate::models::project::{GenerationProgress, NewProject, Project, SectionConfig};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgProjectStore;

#[async_trait]
pub trait ProjectStore: Send + Sync {
    async fn create_project(&self, new: NewProject) -> Result<Project>;

    async fn get_project(&self, id: Uuid) -> Result<Option<Project>>;

    /// Deletes the project and its drafts. Source documents are shared and survive.
    async fn delete_project(&self, id: Uuid) -> Result<bool>;

    async fn update_section_mapping(
        &self,
        id: Uuid,
        mapping: Vec<SectionConfig>,
        global_instructions: Option<String>,
    ) -> Result<bool>;

    async fn set_template(&self, id: Uuid, template_id: Uuid) -> Result<bool>;

    /// Stores the document and appends it to the project's ordered document list.
    async fn add_document(&self, project_id: Uuid, document: SourceDocument) -> Result<()>;

    /// Returns the project's documents in project order.
    async fn list_documents(&self, project_id: Uuid) -> Result<Vec<SourceDocument>>;

    /// Atomically moves the project to `generating` unless it is already there.
    /// Returns `false` when another run holds the project.
    async fn begin_generation(&self, id: Uuid, total_sections: usize) -> Result<bool>;

    async fn update_progress(&self, id: Uuid, progress: &GenerationProgress) -> Result<()>;

    /// Moves the project to `ready` with its final progress.
    async fn finish_generation(&self, id: Uuid, progress: &GenerationProgress) -> Result<()>;

    /// Moves the project back to `draft` and records the error.
    async fn rollback_generation(&self, id: Uuid, error: &str) -> Result<()>;

    /// Creates an empty draft and makes it the project's current draft.
    async fn create_draft(&self, project_id: Uuid) -> Result<Draft>;

    async fn save_draft_section(&self, draft_id: Uuid, section: &DraftSection) -> Result<()>;

    async fn save_references(
        &self,
        draft_id: Uuid,
        references: &[AggregatedReference],
    ) -> Result<()>;

    async fn current_draft(&self, project_id: Uuid) -> Result<Option<Draft>>;
}
