use std::collections::HashMap;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::document::SourceDocument;
use crate::models::draft::{AggregatedReference, Draft, DraftSection};
use crate::models::project::{
    GenerationProgress, NewProject, Project, ProjectStatus, SectionConfig,
};
use crate::store::ProjectStore;

#[derive(Default)]
struct Inner {
    projects: HashMap<Uuid, Project>,
    documents: HashMap<Uuid, SourceDocument>,
    drafts: HashMap<Uuid, Draft>,
}

/// In-process store. Used when no `DATABASE_URL` is configured, and by tests.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProjectStore for MemoryStore {
    async fn create_project(&self, new: NewProject) -> Result<Project> {
        let now = Utc::now();
        let project = Project {
            id: Uuid::new_v4(),
            name: new.name,
            mode: new.mode,
            purpose: new.purpose,
            status: ProjectStatus::Draft,
            section_mapping: new.section_mapping,
            global_instructions: new.global_instructions,
            template_id: new.template_id,
            document_ids: Vec::new(),
            progress: None,
            last_error: None,
            current_draft_id: None,
            created_at: now,
            updated_at: now,
        };
        self.inner
            .write()
            .await
            .projects
            .insert(project.id, project.clone());
        Ok(project)
    }

    async fn get_project(&self, id: Uuid) -> Result<Option<Project>> {
        Ok(self.inner.read().await.projects.get(&id).cloned())
    }

    async fn delete_project(&self, id: Uuid) -> Result<bool> {
        let mut inner = self.inner.write().await;
        let removed = inner.projects.remove(&id).is_some();
        inner.drafts.retain(|_, d| d.project_id != id);
        Ok(removed)
    }

    async fn update_section_mapping(
        &self,
        id: Uuid,
        mapping: Vec<SectionConfig>,
        global_instructions: Option<String>,
    ) -> Result<bool> {
        let mut inner = self.inner.write().await;
        let Some(project) = inner.projects.get_mut(&id) else {
            return Ok(false);
        };
        project.section_mapping = mapping;
        project.global_instructions = global_instructions;
        project.updated_at = Utc::now();
        Ok(true)
    }

    async fn set_template(&self, id: Uuid, template_id: Uuid) -> Result<bool> {
        let mut inner = self.inner.write().await;
        let Some(project) = inner.projects.get_mut(&id) else {
            return Ok(false);
        };
        project.template_id = Some(template_id);
        project.updated_at = Utc::now();
        Ok(true)
    }

    async fn add_document(&self, project_id: Uuid, document: SourceDocument) -> Result<()> {
        let mut inner = self.inner.write().await;
        let project = inner
            .projects
            .get_mut(&project_id)
            .ok_or_else(|| anyhow!("project {project_id} not found"))?;
        project.document_ids.push(document.id);
        project.updated_at = Utc::now();
        inner.documents.insert(document.id, document);
        Ok(())
    }

    async fn list_documents(&self, project_id: Uuid) -> Result<Vec<SourceDocument>> {
        let inner = self.inner.read().await;
        let project = inner
            .projects
            .get(&project_id)
            .ok_or_else(|| anyhow!("project {project_id} not found"))?;
        Ok(project
            .document_ids
            .iter()
            .filter_map(|id| inner.documents.get(id).cloned())
            .collect())
    }

    async fn begin_generation(&self, id: Uuid, total_sections: usize) -> Result<bool> {
        let mut inner = self.inner.write().await;
        let project = inner
            .projects
            .get_mut(&id)
            .ok_or_else(|| anyhow!("project {id} not found"))?;
        if project.status == ProjectStatus::Generating {
            return Ok(false);
        }
        project.status = ProjectStatus::Generating;
        project.progress = Some(GenerationProgress::started(total_sections));
        project.last_error = None;
        project.updated_at = Utc::now();
        Ok(true)
    }

    async fn update_progress(&self, id: Uuid, progress: &GenerationProgress) -> Result<()> {
        let mut inner = self.inner.write().await;
        if let Some(project) = inner.projects.get_mut(&id) {
            project.progress = Some(progress.clone());
            project.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn finish_generation(&self, id: Uuid, progress: &GenerationProgress) -> Result<()> {
        let mut inner = self.inner.write().await;
        let project = inner
            .projects
            .get_mut(&id)
            .ok_or_else(|| anyhow!("project {id} not found"))?;
        project.status = ProjectStatus::Ready;
        project.progress = Some(progress.clone());
        project.updated_at = Utc::now();
        Ok(())
    }

    async fn rollback_generation(&self, id: Uuid, error: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        if let Some(project) = inner.projects.get_mut(&id) {
            project.status = ProjectStatus::Draft;
            project.last_error = Some(error.to_string());
            project.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn create_draft(&self, project_id: Uuid) -> Result<Draft> {
        let mut inner = self.inner.write().await;
        let project = inner
            .projects
            .get_mut(&project_id)
            .ok_or_else(|| anyhow!("project {project_id} not found"))?;
        let draft = Draft::new(project_id);
        project.current_draft_id = Some(draft.id);
        inner.drafts.insert(draft.id, draft.clone());
        Ok(draft)
    }

    async fn save_draft_section(&self, draft_id: Uuid, section: &DraftSection) -> Result<()> {
        let mut inner = self.inner.write().await;
        let draft = inner
            .drafts
            .get_mut(&draft_id)
            .ok_or_else(|| anyhow!("draft {draft_id} not found"))?;
        draft.upsert_section(section.clone());
        Ok(())
    }

    async fn save_references(
        &self,
        draft_id: Uuid,
        references: &[AggregatedReference],
    ) -> Result<()> {
        let mut inner = self.inner.write().await;
        let draft = inner
            .drafts
            .get_mut(&draft_id)
            .ok_or_else(|| anyhow!("draft {draft_id} not found"))?;
        draft.references = references.to_vec();
        draft.updated_at = Utc::now();
        Ok(())
    }

    async fn current_draft(&self, project_id: Uuid) -> Result<Option<Draft>> {
        let inner = self.inner.read().await;
        Ok(inner
            .projects
            .get(&project_id)
            .and_then(|p| p.current_draft_id)
            .and_then(|id| inner.drafts.get(&id).cloned()))
    }
}
