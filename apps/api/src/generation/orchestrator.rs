//! Generation Orchestrator — turns a project's section mapping into a draft.
//!
//! Flow: readiness check → begin_generation (run guard) → create draft →
//!       batches of `concurrency` sections (each: select sources → prompt →
//!       model call under timeout → parse → persist → emit) → aggregate
//!       references → status `ready` → `complete` event.
//!
//! Per-section failures are contained: the section gets a placeholder and the
//! run carries on. Only failures outside the per-section boundary (draft
//! creation, reference persistence, final status write) abort the run, which
//! rolls the project back to `draft`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use futures::future::join_all;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::generation::progress::{
    CompletePayload, ErrorPayload, GenerationEvent, ProgressChannel, ProgressPayload,
    SectionCompletePayload,
};
use crate::generation::prompts::{
    build_comparative_analysis_prompt, build_multi_document_synthesis_prompt,
    build_section_rewrite_prompt, truncate_for_context, MultiDocumentRequest,
    SectionRewriteRequest, MAX_CONTEXT_CHARS,
};
use crate::generation::references::aggregate_references;
use crate::generation::response::{parse_multi_doc_response, parse_section_content, ParsedSection};
use crate::generation::source::{
    build_excerpts, extract_section_text, has_enough_content, select_documents,
    MIN_SOURCE_CHARS,
};
use crate::llm_client::{LlmError, ModelClient};
use crate::models::document::SourceDocument;
use crate::models::draft::DraftSection;
use crate::models::project::{
    GenerationProgress, Project, ProjectMode, ProjectStatus, Purpose, SectionConfig,
    SectionFailure,
};
use crate::store::ProjectStore;

const PREVIEW_CHARS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationSettings {
    /// Sections generated at the same time within one run.
    pub concurrency: usize,
    /// Upper bound on a single model call.
    pub section_timeout: Duration,
    /// Source text ceiling per prompt.
    pub max_context_chars: usize,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            concurrency: 3,
            section_timeout: Duration::from_secs(5 * 60),
            max_context_chars: MAX_CONTEXT_CHARS,
        }
    }
}

/// Recoverable failure of one section.
#[derive(Debug, Error)]
pub enum SectionError {
    #[error("Generation timed out")]
    Timeout,

    #[error("Model error: {0}")]
    Model(#[from] LlmError),

    #[error("Failed to save section: {0}")]
    Store(anyhow::Error),
}

/// Outcome of a finished run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub draft_id: Uuid,
    pub sections_generated: usize,
    pub errors: Vec<SectionFailure>,
}

/// Everything a run needs, loaded and validated before the status changes.
pub struct PreparedRun {
    project: Project,
    documents: Vec<SourceDocument>,
}

impl PreparedRun {
    pub fn project_id(&self) -> Uuid {
        self.project.id
    }
}

/// Section text ready to be persisted.
struct GeneratedSection {
    success: bool,
    content: String,
    warnings: Vec<String>,
    source_refs: Vec<Uuid>,
}

impl GeneratedSection {
    fn from_parsed(parsed: ParsedSection, source_refs: Vec<Uuid>) -> Self {
        Self {
            success: parsed.success,
            content: parsed.content,
            warnings: parsed.warnings,
            source_refs,
        }
    }

    fn insufficient(title: &str, source_refs: Vec<Uuid>) -> Self {
        Self::from_parsed(
            ParsedSection::failed(
                title,
                format!(
                    "Insufficient source content (fewer than {MIN_SOURCE_CHARS} characters)"
                ),
            ),
            source_refs,
        )
    }
}

/// Shared counters for the sections of one run.
struct RunTracker {
    total: usize,
    completed: AtomicUsize,
    current_section: Mutex<Option<String>>,
    errors: Mutex<Vec<SectionFailure>>,
    started_at: chrono::DateTime<Utc>,
}

impl RunTracker {
    fn new(total: usize) -> Self {
        Self {
            total,
            completed: AtomicUsize::new(0),
            current_section: Mutex::new(None),
            errors: Mutex::new(Vec::new()),
            started_at: Utc::now(),
        }
    }

    fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    fn set_current(&self, title: &str) {
        if let Ok(mut current) = self.current_section.lock() {
            *current = Some(title.to_string());
        }
    }

    fn record_failure(&self, section: &str, error: &str) {
        if let Ok(mut errors) = self.errors.lock() {
            errors.push(SectionFailure {
                section: section.to_string(),
                error: error.to_string(),
            });
        }
    }

    fn complete_one(&self) -> usize {
        self.completed.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn errors(&self) -> Vec<SectionFailure> {
        self.errors.lock().map(|e| e.clone()).unwrap_or_default()
    }

    fn snapshot(&self) -> GenerationProgress {
        GenerationProgress {
            total_sections: self.total,
            completed_sections: self.completed(),
            current_section: self.current_section.lock().ok().and_then(|c| c.clone()),
            errors: self.errors(),
            started_at: Some(self.started_at),
            finished_at: None,
        }
    }

    fn finish(&self) -> GenerationProgress {
        GenerationProgress {
            current_section: None,
            finished_at: Some(Utc::now()),
            ..self.snapshot()
        }
    }
}

pub struct Orchestrator {
    store: Arc<dyn ProjectStore>,
    model: Arc<dyn ModelClient>,
    progress: ProgressChannel,
    settings: GenerationSettings,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn ProjectStore>,
        model: Arc<dyn ModelClient>,
        progress: ProgressChannel,
        settings: GenerationSettings,
    ) -> Self {
        Self {
            store,
            model,
            progress,
            settings,
        }
    }

    /// Validates readiness and claims the project for a run.
    ///
    /// On any error here no state has changed. On success the project is `generating`.
    pub async fn prepare(&self, project_id: Uuid) -> Result<PreparedRun, AppError> {
        let project = self
            .store
            .get_project(project_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Project {project_id} not found")))?;

        let issues = project.readiness_issues();
        if !issues.is_empty() {
            return Err(AppError::UnprocessableEntity(format!(
                "Project is not ready for generation: {}",
                issues.join("; ")
            )));
        }
        if project.status == ProjectStatus::Generating {
            return Err(already_generating(project_id));
        }

        let documents = self.store.list_documents(project_id).await?;
        if documents.is_empty() {
            return Err(AppError::UnprocessableEntity(
                "Project source documents could not be loaded".to_string(),
            ));
        }

        let total = project.section_mapping.len();
        if !self.store.begin_generation(project_id, total).await? {
            return Err(already_generating(project_id));
        }

        Ok(PreparedRun { project, documents })
    }

    /// Validates synchronously, then runs the generation on a background task.
    ///
    /// A supervisor task watches the run: if it panics, the project is rolled back
    /// and a non-recoverable error is published.
    pub async fn start(self: &Arc<Self>, project_id: Uuid) -> Result<(), AppError> {
        let run = self.prepare(project_id).await?;

        let worker = Arc::clone(self);
        let handle = tokio::spawn(async move { worker.execute(run).await });

        let supervisor = Arc::clone(self);
        tokio::spawn(async move {
            match handle.await {
                Ok(Ok(summary)) => info!(
                    "Generation for project {} finished: draft {}, {} section errors",
                    project_id,
                    summary.draft_id,
                    summary.errors.len()
                ),
                Ok(Err(err)) => error!("Generation for project {project_id} failed: {err}"),
                Err(join_err) => {
                    error!("Generation task for project {project_id} aborted: {join_err}");
                    supervisor
                        .fail_run(project_id, "Generation task aborted unexpectedly")
                        .await;
                }
            }
        });

        Ok(())
    }

    /// Prepares and runs to completion on the caller's task.
    pub async fn generate(&self, project_id: Uuid) -> Result<RunSummary, AppError> {
        let run = self.prepare(project_id).await?;
        self.execute(run).await
    }

    /// Runs a prepared generation. Fatal errors roll the project back to `draft`.
    pub async fn execute(&self, run: PreparedRun) -> Result<RunSummary, AppError> {
        let project_id = run.project_id();
        match self.run_sections(&run).await {
            Ok(summary) => Ok(summary),
            Err(err) => {
                self.fail_run(project_id, &format!("{err:#}")).await;
                Err(AppError::Internal(err))
            }
        }
    }

    async fn fail_run(&self, project_id: Uuid, message: &str) {
        error!("Generation for project {project_id} rolled back: {message}");
        if let Err(rollback_err) = self.store.rollback_generation(project_id, message).await {
            error!("Failed to roll back project {project_id}: {rollback_err:#}");
        }
        self.progress.publish(GenerationEvent::Error(ErrorPayload {
            project_id,
            section: None,
            error: message.to_string(),
            recoverable: false,
        }));
    }

    async fn run_sections(&self, run: &PreparedRun) -> anyhow::Result<RunSummary> {
        let project = &run.project;
        let total = project.section_mapping.len();
        let concurrency = self.settings.concurrency.max(1);

        info!(
            "Starting generation for project {} ({} sections, {:?} mode, concurrency {})",
            project.id, total, project.mode, concurrency
        );

        let draft = self
            .store
            .create_draft(project.id)
            .await
            .context("failed to create draft")?;

        let tracker = RunTracker::new(total);
        let indexed: Vec<(usize, &SectionConfig)> =
            project.section_mapping.iter().enumerate().collect();

        for batch in indexed.chunks(concurrency) {
            join_all(batch.iter().map(|(position, section)| {
                self.process_section(run, draft.id, &tracker, *position, section)
            }))
            .await;
        }

        let references = aggregate_references(&run.documents);
        self.store
            .save_references(draft.id, &references)
            .await
            .context("failed to save references")?;

        let progress = tracker.finish();
        self.store
            .finish_generation(project.id, &progress)
            .await
            .context("failed to mark project ready")?;

        info!(
            "Generation for project {} complete: draft {}, {} sections, {} errors, {} references",
            project.id,
            draft.id,
            total,
            progress.errors.len(),
            references.len()
        );

        self.progress.publish(GenerationEvent::Complete(CompletePayload {
            project_id: project.id,
            draft_id: draft.id,
            sections_generated: total,
            completed_sections: progress.completed_sections,
            errors: progress.errors.clone(),
        }));

        Ok(RunSummary {
            draft_id: draft.id,
            sections_generated: total,
            errors: progress.errors,
        })
    }

    /// Generates, persists and reports one section. Never fails the run.
    async fn process_section(
        &self,
        run: &PreparedRun,
        draft_id: Uuid,
        tracker: &RunTracker,
        position: usize,
        section: &SectionConfig,
    ) {
        let project_id = run.project_id();
        let title = section.template_section_title.as_str();

        tracker.set_current(title);
        self.progress.publish(GenerationEvent::Progress(ProgressPayload {
            project_id,
            current_section: title.to_string(),
            completed_sections: tracker.completed(),
            total_sections: tracker.total,
        }));

        let outcome = async {
            let generated = self.generate_section(run, section).await?;
            let draft_section = DraftSection {
                template_section_id: section.template_section_id.clone(),
                template_section_title: title.to_string(),
                position,
                content: generated.content.clone(),
                source_refs: generated.source_refs.clone(),
                warnings: generated.warnings.clone(),
            };
            self.store
                .save_draft_section(draft_id, &draft_section)
                .await
                .map_err(SectionError::Store)?;
            Ok::<_, SectionError>(generated)
        }
        .await;

        match outcome {
            Ok(generated) => {
                info!(
                    "Section '{}' of project {} done (success={})",
                    title, project_id, generated.success
                );
                self.progress
                    .publish(GenerationEvent::SectionComplete(SectionCompletePayload {
                        project_id,
                        section_id: section.template_section_id.clone(),
                        section_title: title.to_string(),
                        preview: preview(&generated.content),
                        success: generated.success,
                    }));
            }
            Err(err) => {
                let message = err.to_string();
                warn!("Section '{title}' of project {project_id} failed: {message}");
                tracker.record_failure(title, &message);

                let fallback = DraftSection {
                    template_section_id: section.template_section_id.clone(),
                    template_section_title: title.to_string(),
                    position,
                    content: format!("[Generation failed: {message}. Please edit manually.]"),
                    source_refs: Vec::new(),
                    warnings: vec![message.clone()],
                };
                if let Err(save_err) = self.store.save_draft_section(draft_id, &fallback).await {
                    warn!("Could not save placeholder for section '{title}': {save_err:#}");
                }

                self.progress.publish(GenerationEvent::Error(ErrorPayload {
                    project_id,
                    section: Some(title.to_string()),
                    error: message,
                    recoverable: true,
                }));
            }
        }

        tracker.complete_one();
        if let Err(err) = self
            .store
            .update_progress(project_id, &tracker.snapshot())
            .await
        {
            warn!("Could not persist progress for project {project_id}: {err:#}");
        }
    }

    /// Source selection, prompt, model call and parse for one section.
    async fn generate_section(
        &self,
        run: &PreparedRun,
        section: &SectionConfig,
    ) -> Result<GeneratedSection, SectionError> {
        let project = &run.project;
        let title = section.template_section_title.as_str();
        let keys = &section.source_mapping.source_sections;
        let documents = select_documents(&section.source_mapping.source_documents, &run.documents);
        let max_chars = self.settings.max_context_chars;

        match project.mode {
            ProjectMode::Single => {
                let Some(document) = documents.first() else {
                    return Ok(GeneratedSection::insufficient(title, Vec::new()));
                };
                let text = extract_section_text(document, keys);
                if !has_enough_content(&text) {
                    return Ok(GeneratedSection::insufficient(title, vec![document.id]));
                }

                let context = truncate_for_context(&text, max_chars);
                let prompt = build_section_rewrite_prompt(&SectionRewriteRequest {
                    section_title: title,
                    source_content: &context.text,
                    instructions: section.instructions.as_deref(),
                    global_instructions: project.global_instructions.as_deref(),
                    target_length: section.target_length.as_deref(),
                    purpose: project.purpose,
                    document_metadata: Some(&document.extracted_content.metadata),
                });

                let raw = self.call_model(&prompt).await?;
                let mut generated = GeneratedSection::from_parsed(
                    parse_section_content(&raw, title),
                    vec![document.id],
                );
                if context.truncated {
                    generated.warnings.push(truncation_warning(max_chars));
                }
                Ok(generated)
            }
            ProjectMode::Multi => {
                let (excerpts, truncated) = build_excerpts(&documents, keys, max_chars);
                let combined: String = excerpts
                    .iter()
                    .map(|e| e.content.as_str())
                    .collect::<Vec<_>>()
                    .join("\n");
                let source_refs: Vec<Uuid> = documents.iter().map(|d| d.id).collect();
                if !has_enough_content(&combined) {
                    return Ok(GeneratedSection::insufficient(title, source_refs));
                }

                let request = MultiDocumentRequest {
                    section_title: title,
                    documents: &excerpts,
                    instructions: section.instructions.as_deref(),
                    global_instructions: project.global_instructions.as_deref(),
                    target_length: section.target_length.as_deref(),
                    purpose: project.purpose,
                };
                let prompt = match project.purpose {
                    Purpose::Comparative => build_comparative_analysis_prompt(&request),
                    _ => build_multi_document_synthesis_prompt(&request),
                };

                let raw = self.call_model(&prompt).await?;
                let parsed = parse_multi_doc_response(&raw, title, excerpts.len());
                let mut generated = GeneratedSection::from_parsed(parsed, source_refs);
                if truncated {
                    generated.warnings.push(truncation_warning(max_chars));
                }
                Ok(generated)
            }
        }
    }

    /// Model call bounded by the section timeout. On expiry the call future is
    /// dropped, which aborts the in-flight request.
    async fn call_model(&self, prompt: &str) -> Result<String, SectionError> {
        match tokio::time::timeout(
            self.settings.section_timeout,
            self.model.generate_content(prompt),
        )
        .await
        {
            Ok(result) => Ok(result?),
            Err(_) => Err(SectionError::Timeout),
        }
    }
}

fn already_generating(project_id: Uuid) -> AppError {
    AppError::Conflict(format!("Project {project_id} is already generating"))
}

fn truncation_warning(max_chars: usize) -> String {
    format!("Source content was truncated to {max_chars} characters")
}

fn preview(content: &str) -> String {
    content.chars().take(PREVIEW_CHARS).collect()
}
