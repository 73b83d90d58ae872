use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::document::SectionKey;

/// Whether sections are generated from one document at a time or synthesised across many.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectMode {
    Single,
    Multi,
}

/// What the generated report is for. Shapes the prompt wording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Purpose {
    FullReport,
    Summary,
    LiteratureReview,
    Comparative,
}

impl Purpose {
    /// `literature_review` and `comparative` only make sense across several documents.
    pub fn requires_multi(self) -> bool {
        matches!(self, Purpose::LiteratureReview | Purpose::Comparative)
    }

    pub fn describe(self) -> &'static str {
        match self {
            Purpose::FullReport => "a complete, detailed report",
            Purpose::Summary => "a concise summary",
            Purpose::LiteratureReview => "a literature review",
            Purpose::Comparative => "a comparative analysis",
        }
    }
}

/// Project lifecycle. `Generating` is only entered through `ProjectStore::begin_generation`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    #[default]
    Draft,
    Generating,
    Ready,
}

impl ProjectStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ProjectStatus::Draft => "draft",
            ProjectStatus::Generating => "generating",
            ProjectStatus::Ready => "ready",
        }
    }
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProjectStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(ProjectStatus::Draft),
            "generating" => Ok(ProjectStatus::Generating),
            "ready" => Ok(ProjectStatus::Ready),
            other => Err(anyhow::anyhow!("unknown project status '{other}'")),
        }
    }
}

/// Which documents a section draws from: every project document, or an explicit id list.
///
/// On the wire this is a JSON array; the sentinel `["all"]` selects every document.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DocumentSelector {
    #[default]
    All,
    Ids(Vec<Uuid>),
}

impl DocumentSelector {
    const ALL: &'static str = "all";

    /// Resolves against the project's ordered document list.
    /// Unknown ids are dropped without error; project order is preserved.
    pub fn resolve(&self, project_documents: &[Uuid]) -> Vec<Uuid> {
        match self {
            DocumentSelector::All => project_documents.to_vec(),
            DocumentSelector::Ids(ids) => project_documents
                .iter()
                .filter(|id| ids.contains(id))
                .copied()
                .collect(),
        }
    }
}

impl Serialize for DocumentSelector {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            DocumentSelector::All => vec![Self::ALL.to_string()].serialize(serializer),
            DocumentSelector::Ids(ids) => ids.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for DocumentSelector {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Vec::<String>::deserialize(deserializer)?;
        if raw.is_empty() || raw.iter().any(|s| s.eq_ignore_ascii_case(Self::ALL)) {
            return Ok(DocumentSelector::All);
        }
        // Ids that do not parse can never match a document, so they are dropped like unknown ids.
        Ok(DocumentSelector::Ids(
            raw.iter().filter_map(|s| Uuid::parse_str(s).ok()).collect(),
        ))
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceMapping {
    #[serde(default)]
    pub source_sections: Vec<SectionKey>,
    #[serde(default)]
    pub source_documents: DocumentSelector,
}

/// One target section of the template and where its content comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionConfig {
    pub template_section_id: String,
    pub template_section_title: String,
    #[serde(default)]
    pub source_mapping: SourceMapping,
    #[serde(default)]
    pub instructions: Option<String>,
    #[serde(default)]
    pub target_length: Option<String>,
}

/// A section that failed during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionFailure {
    pub section: String,
    pub error: String,
}

/// Persisted progress of the latest generation run.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationProgress {
    pub total_sections: usize,
    pub completed_sections: usize,
    pub current_section: Option<String>,
    pub errors: Vec<SectionFailure>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl GenerationProgress {
    pub fn started(total_sections: usize) -> Self {
        Self {
            total_sections,
            started_at: Some(Utc::now()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: Uuid,
    pub name: String,
    pub mode: ProjectMode,
    pub purpose: Purpose,
    pub status: ProjectStatus,
    pub section_mapping: Vec<SectionConfig>,
    pub global_instructions: Option<String>,
    pub template_id: Option<Uuid>,
    /// Ordered references to shared source documents.
    pub document_ids: Vec<Uuid>,
    pub progress: Option<GenerationProgress>,
    pub last_error: Option<String>,
    pub current_draft_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    /// Lists every missing prerequisite for generation. Empty means ready.
    pub fn readiness_issues(&self) -> Vec<String> {
        let mut issues = Vec::new();
        if self.template_id.is_none() {
            issues.push("Project has no template".to_string());
        }
        if self.document_ids.is_empty() {
            issues.push("Project has no source documents".to_string());
        }
        if self.section_mapping.is_empty() {
            issues.push("Project has no section mapping".to_string());
        }
        issues
    }

    /// Section ids must be unique: concurrent draft writes are keyed by them.
    pub fn duplicate_section_id(mapping: &[SectionConfig]) -> Option<&str> {
        mapping.iter().enumerate().find_map(|(i, s)| {
            mapping[..i]
                .iter()
                .any(|prev| prev.template_section_id == s.template_section_id)
                .then_some(s.template_section_id.as_str())
        })
    }
}

/// Input for creating a project.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProject {
    pub name: String,
    pub mode: ProjectMode,
    pub purpose: Purpose,
    #[serde(default)]
    pub section_mapping: Vec<SectionConfig>,
    #[serde(default)]
    pub global_instructions: Option<String>,
    #[serde(default)]
    pub template_id: Option<Uuid>,
}

impl NewProject {
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("name cannot be empty".to_string());
        }
        if self.purpose.requires_multi() && self.mode != ProjectMode::Multi {
            return Err(format!(
                "purpose {:?} requires multi-document mode",
                self.purpose
            ));
        }
        if let Some(id) = Project::duplicate_section_id(&self.section_mapping) {
            return Err(format!("duplicate templateSectionId '{id}'"));
        }
        Ok(())
    }
}
