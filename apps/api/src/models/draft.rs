use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One generated section of a draft. Keyed by `template_section_id` within its draft.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftSection {
    pub template_section_id: String,
    pub template_section_title: String,
    /// Index of the section in the project's mapping; drafts are ordered by it.
    pub position: usize,
    pub content: String,
    #[serde(default)]
    pub source_refs: Vec<Uuid>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

/// A de-duplicated citation with its sequential index in the draft.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedReference {
    pub id: Uuid,
    pub index: usize,
    pub source_document_id: Uuid,
    pub source_ref_id: String,
    pub authors: Vec<String>,
    pub title: Option<String>,
    pub year: Option<i32>,
    pub journal: Option<String>,
    pub doi: Option<String>,
    pub formatted: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Draft {
    pub id: Uuid,
    pub project_id: Uuid,
    pub sections: Vec<DraftSection>,
    pub references: Vec<AggregatedReference>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Draft {
    pub fn new(project_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            project_id,
            sections: Vec::new(),
            references: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Inserts or replaces a section by id, keeping mapping order.
    pub fn upsert_section(&mut self, section: DraftSection) {
        self.sections
            .retain(|s| s.template_section_id != section.template_section_id);
        let at = self
            .sections
            .partition_point(|s| s.position <= section.position);
        self.sections.insert(at, section);
        self.updated_at = Utc::now();
    }

    pub fn section(&self, template_section_id: &str) -> Option<&DraftSection> {
        self.sections
            .iter()
            .find(|s| s.template_section_id == template_section_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section(id: &str, position: usize, content: &str) -> DraftSection {
        DraftSection {
            template_section_id: id.to_string(),
            template_section_title: id.to_uppercase(),
            position,
            content: content.to_string(),
            source_refs: vec![],
            warnings: vec![],
        }
    }

    #[test]
    fn test_upsert_keeps_mapping_order_regardless_of_completion_order() {
        let mut draft = Draft::new(Uuid::new_v4());
        draft.upsert_section(section("c", 2, "third"));
        draft.upsert_section(section("a", 0, "first"));
        draft.upsert_section(section("b", 1, "second"));

        let ids: Vec<_> = draft
            .sections
            .iter()
            .map(|s| s.template_section_id.as_str())
            .collect();
        assert_eq!(ids, ["a", "b", "c"]);
    }

    #[test]
    fn test_upsert_replaces_existing_section() {
        let mut draft = Draft::new(Uuid::new_v4());
        draft.upsert_section(section("a", 0, "old"));
        draft.upsert_section(section("a", 0, "new"));
        assert_eq!(draft.sections.len(), 1);
        assert_eq!(draft.section("a").unwrap().content, "new");
    }

    #[test]
    fn test_draft_section_serializes_camel_case() {
        let json = serde_json::to_value(section("a", 0, "x")).unwrap();
        assert!(json.get("templateSectionId").is_some());
        assert!(json.get("templateSectionTitle").is_some());
        assert!(json.get("sourceRefs").is_some());
    }
}
