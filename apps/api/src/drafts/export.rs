use anyhow::Result;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{Delete, ObjectIdentifier};
use tracing::info;
use uuid::Uuid;

use crate::models::draft::Draft;
use crate::models::project::Project;

pub fn export_prefix(project_id: Uuid) -> String {
    format!("exports/{project_id}/")
}

pub fn export_key(project_id: Uuid, draft_id: Uuid) -> String {
    format!("{}{draft_id}.md", export_prefix(project_id))
}

/// Renders a draft as Markdown: project name as title, one `##` heading per
/// section in template order, then the numbered reference list.
pub fn render_markdown(project: &Project, draft: &Draft) -> String {
    let mut md = format!("# {}\n\n", project.name.trim());

    for section in &draft.sections {
        md.push_str(&format!("## {}\n\n", section.template_section_title.trim()));
        let content = section.content.trim();
        if !content.is_empty() {
            md.push_str(content);
            md.push_str("\n\n");
        }
    }

    if !draft.references.is_empty() {
        md.push_str("## References\n\n");
        for reference in &draft.references {
            md.push_str(&format!("{}. {}\n", reference.index, reference.formatted));
        }
    }

    md.trim_end().to_string() + "\n"
}

/// Uploads the rendered draft and returns its object key.
pub async fn upload_export(
    s3: &aws_sdk_s3::Client,
    s3_bucket: &str,
    project_id: Uuid,
    draft_id: Uuid,
    markdown: String,
) -> Result<String> {
    let key = export_key(project_id, draft_id);
    s3.put_object()
        .bucket(s3_bucket)
        .key(&key)
        .body(ByteStream::from(markdown.into_bytes()))
        .content_type("text/markdown")
        .send()
        .await
        .map_err(|e| anyhow::anyhow!("S3 upload failed: {e}"))?;

    info!("Uploaded draft export to s3://{}/{}", s3_bucket, key);
    Ok(key)
}

/// Removes every exported object of a project. Returns how many were deleted.
pub async fn delete_exports(
    s3: &aws_sdk_s3::Client,
    s3_bucket: &str,
    project_id: Uuid,
) -> Result<usize> {
    let listing = s3
        .list_objects_v2()
        .bucket(s3_bucket)
        .prefix(export_prefix(project_id))
        .send()
        .await
        .map_err(|e| anyhow::anyhow!("S3 list failed: {e}"))?;

    let objects = listing
        .contents()
        .iter()
        .filter_map(|object| object.key())
        .map(|key| ObjectIdentifier::builder().key(key).build())
        .collect::<Result<Vec<_>, _>>()?;
    if objects.is_empty() {
        return Ok(0);
    }

    let count = objects.len();
    let delete = Delete::builder().set_objects(Some(objects)).build()?;
    s3.delete_objects()
        .bucket(s3_bucket)
        .delete(delete)
        .send()
        .await
        .map_err(|e| anyhow::anyhow!("S3 delete failed: {e}"))?;

    info!("Deleted {count} exports of project {project_id}");
    Ok(count)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::models::draft::{AggregatedReference, DraftSection};
    use crate::models::project::{ProjectMode, ProjectStatus, Purpose};

    fn project() -> Project {
        Project {
            id: Uuid::new_v4(),
            name: "Attention Survey".to_string(),
            mode: ProjectMode::Multi,
            purpose: Purpose::LiteratureReview,
            status: ProjectStatus::Ready,
            section_mapping: vec![],
            global_instructions: None,
            template_id: None,
            document_ids: vec![],
            progress: None,
            last_error: None,
            current_draft_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn section(id: &str, title: &str, position: usize, content: &str) -> DraftSection {
        DraftSection {
            template_section_id: id.to_string(),
            template_section_title: title.to_string(),
            position,
            content: content.to_string(),
            source_refs: vec![],
            warnings: vec![],
        }
    }

    #[test]
    fn test_render_sections_in_order_with_references() {
        let project = project();
        let mut draft = Draft::new(project.id);
        draft.upsert_section(section("b", "Findings", 1, "Sparse wins."));
        draft.upsert_section(section("a", "Overview", 0, "Two papers.\n"));
        draft.references = vec![AggregatedReference {
            id: Uuid::new_v4(),
            index: 1,
            source_document_id: Uuid::new_v4(),
            source_ref_id: "ref-1".to_string(),
            authors: vec![],
            title: Some("Attention".to_string()),
            year: Some(2017),
            journal: None,
            doi: None,
            formatted: "(2017). Attention.".to_string(),
        }];

        assert_eq!(
            render_markdown(&project, &draft),
            "# Attention Survey\n\n## Overview\n\nTwo papers.\n\n## Findings\n\nSparse wins.\n\n\
             ## References\n\n1. (2017). Attention.\n"
        );
    }

    #[test]
    fn test_render_without_references_omits_heading() {
        let project = project();
        let mut draft = Draft::new(project.id);
        draft.upsert_section(section("a", "Overview", 0, ""));
        assert_eq!(
            render_markdown(&project, &draft),
            "# Attention Survey\n\n## Overview\n"
        );
    }

    #[test]
    fn test_export_key_layout() {
        let project_id = Uuid::new_v4();
        let draft_id = Uuid::new_v4();
        assert_eq!(
            export_key(project_id, draft_id),
            format!("exports/{project_id}/{draft_id}.md")
        );
    }
}
