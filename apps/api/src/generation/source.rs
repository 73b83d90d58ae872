//! Source selection — picks the documents and text a section is generated from.

use uuid::Uuid;

use crate::generation::prompts::{truncate_for_context, DocumentExcerpt};
use crate::models::document::{SectionKey, SourceDocument};
use crate::models::project::DocumentSelector;

/// Sections with less source text than this are not sent to the model.
pub const MIN_SOURCE_CHARS: usize = 50;

/// Documents a section draws from, in project order.
pub fn select_documents<'a>(
    selector: &DocumentSelector,
    documents: &'a [SourceDocument],
) -> Vec<&'a SourceDocument> {
    let ids: Vec<Uuid> = documents.iter().map(|d| d.id).collect();
    let wanted = selector.resolve(&ids);
    documents
        .iter()
        .filter(|d| wanted.contains(&d.id))
        .collect()
}

/// Text of the requested sections, joined in the requested order.
/// With no keys configured the whole document text is used.
pub fn extract_section_text(document: &SourceDocument, keys: &[SectionKey]) -> String {
    let content = &document.extracted_content;
    if keys.is_empty() {
        return content.full_text.trim().to_string();
    }
    keys.iter()
        .filter_map(|key| content.sections.get(key))
        .map(|section| section.text.trim())
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn has_enough_content(text: &str) -> bool {
    text.trim().chars().count() >= MIN_SOURCE_CHARS
}

/// Per-document excerpts for multi-document prompts.
///
/// Documents that contribute no text are omitted. The context ceiling is split
/// evenly across the remaining documents; the flag reports whether any was cut.
pub fn build_excerpts(
    documents: &[&SourceDocument],
    keys: &[SectionKey],
    max_total_chars: usize,
) -> (Vec<DocumentExcerpt>, bool) {
    let texts: Vec<(&SourceDocument, String)> = documents
        .iter()
        .map(|doc| (*doc, extract_section_text(doc, keys)))
        .filter(|(_, text)| !text.is_empty())
        .collect();

    if texts.is_empty() {
        return (Vec::new(), false);
    }

    let budget = max_total_chars / texts.len();
    let mut any_truncated = false;
    let excerpts = texts
        .into_iter()
        .map(|(doc, text)| {
            let cut = truncate_for_context(&text, budget);
            any_truncated |= cut.truncated;
            DocumentExcerpt {
                title: doc.display_title().to_string(),
                authors: doc.extracted_content.metadata.authors.clone(),
                content: cut.text,
            }
        })
        .collect();
    (excerpts, any_truncated)
}

#[cfg(test)]
pub(crate) mod fixtures {
    use chrono::Utc;

    use super::*;
    use crate::models::document::{ContentSection, ExtractedContent};

    pub fn document(title: &str, sections: &[(SectionKey, &str)]) -> SourceDocument {
        let mut content = ExtractedContent::default();
        for (key, text) in sections {
            content.sections.insert(
                key.clone(),
                ContentSection {
                    text: text.to_string(),
                    headings: vec![key.to_string()],
                },
            );
        }
        content.full_text = sections
            .iter()
            .map(|(_, t)| *t)
            .collect::<Vec<_>>()
            .join("\n");
        content.metadata.title = Some(title.to_string());
        SourceDocument {
            id: Uuid::new_v4(),
            filename: format!("{title}.pdf"),
            extracted_content: content,
            references: vec![],
            parsing_warnings: vec![],
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::document;
    use super::*;

    #[test]
    fn test_select_all_keeps_project_order() {
        let docs = vec![document("a", &[]), document("b", &[])];
        let selected = select_documents(&DocumentSelector::All, &docs);
        assert_eq!(selected.len(), 2);
        assert_eq!(selected[0].id, docs[0].id);
    }

    #[test]
    fn test_select_ids_drops_unknown() {
        let docs = vec![document("a", &[]), document("b", &[])];
        let selector = DocumentSelector::Ids(vec![docs[1].id, Uuid::new_v4()]);
        let selected = select_documents(&selector, &docs);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].id, docs[1].id);
    }

    #[test]
    fn test_extract_joins_requested_sections_in_order() {
        let doc = document(
            "a",
            &[
                (SectionKey::Abstract, "abstract text"),
                (SectionKey::Results, "results text"),
            ],
        );
        let text = extract_section_text(&doc, &[SectionKey::Results, SectionKey::Abstract]);
        assert_eq!(text, "results text\n\nabstract text");
    }

    #[test]
    fn test_extract_without_keys_uses_full_text() {
        let doc = document("a", &[(SectionKey::Methods, "method body")]);
        assert_eq!(extract_section_text(&doc, &[]), "method body");
    }

    #[test]
    fn test_extract_missing_keys_yields_empty() {
        let doc = document("a", &[(SectionKey::Methods, "method body")]);
        assert_eq!(extract_section_text(&doc, &[SectionKey::Discussion]), "");
    }

    #[test]
    fn test_minimum_content_threshold() {
        assert!(!has_enough_content(&"x".repeat(MIN_SOURCE_CHARS - 1)));
        assert!(has_enough_content(&"x".repeat(MIN_SOURCE_CHARS)));
        assert!(!has_enough_content(&format!("  {}  ", "x".repeat(49))));
    }

    #[test]
    fn test_excerpts_skip_empty_documents_and_split_budget() {
        let long = "a".repeat(80);
        let short = "c".repeat(30);
        let a = document("A", &[(SectionKey::Abstract, long.as_str())]);
        let b = document("B", &[(SectionKey::Methods, "only methods")]);
        let c = document("C", &[(SectionKey::Abstract, short.as_str())]);
        let (excerpts, truncated) =
            build_excerpts(&[&a, &b, &c], &[SectionKey::Abstract], 100);

        assert_eq!(excerpts.len(), 2);
        assert_eq!(excerpts[0].title, "A");
        assert_eq!(excerpts[0].content.len(), 50);
        assert_eq!(excerpts[1].content.len(), 30);
        assert!(truncated);
    }
}
