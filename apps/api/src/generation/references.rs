//! Reference aggregation — one flat, de-duplicated, sequentially indexed list per draft.

use std::collections::HashSet;

use uuid::Uuid;

use crate::models::document::{Reference, SourceDocument};
use crate::models::draft::AggregatedReference;

/// Flattens the references of every document (document order, then citation order).
///
/// A reference is a duplicate when its DOI (case-insensitive) or its normalised
/// title was already seen. Indices start at 1.
pub fn aggregate_references(documents: &[SourceDocument]) -> Vec<AggregatedReference> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut aggregated = Vec::new();

    for document in documents {
        for reference in &document.references {
            let keys = dedup_keys(reference);
            if keys.iter().any(|k| seen.contains(k)) {
                continue;
            }
            seen.extend(keys);

            aggregated.push(AggregatedReference {
                id: Uuid::new_v4(),
                index: aggregated.len() + 1,
                source_document_id: document.id,
                source_ref_id: reference.id.clone(),
                authors: reference.authors.clone(),
                title: reference.title.clone(),
                year: reference.year,
                journal: reference.journal.clone(),
                doi: reference.doi.clone(),
                formatted: format_reference(reference),
            });
        }
    }

    aggregated
}

fn dedup_keys(reference: &Reference) -> Vec<String> {
    let mut keys = Vec::new();
    if let Some(doi) = reference.doi.as_deref().map(str::trim).filter(|d| !d.is_empty()) {
        keys.push(format!("doi:{}", doi.to_lowercase()));
    }
    let title = reference
        .title
        .as_deref()
        .or(reference.raw.as_deref())
        .map(normalise)
        .unwrap_or_default();
    if !title.is_empty() {
        keys.push(format!("title:{title}"));
    }
    keys
}

fn normalise(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// `Authors (Year). Title. Journal. doi:DOI`, or the raw citation text when the
/// record has no structured title.
pub fn format_reference(reference: &Reference) -> String {
    let Some(title) = reference.title.as_deref().filter(|t| !t.trim().is_empty()) else {
        if let Some(raw) = reference.raw.as_deref().filter(|r| !r.trim().is_empty()) {
            return raw.trim().to_string();
        }
        return reference.id.clone();
    };

    let mut out = String::new();
    if !reference.authors.is_empty() {
        out.push_str(&reference.authors.join(", "));
        out.push(' ');
    }
    match reference.year {
        Some(year) => out.push_str(&format!("({year}). ")),
        None => out.push_str("(n.d.). "),
    }
    out.push_str(title.trim().trim_end_matches('.'));
    out.push('.');
    if let Some(journal) = reference.journal.as_deref().filter(|j| !j.trim().is_empty()) {
        out.push(' ');
        out.push_str(journal.trim());
        out.push('.');
    }
    if let Some(doi) = reference.doi.as_deref().filter(|d| !d.trim().is_empty()) {
        out.push_str(&format!(" doi:{}", doi.trim()));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::source::fixtures::document;

    fn reference(id: &str, title: &str, doi: Option<&str>) -> Reference {
        Reference {
            id: id.to_string(),
            authors: vec!["Smith, J.".to_string()],
            title: Some(title.to_string()),
            year: Some(2020),
            journal: Some("Nature".to_string()),
            doi: doi.map(String::from),
            raw: None,
        }
    }

    #[test]
    fn test_aggregates_across_documents_with_sequential_indices() {
        let mut a = document("A", &[]);
        a.references = vec![reference("r1", "First", None), reference("r2", "Second", None)];
        let mut b = document("B", &[]);
        b.references = vec![reference("r1", "Third", None)];

        let refs = aggregate_references(&[a.clone(), b.clone()]);
        let indices: Vec<_> = refs.iter().map(|r| r.index).collect();
        assert_eq!(indices, [1, 2, 3]);
        assert_eq!(refs[2].source_document_id, b.id);
        assert_eq!(refs[0].source_ref_id, "r1");
    }

    #[test]
    fn test_dedups_by_doi_case_insensitively() {
        let mut a = document("A", &[]);
        a.references = vec![reference("r1", "Paper", Some("10.1000/ABC"))];
        let mut b = document("B", &[]);
        b.references = vec![reference("x", "Paper (preprint)", Some("10.1000/abc"))];
        assert_eq!(aggregate_references(&[a, b]).len(), 1);
    }

    #[test]
    fn test_dedups_by_normalised_title() {
        let mut a = document("A", &[]);
        a.references = vec![
            reference("r1", "Attention Is All You Need", None),
            reference("r2", "attention is all you need.", None),
        ];
        assert_eq!(aggregate_references(&[a]).len(), 1);
    }

    #[test]
    fn test_format_reference_full() {
        let r = reference("r1", "Deep learning.", Some("10.1/xyz"));
        assert_eq!(
            format_reference(&r),
            "Smith, J. (2020). Deep learning. Nature. doi:10.1/xyz"
        );
    }

    #[test]
    fn test_format_reference_falls_back_to_raw() {
        let r = Reference {
            id: "r9".to_string(),
            raw: Some("  [9] Some citation line ".to_string()),
            ..Reference::default()
        };
        assert_eq!(format_reference(&r), "[9] Some citation line");
    }
}
