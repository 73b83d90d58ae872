//! Document Analyzer — turns an uploaded PDF into a structured `SourceDocument`.
//!
//! Pluggable like the model client: carried in `AppState` as `Arc<dyn DocumentAnalyzer>`.
//! Default: `PdfTextAnalyzer` (pdf-extract text + a line-based heading scan).

use std::collections::BTreeMap;
use std::ops::Range;

use chrono::Utc;
use thiserror::Error;
use uuid::Uuid;

use crate::models::document::{
    ContentSection, DocumentMetadata, ExtractedContent, Figure, Reference, SectionKey,
    SourceDocument, Table,
};

/// Longest line still considered a heading.
const MAX_HEADING_CHARS: usize = 60;
/// Longest line still considered a title.
const MAX_TITLE_CHARS: usize = 200;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Could not read PDF '{filename}': {reason}")]
    Unreadable { filename: String, reason: String },

    #[error("No extractable text found in '{0}'")]
    NoText(String),
}

/// CPU-bound; callers run it on a blocking thread.
pub trait DocumentAnalyzer: Send + Sync {
    fn analyze(&self, filename: &str, bytes: &[u8]) -> Result<SourceDocument, AnalysisError>;
}

pub struct PdfTextAnalyzer;

impl DocumentAnalyzer for PdfTextAnalyzer {
    fn analyze(&self, filename: &str, bytes: &[u8]) -> Result<SourceDocument, AnalysisError> {
        let text =
            pdf_extract::extract_text_from_mem(bytes).map_err(|e| AnalysisError::Unreadable {
                filename: filename.to_string(),
                reason: e.to_string(),
            })?;
        if text.trim().is_empty() {
            return Err(AnalysisError::NoText(filename.to_string()));
        }
        let mut document = analyze_text(filename, &text);
        let pages = text.matches('\u{c}').count();
        if pages > 0 {
            document.extracted_content.metadata.page_count = Some(pages as u32 + 1);
        }
        Ok(document)
    }
}

/// Builds the content tree from plain extracted text.
pub fn analyze_text(filename: &str, text: &str) -> SourceDocument {
    let mut sections: BTreeMap<SectionKey, ContentSection> = BTreeMap::new();
    let mut title: Option<String> = None;
    let mut current: Option<SectionKey> = None;
    let mut figures = Vec::new();
    let mut tables = Vec::new();
    let mut reference_lines: Vec<&str> = Vec::new();

    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if let Some((key, heading)) = heading_key(line) {
            sections.entry(key.clone()).or_default().headings.push(heading);
            current = Some(key);
            continue;
        }

        if let Some(figure) = caption(line, &["Figure", "Fig."]) {
            figures.push(Figure {
                label: figure.0,
                caption: figure.1,
            });
        } else if let Some(table) = caption(line, &["Table"]) {
            tables.push(Table {
                label: table.0,
                caption: table.1,
                rows: Vec::new(),
            });
        }

        match &current {
            None => {
                if title.is_none() && line.chars().count() <= MAX_TITLE_CHARS {
                    title = Some(line.to_string());
                }
            }
            Some(SectionKey::References) => reference_lines.push(line),
            Some(key) => {
                let section = sections.entry(key.clone()).or_default();
                if !section.text.is_empty() {
                    section.text.push('\n');
                }
                section.text.push_str(line);
            }
        }
    }

    let references = split_references(&reference_lines);
    if let Some(section) = sections.get_mut(&SectionKey::References) {
        section.text = reference_lines.join("\n");
    }

    let mut warnings = Vec::new();
    if sections.is_empty() {
        warnings.push("No recognisable section headings found; only full text is available".to_string());
    }
    if !sections.contains_key(&SectionKey::References) {
        warnings.push("No references section found".to_string());
    }

    SourceDocument {
        id: Uuid::new_v4(),
        filename: filename.to_string(),
        extracted_content: ExtractedContent {
            sections,
            full_text: text.trim().to_string(),
            tables,
            figures,
            equations: Vec::new(),
            metadata: DocumentMetadata {
                title,
                ..DocumentMetadata::default()
            },
        },
        references,
        parsing_warnings: warnings,
        created_at: Utc::now(),
    }
}

/// Canonical section heading such as `2. Methods`, `IV. RESULTS` or `Abstract:`.
fn heading_key(line: &str) -> Option<(SectionKey, String)> {
    if line.chars().count() > MAX_HEADING_CHARS {
        return None;
    }
    let unnumbered = line.trim_start_matches(|c: char| c.is_ascii_digit() || c == '.' || c == ' ');
    [unnumbered, strip_roman_numeral(unnumbered)]
        .into_iter()
        .map(|candidate| candidate.trim_end_matches(':').trim())
        .filter(|candidate| !candidate.is_empty())
        .map(|candidate| (SectionKey::from(candidate), candidate.to_string()))
        .find(|(key, _)| key.is_canonical())
}

fn strip_roman_numeral(line: &str) -> &str {
    match line.split_once(['.', ' ']) {
        Some((numeral, rest))
            if !numeral.is_empty() && numeral.chars().all(|c| matches!(c, 'I' | 'V' | 'X')) =>
        {
            rest.trim_start_matches(['.', ' '])
        }
        _ => line,
    }
}

/// `(label, caption)` for lines like `Figure 3: Loss curves` or `Table 2. Results`.
fn caption(line: &str, prefixes: &[&str]) -> Option<(String, String)> {
    let prefix = prefixes.iter().find(|p| line.starts_with(**p))?;
    let rest = line[prefix.len()..].trim_start();
    let number: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    if number.is_empty() {
        return None;
    }
    let caption = rest[number.len()..]
        .trim_start_matches([':', '.', ' '])
        .trim()
        .to_string();
    let label = if *prefix == "Fig." { "Figure" } else { *prefix };
    Some((format!("{label} {number}"), caption))
}

/// Groups reference-section lines into entries. A line opening with `[n]` or `n.`
/// starts a new entry; other lines continue the previous one.
fn split_references(lines: &[&str]) -> Vec<Reference> {
    let mut entries: Vec<String> = Vec::new();
    for line in lines {
        if entries.is_empty() || starts_entry(line) {
            entries.push(line.to_string());
        } else if let Some(last) = entries.last_mut() {
            last.push(' ');
            last.push_str(line);
        }
    }

    entries
        .into_iter()
        .enumerate()
        .map(|(i, raw)| {
            let doi = find_doi(&raw);
            let year = match &doi {
                Some((span, _)) => {
                    find_year(&format!("{} {}", &raw[..span.start], &raw[span.end..]))
                }
                None => find_year(&raw),
            };
            Reference {
                id: format!("ref-{}", i + 1),
                year,
                doi: doi.map(|(_, doi)| doi),
                raw: Some(raw),
                ..Reference::default()
            }
        })
        .collect()
}

fn starts_entry(line: &str) -> bool {
    if let Some(rest) = line.strip_prefix('[') {
        return rest.chars().next().is_some_and(|c| c.is_ascii_digit());
    }
    let digits = line.chars().take_while(|c| c.is_ascii_digit()).count();
    digits > 0 && line[digits..].starts_with('.')
}

fn find_year(raw: &str) -> Option<i32> {
    raw.split(|c: char| !c.is_ascii_digit())
        .filter(|token| token.len() == 4)
        .filter_map(|token| token.parse::<i32>().ok())
        .find(|year| (1900..=2100).contains(year))
}

/// First `10.<registrant>/<suffix>` token, with its byte span in `raw`.
fn find_doi(raw: &str) -> Option<(Range<usize>, String)> {
    raw.match_indices("10.")
        .map(|(start, _)| start)
        .filter(|&start| !raw[..start].ends_with(|c: char| c.is_ascii_digit()))
        .find_map(|start| {
            let len = raw[start..]
                .find(char::is_whitespace)
                .unwrap_or(raw.len() - start);
            let doi = raw[start..start + len].trim_end_matches(['.', ',', ';']);
            doi.contains('/')
                .then(|| (start..start + doi.len(), doi.to_string()))
        })
}
