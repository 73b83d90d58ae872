//! Prompt Builder — pure assembly of section prompts. No I/O, never fails.
//!
//! Optional inputs that are absent are simply left out of the prompt.
//! Source content is always substituted last so text inside a document can
//! never be mistaken for a template placeholder.

use crate::llm_client::prompts::{ATTRIBUTION_INSTRUCTION, FIDELITY_INSTRUCTION};
use crate::models::document::DocumentMetadata;
use crate::models::project::Purpose;

/// Character ceiling applied to source content before prompting.
pub const MAX_CONTEXT_CHARS: usize = 100_000;

/// Single-document rewrite template.
/// Replace: {purpose}, {section_title}, {metadata_block}, {guidance_block},
///          {fidelity_instruction}, then {source_content}
pub const SECTION_REWRITE_TEMPLATE: &str = r#"You are writing the "{section_title}" section of {purpose}.
{metadata_block}
{guidance_block}
{fidelity_instruction}

SOURCE CONTENT:
"""
{source_content}
"""

Write the "{section_title}" section now. Return the section body only."#;

/// Multi-document synthesis template.
/// Replace: {purpose}, {section_title}, {doc_count}, {guidance_block},
///          {fidelity_instruction}, {attribution_instruction}, then {documents_block}
pub const SYNTHESIS_TEMPLATE: &str = r#"You are writing the "{section_title}" section of {purpose}, synthesising {doc_count} source documents into one coherent text.
{guidance_block}
{fidelity_instruction}
{attribution_instruction}

Integrate the sources thematically rather than summarising them one after another. Point out where they agree and where they add to each other.

{documents_block}

Write the "{section_title}" section now. Return the section body only."#;

/// Comparative analysis template.
/// Replace: {purpose}, {section_title}, {doc_count}, {guidance_block},
///          {fidelity_instruction}, {attribution_instruction}, then {documents_block}
pub const COMPARATIVE_TEMPLATE: &str = r#"You are writing the "{section_title}" section of {purpose}, comparing {doc_count} source documents.
{guidance_block}
{fidelity_instruction}
{attribution_instruction}

Compare the sources explicitly: contrast their aims, methods, findings and limitations. State clearly where they agree, where they diverge, and what may explain the differences.

{documents_block}

Write the "{section_title}" section now. Return the section body only."#;

/// Inputs for a single-document section rewrite.
#[derive(Debug, Clone)]
pub struct SectionRewriteRequest<'a> {
    pub section_title: &'a str,
    pub source_content: &'a str,
    pub instructions: Option<&'a str>,
    pub global_instructions: Option<&'a str>,
    pub target_length: Option<&'a str>,
    pub purpose: Purpose,
    pub document_metadata: Option<&'a DocumentMetadata>,
}

/// One source document's contribution to a multi-document prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentExcerpt {
    pub title: String,
    pub authors: Vec<String>,
    pub content: String,
}

/// Inputs for synthesis and comparative prompts.
#[derive(Debug, Clone)]
pub struct MultiDocumentRequest<'a> {
    pub section_title: &'a str,
    pub documents: &'a [DocumentExcerpt],
    pub instructions: Option<&'a str>,
    pub global_instructions: Option<&'a str>,
    pub target_length: Option<&'a str>,
    pub purpose: Purpose,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Truncated {
    pub text: String,
    pub truncated: bool,
}

/// Keeps the first `max_chars` characters of `text`.
/// The result never exceeds `max_chars` characters; `truncated` is set iff text was cut.
pub fn truncate_for_context(text: &str, max_chars: usize) -> Truncated {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => Truncated {
            text: text[..cut].to_string(),
            truncated: true,
        },
        None => Truncated {
            text: text.to_string(),
            truncated: false,
        },
    }
}

pub fn build_section_rewrite_prompt(request: &SectionRewriteRequest<'_>) -> String {
    SECTION_REWRITE_TEMPLATE
        .replace("{purpose}", request.purpose.describe())
        .replace("{section_title}", request.section_title)
        .replace(
            "{metadata_block}",
            &metadata_block(request.document_metadata),
        )
        .replace(
            "{guidance_block}",
            &guidance_block(
                request.instructions,
                request.global_instructions,
                request.target_length,
            ),
        )
        .replace("{fidelity_instruction}", FIDELITY_INSTRUCTION)
        .replace("{source_content}", request.source_content)
}

pub fn build_multi_document_synthesis_prompt(request: &MultiDocumentRequest<'_>) -> String {
    fill_multi_document_template(SYNTHESIS_TEMPLATE, request)
}

pub fn build_comparative_analysis_prompt(request: &MultiDocumentRequest<'_>) -> String {
    fill_multi_document_template(COMPARATIVE_TEMPLATE, request)
}

fn fill_multi_document_template(template: &str, request: &MultiDocumentRequest<'_>) -> String {
    template
        .replace("{purpose}", request.purpose.describe())
        .replace("{section_title}", request.section_title)
        .replace("{doc_count}", &request.documents.len().to_string())
        .replace(
            "{guidance_block}",
            &guidance_block(
                request.instructions,
                request.global_instructions,
                request.target_length,
            ),
        )
        .replace("{fidelity_instruction}", FIDELITY_INSTRUCTION)
        .replace("{attribution_instruction}", ATTRIBUTION_INSTRUCTION)
        .replace("{documents_block}", &documents_block(request.documents))
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn metadata_block(metadata: Option<&DocumentMetadata>) -> String {
    let Some(metadata) = metadata else {
        return String::new();
    };
    let mut lines = Vec::new();
    if let Some(title) = non_blank(metadata.title.as_deref()) {
        lines.push(format!("Source title: {title}"));
    }
    if !metadata.authors.is_empty() {
        lines.push(format!("Source authors: {}", metadata.authors.join(", ")));
    }
    if let Some(year) = metadata.year {
        lines.push(format!("Published: {year}"));
    }
    if let Some(journal) = non_blank(metadata.journal.as_deref()) {
        lines.push(format!("Venue: {journal}"));
    }
    if lines.is_empty() {
        String::new()
    } else {
        format!("\n{}\n", lines.join("\n"))
    }
}

fn guidance_block(
    instructions: Option<&str>,
    global_instructions: Option<&str>,
    target_length: Option<&str>,
) -> String {
    let mut lines = Vec::new();
    if let Some(global) = non_blank(global_instructions) {
        lines.push(format!("Report-wide instructions: {global}"));
    }
    if let Some(section) = non_blank(instructions) {
        lines.push(format!("Section instructions: {section}"));
    }
    if let Some(length) = non_blank(target_length) {
        lines.push(format!("Target length: {length}"));
    }
    if lines.is_empty() {
        String::new()
    } else {
        format!("\n{}\n", lines.join("\n"))
    }
}

fn documents_block(documents: &[DocumentExcerpt]) -> String {
    documents
        .iter()
        .enumerate()
        .map(|(i, doc)| {
            let authors = if doc.authors.is_empty() {
                "unknown".to_string()
            } else {
                doc.authors.join(", ")
            };
            format!(
                "### Source {n}: {title}\nAuthors: {authors}\n\"\"\"\n{content}\n\"\"\"",
                n = i + 1,
                title = doc.title,
                content = doc.content,
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
