use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Key of a logical section inside a source document.
///
/// The canonical academic sections are closed variants; anything the analyzer
/// finds beyond them is kept as `Other` with a normalised (lowercase, trimmed) name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SectionKey {
    Abstract,
    Introduction,
    Background,
    Methods,
    Results,
    Discussion,
    Conclusion,
    References,
    Other(String),
}

impl SectionKey {
    pub fn as_str(&self) -> &str {
        match self {
            SectionKey::Abstract => "abstract",
            SectionKey::Introduction => "introduction",
            SectionKey::Background => "background",
            SectionKey::Methods => "methods",
            SectionKey::Results => "results",
            SectionKey::Discussion => "discussion",
            SectionKey::Conclusion => "conclusion",
            SectionKey::References => "references",
            SectionKey::Other(name) => name,
        }
    }

    pub fn is_canonical(&self) -> bool {
        !matches!(self, SectionKey::Other(_))
    }
}

impl From<String> for SectionKey {
    fn from(raw: String) -> Self {
        let key = raw.trim().to_lowercase();
        match key.as_str() {
            "abstract" | "summary" => SectionKey::Abstract,
            "introduction" | "intro" => SectionKey::Introduction,
            "background" | "related_work" | "related work" => SectionKey::Background,
            "methods" | "methodology" | "materials and methods" => SectionKey::Methods,
            "results" | "findings" => SectionKey::Results,
            "discussion" => SectionKey::Discussion,
            "conclusion" | "conclusions" => SectionKey::Conclusion,
            "references" | "bibliography" => SectionKey::References,
            _ => SectionKey::Other(key),
        }
    }
}

impl From<&str> for SectionKey {
    fn from(raw: &str) -> Self {
        SectionKey::from(raw.to_string())
    }
}

impl From<SectionKey> for String {
    fn from(key: SectionKey) -> Self {
        key.as_str().to_string()
    }
}

impl fmt::Display for SectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentSection {
    pub text: String,
    #[serde(default)]
    pub headings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Table {
    pub label: String,
    pub caption: String,
    #[serde(default)]
    pub rows: Vec<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Figure {
    pub label: String,
    pub caption: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Equation {
    pub label: Option<String>,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMetadata {
    pub title: Option<String>,
    #[serde(default)]
    pub authors: Vec<String>,
    pub year: Option<i32>,
    pub journal: Option<String>,
    pub doi: Option<String>,
    pub page_count: Option<u32>,
}

/// Structured content tree produced by a `DocumentAnalyzer`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedContent {
    #[serde(default)]
    pub sections: BTreeMap<SectionKey, ContentSection>,
    #[serde(default)]
    pub full_text: String,
    #[serde(default)]
    pub tables: Vec<Table>,
    #[serde(default)]
    pub figures: Vec<Figure>,
    #[serde(default)]
    pub equations: Vec<Equation>,
    #[serde(default)]
    pub metadata: DocumentMetadata,
}

/// A citation record found in a source document's bibliography.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reference {
    pub id: String,
    #[serde(default)]
    pub authors: Vec<String>,
    pub title: Option<String>,
    pub year: Option<i32>,
    pub journal: Option<String>,
    pub doi: Option<String>,
    /// Citation text as it appeared in the source, when available.
    pub raw: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceDocument {
    pub id: Uuid,
    pub filename: String,
    pub extracted_content: ExtractedContent,
    #[serde(default)]
    pub references: Vec<Reference>,
    #[serde(default)]
    pub parsing_warnings: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl SourceDocument {
    pub fn display_title(&self) -> &str {
        self.extracted_content
            .metadata
            .title
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or(&self.filename)
    }
}
