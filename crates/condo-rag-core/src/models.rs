//! Core data models that flow through ingestion and retrieval.
//!
//! Closed enums ([`DocType`], [`QueryClass`], [`SearchMode`], [`SourceKind`])
//! replace free-form strings so every dispatch site is checked exhaustively.

use std::fmt;
use std::str::FromStr;

use anyhow::bail;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::namespace::Namespace;

/// Declared format of an uploaded document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Pdf,
    Txt,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Pdf => "pdf",
            SourceKind::Txt => "txt",
        }
    }
}

impl FromStr for SourceKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "pdf" => Ok(SourceKind::Pdf),
            "txt" | "text" => Ok(SourceKind::Txt),
            other => bail!("Unknown source kind: '{}'. Use pdf or txt.", other),
        }
    }
}

/// Heuristic document category. Steers chunking strategy and prompt framing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocType {
    Bylaws,
    InternalRegulation,
    MeetingMinutes,
    Charter,
    General,
}

impl DocType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocType::Bylaws => "bylaws",
            DocType::InternalRegulation => "internal_regulation",
            DocType::MeetingMinutes => "meeting_minutes",
            DocType::Charter => "charter",
            DocType::General => "general",
        }
    }

    /// Whether documents of this type are split on legal-structure markers.
    pub fn is_structured(&self) -> bool {
        match self {
            DocType::Bylaws | DocType::InternalRegulation | DocType::Charter => true,
            DocType::MeetingMinutes | DocType::General => false,
        }
    }
}

impl fmt::Display for DocType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a chunk was cut out of its document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkType {
    /// A whole top-level structural unit (article, section, chapter).
    Article,
    /// A paragraph-level piece of an oversized structural unit.
    Paragraph,
    /// A fixed-size sliding window.
    Window,
}

/// A chunk candidate produced by the chunker, before provenance is attached.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkDraft {
    pub text: String,
    pub chunk_type: ChunkType,
    /// Structural number (e.g. `"12"` for `Art. 12`) when recoverable.
    pub article: Option<String>,
}

/// A named bundle of text submitted for ingestion.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub title: String,
    pub category: String,
    pub kind: SourceKind,
    /// Caller-supplied identity. Falls back to a slug of the title.
    pub document_id: Option<String>,
    pub text: String,
}

impl SourceDocument {
    pub fn new(title: impl Into<String>, kind: SourceKind, text: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            category: "general".to_string(),
            kind,
            document_id: None,
            text: text.into(),
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_document_id(mut self, id: impl Into<String>) -> Self {
        self.document_id = Some(id.into());
        self
    }

    /// Stable identity used as the vector-id prefix for every chunk.
    pub fn identity(&self) -> String {
        match &self.document_id {
            Some(id) if !id.trim().is_empty() => slugify(id),
            _ => slugify(&self.title),
        }
    }
}

/// Lowercase, ASCII-alphanumeric slug with `-` separators.
///
/// `#` never survives, so it can serve as the vector-id field separator.
pub fn slugify(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut pending_dash = false;
    for ch in s.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.push(ch.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    if out.is_empty() {
        "doc".to_string()
    } else {
        out
    }
}

/// Where a chunk came from.
#[derive(Debug, Clone)]
pub struct Provenance {
    pub title: String,
    pub category: String,
    pub source_kind: SourceKind,
    pub namespace: Namespace,
    pub indexed_at: DateTime<Utc>,
}

/// A retrieval unit ready for fingerprinting and embedding.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub text: String,
    pub content_hash: String,
    pub chunk_index: usize,
    pub total_chunks: usize,
    pub doc_type: DocType,
    pub chunk_type: ChunkType,
    pub article: Option<String>,
    pub provenance: Provenance,
}

/// Metadata stored next to every vector.
///
/// Flat and null-free so it fits metadata-restricted backends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordMetadata {
    pub document_id: String,
    pub title: String,
    pub category: String,
    pub doc_type: DocType,
    pub chunk_type: ChunkType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub article: Option<String>,
    pub chunk_index: usize,
    pub total_chunks: usize,
    pub content_hash: String,
    pub tenant_id: u64,
    pub sub_tenant_id: u64,
    pub source: SourceKind,
    pub indexed_at: String,
    /// Bounded text preview, always present.
    pub preview: String,
    /// Full chunk text, only when the backend accepts large payloads.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl RecordMetadata {
    /// Full text when stored, otherwise the preview.
    pub fn body(&self) -> &str {
        self.text.as_deref().unwrap_or(&self.preview)
    }
}

/// A chunk embedded into a vector and keyed for storage.
#[derive(Debug, Clone)]
pub struct VectorRecord {
    pub id: String,
    pub vector: Vec<f32>,
    pub metadata: RecordMetadata,
}

/// A nearest-neighbor hit returned by a vector store.
#[derive(Debug, Clone)]
pub struct VectorMatch {
    pub id: String,
    pub score: f32,
    pub metadata: RecordMetadata,
}

/// A merged retrieval hit.
#[derive(Debug, Clone)]
pub struct RetrievalCandidate {
    pub id: String,
    pub score: f32,
    /// Index of the expanded query that first produced this hit.
    pub query_index: usize,
    pub origin: Namespace,
    pub metadata: RecordMetadata,
}

/// Heuristic class of a user question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryClass {
    Lookup,
    Interpretative,
    Comparative,
    Procedural,
    Temporal,
    General,
}

impl QueryClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryClass::Lookup => "lookup",
            QueryClass::Interpretative => "interpretative",
            QueryClass::Comparative => "comparative",
            QueryClass::Procedural => "procedural",
            QueryClass::Temporal => "temporal",
            QueryClass::General => "general",
        }
    }
}

impl fmt::Display for QueryClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which partitions a question is answered from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    /// The tenant's own documents only.
    #[default]
    CondoOnly,
    /// The shared general-knowledge partition only.
    KbOnly,
    /// Both, presented to the model as separately labeled sections.
    Hybrid,
}

impl SearchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchMode::CondoOnly => "condo_only",
            SearchMode::KbOnly => "kb_only",
            SearchMode::Hybrid => "hybrid",
        }
    }
}

impl FromStr for SearchMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "condo_only" | "condo" => Ok(SearchMode::CondoOnly),
            "kb_only" | "kb" => Ok(SearchMode::KbOnly),
            "hybrid" => Ok(SearchMode::Hybrid),
            other => bail!(
                "Unknown search mode: {}. Use condo_only, kb_only, or hybrid.",
                other
            ),
        }
    }
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a question was (or was not) answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerStatus {
    Answered,
    /// The question was blank.
    EmptyQuestion,
    /// The searched partitions returned nothing at all.
    NoCandidates,
    /// Candidates existed but none reached the similarity threshold.
    BelowThreshold,
    /// Retrieval or generation failed.
    Unavailable,
}

impl AnswerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnswerStatus::Answered => "answered",
            AnswerStatus::EmptyQuestion => "empty_question",
            AnswerStatus::NoCandidates => "no_candidates",
            AnswerStatus::BelowThreshold => "below_threshold",
            AnswerStatus::Unavailable => "unavailable",
        }
    }
}

impl fmt::Display for AnswerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller-facing answer.
#[derive(Debug, Clone, Serialize)]
pub struct AnswerResult {
    pub answer: String,
    /// Distinct titles ordered by the rank of their best chunk.
    pub sources: Vec<String>,
    /// Similarity score of the top candidate.
    pub confidence: f32,
    pub success: bool,
    pub status: AnswerStatus,
}

impl AnswerResult {
    /// An unsuccessful answer. `status` must not be `Answered`.
    pub fn failure(status: AnswerStatus, message: impl Into<String>) -> Self {
        Self {
            answer: message.into(),
            sources: Vec::new(),
            confidence: 0.0,
            success: false,
            status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Regimento Interno 2024.pdf"), "regimento-interno-2024-pdf");
        assert_eq!(slugify("  Pool  Rules "), "pool-rules");
        assert_eq!(slugify("a#b"), "a-b");
        assert_eq!(slugify("###"), "doc");
    }

    #[test]
    fn test_identity_prefers_document_id() {
        let doc = SourceDocument::new("Pool Rules", SourceKind::Txt, "x");
        assert_eq!(doc.identity(), "pool-rules");
        let doc = doc.with_document_id("DOC 7");
        assert_eq!(doc.identity(), "doc-7");
    }

    #[test]
    fn test_search_mode_parse() {
        assert_eq!("condo_only".parse::<SearchMode>().unwrap(), SearchMode::CondoOnly);
        assert_eq!("kb_only".parse::<SearchMode>().unwrap(), SearchMode::KbOnly);
        assert_eq!("hybrid".parse::<SearchMode>().unwrap(), SearchMode::Hybrid);
        assert!("everything".parse::<SearchMode>().is_err());
    }

    #[test]
    fn test_body_falls_back_to_preview() {
        let mut md = RecordMetadata {
            document_id: "d".into(),
            title: "t".into(),
            category: "c".into(),
            doc_type: DocType::General,
            chunk_type: ChunkType::Window,
            article: None,
            chunk_index: 0,
            total_chunks: 1,
            content_hash: "h".into(),
            tenant_id: 1,
            sub_tenant_id: 1,
            source: SourceKind::Txt,
            indexed_at: "2024-01-01T00:00:00Z".into(),
            preview: "short".into(),
            text: None,
        };
        assert_eq!(md.body(), "short");
        md.text = Some("full text".into());
        assert_eq!(md.body(), "full text");
    }

    #[test]
    fn test_metadata_serializes_flat_without_nulls() {
        let md = RecordMetadata {
            document_id: "bylaws".into(),
            title: "Bylaws".into(),
            category: "rules".into(),
            doc_type: DocType::InternalRegulation,
            chunk_type: ChunkType::Article,
            article: None,
            chunk_index: 2,
            total_chunks: 5,
            content_hash: "h".into(),
            tenant_id: 4,
            sub_tenant_id: 9,
            source: SourceKind::Pdf,
            indexed_at: "2024-01-01T00:00:00Z".into(),
            preview: "Art. 3".into(),
            text: None,
        };
        let json = serde_json::to_value(&md).unwrap();
        let obj = json.as_object().unwrap();
        assert!(obj.values().all(|v| !v.is_null() && !v.is_object()));
        assert!(!obj.contains_key("article"));
        assert!(!obj.contains_key("text"));
        assert_eq!(json["doc_type"], "internal_regulation");
        assert_eq!(json["chunk_type"], "article");
        assert_eq!(json["source"], "pdf");

        let back: RecordMetadata = serde_json::from_value(json).unwrap();
        assert_eq!(back, md);
    }
}
