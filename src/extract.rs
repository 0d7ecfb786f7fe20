//! Text extraction for uploaded documents.
//!
//! PDFs are decoded page by page with `pdf-extract`; each page's text is
//! prefixed with a `[Page N]` marker so chunks keep a rough location.
//! Plain text is decoded as lossy UTF-8. Extraction never panics: bad input
//! returns an [`ExtractError`] and the caller skips the file.

use std::path::Path;

use condo_rag_core::models::SourceKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("unsupported file type: {0}")]
    UnsupportedType(String),
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Source kind implied by a file extension.
pub fn kind_for_path(path: &Path) -> Result<SourceKind, ExtractError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "pdf" => Ok(SourceKind::Pdf),
        "txt" | "text" | "md" => Ok(SourceKind::Txt),
        other => Err(ExtractError::UnsupportedType(if other.is_empty() {
            path.display().to_string()
        } else {
            format!(".{}", other)
        })),
    }
}

/// Plain text from raw bytes of the given kind.
pub fn extract_text(bytes: &[u8], kind: SourceKind) -> Result<String, ExtractError> {
    match kind {
        SourceKind::Pdf => extract_pdf(bytes),
        SourceKind::Txt => Ok(String::from_utf8_lossy(bytes).into_owned()),
    }
}

/// Read a file and extract its text. Returns the detected kind too.
pub fn extract_file(path: &Path) -> Result<(SourceKind, String), ExtractError> {
    let kind = kind_for_path(path)?;
    let bytes = std::fs::read(path).map_err(|source| ExtractError::Io {
        path: path.display().to_string(),
        source,
    })?;
    Ok((kind, extract_text(&bytes, kind)?))
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    let pages = pdf_extract::extract_text_from_mem_by_pages(bytes)
        .map_err(|e| ExtractError::Pdf(e.to_string()))?;
    Ok(join_pages(&pages))
}

/// Join page texts with `[Page N]` markers, skipping blank pages.
fn join_pages(pages: &[String]) -> String {
    pages
        .iter()
        .enumerate()
        .filter(|(_, text)| !text.trim().is_empty())
        .map(|(i, text)| format!("[Page {}]\n{}", i + 1, text.trim()))
        .collect::<Vec<_>>()
        .join("\n\n")
}
