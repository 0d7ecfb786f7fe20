//! Structure-aware and sliding-window text chunker.
//!
//! Splits a document's text into [`ChunkDraft`]s. The strategy is selected
//! by the document's [`DocType`]:
//!
//! - **Structured** types (bylaws, internal regulations, charters) are cut
//!   on legal boundary markers (`Art. 12`, `Artigo 3º`, `Section 4`,
//!   `§ 2`, `Capítulo II`). The first marker family that occurs in the text
//!   defines the top-level units. Units longer than the section ceiling are
//!   re-packed on blank-line paragraph breaks; resulting fragments under the
//!   minimum length are dropped as noise.
//! - **Everything else** uses a fixed-size character window with overlap.
//!
//! # Guarantees
//!
//! - Deterministic for identical input and parameters.
//! - Never emits an empty or whitespace-only draft.
//! - Whitespace-only input yields [`Chunking::Empty`]; input whose every
//!   unit was filtered yields [`Chunking::Filtered`].
//! - The sliding window emits at most `ceil(len / (window - overlap))`
//!   drafts, `len` measured in characters.
//!
//! # Example
//!
//! ```rust
//! use condo_rag_core::chunk::{split, Chunking, ChunkingParams};
//! use condo_rag_core::models::DocType;
//!
//! let text = "Art. 1 The pool opens at 08:00 and closes at 20:00 every day.\n\
//!             Art. 2 Barbecue areas must be booked with the front desk in advance.";
//! match split(text, DocType::Bylaws, &ChunkingParams::default()) {
//!     Chunking::Chunks(drafts) => assert_eq!(drafts.len(), 2),
//!     other => panic!("unexpected {:?}", other),
//! }
//! ```

use anyhow::bail;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::fingerprint::fingerprint;
use crate::models::{Chunk, ChunkDraft, ChunkType, DocType, Provenance};

/// Size knobs for both strategies. All lengths are in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingParams {
    pub window_chars: usize,
    pub overlap_chars: usize,
    /// Structural units longer than this are re-packed by paragraph.
    pub section_max_chars: usize,
    /// Paragraph fragments (and preambles) shorter than this are dropped.
    pub min_fragment_chars: usize,
}

impl Default for ChunkingParams {
    fn default() -> Self {
        Self {
            window_chars: 800,
            overlap_chars: 200,
            section_max_chars: 1500,
            min_fragment_chars: 50,
        }
    }
}

impl ChunkingParams {
    /// Reject parameter sets that cannot make forward progress.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.window_chars == 0 {
            bail!("chunking.window_chars must be > 0");
        }
        if self.overlap_chars >= self.window_chars {
            bail!(
                "chunking.overlap_chars ({}) must be smaller than chunking.window_chars ({})",
                self.overlap_chars,
                self.window_chars
            );
        }
        if self.section_max_chars == 0 {
            bail!("chunking.section_max_chars must be > 0");
        }
        Ok(())
    }

    /// Window advance per step, clamped so it is always at least one char.
    fn step(&self) -> usize {
        let window = self.window_chars.max(1);
        window.saturating_sub(self.overlap_chars.min(window - 1)).max(1)
    }
}

/// Outcome of [`split`].
#[derive(Debug, Clone, PartialEq)]
pub enum Chunking {
    /// The input was empty or whitespace-only.
    Empty,
    /// The input had content but every unit was discarded as noise.
    Filtered,
    Chunks(Vec<ChunkDraft>),
}

impl Chunking {
    pub fn len(&self) -> usize {
        match self {
            Chunking::Chunks(drafts) => drafts.len(),
            Chunking::Empty | Chunking::Filtered => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_drafts(self) -> Vec<ChunkDraft> {
        match self {
            Chunking::Chunks(drafts) => drafts,
            Chunking::Empty | Chunking::Filtered => Vec::new(),
        }
    }
}

/// Boundary marker families, most specific first. Group 1 is the number.
static MARKERS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?mi)^[ \t]*(?:artigo|article|art\.?)[ \t]*(\d+)",
        r"(?mi)^[ \t]*(?:seção|secao|section|§)[ \t]*(\d+)",
        r"(?mi)^[ \t]*(?:capítulo|capitulo|chapter)[ \t]+([ivxlcdm]+|\d+)\b",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("marker patterns are static and valid"))
    .collect()
});

static BLANK_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n[ \t]*\n").expect("static pattern is valid"));

/// Split `text` into retrieval units using the strategy for `doc_type`.
pub fn split(text: &str, doc_type: DocType, params: &ChunkingParams) -> Chunking {
    if text.trim().is_empty() {
        return Chunking::Empty;
    }

    let drafts = if doc_type.is_structured() {
        split_structured(text, params).unwrap_or_else(|| sliding_window(text, params))
    } else {
        sliding_window(text, params)
    };

    if drafts.is_empty() {
        Chunking::Filtered
    } else {
        Chunking::Chunks(drafts)
    }
}

/// Cut on the first marker family present in `text`.
///
/// Returns `None` when no family matches, so the caller can fall back to
/// the sliding window.
fn split_structured(text: &str, params: &ChunkingParams) -> Option<Vec<ChunkDraft>> {
    let (marker, starts) = MARKERS.iter().find_map(|re| {
        let starts: Vec<usize> = re.find_iter(text).map(|m| m.start()).collect();
        if starts.is_empty() {
            None
        } else {
            Some((re, starts))
        }
    })?;

    let mut drafts = Vec::new();

    let preamble = text[..starts[0]].trim();
    if char_len(preamble) >= params.min_fragment_chars {
        push_unit(&mut drafts, preamble, None, params);
    }

    for (i, &start) in starts.iter().enumerate() {
        let end = starts.get(i + 1).copied().unwrap_or(text.len());
        let body = text[start..end].trim();
        if body.is_empty() {
            continue;
        }
        let number = marker
            .captures(body)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string());
        push_unit(&mut drafts, body, number, params);
    }

    Some(drafts)
}

/// Emit one structural unit, re-packing it by paragraph when oversized.
fn push_unit(
    drafts: &mut Vec<ChunkDraft>,
    body: &str,
    number: Option<String>,
    params: &ChunkingParams,
) {
    let max_chars = params.section_max_chars.max(1);
    if char_len(body) <= max_chars {
        drafts.push(ChunkDraft {
            text: body.to_string(),
            chunk_type: ChunkType::Article,
            article: number,
        });
        return;
    }

    for fragment in pack_paragraphs(body, max_chars) {
        if char_len(&fragment) < params.min_fragment_chars {
            continue;
        }
        drafts.push(ChunkDraft {
            text: fragment,
            chunk_type: ChunkType::Paragraph,
            article: number.clone(),
        });
    }
}

/// Accumulate blank-line separated paragraphs into pieces of at most
/// `max_chars`, hard-splitting any paragraph that is larger on its own.
fn pack_paragraphs(body: &str, max_chars: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut buf = String::new();
    let mut buf_chars = 0usize;

    for para in BLANK_LINE.split(body) {
        let trimmed = para.trim();
        if trimmed.is_empty() {
            continue;
        }
        let para_chars = char_len(trimmed);

        let would_be = if buf.is_empty() {
            para_chars
        } else {
            buf_chars + 2 + para_chars
        };
        if would_be > max_chars && !buf.is_empty() {
            out.push(std::mem::take(&mut buf));
            buf_chars = 0;
        }

        if para_chars > max_chars {
            out.extend(hard_split(trimmed, max_chars).into_iter().map(str::to_string));
            continue;
        }

        if !buf.is_empty() {
            buf.push_str("\n\n");
            buf_chars += 2;
        }
        buf.push_str(trimmed);
        buf_chars += para_chars;
    }

    if !buf.is_empty() {
        out.push(buf);
    }
    out
}

/// Break `s` into pieces of at most `max_chars`, preferring the last
/// whitespace inside each piece.
fn hard_split(s: &str, max_chars: usize) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut rest = s;
    while !rest.is_empty() {
        let limit = byte_offset(rest, max_chars);
        let cut = if limit < rest.len() {
            match rest[..limit].rfind(char::is_whitespace) {
                Some(pos) if pos > 0 => pos,
                _ => limit,
            }
        } else {
            limit
        };
        let piece = rest[..cut].trim();
        if !piece.is_empty() {
            pieces.push(piece);
        }
        rest = rest[cut..].trim_start();
    }
    pieces
}

/// Fixed-size character windows with overlap.
fn sliding_window(text: &str, params: &ChunkingParams) -> Vec<ChunkDraft> {
    let bounds: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let n = bounds.len() - 1;
    let window = params.window_chars.max(1);
    let step = params.step();

    let mut drafts = Vec::new();
    let mut start = 0usize;
    loop {
        let end = (start + window).min(n);
        let piece = text[bounds[start]..bounds[end]].trim();
        if !piece.is_empty() {
            drafts.push(ChunkDraft {
                text: piece.to_string(),
                chunk_type: ChunkType::Window,
                article: None,
            });
        }
        if end == n {
            break;
        }
        start += step;
    }
    drafts
}

/// Attach fingerprints, positions and provenance to drafts.
pub fn finalize(drafts: Vec<ChunkDraft>, doc_type: DocType, provenance: &Provenance) -> Vec<Chunk> {
    let total = drafts.len();
    drafts
        .into_iter()
        .enumerate()
        .map(|(i, d)| Chunk {
            content_hash: fingerprint(&d.text).into_string(),
            text: d.text,
            chunk_index: i,
            total_chunks: total,
            doc_type,
            chunk_type: d.chunk_type,
            article: d.article,
            provenance: provenance.clone(),
        })
        .collect()
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Byte offset of the `n`th char, or `s.len()` if `s` is shorter.
fn byte_offset(s: &str, n: usize) -> usize {
    s.char_indices().nth(n).map(|(i, _)| i).unwrap_or(s.len())
}
