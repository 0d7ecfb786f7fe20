//! Typed errors at the pipeline boundary.
//!
//! Backend traits return `anyhow::Result`; the pipeline wraps those
//! failures in [`PipelineError`] so callers can tell "nothing to index"
//! apart from "a backend is down". Negative retrieval outcomes and
//! partially duplicated uploads are not errors; see
//! [`Retrieval`](crate::retrieve::Retrieval) and
//! [`UpsertReport`](crate::upsert::UpsertReport).

use std::fmt;

use thiserror::Error;

/// The external service that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Embedding,
    VectorStore,
    Generation,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Backend::Embedding => "embedding",
            Backend::VectorStore => "vector store",
            Backend::Generation => "generation",
        })
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    /// No extractable text. Reported to the caller, never retried.
    #[error("document has no extractable text")]
    EmptyInput,

    /// A backend call failed. Ingestion is safe to retry end to end.
    #[error("{backend} backend unavailable: {source}")]
    BackendUnavailable {
        backend: Backend,
        #[source]
        source: anyhow::Error,
    },

    #[error("text extraction failed: {0}")]
    Extraction(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl PipelineError {
    pub fn backend(backend: Backend, source: anyhow::Error) -> Self {
        PipelineError::BackendUnavailable { backend, source }
    }

    /// Whether retrying the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PipelineError::BackendUnavailable { .. })
    }
}
