//! Audit trail hook.
//!
//! The pipeline reports one event after each successful ingestion and one
//! after each answered question. Sinks are fire-and-forget from the
//! pipeline's point of view: a failing sink is logged and otherwise
//! ignored. The SQLite sink lives in the app crate.

use async_trait::async_trait;

use crate::models::{QueryClass, SearchMode};
use crate::namespace::Namespace;

/// A completed ingestion.
#[derive(Debug, Clone)]
pub struct IngestionEvent {
    pub namespace: Namespace,
    pub document_id: String,
    pub title: String,
    pub doc_type: String,
    pub chunk_count: usize,
    pub stored_count: usize,
    pub skipped_count: usize,
}

/// An answered (or unanswerable) question.
#[derive(Debug, Clone)]
pub struct QueryEvent {
    pub namespace: Namespace,
    pub question: String,
    pub query_class: QueryClass,
    pub mode: SearchMode,
    pub success: bool,
    pub confidence: f32,
    pub sources: Vec<String>,
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record_ingestion(&self, event: &IngestionEvent) -> anyhow::Result<()>;
    async fn record_query(&self, event: &QueryEvent) -> anyhow::Result<()>;
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopAudit;

#[async_trait]
impl AuditSink for NoopAudit {
    async fn record_ingestion(&self, _event: &IngestionEvent) -> anyhow::Result<()> {
        Ok(())
    }

    async fn record_query(&self, _event: &QueryEvent) -> anyhow::Result<()> {
        Ok(())
    }
}
