//! Ingestion and question-answering orchestration.
//!
//! [`RagPipeline`] owns one instance of each backend, constructed once at
//! startup and shared behind `Arc`s. It is `Send + Sync` and can serve
//! many concurrent requests; nothing in it is mutated after construction.
//!
//! ```text
//! ingest: text ─▶ classify ─▶ split ─▶ finalize ─▶ Upserter ─▶ audit
//! query:  question ─▶ classify_query ─▶ expand ─▶ Retriever ─▶ Synthesizer ─▶ audit
//! ```

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::audit::{AuditSink, IngestionEvent, NoopAudit, QueryEvent};
use crate::chunk::{finalize, split, ChunkingParams};
use crate::classify::{classify_with_prefix, DEFAULT_PREFIX_CHARS};
use crate::embedding::EmbeddingBackend;
use crate::error::{Backend, PipelineError};
use crate::expand::{expand_with_limit, DEFAULT_MAX_EXPANSIONS};
use crate::fingerprint::document_prefix;
use crate::models::{
    slugify, AnswerResult, AnswerStatus, Chunk, DocType, Provenance, RetrievalCandidate, SearchMode,
    SourceDocument, SourceKind,
};
use crate::namespace::{resolve, Namespace};
use crate::query::classify_query;
use crate::retrieve::{Retrieval, RetrievalParams, Retriever};
use crate::store::VectorStore;
use crate::synthesize::{
    GenerationBackend, Synthesizer, BELOW_THRESHOLD_ANSWER, FALLBACK_ANSWER, NO_CONTENT_ANSWER,
};
use crate::upsert::Upserter;

pub const EMPTY_QUESTION_ANSWER: &str = "Please type a question about your building's documents.";

/// Tunables for a [`RagPipeline`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineConfig {
    pub chunking: ChunkingParams,
    pub classify_prefix_chars: usize,
    pub retrieval: RetrievalParams,
    pub max_expansions: usize,
    /// Chunks per origin rendered into the generation context.
    pub context_chunks: usize,
    /// In-flight embedding calls during ingestion.
    pub embed_concurrency: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chunking: ChunkingParams::default(),
            classify_prefix_chars: DEFAULT_PREFIX_CHARS,
            retrieval: RetrievalParams::default(),
            max_expansions: DEFAULT_MAX_EXPANSIONS,
            context_chunks: 8,
            embed_concurrency: 4,
        }
    }
}

/// Result of one ingestion.
#[derive(Debug, Clone)]
pub struct IngestReport {
    pub document_id: String,
    pub namespace: Namespace,
    pub doc_type: DocType,
    pub chunks_created: usize,
    pub stored_count: usize,
    pub skipped_count: usize,
    pub embedded_count: usize,
}

/// A classified and chunked document, not yet embedded.
#[derive(Debug, Clone)]
pub struct Prepared {
    pub document_id: String,
    pub doc_type: DocType,
    pub chunks: Vec<Chunk>,
}

pub struct RagPipeline {
    embedder: Arc<dyn EmbeddingBackend>,
    store: Arc<dyn VectorStore>,
    generator: Arc<dyn GenerationBackend>,
    audit: Arc<dyn AuditSink>,
    config: PipelineConfig,
}

impl RagPipeline {
    pub fn new(
        embedder: Arc<dyn EmbeddingBackend>,
        store: Arc<dyn VectorStore>,
        generator: Arc<dyn GenerationBackend>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            embedder,
            store,
            generator,
            audit: Arc::new(NoopAudit),
            config,
        }
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Classify and chunk `doc` for `ns` without touching any backend.
    pub fn prepare(&self, doc: &SourceDocument, ns: Namespace) -> Result<Prepared, PipelineError> {
        if doc.text.trim().is_empty() {
            return Err(PipelineError::EmptyInput);
        }
        let doc_type = classify_with_prefix(&doc.text, &doc.title, self.config.classify_prefix_chars);
        let provenance = Provenance {
            title: doc.title.clone(),
            category: doc.category.clone(),
            source_kind: doc.kind,
            namespace: ns,
            indexed_at: Utc::now(),
        };
        let drafts = split(&doc.text, doc_type, &self.config.chunking).into_drafts();
        Ok(Prepared {
            document_id: doc.identity(),
            doc_type,
            chunks: finalize(drafts, doc_type, &provenance),
        })
    }

    /// Ingest `doc` into the tenant's namespace.
    pub async fn ingest(
        &self,
        doc: &SourceDocument,
        tenant_id: u64,
        sub_tenant_id: u64,
    ) -> Result<IngestReport, PipelineError> {
        self.ingest_into(doc, resolve(tenant_id, sub_tenant_id)).await
    }

    /// Ingest `doc` into the shared general-knowledge namespace.
    pub async fn add_to_knowledge_base(
        &self,
        content: &str,
        title: &str,
        category: &str,
    ) -> Result<IngestReport, PipelineError> {
        let doc = SourceDocument::new(title, SourceKind::Txt, content).with_category(category);
        self.ingest_into(&doc, Namespace::general()).await
    }

    pub async fn ingest_into(
        &self,
        doc: &SourceDocument,
        ns: Namespace,
    ) -> Result<IngestReport, PipelineError> {
        let prepared = self.prepare(doc, ns)?;
        let mut report = IngestReport {
            document_id: prepared.document_id.clone(),
            namespace: ns,
            doc_type: prepared.doc_type,
            chunks_created: prepared.chunks.len(),
            stored_count: 0,
            skipped_count: 0,
            embedded_count: 0,
        };

        if prepared.chunks.is_empty() {
            info!(namespace = %ns, doc = %report.document_id, "no chunks survived filtering");
            return Ok(report);
        }

        let upserter = Upserter::new(
            self.embedder.as_ref(),
            self.store.as_ref(),
            self.config.embed_concurrency,
        );
        let upsert = upserter
            .upsert(&prepared.chunks, &ns, &prepared.document_id)
            .await?;
        report.stored_count = upsert.stored_count;
        report.skipped_count = upsert.skipped_count;
        report.embedded_count = upsert.embedded_count;

        info!(
            namespace = %ns,
            doc = %report.document_id,
            doc_type = %report.doc_type,
            chunks = report.chunks_created,
            stored = report.stored_count,
            skipped = report.skipped_count,
            "ingested document"
        );

        let event = IngestionEvent {
            namespace: ns,
            document_id: report.document_id.clone(),
            title: doc.title.clone(),
            doc_type: report.doc_type.to_string(),
            chunk_count: report.chunks_created,
            stored_count: report.stored_count,
            skipped_count: report.skipped_count,
        };
        if let Err(e) = self.audit.record_ingestion(&event).await {
            warn!(error = %e, "audit write failed for ingestion");
        }

        Ok(report)
    }

    /// Remove every chunk of `document_id` from `ns`. Returns the count.
    pub async fn delete_document(
        &self,
        document_id: &str,
        ns: Namespace,
    ) -> Result<usize, PipelineError> {
        if document_id.trim().is_empty() {
            return Err(PipelineError::InvalidInput("document id is empty".to_string()));
        }
        let prefix = document_prefix(&slugify(document_id));
        let ids = self
            .store
            .list_ids(&ns, &prefix)
            .await
            .map_err(|e| PipelineError::backend(Backend::VectorStore, e))?;
        if ids.is_empty() {
            return Ok(0);
        }
        self.store
            .delete(&ns, &ids)
            .await
            .map_err(|e| PipelineError::backend(Backend::VectorStore, e))?;
        info!(namespace = %ns, doc = document_id, removed = ids.len(), "deleted document");
        Ok(ids.len())
    }

    /// Answer `question` from the partitions selected by `mode`.
    ///
    /// Never fails: backend errors and empty retrievals come back as an
    /// unsuccessful [`AnswerResult`] with a fixed message. When nothing is
    /// found, any partition whose candidates all fell below the threshold
    /// makes the status [`AnswerStatus::BelowThreshold`]; otherwise it is
    /// [`AnswerStatus::NoCandidates`].
    pub async fn query(&self, question: &str, ns: Namespace, mode: SearchMode) -> AnswerResult {
        let question = question.trim();
        if question.is_empty() {
            return AnswerResult::failure(AnswerStatus::EmptyQuestion, EMPTY_QUESTION_ANSWER);
        }

        let class = classify_query(question);
        let queries = expand_with_limit(question, class, self.config.max_expansions);
        let retriever = Retriever::new(
            self.embedder.as_ref(),
            self.store.as_ref(),
            self.config.retrieval,
        );

        let general = Namespace::general();
        let targets: Vec<Namespace> = match mode {
            SearchMode::CondoOnly => vec![ns],
            SearchMode::KbOnly => vec![general],
            SearchMode::Hybrid if ns.is_general() => vec![general],
            SearchMode::Hybrid => vec![ns, general],
        };

        let outcomes = futures::future::join_all(
            targets.iter().map(|target| retriever.retrieve(&queries, target)),
        )
        .await;

        let mut ranked: Vec<RetrievalCandidate> = Vec::new();
        let mut failed = 0;
        let mut below_threshold = false;
        for (target, outcome) in targets.iter().zip(outcomes) {
            match outcome {
                Ok(Retrieval::Found(found)) => ranked.extend(found),
                Ok(Retrieval::NoCandidates) => {
                    info!(namespace = %target, class = %class, "no candidates");
                }
                Ok(Retrieval::BelowThreshold { best_score }) => {
                    info!(namespace = %target, class = %class, best_score, "all candidates below threshold");
                    below_threshold = true;
                }
                Err(e) => {
                    warn!(namespace = %target, error = %e, "retrieval failed");
                    failed += 1;
                }
            }
        }

        let result = if !ranked.is_empty() {
            Synthesizer::new(self.generator.as_ref(), self.config.context_chunks)
                .synthesize(question, &ranked, class, mode)
                .await
        } else if failed == targets.len() {
            AnswerResult::failure(AnswerStatus::Unavailable, FALLBACK_ANSWER)
        } else if below_threshold {
            AnswerResult::failure(AnswerStatus::BelowThreshold, BELOW_THRESHOLD_ANSWER)
        } else {
            AnswerResult::failure(AnswerStatus::NoCandidates, NO_CONTENT_ANSWER)
        };

        let event = QueryEvent {
            namespace: ns,
            question: question.to_string(),
            query_class: class,
            mode,
            success: result.success,
            confidence: result.confidence,
            sources: result.sources.clone(),
        };
        if let Err(e) = self.audit.record_query(&event).await {
            warn!(error = %e, "audit write failed for query");
        }

        result
    }
}
