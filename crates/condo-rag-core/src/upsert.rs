//! Deduplicating upsert of chunks into a namespace.
//!
//! Each chunk gets a vector id derived from the document identity, its
//! content hash and its position. Ids already present in the namespace are
//! skipped, so re-ingesting an unchanged document costs one probe per chunk
//! and no embedding calls.
//!
//! # Failure policy
//!
//! - **Probe errors are fail-open.** A failed `exists` call is logged and
//!   the chunk is treated as absent. Ingestion throughput does not depend
//!   on probe reliability; the cost is an occasional duplicate write of an
//!   identical record.
//! - **Embedding and store errors are fail-fast.** The call returns
//!   [`PipelineError::BackendUnavailable`]. Batches upserted before the
//!   failure stay in place; a retry skips them through the probe.

use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::{debug, info, warn};

use crate::embedding::EmbeddingBackend;
use crate::error::{Backend, PipelineError};
use crate::fingerprint::vector_id;
use crate::models::{Chunk, RecordMetadata, VectorRecord};
use crate::namespace::Namespace;
use crate::store::VectorStore;

/// Characters of chunk text kept in the always-present metadata preview.
pub const PREVIEW_CHARS: usize = 1000;

/// Records sent per store upsert call.
const UPSERT_BATCH: usize = 32;

/// Counts reported by [`Upserter::upsert`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertReport {
    /// Records written to the store by this call.
    pub stored_count: usize,
    /// Chunks already present and left untouched.
    pub skipped_count: usize,
    /// Embedding calls made.
    pub embedded_count: usize,
}

/// Borrowed view of the backends needed to index chunks.
pub struct Upserter<'a> {
    embedder: &'a dyn EmbeddingBackend,
    store: &'a dyn VectorStore,
    concurrency: usize,
}

impl<'a> Upserter<'a> {
    pub fn new(
        embedder: &'a dyn EmbeddingBackend,
        store: &'a dyn VectorStore,
        concurrency: usize,
    ) -> Self {
        Self {
            embedder,
            store,
            concurrency: concurrency.max(1),
        }
    }

    /// Index `chunks` of the document `identity` into `ns`.
    pub async fn upsert(
        &self,
        chunks: &[Chunk],
        ns: &Namespace,
        identity: &str,
    ) -> Result<UpsertReport, PipelineError> {
        let mut report = UpsertReport::default();
        if chunks.is_empty() {
            return Ok(report);
        }

        let store = self.store;
        let probed: Vec<(String, &Chunk, bool)> = stream::iter(chunks)
            .map(|chunk| {
                let id = vector_id(identity, &chunk.content_hash, chunk.chunk_index);
                async move {
                    let present = match store.exists(ns, &id).await {
                        Ok(present) => present,
                        Err(e) => {
                            warn!(namespace = %ns, id = %id, error = %e, "dedup probe failed; treating chunk as new");
                            false
                        }
                    };
                    (id, chunk, present)
                }
            })
            .buffered(self.concurrency)
            .collect()
            .await;

        let pending: Vec<(String, &Chunk)> = probed
            .into_iter()
            .filter_map(|(id, chunk, present)| {
                if present {
                    report.skipped_count += 1;
                    None
                } else {
                    Some((id, chunk))
                }
            })
            .collect();

        let full_text = store.supports_full_text();
        let embedder = self.embedder;

        for batch in pending.chunks(UPSERT_BATCH) {
            let records: Vec<VectorRecord> = stream::iter(batch)
                .map(|(id, chunk)| async move {
                    let vector = embedder
                        .embed(&chunk.text)
                        .await
                        .map_err(|e| PipelineError::backend(Backend::Embedding, e))?;
                    Ok::<_, PipelineError>(VectorRecord {
                        id: id.clone(),
                        vector,
                        metadata: record_metadata(chunk, identity, full_text),
                    })
                })
                .buffered(self.concurrency)
                .try_collect()
                .await?;
            report.embedded_count += records.len();

            store
                .upsert(ns, &records)
                .await
                .map_err(|e| PipelineError::backend(Backend::VectorStore, e))?;
            report.stored_count += records.len();
            debug!(namespace = %ns, doc = identity, batch = records.len(), "upserted batch");
        }

        info!(
            namespace = %ns,
            doc = identity,
            stored = report.stored_count,
            skipped = report.skipped_count,
            "upsert complete"
        );
        Ok(report)
    }
}

/// Flat metadata for one chunk.
pub fn record_metadata(chunk: &Chunk, identity: &str, full_text: bool) -> RecordMetadata {
    let prov = &chunk.provenance;
    RecordMetadata {
        document_id: identity.to_string(),
        title: prov.title.clone(),
        category: prov.category.clone(),
        doc_type: chunk.doc_type,
        chunk_type: chunk.chunk_type,
        article: chunk.article.clone(),
        chunk_index: chunk.chunk_index,
        total_chunks: chunk.total_chunks,
        content_hash: chunk.content_hash.clone(),
        tenant_id: prov.namespace.tenant_id(),
        sub_tenant_id: prov.namespace.sub_tenant_id(),
        source: prov.source_kind,
        indexed_at: prov.indexed_at.to_rfc3339(),
        preview: chunk.text.chars().take(PREVIEW_CHARS).collect(),
        text: full_text.then(|| chunk.text.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{finalize, split, ChunkingParams};
    use crate::embedding::HashingEmbedder;
    use crate::models::{DocType, Provenance, SourceKind, VectorMatch};
    use crate::namespace::resolve;
    use crate::store::memory::InMemoryVectorStore;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use futures::executor::block_on;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    fn chunks_for(text: &str, ns: Namespace) -> Vec<Chunk> {
        let prov = Provenance {
            title: "Pool Rules".into(),
            category: "rules".into(),
            source_kind: SourceKind::Txt,
            namespace: ns,
            indexed_at: chrono::Utc::now(),
        };
        let p = ChunkingParams {
            window_chars: 100,
            overlap_chars: 20,
            ..ChunkingParams::default()
        };
        finalize(split(text, DocType::General, &p).into_drafts(), DocType::General, &prov)
    }

    fn sample_text() -> String {
        "The pool opens at 08:00 and closes at 20:00. Children under twelve must be accompanied. "
            .repeat(4)
    }

    struct FailingEmbedder;

    #[async_trait]
    impl EmbeddingBackend for FailingEmbedder {
        fn model_name(&self) -> &str {
            "failing"
        }
        fn dims(&self) -> usize {
            4
        }
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Err(anyhow!("HTTP 503"))
        }
    }

    /// Embeds normally for `budget` calls, then fails until healed.
    struct FlakyEmbedder {
        inner: HashingEmbedder,
        budget: usize,
        calls: AtomicUsize,
        healed: AtomicBool,
    }

    #[async_trait]
    impl EmbeddingBackend for FlakyEmbedder {
        fn model_name(&self) -> &str {
            "flaky"
        }
        fn dims(&self) -> usize {
            self.inner.dims()
        }
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n >= self.budget && !self.healed.load(Ordering::SeqCst) {
                return Err(anyhow!("HTTP 429: rate limited"));
            }
            self.inner.embed(text).await
        }
    }

    /// Delegates to an in-memory store but every probe errors.
    struct BrokenProbeStore {
        inner: InMemoryVectorStore,
        probes: AtomicUsize,
    }

    #[async_trait]
    impl VectorStore for BrokenProbeStore {
        fn supports_full_text(&self) -> bool {
            false
        }
        async fn upsert(&self, ns: &Namespace, records: &[VectorRecord]) -> Result<()> {
            self.inner.upsert(ns, records).await
        }
        async fn exists(&self, _ns: &Namespace, _id: &str) -> Result<bool> {
            self.probes.fetch_add(1, Ordering::SeqCst);
            Err(anyhow!("connection reset"))
        }
        async fn query(&self, ns: &Namespace, v: &[f32], k: usize) -> Result<Vec<VectorMatch>> {
            self.inner.query(ns, v, k).await
        }
        async fn delete(&self, ns: &Namespace, ids: &[String]) -> Result<()> {
            self.inner.delete(ns, ids).await
        }
        async fn list_ids(&self, ns: &Namespace, prefix: &str) -> Result<Vec<String>> {
            self.inner.list_ids(ns, prefix).await
        }
    }

    #[test]
    fn test_second_upsert_is_skipped() {
        let ns = resolve(1, 1);
        let chunks = chunks_for(&sample_text(), ns);
        let embedder = HashingEmbedder::default();
        let store = InMemoryVectorStore::new();
        let upserter = Upserter::new(&embedder, &store, 4);

        let first = block_on(upserter.upsert(&chunks, &ns, "pool-rules")).unwrap();
        assert_eq!(first.stored_count, chunks.len());
        assert_eq!(first.embedded_count, chunks.len());
        assert_eq!(first.skipped_count, 0);

        let second = block_on(upserter.upsert(&chunks, &ns, "pool-rules")).unwrap();
        assert_eq!(second.stored_count, 0);
        assert_eq!(second.embedded_count, 0);
        assert_eq!(second.skipped_count, chunks.len());
        assert_eq!(store.len(&ns), chunks.len());
    }

    #[test]
    fn test_same_chunks_other_namespace_are_new() {
        let chunks = chunks_for(&sample_text(), resolve(1, 1));
        let embedder = HashingEmbedder::default();
        let store = InMemoryVectorStore::new();
        let upserter = Upserter::new(&embedder, &store, 4);
        block_on(upserter.upsert(&chunks, &resolve(1, 1), "pool-rules")).unwrap();
        let other = block_on(upserter.upsert(&chunks, &resolve(1, 2), "pool-rules")).unwrap();
        assert_eq!(other.stored_count, chunks.len());
    }

    #[test]
    fn test_empty_input_reports_zero() {
        let embedder = HashingEmbedder::default();
        let store = InMemoryVectorStore::new();
        let report =
            block_on(Upserter::new(&embedder, &store, 4).upsert(&[], &resolve(1, 1), "x")).unwrap();
        assert_eq!(report, UpsertReport::default());
    }

    #[test]
    fn test_embedding_failure_is_fail_fast() {
        let ns = resolve(1, 1);
        let chunks = chunks_for(&sample_text(), ns);
        let store = InMemoryVectorStore::new();
        let err = block_on(Upserter::new(&FailingEmbedder, &store, 4).upsert(&chunks, &ns, "d"))
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::BackendUnavailable {
                backend: Backend::Embedding,
                ..
            }
        ));
        assert!(store.is_empty(&ns));
    }

    #[test]
    fn test_failed_batch_keeps_earlier_batches_and_retry_resumes() {
        let ns = resolve(6, 1);
        let chunks = chunks_for(&sample_text().repeat(10), ns);
        assert!(chunks.len() > UPSERT_BATCH);
        let embedder = FlakyEmbedder {
            inner: HashingEmbedder::default(),
            budget: UPSERT_BATCH,
            calls: AtomicUsize::new(0),
            healed: AtomicBool::new(false),
        };
        let store = InMemoryVectorStore::new();
        let upserter = Upserter::new(&embedder, &store, 4);

        let err = block_on(upserter.upsert(&chunks, &ns, "pool-rules")).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::BackendUnavailable {
                backend: Backend::Embedding,
                ..
            }
        ));
        assert_eq!(store.len(&ns), UPSERT_BATCH);
        for chunk in &chunks[..UPSERT_BATCH] {
            let id = vector_id("pool-rules", &chunk.content_hash, chunk.chunk_index);
            assert!(block_on(store.exists(&ns, &id)).unwrap(), "missing {}", id);
        }

        embedder.healed.store(true, Ordering::SeqCst);
        embedder.calls.store(0, Ordering::SeqCst);
        let retry = block_on(upserter.upsert(&chunks, &ns, "pool-rules")).unwrap();
        assert_eq!(retry.skipped_count, UPSERT_BATCH);
        assert_eq!(retry.embedded_count, chunks.len() - UPSERT_BATCH);
        assert_eq!(retry.stored_count, chunks.len() - UPSERT_BATCH);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), chunks.len() - UPSERT_BATCH);
        assert_eq!(store.len(&ns), chunks.len());
    }

    #[test]
    fn test_probe_failure_is_fail_open() {
        let ns = resolve(3, 4);
        let chunks = chunks_for(&sample_text(), ns);
        let embedder = HashingEmbedder::default();
        let store = BrokenProbeStore {
            inner: InMemoryVectorStore::new(),
            probes: AtomicUsize::new(0),
        };
        let upserter = Upserter::new(&embedder, &store, 2);
        let report = block_on(upserter.upsert(&chunks, &ns, "d")).unwrap();
        assert_eq!(report.stored_count, chunks.len());
        assert_eq!(store.probes.load(Ordering::SeqCst), chunks.len());

        // Re-ingesting rewrites the same ids instead of duplicating them.
        block_on(upserter.upsert(&chunks, &ns, "d")).unwrap();
        assert_eq!(store.inner.len(&ns), chunks.len());
    }

    #[test]
    fn test_metadata_preview_and_full_text() {
        let ns = resolve(1, 1);
        let long = "x".repeat(PREVIEW_CHARS + 500);
        let prov = Provenance {
            title: "Long".into(),
            category: "general".into(),
            source_kind: SourceKind::Pdf,
            namespace: ns,
            indexed_at: chrono::Utc::now(),
        };
        let p = ChunkingParams {
            window_chars: 2000,
            overlap_chars: 0,
            ..ChunkingParams::default()
        };
        let chunks = finalize(split(&long, DocType::General, &p).into_drafts(), DocType::General, &prov);
        let md = record_metadata(&chunks[0], "long", false);
        assert_eq!(md.preview.chars().count(), PREVIEW_CHARS);
        assert!(md.text.is_none());
        assert_eq!(md.tenant_id, 1);
        let md = record_metadata(&chunks[0], "long", true);
        assert_eq!(md.text.as_deref(), Some(long.as_str()));
    }
}
