//! Multi-query retrieval with threshold fusion.
//!
//! Every expanded query is embedded and searched against one namespace.
//! The per-query hit lists are then fused:
//!
//! 1. Merge by vector id, keeping the first occurrence. Lists are visited
//!    in expansion order, so the original question wins ties.
//! 2. Drop candidates below the namespace threshold. The shared general
//!    namespace uses a lower threshold than tenant namespaces.
//! 3. Sort by descending score (stable) and cap to `final_limit`.
//!
//! An empty merge is reported as [`Retrieval::NoCandidates`]; a merge
//! that the threshold emptied is [`Retrieval::BelowThreshold`]. Both are
//! unsuccessful retrievals, not errors.

use std::collections::HashSet;

use futures::stream::{self, StreamExt};
use tracing::{debug, warn};

use crate::embedding::EmbeddingBackend;
use crate::error::{Backend, PipelineError};
use crate::models::{RetrievalCandidate, VectorMatch};
use crate::namespace::Namespace;
use crate::store::VectorStore;

/// Retrieval knobs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetrievalParams {
    /// Nearest neighbours requested per expanded query.
    pub k_per_query: usize,
    /// Candidates kept after fusion.
    pub final_limit: usize,
    /// Minimum similarity for tenant namespaces.
    pub tenant_threshold: f32,
    /// Minimum similarity for the shared general namespace.
    pub general_threshold: f32,
    /// In-flight embed+search calls.
    pub concurrency: usize,
}

impl Default for RetrievalParams {
    fn default() -> Self {
        Self {
            k_per_query: 10,
            final_limit: 12,
            tenant_threshold: 0.7,
            general_threshold: 0.35,
            concurrency: 4,
        }
    }
}

impl RetrievalParams {
    pub fn threshold_for(&self, ns: &Namespace) -> f32 {
        if ns.is_general() {
            self.general_threshold
        } else {
            self.tenant_threshold
        }
    }
}

/// Outcome of a retrieval.
#[derive(Debug, Clone)]
pub enum Retrieval {
    /// Ranked candidates, best first. Never empty.
    Found(Vec<RetrievalCandidate>),
    /// The searches returned nothing at all.
    NoCandidates,
    /// Candidates existed but none reached the threshold.
    BelowThreshold { best_score: f32 },
}

impl Retrieval {
    pub fn is_found(&self) -> bool {
        matches!(self, Retrieval::Found(_))
    }

    pub fn candidates(&self) -> &[RetrievalCandidate] {
        match self {
            Retrieval::Found(c) => c,
            Retrieval::NoCandidates | Retrieval::BelowThreshold { .. } => &[],
        }
    }

    pub fn into_candidates(self) -> Vec<RetrievalCandidate> {
        match self {
            Retrieval::Found(c) => c,
            Retrieval::NoCandidates | Retrieval::BelowThreshold { .. } => Vec::new(),
        }
    }
}

pub struct Retriever<'a> {
    embedder: &'a dyn EmbeddingBackend,
    store: &'a dyn VectorStore,
    params: RetrievalParams,
}

impl<'a> Retriever<'a> {
    pub fn new(
        embedder: &'a dyn EmbeddingBackend,
        store: &'a dyn VectorStore,
        params: RetrievalParams,
    ) -> Self {
        Self {
            embedder,
            store,
            params,
        }
    }

    /// Search `ns` with every query and fuse the results.
    ///
    /// Individual query failures are logged and skipped. The call only
    /// fails when every query failed.
    pub async fn retrieve(
        &self,
        queries: &[String],
        ns: &Namespace,
    ) -> Result<Retrieval, PipelineError> {
        if queries.is_empty() {
            return Ok(Retrieval::NoCandidates);
        }

        let embedder = self.embedder;
        let store = self.store;
        let top_k = self.params.k_per_query.max(1);

        let results: Vec<Result<Vec<VectorMatch>, PipelineError>> = stream::iter(queries)
            .map(|q| async move {
                let vector = embedder
                    .embed(q)
                    .await
                    .map_err(|e| PipelineError::backend(Backend::Embedding, e))?;
                store
                    .query(ns, &vector, top_k)
                    .await
                    .map_err(|e| PipelineError::backend(Backend::VectorStore, e))
            })
            .buffered(self.params.concurrency.max(1))
            .collect()
            .await;

        let total = results.len();
        let mut per_query = Vec::with_capacity(total);
        let mut failures = Vec::new();
        for (i, r) in results.into_iter().enumerate() {
            match r {
                Ok(matches) => per_query.push(matches),
                Err(e) => {
                    warn!(namespace = %ns, query = i, error = %e, "expanded query failed");
                    per_query.push(Vec::new());
                    failures.push(e);
                }
            }
        }
        if failures.len() == total {
            if let Some(e) = failures.pop() {
                return Err(e);
            }
        }

        let threshold = self.params.threshold_for(ns);
        let outcome = fuse(per_query, *ns, threshold, self.params.final_limit);
        debug!(
            namespace = %ns,
            queries = queries.len(),
            threshold,
            found = outcome.candidates().len(),
            "retrieval fused"
        );
        Ok(outcome)
    }
}

/// Merge per-query hit lists (in expansion order) into a ranked result.
pub fn fuse(
    per_query: Vec<Vec<VectorMatch>>,
    origin: Namespace,
    threshold: f32,
    final_limit: usize,
) -> Retrieval {
    let mut seen = HashSet::new();
    let mut merged = Vec::new();
    for (query_index, matches) in per_query.into_iter().enumerate() {
        for m in matches {
            if seen.insert(m.id.clone()) {
                merged.push(RetrievalCandidate {
                    id: m.id,
                    score: m.score,
                    query_index,
                    origin,
                    metadata: m.metadata,
                });
            }
        }
    }

    if merged.is_empty() {
        return Retrieval::NoCandidates;
    }

    let best_score = merged
        .iter()
        .map(|c| c.score)
        .fold(f32::NEG_INFINITY, f32::max);

    let mut kept: Vec<RetrievalCandidate> =
        merged.into_iter().filter(|c| c.score >= threshold).collect();
    if kept.is_empty() {
        return Retrieval::BelowThreshold { best_score };
    }

    kept.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    kept.truncate(final_limit.max(1));
    Retrieval::Found(kept)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashingEmbedder;
    use crate::models::{ChunkType, DocType, RecordMetadata, SourceKind, VectorRecord};
    use crate::namespace::resolve;
    use crate::store::memory::InMemoryVectorStore;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use futures::executor::block_on;

    fn metadata(title: &str, text: &str) -> RecordMetadata {
        RecordMetadata {
            document_id: "doc".into(),
            title: title.into(),
            category: "general".into(),
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
            preview: text.into(),
            text: Some(text.into()),
        }
    }

    fn hit(id: &str, score: f32) -> VectorMatch {
        VectorMatch {
            id: id.into(),
            score,
            metadata: metadata(id, id),
        }
    }

    #[test]
    fn test_threshold_keeps_first_two() {
        let out = fuse(
            vec![vec![hit("a", 0.9), hit("b", 0.6), hit("c", 0.3)]],
            resolve(1, 1),
            0.5,
            12,
        );
        let ids: Vec<_> = out.candidates().iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_first_occurrence_wins() {
        let out = fuse(
            vec![vec![hit("a", 0.8)], vec![hit("a", 0.95), hit("b", 0.85)]],
            resolve(1, 1),
            0.0,
            12,
        );
        let c = out.candidates();
        assert_eq!(c.len(), 2);
        assert_eq!(c[0].id, "b");
        assert_eq!(c[1].id, "a");
        assert_eq!(c[1].query_index, 0);
        assert!((c[1].score - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_no_candidates_vs_below_threshold() {
        assert!(matches!(
            fuse(vec![vec![], vec![]], resolve(1, 1), 0.5, 12),
            Retrieval::NoCandidates
        ));
        match fuse(vec![vec![hit("a", 0.2), hit("b", 0.4)]], resolve(1, 1), 0.5, 12) {
            Retrieval::BelowThreshold { best_score } => assert!((best_score - 0.4).abs() < 1e-6),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_final_limit_and_stable_order() {
        let hits: Vec<_> = (0..20).map(|i| hit(&format!("h{i}"), 0.8)).collect();
        let out = fuse(vec![hits], resolve(1, 1), 0.5, 12);
        let c = out.candidates();
        assert_eq!(c.len(), 12);
        assert_eq!(c[0].id, "h0");
        assert_eq!(c[11].id, "h11");
    }

    #[test]
    fn test_threshold_depends_on_namespace() {
        let p = RetrievalParams::default();
        assert_eq!(p.threshold_for(&Namespace::general()), p.general_threshold);
        assert_eq!(p.threshold_for(&resolve(4, 2)), p.tenant_threshold);
        assert!(p.general_threshold < p.tenant_threshold);
    }

    #[test]
    fn test_retrieve_end_to_end_in_memory() {
        let embedder = HashingEmbedder::default();
        let store = InMemoryVectorStore::new();
        let ns = resolve(1, 1);
        let text = "Pool opens 08:00, closes 20:00.";
        block_on(store.upsert(
            &ns,
            &[VectorRecord {
                id: "pool#h#0".into(),
                vector: embedder.embed_sync(text),
                metadata: metadata("Pool Rules", text),
            }],
        ))
        .unwrap();

        let params = RetrievalParams {
            tenant_threshold: 0.2,
            ..RetrievalParams::default()
        };
        let retriever = Retriever::new(&embedder, &store, params);
        let queries = vec!["When does the pool open?".to_string(), "swimming pool hours".to_string()];

        let found = block_on(retriever.retrieve(&queries, &ns)).unwrap();
        assert_eq!(found.candidates().len(), 1);
        assert_eq!(found.candidates()[0].origin, ns);

        let empty = block_on(retriever.retrieve(&queries, &resolve(1, 2))).unwrap();
        assert!(matches!(empty, Retrieval::NoCandidates));
    }

    struct DownEmbedder;

    #[async_trait]
    impl EmbeddingBackend for DownEmbedder {
        fn model_name(&self) -> &str {
            "down"
        }
        fn dims(&self) -> usize {
            1
        }
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Err(anyhow!("connection refused"))
        }
    }

    #[test]
    fn test_all_queries_failing_is_an_error() {
        let store = InMemoryVectorStore::new();
        let retriever = Retriever::new(&DownEmbedder, &store, RetrievalParams::default());
        let err = block_on(retriever.retrieve(&["pool".to_string()], &resolve(1, 1))).unwrap_err();
        assert!(err.is_retryable());
    }
}
