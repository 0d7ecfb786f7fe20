//! In-memory [`VectorStore`] for tests and single-process runs.
//!
//! One `BTreeMap` per namespace behind a `std::sync::RwLock`. Queries are
//! brute-force cosine similarity over the namespace's vectors. Locks are
//! only held for the synchronous map access, never across an await.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::models::{RecordMetadata, VectorMatch, VectorRecord};
use crate::namespace::Namespace;

use super::VectorStore;

struct StoredVector {
    vector: Vec<f32>,
    metadata: RecordMetadata,
}

type Partitions = HashMap<Namespace, BTreeMap<String, StoredVector>>;

/// In-memory store. Accepts full-text metadata.
pub struct InMemoryVectorStore {
    partitions: RwLock<Partitions>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self {
            partitions: RwLock::new(HashMap::new()),
        }
    }

    /// Number of records stored in `ns`.
    pub fn len(&self, ns: &Namespace) -> usize {
        self.partitions
            .read()
            .map(|p| p.get(ns).map(BTreeMap::len).unwrap_or(0))
            .unwrap_or(0)
    }

    pub fn is_empty(&self, ns: &Namespace) -> bool {
        self.len(ns) == 0
    }
}

impl Default for InMemoryVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned() -> anyhow::Error {
    anyhow!("in-memory vector store lock poisoned")
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    fn supports_full_text(&self) -> bool {
        true
    }

    async fn upsert(&self, ns: &Namespace, records: &[VectorRecord]) -> Result<()> {
        let mut partitions = self.partitions.write().map_err(|_| poisoned())?;
        let partition = partitions.entry(*ns).or_default();
        for r in records {
            partition.insert(
                r.id.clone(),
                StoredVector {
                    vector: r.vector.clone(),
                    metadata: r.metadata.clone(),
                },
            );
        }
        Ok(())
    }

    async fn exists(&self, ns: &Namespace, id: &str) -> Result<bool> {
        let partitions = self.partitions.read().map_err(|_| poisoned())?;
        Ok(partitions.get(ns).is_some_and(|p| p.contains_key(id)))
    }

    async fn query(
        &self,
        ns: &Namespace,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<VectorMatch>> {
        let partitions = self.partitions.read().map_err(|_| poisoned())?;
        let partition = match partitions.get(ns) {
            Some(p) => p,
            None => return Ok(Vec::new()),
        };
        let mut matches: Vec<VectorMatch> = partition
            .iter()
            .map(|(id, sv)| VectorMatch {
                id: id.clone(),
                score: cosine_similarity(vector, &sv.vector),
                metadata: sv.metadata.clone(),
            })
            .collect();
        matches.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        matches.truncate(top_k);
        Ok(matches)
    }

    async fn delete(&self, ns: &Namespace, ids: &[String]) -> Result<()> {
        let mut partitions = self.partitions.write().map_err(|_| poisoned())?;
        if let Some(partition) = partitions.get_mut(ns) {
            for id in ids {
                partition.remove(id);
            }
        }
        Ok(())
    }

    async fn list_ids(&self, ns: &Namespace, prefix: &str) -> Result<Vec<String>> {
        let partitions = self.partitions.read().map_err(|_| poisoned())?;
        Ok(partitions
            .get(ns)
            .map(|p| {
                p.range(prefix.to_string()..)
                    .take_while(|(id, _)| id.starts_with(prefix))
                    .map(|(id, _)| id.clone())
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChunkType, DocType, SourceKind};
    use crate::namespace::resolve;
    use futures::executor::block_on;

    fn record(id: &str, vector: Vec<f32>) -> VectorRecord {
        VectorRecord {
            id: id.to_string(),
            vector,
            metadata: RecordMetadata {
                document_id: "doc".into(),
                title: "Doc".into(),
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
                preview: id.into(),
                text: None,
            },
        }
    }

    #[test]
    fn test_query_ranks_by_similarity() {
        let store = InMemoryVectorStore::new();
        let ns = resolve(1, 1);
        block_on(store.upsert(
            &ns,
            &[record("a", vec![1.0, 0.0]), record("b", vec![0.6, 0.8]), record("c", vec![0.0, 1.0])],
        ))
        .unwrap();
        let hits = block_on(store.query(&ns, &[1.0, 0.0], 2)).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "a");
        assert_eq!(hits[1].id, "b");
        assert!((hits[0].score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_namespaces_are_isolated() {
        let store = InMemoryVectorStore::new();
        block_on(store.upsert(&resolve(1, 1), &[record("a", vec![1.0])])).unwrap();
        assert!(block_on(store.exists(&resolve(1, 1), "a")).unwrap());
        assert!(!block_on(store.exists(&resolve(1, 2), "a")).unwrap());
        assert!(block_on(store.query(&resolve(1, 2), &[1.0], 5)).unwrap().is_empty());
    }

    #[test]
    fn test_list_and_delete_by_prefix() {
        let store = InMemoryVectorStore::new();
        let ns = resolve(2, 3);
        block_on(store.upsert(
            &ns,
            &[
                record("pool#aa#0", vec![1.0]),
                record("pool#bb#1", vec![1.0]),
                record("pool-old#cc#0", vec![1.0]),
                record("gym#dd#0", vec![1.0]),
            ],
        ))
        .unwrap();
        let ids = block_on(store.list_ids(&ns, "pool#")).unwrap();
        assert_eq!(ids, vec!["pool#aa#0".to_string(), "pool#bb#1".to_string()]);
        block_on(store.delete(&ns, &ids)).unwrap();
        assert_eq!(store.len(&ns), 2);
        assert!(block_on(store.list_ids(&ns, "pool#")).unwrap().is_empty());
    }

    #[test]
    fn test_upsert_overwrites_same_id() {
        let store = InMemoryVectorStore::new();
        let ns = resolve(1, 1);
        block_on(store.upsert(&ns, &[record("a", vec![1.0])])).unwrap();
        block_on(store.upsert(&ns, &[record("a", vec![0.5])])).unwrap();
        assert_eq!(store.len(&ns), 1);
    }
}
