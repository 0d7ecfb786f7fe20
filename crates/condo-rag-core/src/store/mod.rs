//! Namespace-partitioned vector storage abstraction.
//!
//! The [`VectorStore`] trait is the only way the pipeline touches stored
//! vectors. Every operation is scoped to one [`Namespace`]; no method can
//! read or write across partitions, which is what keeps one tenant's
//! chunks out of another tenant's answers.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{VectorMatch, VectorRecord};
use crate::namespace::Namespace;

/// Abstract vector store.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`upsert`](VectorStore::upsert) | Insert or overwrite records by id |
/// | [`exists`](VectorStore::exists) | Dedup probe for a single id |
/// | [`query`](VectorStore::query) | Top-k nearest neighbours |
/// | [`delete`](VectorStore::delete) | Remove records by id |
/// | [`list_ids`](VectorStore::list_ids) | Enumerate ids sharing a prefix |
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Whether record metadata may carry the full chunk text in addition
    /// to the bounded preview.
    fn supports_full_text(&self) -> bool;

    /// Insert or overwrite records in `ns`.
    async fn upsert(&self, ns: &Namespace, records: &[VectorRecord]) -> Result<()>;

    /// Whether a record with `id` is stored in `ns`.
    async fn exists(&self, ns: &Namespace, id: &str) -> Result<bool>;

    /// The `top_k` records most similar to `vector`, best first.
    async fn query(&self, ns: &Namespace, vector: &[f32], top_k: usize)
        -> Result<Vec<VectorMatch>>;

    /// Remove records by id. Unknown ids are ignored.
    async fn delete(&self, ns: &Namespace, ids: &[String]) -> Result<()>;

    /// Every stored id in `ns` starting with `prefix`.
    async fn list_ids(&self, ns: &Namespace, prefix: &str) -> Result<Vec<String>>;
}
