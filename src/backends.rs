//! Backend construction.
//!
//! Everything the pipeline talks to is built exactly once here from the
//! loaded [`Config`] and handed to [`RagPipeline::new`] as `Arc<dyn _>`.

use anyhow::{bail, Result};
use condo_rag_core::pipeline::RagPipeline;
use condo_rag_core::store::memory::InMemoryVectorStore;
use condo_rag_core::store::VectorStore;
use std::sync::Arc;
use tracing::info;

use crate::audit::SqliteAudit;
use crate::config::{Config, VectorStoreConfig};
use crate::embedding::create_embedder;
use crate::generation::create_generator;
use crate::pinecone::PineconeStore;

/// Build the [`VectorStore`] named by `config.provider`.
///
/// `memory` keeps vectors for the life of the process only.
pub fn create_store(config: &VectorStoreConfig) -> Result<Arc<dyn VectorStore>> {
    match config.provider.as_str() {
        "pinecone" => Ok(Arc::new(PineconeStore::new(config)?)),
        "memory" => Ok(Arc::new(InMemoryVectorStore::new())),
        other => bail!("Unknown vector store provider: {}", other),
    }
}

/// Open the audit database when auditing is enabled.
pub async fn open_audit(config: &Config) -> Result<Option<Arc<SqliteAudit>>> {
    if !config.audit.enabled {
        return Ok(None);
    }
    Ok(Some(Arc::new(SqliteAudit::open(&config.audit.path).await?)))
}

/// Wire every backend into a ready pipeline.
pub async fn build_pipeline(config: &Config) -> Result<RagPipeline> {
    let embedder = create_embedder(&config.embedding)?;
    let store = create_store(&config.vector_store)?;
    let generator = create_generator(&config.generation)?;

    info!(
        embedding = embedder.model_name(),
        dims = embedder.dims(),
        store = %config.vector_store.provider,
        generation = %config.generation.provider,
        "backends ready"
    );

    let pipeline = RagPipeline::new(embedder, store, generator, config.pipeline_config());
    Ok(match open_audit(config).await? {
        Some(audit) => pipeline.with_audit(audit),
        None => pipeline,
    })
}
