//! Document-side commands: `ingest`, `kb-add`, `delete` and `classify`.

use anyhow::{Context, Result};
use condo_rag_core::chunk::split;
use condo_rag_core::classify::classify_with_prefix;
use condo_rag_core::error::PipelineError;
use condo_rag_core::models::{ChunkType, SourceDocument};
use condo_rag_core::namespace::{resolve, Namespace};
use condo_rag_core::pipeline::{IngestReport, RagPipeline};
use std::path::Path;

use crate::config::Config;
use crate::extract::extract_file;

/// Title given on the command line, else the file stem.
fn title_for(path: &Path, title: Option<String>) -> String {
    title.unwrap_or_else(|| {
        path.file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("document")
            .to_string()
    })
}

fn load_document(
    path: &Path,
    title: Option<String>,
    category: &str,
    document_id: Option<String>,
) -> Result<SourceDocument> {
    let (kind, text) = extract_file(path)
        .map_err(|e| PipelineError::Extraction(e.to_string()))
        .with_context(|| format!("Failed to extract {}", path.display()))?;
    let mut doc = SourceDocument::new(title_for(path, title), kind, text).with_category(category);
    if let Some(id) = document_id {
        doc = doc.with_document_id(id);
    }
    Ok(doc)
}

fn print_report(label: &str, report: &IngestReport) {
    println!("{} {}", label, report.document_id);
    println!("  namespace: {}", report.namespace);
    println!("  doc type: {}", report.doc_type);
    println!("  chunks: {}", report.chunks_created);
    println!("  stored: {}", report.stored_count);
    println!("  skipped (already indexed): {}", report.skipped_count);
    println!("ok");
}

pub async fn run_ingest(
    pipeline: &RagPipeline,
    path: &Path,
    tenant_id: u64,
    sub_tenant_id: u64,
    title: Option<String>,
    category: &str,
    document_id: Option<String>,
) -> Result<()> {
    let doc = load_document(path, title, category, document_id)?;
    let report = pipeline.ingest(&doc, tenant_id, sub_tenant_id).await?;
    print_report("ingest", &report);
    Ok(())
}

pub async fn run_kb_add(
    pipeline: &RagPipeline,
    path: &Path,
    title: Option<String>,
    category: &str,
) -> Result<()> {
    let doc = load_document(path, title, category, None)?;
    let report = pipeline
        .add_to_knowledge_base(&doc.text, &doc.title, &doc.category)
        .await?;
    print_report("kb-add", &report);
    Ok(())
}

pub async fn run_delete(
    pipeline: &RagPipeline,
    document_id: &str,
    tenant_id: u64,
    sub_tenant_id: u64,
) -> Result<()> {
    let ns = resolve(tenant_id, sub_tenant_id);
    let removed = pipeline.delete_document(document_id, ns).await?;
    if removed == 0 {
        println!("No vectors found for '{}' in {}.", document_id, ns);
    } else {
        println!("deleted {} vectors of '{}' from {}", removed, document_id, ns);
    }
    Ok(())
}

/// Dry run: classify and chunk a file without any backend.
pub fn run_classify(config: &Config, path: &Path) -> Result<()> {
    let doc = load_document(path, None, "general", None)?;
    let doc_type = classify_with_prefix(
        &doc.text,
        &doc.title,
        config.chunking.classify_prefix_chars,
    );
    let chunking = split(&doc.text, doc_type, &config.chunking_params());
    let drafts = chunking.into_drafts();

    let count = |t: ChunkType| drafts.iter().filter(|d| d.chunk_type == t).count();
    println!("classify {}", path.display());
    println!("  identity: {}", doc.identity());
    println!("  kind: {}", doc.kind.as_str());
    println!("  characters: {}", doc.text.chars().count());
    println!("  doc type: {}", doc_type);
    println!("  chunks: {}", drafts.len());
    println!("    article: {}", count(ChunkType::Article));
    println!("    paragraph: {}", count(ChunkType::Paragraph));
    println!("    window: {}", count(ChunkType::Window));
    let first_articles: Vec<&str> = drafts
        .iter()
        .filter_map(|d| d.article.as_deref())
        .take(10)
        .collect();
    if !first_articles.is_empty() {
        println!("  articles: {}", first_articles.join(", "));
    }
    println!("  general namespace: {}", Namespace::general());
    Ok(())
}
