//! Configuration parsing and validation.
//!
//! condo-rag is configured via a TOML file (default: `config/crag.toml`).
//! Every section is optional; missing keys fall back to the defaults below.
//! Secrets never live in the file: the OpenAI key comes from
//! `OPENAI_API_KEY` and the Pinecone key from the variable named by
//! `vector_store.api_key_env`.
//!
//! # Example Configuration
//!
//! ```toml
//! [chunking]
//! window_chars = 800
//! overlap_chars = 200
//!
//! [retrieval]
//! tenant_threshold = 0.7
//! general_threshold = 0.35
//!
//! [embedding]
//! provider = "openai"
//! model = "text-embedding-ada-002"
//! dims = 1536
//!
//! [vector_store]
//! provider = "pinecone"
//! host = "https://condo-docs-abc123.svc.us-east-1.pinecone.io"
//!
//! [generation]
//! provider = "openai"
//! models = ["gpt-4o-mini", "gpt-3.5-turbo"]
//!
//! [audit]
//! path = "./data/crag-audit.sqlite"
//! ```

use anyhow::{bail, Context, Result};
use condo_rag_core::chunk::ChunkingParams;
use condo_rag_core::pipeline::PipelineConfig;
use condo_rag_core::retrieve::RetrievalParams;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub vector_store: VectorStoreConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub audit: AuditConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Chunker sizes, all in characters.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_window_chars")]
    pub window_chars: usize,
    #[serde(default = "default_overlap_chars")]
    pub overlap_chars: usize,
    #[serde(default = "default_section_max_chars")]
    pub section_max_chars: usize,
    #[serde(default = "default_min_fragment_chars")]
    pub min_fragment_chars: usize,
    #[serde(default = "default_classify_prefix_chars")]
    pub classify_prefix_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            window_chars: default_window_chars(),
            overlap_chars: default_overlap_chars(),
            section_max_chars: default_section_max_chars(),
            min_fragment_chars: default_min_fragment_chars(),
            classify_prefix_chars: default_classify_prefix_chars(),
        }
    }
}

fn default_window_chars() -> usize {
    800
}
fn default_overlap_chars() -> usize {
    200
}
fn default_section_max_chars() -> usize {
    1500
}
fn default_min_fragment_chars() -> usize {
    50
}
fn default_classify_prefix_chars() -> usize {
    1000
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_k_per_query")]
    pub k_per_query: usize,
    #[serde(default = "default_final_limit")]
    pub final_limit: usize,
    #[serde(default = "default_tenant_threshold")]
    pub tenant_threshold: f32,
    #[serde(default = "default_general_threshold")]
    pub general_threshold: f32,
    #[serde(default = "default_max_expansions")]
    pub max_expansions: usize,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_context_chunks")]
    pub context_chunks: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            k_per_query: default_k_per_query(),
            final_limit: default_final_limit(),
            tenant_threshold: default_tenant_threshold(),
            general_threshold: default_general_threshold(),
            max_expansions: default_max_expansions(),
            concurrency: default_concurrency(),
            context_chunks: default_context_chunks(),
        }
    }
}

fn default_k_per_query() -> usize {
    10
}
fn default_final_limit() -> usize {
    12
}
fn default_tenant_threshold() -> f32 {
    0.7
}
fn default_general_threshold() -> f32 {
    0.35
}
fn default_max_expansions() -> usize {
    5
}
fn default_concurrency() -> usize {
    4
}
fn default_context_chunks() -> usize {
    8
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EmbeddingConfig {
    /// `openai`, `ollama`, `local` (fastembed feature) or `hashing`.
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// In-flight embedding calls during ingestion.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: Some("text-embedding-ada-002".to_string()),
            dims: Some(1536),
            url: None,
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            concurrency: default_concurrency(),
        }
    }
}

fn default_embedding_provider() -> String {
    "openai".to_string()
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct VectorStoreConfig {
    /// `pinecone` or `memory`.
    #[serde(default = "default_store_provider")]
    pub provider: String,
    /// Index host, e.g. `https://<index>-<project>.svc.<region>.pinecone.io`.
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Store full chunk text in metadata next to the 1000-char preview.
    #[serde(default)]
    pub full_text_metadata: bool,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            provider: default_store_provider(),
            host: None,
            api_key_env: default_api_key_env(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            full_text_metadata: false,
        }
    }
}

fn default_store_provider() -> String {
    "pinecone".to_string()
}
fn default_api_key_env() -> String {
    "PINECONE_API_KEY".to_string()
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GenerationConfig {
    /// `openai` or `ollama`.
    #[serde(default = "default_generation_provider")]
    pub provider: String,
    /// Tried in order; the first model that answers wins.
    #[serde(default = "default_generation_models")]
    pub models: Vec<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_generation_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_generation_retries")]
    pub max_retries: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_generation_provider(),
            models: default_generation_models(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            url: None,
            timeout_secs: default_generation_timeout_secs(),
            max_retries: default_generation_retries(),
        }
    }
}

fn default_generation_provider() -> String {
    "openai".to_string()
}
fn default_generation_models() -> Vec<String> {
    ["gpt-4o-mini", "gpt-4-turbo-preview", "gpt-4", "gpt-3.5-turbo"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_temperature() -> f32 {
    0.3
}
fn default_max_tokens() -> u32 {
    1000
}
fn default_generation_timeout_secs() -> u64 {
    60
}
fn default_generation_retries() -> u32 {
    2
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AuditConfig {
    #[serde(default = "default_audit_enabled")]
    pub enabled: bool,
    #[serde(default = "default_audit_path")]
    pub path: PathBuf,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: default_audit_enabled(),
            path: default_audit_path(),
        }
    }
}

fn default_audit_enabled() -> bool {
    true
}
fn default_audit_path() -> PathBuf {
    PathBuf::from("./data/crag-audit.sqlite")
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Fallback `EnvFilter` directive when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Check cross-field constraints. Called by [`load_config`].
    pub fn validate(&self) -> Result<()> {
        self.chunking_params()
            .validate()
            .context("Invalid [chunking] section")?;

        let r = &self.retrieval;
        if r.k_per_query == 0 {
            bail!("retrieval.k_per_query must be >= 1");
        }
        if r.final_limit == 0 {
            bail!("retrieval.final_limit must be >= 1");
        }
        if r.max_expansions == 0 {
            bail!("retrieval.max_expansions must be >= 1");
        }
        if r.concurrency == 0 {
            bail!("retrieval.concurrency must be >= 1");
        }
        for (name, value) in [
            ("tenant_threshold", r.tenant_threshold),
            ("general_threshold", r.general_threshold),
        ] {
            if !(-1.0..=1.0).contains(&value) {
                bail!("retrieval.{} must be in [-1.0, 1.0], got {}", name, value);
            }
        }

        match self.embedding.provider.as_str() {
            "openai" | "ollama" => {
                if self.embedding.model.is_none() {
                    bail!(
                        "embedding.model must be specified when provider is '{}'",
                        self.embedding.provider
                    );
                }
                if self.embedding.dims.is_none() || self.embedding.dims == Some(0) {
                    bail!(
                        "embedding.dims must be > 0 when provider is '{}'",
                        self.embedding.provider
                    );
                }
            }
            "local" | "hashing" => {}
            other => bail!(
                "Unknown embedding provider: '{}'. Must be openai, ollama, local, or hashing.",
                other
            ),
        }

        match self.vector_store.provider.as_str() {
            "pinecone" => {
                if self.vector_store.host.is_none() {
                    bail!("vector_store.host must be set when provider is 'pinecone'");
                }
            }
            "memory" => {}
            other => bail!(
                "Unknown vector store provider: '{}'. Must be pinecone or memory.",
                other
            ),
        }

        match self.generation.provider.as_str() {
            "openai" | "ollama" => {}
            other => bail!(
                "Unknown generation provider: '{}'. Must be openai or ollama.",
                other
            ),
        }
        if self.generation.models.is_empty() {
            bail!("generation.models must list at least one model");
        }

        Ok(())
    }

    pub fn chunking_params(&self) -> ChunkingParams {
        ChunkingParams {
            window_chars: self.chunking.window_chars,
            overlap_chars: self.chunking.overlap_chars,
            section_max_chars: self.chunking.section_max_chars,
            min_fragment_chars: self.chunking.min_fragment_chars,
        }
    }

    /// Core pipeline tunables derived from this configuration.
    pub fn pipeline_config(&self) -> PipelineConfig {
        let r = &self.retrieval;
        PipelineConfig {
            chunking: self.chunking_params(),
            classify_prefix_chars: self.chunking.classify_prefix_chars,
            retrieval: RetrievalParams {
                k_per_query: r.k_per_query,
                final_limit: r.final_limit,
                tenant_threshold: r.tenant_threshold,
                general_threshold: r.general_threshold,
                concurrency: r.concurrency,
            },
            max_expansions: r.max_expansions,
            context_chunks: r.context_chunks,
            embed_concurrency: self.embedding.concurrency.max(1),
        }
    }
}

/// Read, parse and validate a configuration file.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Parse and validate configuration text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    config.validate()?;
    Ok(config)
}

const EXAMPLE_CONFIG: &str = include_str!("../config/crag.example.toml");

/// Commented starter configuration written by `crag init`.
pub fn default_config_toml() -> Result<String> {
    parse_config(EXAMPLE_CONFIG).context("Bundled example config is invalid")?;
    Ok(EXAMPLE_CONFIG.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = parse_config(
            r#"
[vector_store]
provider = "memory"
"#,
        )
        .unwrap();
        assert_eq!(config.chunking.window_chars, 800);
        assert_eq!(config.retrieval.final_limit, 12);
        assert_eq!(config.embedding.provider, "openai");
        assert_eq!(config.generation.models[0], "gpt-4o-mini");
        assert!(config.audit.enabled);
    }

    #[test]
    fn test_overlap_must_be_smaller_than_window() {
        let err = parse_config(
            r#"
[chunking]
window_chars = 500
overlap_chars = 500

[vector_store]
provider = "memory"
"#,
        )
        .unwrap_err();
        assert!(format!("{:#}", err).contains("overlap_chars"));
    }

    #[test]
    fn test_pinecone_requires_host() {
        let err = parse_config("").unwrap_err();
        assert!(err.to_string().contains("vector_store.host"));
    }

    #[test]
    fn test_unknown_providers_rejected() {
        assert!(parse_config("[embedding]\nprovider = \"magic\"\n[vector_store]\nprovider = \"memory\"").is_err());
        assert!(parse_config("[vector_store]\nprovider = \"chroma\"").is_err());
        assert!(parse_config(
            "[vector_store]\nprovider = \"memory\"\n[generation]\nprovider = \"claude\""
        )
        .is_err());
    }

    #[test]
    fn test_default_toml_roundtrips() {
        let text = default_config_toml().unwrap();
        let config = parse_config(&text).unwrap();
        assert_eq!(config.vector_store.provider, "pinecone");
        assert_eq!(config.pipeline_config().retrieval.tenant_threshold, 0.7);
    }
}
