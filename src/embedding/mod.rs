//! Embedding backends.
//!
//! Concrete [`EmbeddingBackend`] implementations:
//! - **[`OpenAIEmbedder`]**: `POST /v1/embeddings` with retry and backoff.
//! - **[`OllamaEmbedder`]**: a local Ollama instance's `/api/embed` endpoint.
//! - **`LocalEmbedder`**: fastembed models run in-process
//!   (`--features local-embeddings-fastembed`); no network after the model
//!   download.
//! - **`hashing`**: the core crate's feature-hashing embedder, for offline
//!   smoke runs.
//!
//! Use [`create_embedder`] to build the one named by the configuration.
//! Each backend holds a single `reqwest::Client` for its lifetime.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use condo_rag_core::embedding::{EmbeddingBackend, HashingEmbedder};
use std::sync::Arc;

use crate::config::EmbeddingConfig;
use crate::http::{build_client, send_with_retry};

const OPENAI_EMBEDDINGS_URL: &str = "https://api.openai.com/v1/embeddings";
const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

// ============ OpenAI ============

/// Embedding backend using the OpenAI API. Requires `OPENAI_API_KEY`.
pub struct OpenAIEmbedder {
    client: reqwest::Client,
    api_key: String,
    model: String,
    dims: usize,
    max_retries: u32,
}

impl OpenAIEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow!("embedding.model required for OpenAI provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow!("embedding.dims required for OpenAI provider"))?;
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow!("OPENAI_API_KEY environment variable not set"))?;

        Ok(Self {
            client: build_client(config.timeout_secs)?,
            api_key,
            model,
            dims,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl EmbeddingBackend for OpenAIEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": [text],
        });
        let response = send_with_retry("OpenAI", self.max_retries, || {
            self.client
                .post(OPENAI_EMBEDDINGS_URL)
                .bearer_auth(&self.api_key)
                .json(&body)
        })
        .await?;
        let json: serde_json::Value = response.json().await?;
        let vector = parse_openai_response(&json)?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("Empty embedding response"))?;
        check_dims(&self.model, self.dims, vector)
    }
}

/// Extract `data[].embedding` arrays in response order.
fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| anyhow!("Invalid OpenAI response: missing data array"))?;

    data.iter()
        .map(|item| {
            item.get("embedding")
                .and_then(|e| e.as_array())
                .ok_or_else(|| anyhow!("Invalid OpenAI response: missing embedding"))
                .map(|values| to_f32_vec(values))
        })
        .collect()
}

// ============ Ollama ============

/// Embedding backend using a local Ollama instance.
///
/// Requires Ollama running with an embedding model pulled
/// (e.g. `ollama pull nomic-embed-text`).
pub struct OllamaEmbedder {
    client: reqwest::Client,
    url: String,
    model: String,
    dims: usize,
    max_retries: u32,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow!("embedding.model required for Ollama provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow!("embedding.dims required for Ollama provider"))?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string());

        Ok(Self {
            client: build_client(config.timeout_secs)?,
            url: url.trim_end_matches('/').to_string(),
            model,
            dims,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl EmbeddingBackend for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": [text],
        });
        let endpoint = format!("{}/api/embed", self.url);
        let response = send_with_retry("Ollama", self.max_retries, || {
            self.client.post(&endpoint).json(&body)
        })
        .await?;
        let json: serde_json::Value = response.json().await?;
        let vector = parse_ollama_response(&json)?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("Empty embedding response"))?;
        check_dims(&self.model, self.dims, vector)
    }
}

fn parse_ollama_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| anyhow!("Invalid Ollama response: missing embeddings array"))?;

    embeddings
        .iter()
        .map(|embedding| {
            embedding
                .as_array()
                .ok_or_else(|| anyhow!("Invalid Ollama response: embedding is not an array"))
                .map(|values| to_f32_vec(values))
        })
        .collect()
}

// ============ Local (fastembed) ============

#[cfg(feature = "local-embeddings-fastembed")]
pub use local::LocalEmbedder;

#[cfg(feature = "local-embeddings-fastembed")]
mod local {
    use super::*;
    use std::sync::Mutex;

    /// In-process embedding via fastembed. The model is loaded once and
    /// shared; inference runs on the blocking pool.
    pub struct LocalEmbedder {
        model: Arc<Mutex<fastembed::TextEmbedding>>,
        model_name: String,
        dims: usize,
    }

    impl LocalEmbedder {
        pub fn new(config: &EmbeddingConfig) -> Result<Self> {
            let model_name = config
                .model
                .clone()
                .unwrap_or_else(|| "multilingual-e5-small".to_string());
            let (fastembed_model, default_dims) = resolve_local_model(&model_name)?;
            let model = fastembed::TextEmbedding::try_new(
                fastembed::InitOptions::new(fastembed_model).with_show_download_progress(true),
            )
            .map_err(|e| anyhow!("Failed to initialize local embedding model: {}", e))?;
            Ok(Self {
                model: Arc::new(Mutex::new(model)),
                model_name,
                dims: config.dims.unwrap_or(default_dims),
            })
        }
    }

    #[async_trait]
    impl EmbeddingBackend for LocalEmbedder {
        fn model_name(&self) -> &str {
            &self.model_name
        }

        fn dims(&self) -> usize {
            self.dims
        }

        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            let model = Arc::clone(&self.model);
            let texts = vec![text.to_string()];
            let mut out = tokio::task::spawn_blocking(move || {
                let mut guard = model
                    .lock()
                    .map_err(|_| anyhow!("local embedding model lock poisoned"))?;
                guard
                    .embed(texts, None)
                    .map_err(|e| anyhow!("Local embedding failed: {}", e))
            })
            .await??;
            out.pop().ok_or_else(|| anyhow!("Empty embedding response"))
        }
    }

    fn resolve_local_model(name: &str) -> Result<(fastembed::EmbeddingModel, usize)> {
        match name {
            "all-minilm-l6-v2" => Ok((fastembed::EmbeddingModel::AllMiniLML6V2, 384)),
            "bge-small-en-v1.5" => Ok((fastembed::EmbeddingModel::BGESmallENV15, 384)),
            "bge-base-en-v1.5" => Ok((fastembed::EmbeddingModel::BGEBaseENV15, 768)),
            "multilingual-e5-small" => Ok((fastembed::EmbeddingModel::MultilingualE5Small, 384)),
            "multilingual-e5-base" => Ok((fastembed::EmbeddingModel::MultilingualE5Base, 768)),
            "multilingual-e5-large" => Ok((fastembed::EmbeddingModel::MultilingualE5Large, 1024)),
            other => bail!(
                "Unknown local embedding model: '{}'. Supported models: \
                 all-minilm-l6-v2, bge-small-en-v1.5, bge-base-en-v1.5, \
                 multilingual-e5-small, multilingual-e5-base, multilingual-e5-large",
                other
            ),
        }
    }
}

// ============ Helpers ============

fn to_f32_vec(values: &[serde_json::Value]) -> Vec<f32> {
    values
        .iter()
        .map(|v| v.as_f64().unwrap_or(0.0) as f32)
        .collect()
}

fn check_dims(model: &str, expected: usize, vector: Vec<f32>) -> Result<Vec<f32>> {
    if vector.len() != expected {
        bail!(
            "Model {} returned {} dimensions, config says {}",
            model,
            vector.len(),
            expected
        );
    }
    Ok(vector)
}

/// Build the [`EmbeddingBackend`] named by `config.provider`.
///
/// | Config Value | Backend |
/// |-------------|----------|
/// | `"openai"` | [`OpenAIEmbedder`] |
/// | `"ollama"` | [`OllamaEmbedder`] |
/// | `"local"` | `LocalEmbedder` (fastembed feature) |
/// | `"hashing"` | [`HashingEmbedder`] |
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingBackend>> {
    match config.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAIEmbedder::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaEmbedder::new(config)?)),
        #[cfg(feature = "local-embeddings-fastembed")]
        "local" => Ok(Arc::new(LocalEmbedder::new(config)?)),
        #[cfg(not(feature = "local-embeddings-fastembed"))]
        "local" => bail!("Local embedding provider requires --features local-embeddings-fastembed"),
        "hashing" => Ok(Arc::new(HashingEmbedder::new(config.dims.unwrap_or(256)))),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_openai_response() {
        let json = serde_json::json!({
            "data": [{"embedding": [0.5, -1.0], "index": 0}],
            "model": "text-embedding-ada-002"
        });
        assert_eq!(parse_openai_response(&json).unwrap(), vec![vec![0.5f32, -1.0]]);
        assert!(parse_openai_response(&serde_json::json!({"error": "x"})).is_err());
    }

    #[test]
    fn test_parse_ollama_response() {
        let json = serde_json::json!({"embeddings": [[0.25, 0.75]]});
        assert_eq!(parse_ollama_response(&json).unwrap(), vec![vec![0.25f32, 0.75]]);
        assert!(parse_ollama_response(&serde_json::json!({"embeddings": [1]})).is_err());
    }

    #[test]
    fn test_check_dims() {
        assert!(check_dims("m", 2, vec![1.0, 2.0]).is_ok());
        assert!(check_dims("m", 3, vec![1.0, 2.0]).is_err());
    }

    #[test]
    fn test_create_hashing_embedder() {
        let config = EmbeddingConfig {
            provider: "hashing".to_string(),
            dims: Some(64),
            ..EmbeddingConfig::default()
        };
        let e = create_embedder(&config).unwrap();
        assert_eq!(e.dims(), 64);
        assert_eq!(e.model_name(), "hashing-bow");
    }

    #[test]
    fn test_unknown_provider() {
        let config = EmbeddingConfig {
            provider: "nope".to_string(),
            ..EmbeddingConfig::default()
        };
        assert!(create_embedder(&config).is_err());
    }
}
