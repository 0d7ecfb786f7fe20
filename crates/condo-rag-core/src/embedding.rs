//! Embedding backend trait and vector utilities.
//!
//! Defines the [`EmbeddingBackend`] trait every embedding client
//! implements, the cosine similarity used by the in-memory store, and
//! [`HashingEmbedder`], a deterministic offline embedder.
//!
//! Network clients (OpenAI, Ollama, fastembed) live in the `condo-rag`
//! app crate.

use async_trait::async_trait;

/// Turns text into a fixed-dimension vector.
///
/// Implementations own their connection pool and retry policy and must be
/// safe to call from many tasks at once.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;
    /// Vector dimensionality (e.g. `1536`).
    fn dims(&self) -> usize;
    /// Embed one text.
    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>>;
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`, or `0.0` for empty vectors and
/// vectors of different lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "can", "do", "for", "from", "i", "in", "is",
    "it", "of", "on", "or", "the", "to", "what", "when", "where", "which", "with", "o", "os",
    "as", "da", "das", "de", "do", "dos", "e", "em", "na", "no", "para", "por", "que", "um",
    "uma",
];

/// Feature-hashing bag-of-words embedder.
///
/// Lowercases, drops stopwords, folds a trailing plural `s`, and hashes
/// each remaining token (FNV-1a) into one of `dims` buckets. Output is
/// L2-normalized. No model download, no network: intended for tests,
/// demos and air-gapped smoke runs.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dims: usize,
}

impl HashingEmbedder {
    pub fn new(dims: usize) -> Self {
        Self { dims: dims.max(1) }
    }

    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dims];
        let lowered = text.to_lowercase();
        for raw in lowered.split(|c: char| !c.is_alphanumeric()) {
            if raw.is_empty() || STOPWORDS.contains(&raw) {
                continue;
            }
            let token = match raw.strip_suffix('s') {
                Some(stem) if stem.chars().count() >= 3 => stem,
                _ => raw,
            };
            let bucket = (fnv1a(token.as_bytes()) % self.dims as u64) as usize;
            v[bucket] += 1.0;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            for x in v.iter_mut() {
                *x /= norm;
            }
        }
        v
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl EmbeddingBackend for HashingEmbedder {
    fn model_name(&self) -> &str {
        "hashing-bow"
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        Ok(self.embed_sync(text))
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for b in bytes {
        hash ^= *b as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}
