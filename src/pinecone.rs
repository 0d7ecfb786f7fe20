//! Pinecone-backed [`VectorStore`].
//!
//! Talks to a single serverless index over its data-plane REST API. Each
//! [`Namespace`] maps onto a Pinecone namespace named by its key
//! (`user_{tenant}_cond_{sub}`); the shared general partition lives in
//! `user_0_cond_0`.
//!
//! Pinecone stores metadata numbers as doubles, so integral values are
//! folded back into integers before [`RecordMetadata`] is deserialized.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use condo_rag_core::models::{RecordMetadata, VectorMatch, VectorRecord};
use condo_rag_core::namespace::Namespace;
use condo_rag_core::store::VectorStore;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::config::VectorStoreConfig;
use crate::http::{build_client, send_with_retry};

const API_VERSION: &str = "2024-07";
/// Ids per delete request.
const DELETE_BATCH: usize = 1000;
/// Records per upsert request.
const UPSERT_BATCH: usize = 100;

pub struct PineconeStore {
    client: reqwest::Client,
    host: String,
    api_key: String,
    max_retries: u32,
    full_text: bool,
}

impl PineconeStore {
    pub fn new(config: &VectorStoreConfig) -> Result<Self> {
        let host = config
            .host
            .clone()
            .ok_or_else(|| anyhow!("vector_store.host required for Pinecone provider"))?;
        let api_key = std::env::var(&config.api_key_env)
            .map_err(|_| anyhow!("{} environment variable not set", config.api_key_env))?;
        let host = if host.starts_with("http://") || host.starts_with("https://") {
            host
        } else {
            format!("https://{}", host)
        };

        Ok(Self {
            client: build_client(config.timeout_secs)?,
            host: host.trim_end_matches('/').to_string(),
            api_key,
            max_retries: config.max_retries,
            full_text: config.full_text_metadata,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.host, path)
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value> {
        let url = self.url(path);
        let response = send_with_retry("Pinecone", self.max_retries, || {
            self.client
                .post(&url)
                .header("Api-Key", &self.api_key)
                .header("X-Pinecone-API-Version", API_VERSION)
                .json(body)
        })
        .await?;
        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).with_context(|| format!("Invalid Pinecone response from {}", path))
    }

    async fn get(&self, path: &str, params: &[(&str, String)]) -> Result<Value> {
        let url = self.url(path);
        let response = send_with_retry("Pinecone", self.max_retries, || {
            self.client
                .get(&url)
                .header("Api-Key", &self.api_key)
                .header("X-Pinecone-API-Version", API_VERSION)
                .query(params)
        })
        .await?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl VectorStore for PineconeStore {
    fn supports_full_text(&self) -> bool {
        self.full_text
    }

    async fn upsert(&self, ns: &Namespace, records: &[VectorRecord]) -> Result<()> {
        for batch in records.chunks(UPSERT_BATCH) {
            let vectors = batch
                .iter()
                .map(|r| {
                    Ok(json!({
                        "id": r.id,
                        "values": r.vector,
                        "metadata": serde_json::to_value(&r.metadata)?,
                    }))
                })
                .collect::<Result<Vec<Value>>>()?;
            let body = json!({ "vectors": vectors, "namespace": ns.key() });
            self.post("/vectors/upsert", &body).await?;
            debug!(namespace = %ns, count = batch.len(), "pinecone upsert");
        }
        Ok(())
    }

    async fn exists(&self, ns: &Namespace, id: &str) -> Result<bool> {
        let json = self
            .get(
                "/vectors/fetch",
                &[("ids", id.to_string()), ("namespace", ns.key())],
            )
            .await?;
        Ok(json
            .get("vectors")
            .and_then(|v| v.as_object())
            .map(|v| v.contains_key(id))
            .unwrap_or(false))
    }

    async fn query(&self, ns: &Namespace, vector: &[f32], top_k: usize) -> Result<Vec<VectorMatch>> {
        let body = json!({
            "namespace": ns.key(),
            "vector": vector,
            "topK": top_k,
            "includeMetadata": true,
            "includeValues": false,
        });
        let json = self.post("/query", &body).await?;
        parse_query_response(&json)
    }

    async fn delete(&self, ns: &Namespace, ids: &[String]) -> Result<()> {
        for batch in ids.chunks(DELETE_BATCH) {
            let body = json!({ "ids": batch, "namespace": ns.key() });
            self.post("/vectors/delete", &body).await?;
        }
        Ok(())
    }

    async fn list_ids(&self, ns: &Namespace, prefix: &str) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let mut params = vec![("namespace", ns.key()), ("prefix", prefix.to_string())];
            if let Some(t) = &token {
                params.push(("paginationToken", t.clone()));
            }
            let json = self.get("/vectors/list", &params).await?;
            let (page, next) = parse_list_response(&json)?;
            ids.extend(page);
            match next {
                Some(t) => token = Some(t),
                None => break,
            }
        }
        Ok(ids)
    }
}

fn parse_query_response(json: &Value) -> Result<Vec<VectorMatch>> {
    let matches = json
        .get("matches")
        .and_then(|m| m.as_array())
        .ok_or_else(|| anyhow!("Invalid Pinecone response: missing matches array"))?;

    let mut out = Vec::with_capacity(matches.len());
    for m in matches {
        let id = m
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow!("Invalid Pinecone response: match without id"))?;
        let score = m.get("score").and_then(|v| v.as_f64()).unwrap_or(0.0) as f32;
        let Some(raw) = m.get("metadata") else {
            warn!(id, "pinecone match without metadata; skipping");
            continue;
        };
        match serde_json::from_value::<RecordMetadata>(integral_numbers(raw.clone())) {
            Ok(metadata) => out.push(VectorMatch {
                id: id.to_string(),
                score,
                metadata,
            }),
            Err(e) => warn!(id, error = %e, "unreadable pinecone metadata; skipping"),
        }
    }
    Ok(out)
}

fn parse_list_response(json: &Value) -> Result<(Vec<String>, Option<String>)> {
    let ids = json
        .get("vectors")
        .and_then(|v| v.as_array())
        .ok_or_else(|| anyhow!("Invalid Pinecone response: missing vectors array"))?
        .iter()
        .filter_map(|v| v.get("id").and_then(|id| id.as_str()).map(String::from))
        .collect();
    let next = json
        .get("pagination")
        .and_then(|p| p.get("next"))
        .and_then(|n| n.as_str())
        .filter(|n| !n.is_empty())
        .map(String::from);
    Ok((ids, next))
}

/// Rewrite `3.0` as `3` so integer fields deserialize.
fn integral_numbers(value: Value) -> Value {
    match value {
        Value::Number(n) => match n.as_f64() {
            Some(f) if n.is_f64() && f.fract() == 0.0 && f >= 0.0 && f <= u64::MAX as f64 => {
                Value::from(f as u64)
            }
            _ => Value::Number(n),
        },
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, integral_numbers(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(integral_numbers).collect()),
        other => other,
    }
}
