//! Chat generation backends.
//!
//! Both backends walk `generation.models` in order and return the first
//! model's answer. A model that errors (unknown model, quota, outage after
//! retries) hands over to the next one; the call fails only when every
//! model failed.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use condo_rag_core::synthesize::GenerationBackend;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::GenerationConfig;
use crate::http::{build_client, send_with_retry};

const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";
const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct OpenAIChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    max_tokens: u32,
    messages: [ChatMessage<'a>; 2],
}

#[derive(Deserialize)]
struct OpenAIChatResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Deserialize)]
struct OpenAIChoice {
    message: AssistantMessage,
}

#[derive(Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    stream: bool,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Deserialize)]
struct OllamaChatResponse {
    message: AssistantMessage,
}

fn messages<'a>(system: &'a str, user: &'a str) -> [ChatMessage<'a>; 2] {
    [
        ChatMessage {
            role: "system",
            content: system,
        },
        ChatMessage {
            role: "user",
            content: user,
        },
    ]
}

/// Run `attempt` for each model in order and return the first answer.
///
/// Failures are logged and hand over to the next model; the last error is
/// returned when every model failed.
async fn first_success<'m, F, Fut>(models: &'m [String], mut attempt: F) -> Result<String>
where
    F: FnMut(&'m str) -> Fut,
    Fut: Future<Output = Result<String>>,
{
    let mut last_err = None;
    for model in models {
        match attempt(model).await {
            Ok(answer) => {
                debug!(model = %model, "generation succeeded");
                return Ok(answer);
            }
            Err(e) => {
                warn!(model = %model, error = %e, "generation model failed; trying next");
                last_err = Some(e);
            }
        }
    }
    Err(last_err.unwrap_or_else(|| anyhow!("no generation models configured")))
}

/// OpenAI chat completions. Requires `OPENAI_API_KEY`.
pub struct OpenAIGenerator {
    client: reqwest::Client,
    api_key: String,
    config: GenerationConfig,
}

impl OpenAIGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow!("OPENAI_API_KEY environment variable not set"))?;
        Ok(Self {
            client: build_client(config.timeout_secs)?,
            api_key,
            config: config.clone(),
        })
    }

    async fn complete_with(&self, model: &str, system: &str, user: &str) -> Result<String> {
        let body = OpenAIChatRequest {
            model,
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            messages: messages(system, user),
        };
        let url = self.config.url.as_deref().unwrap_or(OPENAI_CHAT_URL);
        let response = send_with_retry("OpenAI", self.config.max_retries, || {
            self.client.post(url).bearer_auth(&self.api_key).json(&body)
        })
        .await?;
        let parsed: OpenAIChatResponse = response.json().await?;
        parsed
            .choices
            .into_iter()
            .find_map(|c| c.message.content)
            .ok_or_else(|| anyhow!("OpenAI response had no message content"))
    }
}

#[async_trait]
impl GenerationBackend for OpenAIGenerator {
    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        first_success(&self.config.models, |model| {
            self.complete_with(model, system, user)
        })
        .await
    }
}

/// Chat against a local Ollama instance.
pub struct OllamaGenerator {
    client: reqwest::Client,
    url: String,
    config: GenerationConfig,
}

impl OllamaGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string());
        Ok(Self {
            client: build_client(config.timeout_secs)?,
            url: url.trim_end_matches('/').to_string(),
            config: config.clone(),
        })
    }
}

impl OllamaGenerator {
    async fn complete_with(&self, model: &str, system: &str, user: &str) -> Result<String> {
        let endpoint = format!("{}/api/chat", self.url);
        let body = OllamaChatRequest {
            model,
            messages: messages(system, user),
            stream: false,
            options: OllamaOptions {
                temperature: self.config.temperature,
                num_predict: self.config.max_tokens,
            },
        };
        let response = send_with_retry("Ollama", self.config.max_retries, || {
            self.client.post(&endpoint).json(&body)
        })
        .await?;
        let parsed: OllamaChatResponse = response.json().await?;
        parsed
            .message
            .content
            .ok_or_else(|| anyhow!("Ollama response had no message content"))
    }
}

#[async_trait]
impl GenerationBackend for OllamaGenerator {
    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        first_success(&self.config.models, |model| {
            self.complete_with(model, system, user)
        })
        .await
    }
}

/// Build the [`GenerationBackend`] named by `config.provider`.
pub fn create_generator(config: &GenerationConfig) -> Result<Arc<dyn GenerationBackend>> {
    match config.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAIGenerator::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaGenerator::new(config)?)),
        other => bail!("Unknown generation provider: {}", other),
    }
}
