//! Model client for VLM inference over Ollama or vLLM (OpenAI-compatible).

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::adb::Screenshot;
use crate::ports::PerceptionPort;

/// Default request timeout in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

/// Local Ollama service.
pub const DEFAULT_API_URL: &str = "http://localhost:11434";

pub const DEFAULT_MODEL_NAME: &str = "qwen2.5vl:3b";

/// Model client errors.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),
    #[error("Failed to parse response: {0}")]
    ParseError(String),
    #[error("API error {status}: {body}")]
    ApiError { status: u16, body: String },
    #[error("Unsupported model type: {0} (expected 'ollama' or 'vllm')")]
    UnsupportedBackend(String),
}

/// Wire protocol of the model service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelBackend {
    /// `POST /api/generate` with an inline base64 image.
    #[default]
    Ollama,
    /// `POST /v1/chat/completions` with a data-URI image attachment.
    Vllm,
}

impl FromStr for ModelBackend {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "vllm" => Ok(Self::Vllm),
            other => Err(ModelError::UnsupportedBackend(other.to_string())),
        }
    }
}

impl fmt::Display for ModelBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ollama => f.write_str("ollama"),
            Self::Vllm => f.write_str("vllm"),
        }
    }
}

/// Configuration for the VLM service.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub backend: ModelBackend,
    pub api_url: String,
    pub model_name: String,
    /// Only sent on the chat-completions backend.
    pub max_tokens: u32,
    /// Only sent on the chat-completions backend.
    pub temperature: f32,
    pub timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            backend: ModelBackend::Ollama,
            api_url: DEFAULT_API_URL.to_string(),
            model_name: DEFAULT_MODEL_NAME.to_string(),
            max_tokens: 512,
            temperature: 0.7,
            timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl ModelConfig {
    /// Set the wire protocol.
    pub fn with_backend(mut self, backend: ModelBackend) -> Self {
        self.backend = backend;
        self
    }

    /// Set the service URL, e.g. `http://localhost:11434` or `http://localhost:8000`.
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    /// Set the model name.
    pub fn with_model_name(mut self, model_name: impl Into<String>) -> Self {
        self.model_name = model_name.into();
        self
    }

    /// Set the request timeout in seconds.
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Full endpoint URL for the configured backend.
    pub fn endpoint(&self) -> String {
        let base = self.api_url.trim_end_matches('/');
        match self.backend {
            ModelBackend::Ollama => format!("{}/api/generate", base),
            ModelBackend::Vllm => {
                let base = base.strip_suffix("/v1").unwrap_or(base);
                format!("{}/v1/chat/completions", base)
            }
        }
    }
}

/// Ollama generate response.
#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

/// OpenAI API response structures.
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Debug, Deserialize)]
struct Message {
    content: String,
}

/// Client for a single-shot image + prompt query.
///
/// The client does no retries of its own: the round controller decides what
/// a missing answer means.
pub struct ModelClient {
    config: ModelConfig,
    client: Client,
}

impl ModelClient {
    /// Create a new ModelClient with the given configuration.
    pub fn new(config: ModelConfig) -> Result<Self, ModelError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Send one request and return the model text.
    pub async fn request(&self, image_base64: &str, prompt: &str) -> Result<String, ModelError> {
        let body = match self.config.backend {
            ModelBackend::Ollama => {
                MessageBuilder::generate_body(&self.config, image_base64, prompt)
            }
            ModelBackend::Vllm => MessageBuilder::chat_body(&self.config, image_base64, prompt),
        };

        let response = self
            .client
            .post(self.config.endpoint())
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::ApiError {
                status: status.as_u16(),
                body,
            });
        }

        match self.config.backend {
            ModelBackend::Ollama => {
                let generated: GenerateResponse = response.json().await?;
                Ok(generated.response)
            }
            ModelBackend::Vllm => {
                let completion: ChatCompletionResponse = response.json().await?;
                completion
                    .choices
                    .into_iter()
                    .next()
                    .map(|c| c.message.content)
                    .ok_or_else(|| ModelError::ParseError("No choices in response".to_string()))
            }
        }
    }
}

#[async_trait]
impl PerceptionPort for ModelClient {
    async fn query(&self, image: &Screenshot, prompt: &str) -> String {
        match self.request(&image.to_base64(), prompt).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!("{} query failed: {}", self.config.backend, e);
                String::new()
            }
        }
    }

    fn describe(&self) -> String {
        format!("{}:{}", self.config.backend, self.config.model_name)
    }
}

/// Request body builders for both wire protocols.
pub struct MessageBuilder;

impl MessageBuilder {
    /// Ollama `/api/generate` body.
    pub fn generate_body(config: &ModelConfig, image_base64: &str, prompt: &str) -> Value {
        json!({
            "model": config.model_name,
            "prompt": prompt,
            "images": [image_base64],
            "stream": false
        })
    }

    /// OpenAI-style chat-completions body with a single user message.
    pub fn chat_body(config: &ModelConfig, image_base64: &str, prompt: &str) -> Value {
        json!({
            "model": config.model_name,
            "messages": [Self::create_user_message(prompt, Some(image_base64))],
            "max_tokens": config.max_tokens,
            "temperature": config.temperature,
        })
    }

    /// Create a user message with optional image; text comes first.
    pub fn create_user_message(text: &str, image_base64: Option<&str>) -> Value {
        let mut content = vec![json!({
            "type": "text",
            "text": text
        })];

        if let Some(img_data) = image_base64 {
            content.push(json!({
                "type": "image_url",
                "image_url": {
                    "url": format!("data:image/png;base64,{}", img_data)
                }
            }));
        }

        json!({
            "role": "user",
            "content": content
        })
    }
}
