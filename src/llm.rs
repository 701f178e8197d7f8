//! Text-generation client abstraction and implementations.
//!
//! Defines the [`LlmClient`] trait and concrete implementations:
//! - **[`DisabledClient`]**: always errors; used when no provider is configured.
//! - **[`OpenAiClient`]**: calls an OpenAI-compatible chat completions endpoint.
//!
//! # Provider Selection
//!
//! Use [`create_client`] to instantiate the appropriate client based on the
//! configuration:
//!
//! ```rust,no_run
//! # use txt2kb::config::LlmConfig;
//! # use txt2kb::llm::create_client;
//! let config = LlmConfig::default(); // provider = "disabled"
//! let client = create_client(&config).unwrap();
//! assert_eq!(client.model_name(), "disabled");
//! ```
//!
//! # Timeouts and retries
//!
//! A client performs exactly one request per [`LlmClient::complete`] call.
//! Attempt timeouts, the retry with a stricter instruction and the fallback
//! to rule-based extraction all live in [`crate::extract::llm`], so the
//! whole policy is bounded by one configured timeout per attempt.

use anyhow::bail;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::LlmConfig;

/// Failure of a single completion request.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("LLM provider is disabled")]
    Disabled,

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("invalid API response: {0}")]
    InvalidResponse(String),
}

/// A text-generation service taking an instruction and a document.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Returns the model identifier (e.g. `"gpt-4o-mini"`).
    fn model_name(&self) -> &str;

    /// Send one request and return the raw text payload.
    async fn complete(&self, instruction: &str, document: &str) -> Result<String, LlmError>;
}

// ============ Disabled Client ============

/// A client that refuses every request.
pub struct DisabledClient;

#[async_trait]
impl LlmClient for DisabledClient {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn complete(&self, _instruction: &str, _document: &str) -> Result<String, LlmError> {
        Err(LlmError::Disabled)
    }
}

// ============ OpenAI Client ============

/// Client for OpenAI-compatible `POST {base_url}/chat/completions`.
///
/// Sends the instruction as the system message and the document as the
/// user message, and asks for a JSON object response.
pub struct OpenAiClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAiClient {
    /// Create a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the API key environment variable is not set or
    /// the HTTP client cannot be built.
    pub fn new(config: &LlmConfig) -> anyhow::Result<Self> {
        let api_key = match std::env::var(&config.api_key_env) {
            Ok(key) if !key.trim().is_empty() => key,
            _ => bail!("{} environment variable not set", config.api_key_env),
        };

        // The extractor enforces the per-attempt timeout; this one only
        // guards against a stuck connection outliving it.
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.saturating_add(5)))
            .build()?;

        Ok(Self {
            http,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, instruction: &str, document: &str) -> Result<String, LlmError> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": instruction },
                { "role": "user", "content": document },
            ],
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
            "response_format": { "type": "json_object" },
        });

        let response = self
            .http
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let json: serde_json::Value = response.json().await?;
        parse_chat_response(&json)
    }
}

/// Pull `choices[0].message.content` out of a chat completions response.
fn parse_chat_response(json: &serde_json::Value) -> Result<String, LlmError> {
    json.pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .map(|c| c.trim().to_string())
        .ok_or_else(|| LlmError::InvalidResponse("missing choices[0].message.content".into()))
}

/// Create the appropriate [`LlmClient`] based on configuration.
///
/// | Config Value | Client |
/// |-------------|----------|
/// | `"disabled"` | [`DisabledClient`] |
/// | `"openai"` | [`OpenAiClient`] |
pub fn create_client(config: &LlmConfig) -> anyhow::Result<Arc<dyn LlmClient>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledClient)),
        "openai" => Ok(Arc::new(OpenAiClient::new(config)?)),
        other => bail!("Unknown LLM provider: {}", other),
    }
}
