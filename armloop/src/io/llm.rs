//! Chat-completion client abstraction for the planner and critic.
//!
//! [`HttpChatClient`] speaks the OpenAI-compatible `chat/completions` protocol
//! with JSON-object responses. It is constructed once from validated config and
//! passed explicitly to the services that need it.

use std::env;
use std::fmt;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde_json::{Value, json};
use tracing::{debug, instrument, warn};

use crate::io::config::LlmConfig;

/// Failure calling an external language-model service.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    #[error("request failed: {0}")]
    Transport(String),
    #[error("request timed out after {0}s")]
    Timeout(u64),
    #[error("service returned http {0}")]
    Status(u16),
    #[error("service response has no message content")]
    EmptyResponse,
    #[error("prompt rendering failed: {0}")]
    Prompt(String),
}

/// One system + user exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest<'a> {
    pub system: &'a str,
    pub user: &'a str,
    pub temperature: Option<f64>,
}

/// Abstraction over chat-completion backends.
pub trait ChatClient {
    /// Send the request and return the raw message content (expected to be JSON).
    fn complete(&self, request: &ChatRequest<'_>) -> Result<String, ServiceError>;
}

/// Blocking OpenAI-compatible HTTP client.
#[derive(Clone)]
pub struct HttpChatClient {
    client: reqwest::blocking::Client,
    endpoint: String,
    model: String,
    api_key: String,
    timeout_secs: u64,
}

impl fmt::Debug for HttpChatClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpChatClient")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("api_key", &"<redacted>")
            .field("timeout_secs", &self.timeout_secs)
            .finish_non_exhaustive()
    }
}

impl HttpChatClient {
    /// Build a client, reading the API key from the configured environment variable.
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let api_key = env::var(&config.api_key_env)
            .map_err(|_| anyhow!("missing api key: set {}", config.api_key_env))?;
        Self::new(config, api_key.trim().to_string())
    }

    pub fn new(config: &LlmConfig, api_key: String) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("build http client")?;
        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            api_key,
            timeout_secs: config.timeout_secs,
        })
    }

    fn request_body(&self, request: &ChatRequest<'_>) -> Value {
        let mut body = json!({
            "model": self.model,
            "response_format": { "type": "json_object" },
            "messages": [
                { "role": "system", "content": request.system },
                { "role": "user", "content": request.user },
            ],
        });
        if let Some(temperature) = request.temperature {
            body["temperature"] = json!(temperature);
        }
        body
    }
}

impl ChatClient for HttpChatClient {
    #[instrument(skip_all, fields(model = %self.model))]
    fn complete(&self, request: &ChatRequest<'_>) -> Result<String, ServiceError> {
        debug!(endpoint = %self.endpoint, "sending chat completion");
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&self.request_body(request))
            .send()
            .map_err(|err| {
                if err.is_timeout() {
                    ServiceError::Timeout(self.timeout_secs)
                } else {
                    ServiceError::Transport(err.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), "chat completion failed");
            return Err(ServiceError::Status(status.as_u16()));
        }

        let body: Value = response
            .json()
            .map_err(|err| ServiceError::Transport(format!("decode response: {err}")))?;
        extract_content(&body)
    }
}

/// Pull `choices[0].message.content` out of a chat-completion response.
pub fn extract_content(body: &Value) -> Result<String, ServiceError> {
    body.get("choices")
        .and_then(|choices| choices.get(0))
        .and_then(|choice| choice.get("message"))
        .and_then(|message| message.get("content"))
        .and_then(Value::as_str)
        .filter(|content| !content.trim().is_empty())
        .map(str::to_string)
        .ok_or(ServiceError::EmptyResponse)
}
