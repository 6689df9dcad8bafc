use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::AdvisoryEndpoint;

pub const ROLE_SYSTEM: &str = "system";
pub const ROLE_USER: &str = "user";
pub const ROLE_ASSISTANT: &str = "assistant";

/// Set to `1` or `true` to let advisory requests go through the system proxy.
pub const SYSTEM_PROXY_ENV: &str = "PIDTUNE_ENABLE_SYSTEM_PROXY";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ROLE_SYSTEM.to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ROLE_USER.to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ROLE_ASSISTANT.to_string(),
            content: content.into(),
        }
    }
}

/// Text-generation service that turns a conversation into the next reply.
#[async_trait]
pub trait AdvisoryService: Send + Sync {
    async fn complete(&self, messages: &[Message]) -> Result<String>;
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI-compatible chat completions client (OpenAI, Ollama, vLLM, ...).
#[derive(Clone)]
pub struct LlmClient {
    api_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    client: reqwest::Client,
}

impl LlmClient {
    pub fn new(api_url: String, api_key: String, model: String) -> Self {
        Self {
            api_url: api_url.trim_end_matches('/').to_string(),
            api_key,
            model,
            temperature: 0.0,
            max_tokens: 200,
            client: reqwest::Client::new(),
        }
    }

    pub fn from_endpoint(
        endpoint: &AdvisoryEndpoint,
        model: &str,
        timeout: Duration,
    ) -> Result<Self> {
        let mut client = Self::new(
            endpoint.api_url.clone(),
            endpoint.api_key.clone(),
            model.to_string(),
        );
        let system_proxy = system_proxy_enabled(std::env::var(SYSTEM_PROXY_ENV).ok().as_deref());
        client.client = match advisory_http_client(timeout, system_proxy) {
            Ok(http) => http,
            Err(e) if system_proxy => {
                tracing::warn!("{:#}; retrying without the system proxy", e);
                advisory_http_client(timeout, false)?
            }
            Err(e) => return Err(e),
        };
        Ok(client)
    }

    pub fn with_sampling(mut self, temperature: f32, max_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Generate a completion using the OpenAI API format
    pub async fn generate(&self, messages: &[Message]) -> Result<String> {
        let url = format!("{}/chat/completions", self.api_url);

        let request = ChatCompletionRequest {
            model: &self.model,
            messages,
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
        };

        let mut req = self.client.post(&url).json(&request);

        // Local endpoints accept any key; skip the header when none is set.
        if !self.api_key.is_empty() {
            req = req.header("Authorization", format!("Bearer {}", self.api_key));
        }

        let response = req
            .send()
            .await
            .context("Failed to send advisory request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read body".to_string());
            anyhow::bail!("Advisory API returned error {}: {}", status, body);
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .context("Failed to parse advisory response")?;

        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| anyhow::anyhow!("No response from advisory model"))?;

        Ok(content.trim().to_string())
    }
}

#[async_trait]
impl AdvisoryService for LlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String> {
        self.generate(messages).await
    }
}

fn system_proxy_enabled(value: Option<&str>) -> bool {
    value
        .map(|v| v.trim() == "1" || v.trim().eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Every request carries the advisory timeout; proxies are bypassed unless
/// opted in.
fn advisory_http_client(timeout: Duration, system_proxy: bool) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder().timeout(timeout);
    if !system_proxy {
        builder = builder.no_proxy();
    }
    builder
        .build()
        .context("Failed to initialize advisory HTTP client")
}
