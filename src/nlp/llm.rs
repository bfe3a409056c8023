//! Minimal OpenAI-compatible chat-completions client shared by the classifier
//! and the delegated report extractor.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::config::{AiProvider, Settings};

const TEMPERATURE: f32 = 0.3;

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("no API key configured for {0}")]
    Unconfigured(String),

    #[error("request failed: {0}")]
    Transport(String),

    #[error("API call failed with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed completion: {0}")]
    Malformed(String),
}

/// Connection parameters for one provider.
#[derive(Debug, Clone)]
pub struct ChatEndpoint {
    pub provider: AiProvider,
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl ChatEndpoint {
    /// Endpoint for the provider selected in settings.
    pub fn from_settings(settings: &Settings) -> Self {
        let (base_url, model, api_key) = match settings.ai_provider {
            AiProvider::Aliyun => (
                settings.aliyun_base_url.clone(),
                settings.aliyun_model.clone(),
                settings.aliyun_api_key.clone(),
            ),
            AiProvider::Zhipu => (
                settings.zhipu_base_url.clone(),
                settings.zhipu_model.clone(),
                settings.zhipu_api_key.clone(),
            ),
            AiProvider::None => (String::new(), String::new(), None),
        };
        Self {
            provider: settings.ai_provider,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            timeout: Duration::from_secs(settings.ai_request_timeout_secs),
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

/// HTTP client bound to one chat endpoint.
#[derive(Debug, Clone)]
pub struct ChatClient {
    endpoint: ChatEndpoint,
    client: Client,
}

impl ChatClient {
    pub fn new(endpoint: ChatEndpoint) -> Result<Self, LlmError> {
        let client = Client::builder()
            .user_agent("labnorm/0.1")
            .timeout(endpoint.timeout)
            .gzip(true)
            .brotli(true)
            .build()
            .map_err(|e| LlmError::Transport(e.to_string()))?;
        Ok(Self { endpoint, client })
    }

    pub fn endpoint(&self) -> &ChatEndpoint {
        &self.endpoint
    }

    pub fn is_configured(&self) -> bool {
        self.endpoint.provider != AiProvider::None && self.endpoint.api_key.is_some()
    }

    /// Send a single user prompt and return the first choice's content.
    pub async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        let Some(api_key) = self.endpoint.api_key.as_deref() else {
            return Err(LlmError::Unconfigured(self.endpoint.provider.to_string()));
        };
        if self.endpoint.provider == AiProvider::None {
            return Err(LlmError::Unconfigured(self.endpoint.provider.to_string()));
        }

        let url = format!("{}/chat/completions", self.endpoint.base_url);
        let body = ChatRequest {
            model: &self.endpoint.model,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: TEMPERATURE,
        };
        debug!(%url, model = %self.endpoint.model, "sending chat completion");

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Transport(format!(
                        "timed out after {}s",
                        self.endpoint.timeout.as_secs()
                    ))
                } else {
                    LlmError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let payload: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Malformed(e.to_string()))?;
        payload
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| LlmError::Malformed("response has no choices".into()))
    }
}

/// Return the JSON payload of a completion, tolerating a surrounding
/// markdown code fence.
pub fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(start) = trimmed.find("```") else {
        return trimmed;
    };
    let after = &trimmed[start + 3..];
    let after = after.strip_prefix("json").unwrap_or(after);
    match after.find("```") {
        Some(end) => after[..end].trim(),
        None => after.trim(),
    }
}
