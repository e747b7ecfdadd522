use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::LlmConfig;
use crate::models::chat::{ChatMessage, Role};

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Failed to reach LLM provider: {0}")]
    Network(String),

    #[error("LLM provider did not answer within {0:?}")]
    Timeout(Duration),

    #[error("LLM provider rejected credentials ({status})")]
    Unauthorized { status: u16 },

    #[error("LLM provider quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("LLM API error: {status} - {body}")]
    Upstream { status: u16, body: String },

    #[error("Malformed LLM response: {0}")]
    MalformedResponse(String),
}

/// Sends a rendered system prompt plus conversation history to a chat model
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn complete(
        &self,
        system_text: &str,
        history: &[ChatMessage],
    ) -> Result<String, ProviderError>;
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    max_tokens: usize,
    temperature: f32,
    stream: bool,
}

/// Provider payload carries role and content only
#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// OpenAI-compatible chat completions client (non-streaming)
#[derive(Clone)]
pub struct LlmService {
    client: Client,
    config: LlmConfig,
}

impl LlmService {
    pub fn new(config: LlmConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        info!(
            "LLM client ready: base_url={}, model={}, timeout={}s",
            config.base_url, config.model, config.timeout_seconds
        );

        Ok(Self { client, config })
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }

    /// Generate completion without streaming (wait for full response)
    pub async fn generate_chat(
        &self,
        system_text: &str,
        history: &[ChatMessage],
    ) -> Result<String, ProviderError> {
        debug!("Starting chat generation with {} history messages", history.len());

        let messages = std::iter::once(WireMessage {
            role: Role::System.as_str(),
            content: system_text,
        })
        .chain(history.iter().map(|m| WireMessage {
            role: m.role().as_str(),
            content: m.content(),
        }))
        .collect();

        let request = ChatCompletionRequest {
            model: &self.config.model,
            messages,
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            stream: false,
        };

        let started = Instant::now();
        let response = self
            .client
            .post(self.completions_url())
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("LLM API returned {}: {}", status, body);
            return Err(match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ProviderError::Unauthorized {
                    status: status.as_u16(),
                },
                StatusCode::TOO_MANY_REQUESTS => ProviderError::QuotaExceeded(body),
                _ => ProviderError::Upstream {
                    status: status.as_u16(),
                    body,
                },
            });
        }

        let chat_response: ChatCompletionResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout(Duration::from_secs(self.config.timeout_seconds))
            } else {
                ProviderError::MalformedResponse(format!("Failed to parse LLM response: {}", e))
            }
        })?;

        let content = chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ProviderError::MalformedResponse("No choices returned from LLM".to_string()))?;

        info!(
            "LLM completion took {}ms ({} chars)",
            started.elapsed().as_millis(),
            content.len()
        );
        Ok(content)
    }

    fn map_transport_error(&self, e: reqwest::Error) -> ProviderError {
        if e.is_timeout() {
            ProviderError::Timeout(Duration::from_secs(self.config.timeout_seconds))
        } else {
            ProviderError::Network(format!("Failed to call LLM API: {}", e))
        }
    }
}

#[async_trait]
impl LlmProvider for LlmService {
    async fn complete(
        &self,
        system_text: &str,
        history: &[ChatMessage],
    ) -> Result<String, ProviderError> {
        self.generate_chat(system_text, history).await
    }
}
