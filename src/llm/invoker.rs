//! OpenAI-compatible chat-completions client behind the `ModelInvoker` trait.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

use crate::error::LlmError;

/// Environment variable holding the API key.
pub const API_KEY_ENV: &str = "INSIGHT_FORGE_API_KEY";
/// Environment variable holding the API base URL.
pub const API_BASE_ENV: &str = "INSIGHT_FORGE_API_BASE";
/// Default API base when none is configured.
pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

/// A message in a conversation with an LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Role of the message sender ("system", "user", "assistant").
    pub role: String,
    /// Content of the message.
    pub content: String,
}

impl Message {
    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Request for text generation from an LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Model identifier to use for generation.
    pub model: String,
    /// Conversation messages.
    pub messages: Vec<Message>,
    /// Sampling temperature (0.0 - 2.0).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Maximum number of tokens to generate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl GenerationRequest {
    /// Create a new generation request with default parameters.
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: None,
            max_tokens: None,
        }
    }

    /// Set the temperature for this request.
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set the max tokens for this request.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Response from an LLM generation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationResponse {
    /// Unique identifier for this response.
    #[serde(default)]
    pub id: String,
    /// Model that generated this response.
    #[serde(default)]
    pub model: String,
    /// Generated choices/completions.
    pub choices: Vec<Choice>,
    /// Token usage statistics.
    #[serde(default)]
    pub usage: Usage,
}

impl GenerationResponse {
    /// Get the content of the first choice, if available.
    pub fn first_content(&self) -> Option<&str> {
        self.choices.first().map(|c| c.message.content.as_str())
    }
}

/// A single generated choice from the LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    /// Index of this choice in the response.
    #[serde(default)]
    pub index: u32,
    /// Generated message.
    pub message: Message,
    /// Reason the generation stopped (e.g. "stop", "length").
    #[serde(default)]
    pub finish_reason: String,
}

/// Token usage statistics for a generation request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

/// Role contract for the external model collaborator:
/// accept structured input, return role-conformant output.
#[async_trait]
pub trait ModelInvoker: Send + Sync {
    /// Submits a generation request and returns the raw response.
    async fn invoke(&self, request: GenerationRequest) -> Result<GenerationResponse, LlmError>;
}

/// HTTP client for OpenAI-compatible chat-completions endpoints.
pub struct HttpInvoker {
    client: Client,
    api_base: String,
    api_key: String,
}

impl std::fmt::Debug for HttpInvoker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpInvoker")
            .field("api_base", &self.api_base)
            .finish_non_exhaustive()
    }
}

impl HttpInvoker {
    /// Creates a new invoker against the given endpoint.
    pub fn new(api_key: impl Into<String>, api_base: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .unwrap_or_default();
        Self {
            client,
            api_base: api_base.into(),
            api_key: api_key.into(),
        }
    }

    /// Creates an invoker from `INSIGHT_FORGE_API_KEY` / `INSIGHT_FORGE_API_BASE`.
    pub fn from_env() -> Result<Self, LlmError> {
        let api_key = env::var(API_KEY_ENV).map_err(|_| LlmError::MissingApiKey)?;
        let api_base = env::var(API_BASE_ENV).unwrap_or_else(|_| DEFAULT_API_BASE.to_string());
        Ok(Self::new(api_key, api_base))
    }
}

#[async_trait]
impl ModelInvoker for HttpInvoker {
    async fn invoke(&self, request: GenerationRequest) -> Result<GenerationResponse, LlmError> {
        let url = format!("{}/chat/completions", self.api_base.trim_end_matches('/'));

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(LlmError::ApiError {
                code: status.as_u16(),
                message,
            });
        }

        response
            .json::<GenerationResponse>()
            .await
            .map_err(|e| LlmError::Parse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serializes_without_absent_options() {
        let request = GenerationRequest::new("gpt-4o-mini", vec![Message::user("hi")]);
        let json = serde_json::to_string(&request).expect("serialize");
        assert!(!json.contains("temperature"));
        assert!(!json.contains("max_tokens"));
    }

    #[test]
    fn response_first_content() {
        let response = GenerationResponse {
            id: "r1".to_string(),
            model: "m".to_string(),
            choices: vec![Choice {
                index: 0,
                message: Message::assistant("{\"ok\": true}"),
                finish_reason: "stop".to_string(),
            }],
            usage: Usage::default(),
        };
        assert_eq!(response.first_content(), Some("{\"ok\": true}"));
    }
}
