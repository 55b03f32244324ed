//! Ollabot LLM Providers
//!
//! Chat message model plus the Ollama `/api/chat` and `/api/tags` client

use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize, Serializer};
use std::sync::Arc;
use std::time::Duration;

const ERROR_BODY_MAX_CHARS: usize = 600;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// Raw image bytes attached to a user message. Cloning shares the buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageBlob {
    bytes: Arc<Vec<u8>>,
    mime_type: Option<String>,
}

impl ImageBlob {
    pub fn new(bytes: Vec<u8>, mime_type: Option<String>) -> Self {
        Self {
            bytes: Arc::new(bytes),
            mime_type,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn mime_type(&self) -> Option<&str> {
        self.mime_type.as_deref()
    }

    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(self.bytes.as_slice())
    }
}

impl Serialize for ImageBlob {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base64())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<ImageBlob>>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            images: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            images: None,
        }
    }

    pub fn user_with_images(content: impl Into<String>, images: Vec<ImageBlob>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            images: Some(images),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            images: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatResponse {
    pub content: String,
    pub model: String,
    pub done_reason: Option<String>,
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    #[error("backend HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("backend response malformed: {0}")]
    Decode(String),
}

impl BackendError {
    /// Short category safe to show to chat users. Carries no host, URL or body.
    pub fn summary(&self) -> String {
        match self {
            BackendError::Unavailable(_) => "backend unavailable".to_string(),
            BackendError::Http { status, .. } => format!("HTTP {}", status),
            BackendError::Decode(_) => "malformed backend response".to_string(),
        }
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        let err = err.without_url();
        if err.is_decode() {
            BackendError::Decode(err.to_string())
        } else {
            BackendError::Unavailable(err.to_string())
        }
    }
}

#[async_trait::async_trait]
pub trait Backend: Send + Sync {
    fn name(&self) -> &str;
    async fn chat(
        &self,
        model: &str,
        messages: &[ChatMessage],
    ) -> Result<ChatResponse, BackendError>;
    /// Model names in catalog order.
    async fn list_models(&self) -> Result<Vec<String>, BackendError>;
    async fn health_check(&self) -> Result<bool, BackendError>;
}

pub struct OllamaProvider {
    client: Client,
    base_url: String,
}

impl OllamaProvider {
    pub fn new(base_url: &str, request_timeout: Option<Duration>) -> Result<Self, BackendError> {
        let mut builder = Client::builder().connect_timeout(Duration::from_secs(30));
        if let Some(timeout) = request_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| BackendError::Unavailable(format!("http client init failed: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn truncate_for_error(text: &str, max_chars: usize) -> String {
        if text.chars().count() <= max_chars {
            text.to_string()
        } else {
            let truncated: String = text.chars().take(max_chars).collect();
            format!("{}...", truncated)
        }
    }

    fn build_chat_body(model: &str, messages: &[ChatMessage]) -> serde_json::Value {
        serde_json::json!({
            "model": model,
            "messages": messages,
            "stream": false,
        })
    }

    fn parse_chat_response(
        value: &serde_json::Value,
        requested_model: &str,
    ) -> Result<ChatResponse, BackendError> {
        if let Some(error) = value.get("error").and_then(|v| v.as_str()) {
            return Err(BackendError::Decode(format!("error field: {}", error)));
        }

        let content = value
            .get("message")
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .ok_or_else(|| BackendError::Decode("missing 'message.content'".to_string()))?
            .to_string();

        let model = value
            .get("model")
            .and_then(|v| v.as_str())
            .unwrap_or(requested_model)
            .to_string();

        let done_reason = value
            .get("done_reason")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());

        let prompt_tokens = value.get("prompt_eval_count").and_then(|v| v.as_u64());
        let completion_tokens = value.get("eval_count").and_then(|v| v.as_u64());
        let usage = match (prompt_tokens, completion_tokens) {
            (None, None) => None,
            (p, c) => Some(Usage {
                prompt_tokens: p.unwrap_or(0),
                completion_tokens: c.unwrap_or(0),
            }),
        };

        Ok(ChatResponse {
            content,
            model,
            done_reason,
            usage,
        })
    }

    fn parse_tags_response(value: &serde_json::Value) -> Result<Vec<String>, BackendError> {
        let models = value
            .get("models")
            .and_then(|v| v.as_array())
            .ok_or_else(|| BackendError::Decode("missing 'models' array".to_string()))?;

        Ok(models
            .iter()
            .filter_map(|entry| entry.as_object())
            .filter_map(|entry| entry.get("name").and_then(|n| n.as_str()))
            .map(|name| name.to_string())
            .collect())
    }

    async fn read_json(response: reqwest::Response) -> Result<serde_json::Value, BackendError> {
        let status = response.status();
        let raw_body = response.text().await?;

        if !status.is_success() {
            return Err(BackendError::Http {
                status: status.as_u16(),
                body: Self::truncate_for_error(&raw_body, ERROR_BODY_MAX_CHARS),
            });
        }

        serde_json::from_str(&raw_body).map_err(|e| BackendError::Decode(e.to_string()))
    }
}

#[async_trait::async_trait]
impl Backend for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn chat(
        &self,
        model: &str,
        messages: &[ChatMessage],
    ) -> Result<ChatResponse, BackendError> {
        let url = format!("{}/api/chat", self.base_url);
        let images = messages
            .iter()
            .filter_map(|m| m.images.as_ref())
            .map(Vec::len)
            .sum::<usize>();
        tracing::debug!(
            model = %model,
            messages = messages.len(),
            images = images,
            "Sending chat request"
        );

        let response = self
            .client
            .post(&url)
            .json(&Self::build_chat_body(model, messages))
            .send()
            .await?;
        let value = Self::read_json(response).await?;
        let parsed = Self::parse_chat_response(&value, model)?;

        if let Some(usage) = parsed.usage {
            tracing::debug!(
                model = %parsed.model,
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "Chat response received"
            );
        }
        Ok(parsed)
    }

    async fn list_models(&self) -> Result<Vec<String>, BackendError> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self.client.get(&url).send().await?;
        let value = Self::read_json(response).await?;
        Self::parse_tags_response(&value)
    }

    async fn health_check(&self) -> Result<bool, BackendError> {
        let url = format!("{}/api/tags", self.base_url);
        match self.client.get(&url).send().await {
            Ok(resp) => Ok(resp.status().is_success()),
            Err(_) => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_body_encodes_images_as_base64() {
        let messages = vec![
            ChatMessage::system("be brief"),
            ChatMessage::user_with_images(
                "Describe the image.",
                vec![ImageBlob::new(b"png!".to_vec(), Some("image/png".to_string()))],
            ),
        ];
        let body = OllamaProvider::build_chat_body("gemma3:4b", &messages);
        assert_eq!(body["model"], "gemma3:4b");
        assert_eq!(body["stream"], false);
        assert_eq!(body["messages"][0]["role"], "system");
        assert!(body["messages"][0].get("images").is_none());
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["messages"][1]["images"][0], "cG5nIQ==");
    }

    #[test]
    fn parse_chat_response_reads_content_and_usage() {
        let value = serde_json::json!({
            "model": "qwen3:4b",
            "message": { "role": "assistant", "content": "<think>x</think>hi" },
            "done": true,
            "done_reason": "stop",
            "prompt_eval_count": 12,
            "eval_count": 3
        });
        let parsed =
            OllamaProvider::parse_chat_response(&value, "fallback").expect("parse success");
        assert_eq!(parsed.content, "<think>x</think>hi");
        assert_eq!(parsed.model, "qwen3:4b");
        assert_eq!(parsed.done_reason.as_deref(), Some("stop"));
        assert_eq!(
            parsed.usage,
            Some(Usage {
                prompt_tokens: 12,
                completion_tokens: 3
            })
        );
    }

    #[test]
    fn parse_chat_response_errors_without_message() {
        let value = serde_json::json!({ "model": "qwen3:4b", "done": true });
        let err = OllamaProvider::parse_chat_response(&value, "qwen3:4b")
            .expect_err("missing message");
        assert!(matches!(err, BackendError::Decode(_)));
    }

    #[test]
    fn parse_chat_response_surfaces_error_field() {
        let value = serde_json::json!({ "error": "model 'nope' not found" });
        let err = OllamaProvider::parse_chat_response(&value, "nope").expect_err("error field");
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn parse_tags_skips_malformed_entries() {
        let value = serde_json::json!({
            "models": [
                { "name": "qwen3:4b", "size": 1 },
                "garbage",
                { "model": "no-name" },
                { "name": "gemma3:4b" }
            ]
        });
        let names = OllamaProvider::parse_tags_response(&value).expect("parse tags");
        assert_eq!(names, vec!["qwen3:4b", "gemma3:4b"]);
    }

    #[test]
    fn parse_tags_requires_models_array() {
        let err = OllamaProvider::parse_tags_response(&serde_json::json!({ "tags": [] }))
            .expect_err("missing models");
        assert!(matches!(err, BackendError::Decode(_)));
    }

    #[test]
    fn summary_hides_error_details() {
        let unavailable = BackendError::Unavailable(
            "error sending request for url (http://10.0.0.5:11434/api/chat)".to_string(),
        );
        assert_eq!(unavailable.summary(), "backend unavailable");
        assert!(unavailable.to_string().contains("http://"));

        let http = BackendError::Http {
            status: 404,
            body: "{\"error\":\"model 'x' not found\"}".to_string(),
        };
        assert_eq!(http.summary(), "HTTP 404");

        let decode = BackendError::Decode("expected value at line 1".to_string());
        assert_eq!(decode.summary(), "malformed backend response");
    }

    #[tokio::test]
    async fn transport_errors_carry_no_url() {
        let provider = OllamaProvider::new("http://127.0.0.1:9", Some(Duration::from_secs(5)))
            .expect("client builds");
        let err = provider
            .list_models()
            .await
            .expect_err("nothing listens on the discard port");
        assert!(matches!(err, BackendError::Unavailable(_)));
        assert!(!err.to_string().contains("127.0.0.1"));
    }

    #[test]
    fn provider_trims_trailing_slash() {
        let provider =
            OllamaProvider::new("http://localhost:11434/", None).expect("client builds");
        assert_eq!(provider.base_url(), "http://localhost:11434");
        assert_eq!(provider.name(), "ollama");
    }

    #[test]
    fn truncate_for_error_caps_long_bodies() {
        let body = "x".repeat(700);
        let out = OllamaProvider::truncate_for_error(&body, ERROR_BODY_MAX_CHARS);
        assert_eq!(out.chars().count(), ERROR_BODY_MAX_CHARS + 3);
        assert!(out.ends_with("..."));
    }
}
