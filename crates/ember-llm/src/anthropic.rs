//! Anthropic Messages API transport.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{CompletionRequest, CompletionResponse, CompletionTransport, TransportError, Usage};

/// Configuration for the Anthropic transport.
#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    /// Anthropic API key.
    pub api_key: String,
    /// Base URL for the API (defaults to `https://api.anthropic.com`).
    pub base_url: String,
    /// Model identifier.
    pub model: String,
    /// API version header value.
    pub api_version: String,
    /// Max tokens per response.
    pub max_tokens: u32,
}

impl AnthropicConfig {
    /// Create a new config with default base URL, version and token limit.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: "https://api.anthropic.com".to_string(),
            model: model.into(),
            api_version: "2023-06-01".to_string(),
            max_tokens: 4096,
        }
    }

    /// Set the base URL (useful for testing with mock servers).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the max tokens per response.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// Transport that performs one `POST /v1/messages` per call.
pub struct AnthropicTransport {
    http: Client,
    config: AnthropicConfig,
}

impl AnthropicTransport {
    /// Create a new transport.
    pub fn new(config: AnthropicConfig) -> Self {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(300))
            .build()
            .expect("failed to build HTTP client");

        Self { http, config }
    }
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: [RequestMessage<'a>; 1],
}

#[derive(Serialize)]
struct RequestMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: Usage,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

/// Anthropic error envelope: `{"type":"error","error":{"type":..,"message":..}}`.
#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(rename = "type")]
    kind: String,
    message: String,
}

#[async_trait]
impl CompletionTransport for AnthropicTransport {
    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, TransportError> {
        let url = format!("{}/v1/messages", self.config.base_url);

        let body = MessagesRequest {
            model: &self.config.model,
            max_tokens: self.config.max_tokens,
            system: &request.system_prompt,
            messages: [RequestMessage {
                role: "user",
                content: &request.user_prompt,
            }],
        };

        let response = self
            .http
            .post(&url)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", &self.config.api_version)
            .json(&body)
            .send()
            .await?;

        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok());
            return Err(TransportError::RateLimited { retry_after_secs });
        }

        if !status.is_success() {
            let text = response.text().await.map_err(|e| {
                TransportError::InvalidResponse(format!(
                    "request failed ({}): failed to read response: {}",
                    status, e
                ))
            })?;

            let (kind, message) = match serde_json::from_str::<ErrorEnvelope>(&text) {
                Ok(envelope) => (envelope.error.kind, envelope.error.message),
                Err(_) => ("unknown".to_string(), text),
            };
            return Err(TransportError::Api {
                status: status.as_u16(),
                kind,
                message,
            });
        }

        let parsed: MessagesResponse = response.json().await?;
        let content = parsed
            .content
            .into_iter()
            .find(|block| block.kind == "text")
            .and_then(|block| block.text)
            .unwrap_or_default();

        debug!(
            content_len = content.len(),
            input_tokens = parsed.usage.input_tokens,
            output_tokens = parsed.usage.output_tokens,
            "completion received"
        );

        Ok(CompletionResponse {
            content,
            usage: parsed.usage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> CompletionRequest {
        CompletionRequest {
            system_prompt: "You are a test.".to_string(),
            user_prompt: "Say hello.".to_string(),
        }
    }

    fn transport(server: &MockServer) -> AnthropicTransport {
        AnthropicTransport::new(
            AnthropicConfig::new("test-key", "test-model").with_base_url(server.uri()),
        )
    }

    #[tokio::test]
    async fn test_complete_success() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "test-key"))
            .and(header("anthropic-version", "2023-06-01"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "msg_1",
                "type": "message",
                "role": "assistant",
                "content": [{"type": "text", "text": "Hello there"}],
                "usage": {"input_tokens": 12, "output_tokens": 3}
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let response = transport(&mock_server).complete(&request()).await.unwrap();

        assert_eq!(
            response,
            CompletionResponse {
                content: "Hello there".to_string(),
                usage: Usage {
                    input_tokens: 12,
                    output_tokens: 3,
                },
            }
        );
    }

    #[tokio::test]
    async fn test_complete_without_text_block_is_empty() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "content": [{"type": "tool_use", "id": "t1", "name": "x", "input": {}}],
                "usage": {"input_tokens": 5, "output_tokens": 0}
            })))
            .mount(&mock_server)
            .await;

        let response = transport(&mock_server).complete(&request()).await.unwrap();
        assert_eq!(response.content, "");
        assert_eq!(response.usage.input_tokens, 5);
    }

    #[tokio::test]
    async fn test_max_tokens_is_sent() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(body_partial_json(serde_json::json!({"max_tokens": 512})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "content": [{"type": "text", "text": "ok"}],
                "usage": {"input_tokens": 1, "output_tokens": 1}
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let transport = AnthropicTransport::new(
            AnthropicConfig::new("test-key", "test-model")
                .with_base_url(mock_server.uri())
                .with_max_tokens(512),
        );
        let response = transport.complete(&request()).await.unwrap();
        assert_eq!(response.content, "ok");
    }

    #[tokio::test]
    async fn test_rate_limited() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "20"))
            .mount(&mock_server)
            .await;

        let err = transport(&mock_server)
            .complete(&request())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            TransportError::RateLimited {
                retry_after_secs: Some(20)
            }
        ));
        assert!(err.is_rate_limit());
    }

    #[tokio::test]
    async fn test_api_error_envelope() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(529).set_body_json(serde_json::json!({
                "type": "error",
                "error": {"type": "overloaded_error", "message": "Overloaded"}
            })))
            .mount(&mock_server)
            .await;

        let err = transport(&mock_server)
            .complete(&request())
            .await
            .unwrap_err();

        match err {
            TransportError::Api {
                status,
                kind,
                message,
            } => {
                assert_eq!(status, 529);
                assert_eq!(kind, "overloaded_error");
                assert_eq!(message, "Overloaded");
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }
}
