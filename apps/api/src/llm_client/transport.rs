//! HTTP transport for OpenAI-compatible chat completion endpoints.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::LlmError;

/// One prompt/system pair sent to the model.
#[derive(Debug, Clone, Copy)]
pub struct ChatRequest<'a> {
    pub system: &'a str,
    pub prompt: &'a str,
}

/// A single, un-retried round trip to the model. `LlmClient` layers the
/// deadline, retry policy and JSON decoding on top.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    fn model(&self) -> &str;

    async fn complete(&self, request: &ChatRequest<'_>) -> Result<String, LlmError>;
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    temperature: f32,
    response_format: ResponseFormat,
    messages: [Message<'a>; 2],
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

/// Chat completions over HTTPS with deterministic decoding:
/// temperature 0 and `response_format: json_object` on every request.
pub struct OpenAiTransport {
    client: Client,
    api_key: String,
    endpoint: String,
    model: String,
}

impl OpenAiTransport {
    pub fn new(api_key: String, base_url: &str, model: String) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            api_key,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            model,
        })
    }
}

#[async_trait]
impl ChatTransport for OpenAiTransport {
    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &ChatRequest<'_>) -> Result<String, LlmError> {
        let body = CompletionRequest {
            model: &self.model,
            temperature: 0.0,
            response_format: ResponseFormat {
                kind: "json_object",
            },
            messages: [
                Message {
                    role: "system",
                    content: request.system,
                },
                Message {
                    role: "user",
                    content: request.prompt,
                },
            ],
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();

        if !status.is_success() {
            let raw = response.text().await.unwrap_or_default();
            if status.as_u16() == 429 || status.is_server_error() {
                warn!("LLM API returned {}: {}", status, raw);
            }
            // Try to parse error message
            let message = serde_json::from_str::<ApiErrorEnvelope>(&raw)
                .map(|e| e.error.message)
                .unwrap_or(raw);
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let raw = response.text().await?;
        decode_completion(&raw)
    }
}

/// Pulls the message content out of a successful response body. A body that
/// is not a completion envelope is a content failure, not a transport one.
fn decode_completion(raw: &str) -> Result<String, LlmError> {
    let completion: CompletionResponse = serde_json::from_str(raw)?;

    if let Some(usage) = &completion.usage {
        debug!(
            "LLM call succeeded: prompt_tokens={}, completion_tokens={}",
            usage.prompt_tokens, usage.completion_tokens
        );
    }

    completion
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .filter(|content| !content.trim().is_empty())
        .ok_or(LlmError::EmptyContent)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body_pins_deterministic_decoding() {
        let body = CompletionRequest {
            model: "gpt-4o-mini",
            temperature: 0.0,
            response_format: ResponseFormat {
                kind: "json_object",
            },
            messages: [
                Message {
                    role: "system",
                    content: "sys",
                },
                Message {
                    role: "user",
                    content: "hi",
                },
            ],
        };

        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["temperature"], 0.0);
        assert_eq!(json["response_format"]["type"], "json_object");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "hi");
    }

    #[test]
    fn test_endpoint_joins_base_url() {
        let transport =
            OpenAiTransport::new("sk-test".into(), "https://api.openai.com/v1/", "m".into())
                .unwrap();
        assert_eq!(
            transport.endpoint,
            "https://api.openai.com/v1/chat/completions"
        );
    }

    #[test]
    fn test_completion_response_deserializes() {
        let json = r#"{
            "choices": [{"message": {"role": "assistant", "content": "{\"a\": 1}"}}],
            "usage": {"prompt_tokens": 12, "completion_tokens": 5, "total_tokens": 17}
        }"#;
        let parsed: CompletionResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.choices[0].message.content.as_deref(), Some("{\"a\": 1}"));
        assert_eq!(parsed.usage.unwrap().completion_tokens, 5);
    }

    #[test]
    fn test_decode_completion_returns_content() {
        let raw = r#"{"choices": [{"message": {"content": "{\"ok\": true}"}}]}"#;
        assert_eq!(decode_completion(raw).unwrap(), "{\"ok\": true}");
    }

    #[test]
    fn test_malformed_envelope_is_not_retried() {
        for raw in ["<html>gateway</html>", r#"{"choices": "nope"}"#] {
            let err = decode_completion(raw).unwrap_err();
            assert!(matches!(err, LlmError::Parse(_)));
            assert!(!err.is_transient());
            assert!(err.is_content_failure());
        }
    }

    #[test]
    fn test_blank_content_is_empty() {
        let raw = r#"{"choices": [{"message": {"content": "  "}}]}"#;
        assert!(matches!(decode_completion(raw), Err(LlmError::EmptyContent)));
    }
}
