/// LLM Client: the single point of entry for all model calls in the screener.
///
/// ARCHITECTURAL RULE: No other module may talk to the model API directly.
/// Every call goes through `LlmClient`, which owns decoding parameters,
/// the per-call deadline, the retry policy and JSON decoding.
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::warn;

pub mod prompts;
pub mod retry;
#[cfg(test)]
pub mod testing;
pub mod transport;

pub use retry::RetryPolicy;
pub use transport::{ChatRequest, ChatTransport, OpenAiTransport};

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("LLM call exceeded its {}s deadline", .0.as_secs())]
    Timeout(Duration),

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("LLM returned empty content")]
    EmptyContent,

    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: Box<LlmError> },
}

impl LlmError {
    /// Rate limits, 5xx responses, transport failures and deadline expiry.
    pub fn is_transient(&self) -> bool {
        match self {
            LlmError::Http(_) | LlmError::Timeout(_) => true,
            LlmError::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// The model answered, but not with a usable JSON document.
    pub fn is_content_failure(&self) -> bool {
        matches!(self, LlmError::Parse(_) | LlmError::EmptyContent)
    }
}

/// The single LLM client shared by every screening operation.
#[derive(Clone)]
pub struct LlmClient {
    transport: Arc<dyn ChatTransport>,
    retry: RetryPolicy,
    call_timeout: Duration,
}

impl LlmClient {
    pub fn new(transport: Arc<dyn ChatTransport>, retry: RetryPolicy, call_timeout: Duration) -> Self {
        Self {
            transport,
            retry,
            call_timeout,
        }
    }

    pub fn model(&self) -> &str {
        self.transport.model()
    }

    /// Makes a call to the model and returns the raw text payload.
    /// Transient failures are retried under the client's `RetryPolicy`;
    /// everything else is returned on first occurrence.
    pub async fn call(&self, prompt: &str, system: &str) -> Result<String, LlmError> {
        let request = ChatRequest { system, prompt };
        let mut attempt = 0;

        loop {
            attempt += 1;

            let outcome =
                match tokio::time::timeout(self.call_timeout, self.transport.complete(&request))
                    .await
                {
                    Ok(outcome) => outcome,
                    Err(_) => Err(LlmError::Timeout(self.call_timeout)),
                };

            let err = match outcome {
                Ok(text) => return Ok(text),
                Err(err) => err,
            };

            if !err.is_transient() {
                return Err(err);
            }

            if attempt >= self.retry.max_attempts {
                return Err(LlmError::Exhausted {
                    attempts: attempt,
                    last: Box::new(err),
                });
            }

            let delay = self.retry.delay_for(attempt);
            warn!(
                "LLM call attempt {} failed ({}), retrying after {}ms...",
                attempt,
                err,
                delay.as_millis()
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// Calls the model and deserializes the text response as JSON.
    /// A response that does not parse is a content failure and is never retried.
    pub async fn call_json<T: DeserializeOwned>(
        &self,
        prompt: &str,
        system: &str,
    ) -> Result<T, LlmError> {
        let text = self.call(prompt, system).await?;

        // Strip markdown code fences if the model wraps JSON in them
        let text = strip_json_fences(&text);
        if text.is_empty() {
            return Err(LlmError::EmptyContent);
        }

        serde_json::from_str(text).map_err(LlmError::Parse)
    }
}

/// Strips ```json ... ``` or ``` ... ``` code fences from LLM output.
fn strip_json_fences(text: &str) -> &str {
    let text = text.trim();
    if let Some(stripped) = text.strip_prefix("```json") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else if let Some(stripped) = text.strip_prefix("```") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else {
        text
    }
}
