// Screening: resume parsing, job requirement extraction and two-phase matching.
// All LLM calls go through llm_client; no direct HTTP calls here.

use thiserror::Error;

use crate::llm_client::LlmError;
use crate::screening::models::FailureKind;
use crate::screening::prompts::PromptError;

pub mod handlers;
pub mod matcher;
pub mod models;
pub mod prompts;
pub mod requirements;
pub mod resume_parser;
pub mod schema;
pub mod text_extract;
pub mod validator;

#[derive(Debug, Error)]
pub enum ScreeningError {
    #[error("prompt configuration error: {0}")]
    Prompt(#[from] PromptError),

    #[error("model call failed: {0}")]
    Llm(#[from] LlmError),

    #[error("invalid model output: {0}")]
    Schema(String),

    #[error("not a resume: {0}")]
    NotAResume(String),

    #[error("storage error: {0:#}")]
    Storage(#[from] anyhow::Error),
}

impl ScreeningError {
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            ScreeningError::Prompt(_) => FailureKind::Configuration,
            ScreeningError::Llm(LlmError::Exhausted { .. }) => FailureKind::TransientExhausted,
            ScreeningError::Llm(e) if e.is_content_failure() => FailureKind::Content,
            ScreeningError::Llm(e) if e.is_transient() => FailureKind::TransientExhausted,
            ScreeningError::Llm(_) => FailureKind::Upstream,
            ScreeningError::Schema(_) => FailureKind::Content,
            ScreeningError::NotAResume(_) => FailureKind::Rejected,
            ScreeningError::Storage(_) => FailureKind::Storage,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_kinds() {
        let exhausted = ScreeningError::Llm(LlmError::Exhausted {
            attempts: 3,
            last: Box::new(LlmError::EmptyContent),
        });
        assert_eq!(exhausted.failure_kind(), FailureKind::TransientExhausted);

        let content = ScreeningError::Llm(LlmError::EmptyContent);
        assert_eq!(content.failure_kind(), FailureKind::Content);

        let upstream = ScreeningError::Llm(LlmError::Api {
            status: 401,
            message: "bad key".to_string(),
        });
        assert_eq!(upstream.failure_kind(), FailureKind::Upstream);

        let schema = ScreeningError::Schema("skills_points out of range".to_string());
        assert_eq!(schema.failure_kind(), FailureKind::Content);
    }
}
