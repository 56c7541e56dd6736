use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result};

/// Application configuration loaded from environment variables.
/// Startup fails if required variables are missing or malformed.
#[derive(Debug, Clone)]
pub struct Config {
    pub openai_api_key: String,
    pub openai_base_url: String,
    pub openai_model: String,
    pub data_dir: PathBuf,
    pub port: u16,
    pub rust_log: String,
    pub max_concurrent_requests: usize,
    pub llm_timeout_secs: u64,
    pub llm_max_attempts: u32,
    pub llm_retry_base_ms: u64,
    pub review_confidence_threshold: u8,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let review_confidence_threshold = env_or("REVIEW_CONFIDENCE_THRESHOLD", 60u8)?;
        anyhow::ensure!(
            review_confidence_threshold <= 100,
            "REVIEW_CONFIDENCE_THRESHOLD must be between 0 and 100"
        );

        Ok(Config {
            openai_api_key: require_env("OPENAI_API_KEY")?,
            openai_base_url: std::env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            openai_model: std::env::var("OPENAI_MODEL")
                .unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            data_dir: PathBuf::from(std::env::var("DATA_DIR").unwrap_or_else(|_| "data".to_string())),
            port: env_or("PORT", 8080)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            max_concurrent_requests: env_or("MAX_CONCURRENT_REQUESTS", 4)?,
            llm_timeout_secs: env_or("LLM_TIMEOUT_SECS", 60)?,
            llm_max_attempts: env_or("LLM_MAX_ATTEMPTS", 3)?,
            llm_retry_base_ms: env_or("LLM_RETRY_BASE_MS", 1000)?,
            review_confidence_threshold,
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} has an invalid value '{raw}'")),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_or_parses_and_defaults() {
        std::env::set_var("SCREENER_TEST_PORT", " 9090 ");
        assert_eq!(env_or::<u16>("SCREENER_TEST_PORT", 8080).unwrap(), 9090);
        assert_eq!(env_or::<u16>("SCREENER_TEST_UNSET", 8080).unwrap(), 8080);
    }

    #[test]
    fn test_env_or_names_the_variable_on_error() {
        std::env::set_var("SCREENER_TEST_WORKERS", "many");
        let err = env_or::<usize>("SCREENER_TEST_WORKERS", 4).unwrap_err();
        assert!(err.to_string().contains("SCREENER_TEST_WORKERS"));
    }
}
