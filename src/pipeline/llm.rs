//! Structuring oracle: send the extraction prompt to an LLM, get raw text back.
//!
//! The pipeline only depends on the [`StructuringOracle`] trait, so tests and
//! library users can plug in any implementation. [`LlmOracle`] is the
//! production one, built on an `edgequake_llm::LLMProvider`. The prompt
//! lives in [`crate::prompts`] and the reply is not interpreted here at all;
//! an empty reply is handed back as an empty string and rejected by the
//! normaliser.
//!
//! ## Retry Strategy
//!
//! `max_retries` (default 0) re-sends the same prompt after a provider error
//! or timeout, waiting `retry_backoff_ms * 2^attempt` between attempts.

use crate::config::ExtractionConfig;
use crate::prompts::DEFAULT_SYSTEM_PROMPT;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OracleError {
    #[error("provider error: {0}")]
    Provider(String),

    #[error("call timed out after {0}s")]
    Timeout(u64),
}

/// Turns a prompt into raw structured text.
#[async_trait]
pub trait StructuringOracle: Send + Sync {
    async fn structure(&self, prompt: &str) -> Result<String, OracleError>;
}

/// [`StructuringOracle`] backed by an LLM provider.
pub struct LlmOracle {
    provider: Arc<dyn LLMProvider>,
    system_prompt: String,
    temperature: f32,
    max_tokens: usize,
    max_retries: u32,
    retry_backoff_ms: u64,
    timeout_secs: u64,
}

impl LlmOracle {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &ExtractionConfig) -> Self {
        Self {
            provider,
            system_prompt: config
                .system_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_retries: config.max_retries,
            retry_backoff_ms: config.retry_backoff_ms,
            timeout_secs: config.api_timeout_secs,
        }
    }

    fn build_options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            ..Default::default()
        }
    }
}

#[async_trait]
impl StructuringOracle for LlmOracle {
    async fn structure(&self, prompt: &str) -> Result<String, OracleError> {
        let start = Instant::now();
        let messages = vec![
            ChatMessage::system(self.system_prompt.as_str()),
            ChatMessage::user(prompt),
        ];
        let options = self.build_options();

        let mut last_err = OracleError::Provider("no attempt made".to_string());

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let backoff = self.retry_backoff_ms * 2u64.pow(attempt - 1);
                warn!(
                    "Oracle retry {}/{} after {}ms",
                    attempt, self.max_retries, backoff
                );
                sleep(Duration::from_millis(backoff)).await;
            }

            let call = self.provider.chat(&messages, Some(&options));
            match timeout(Duration::from_secs(self.timeout_secs), call).await {
                Ok(Ok(response)) => {
                    debug!(
                        "Oracle reply: {} input tokens, {} output tokens, {:?}",
                        response.prompt_tokens,
                        response.completion_tokens,
                        start.elapsed()
                    );
                    return Ok(response.content);
                }
                Ok(Err(e)) => {
                    warn!("Oracle attempt {} failed: {}", attempt + 1, e);
                    last_err = OracleError::Provider(e.to_string());
                }
                Err(_) => {
                    warn!(
                        "Oracle attempt {} timed out after {}s",
                        attempt + 1,
                        self.timeout_secs
                    );
                    last_err = OracleError::Timeout(self.timeout_secs);
                }
            }
        }

        Err(last_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oracle_error_display() {
        assert_eq!(
            OracleError::Timeout(30).to_string(),
            "call timed out after 30s"
        );
        assert!(OracleError::Provider("401".into()).to_string().contains("401"));
    }

    #[tokio::test]
    async fn trait_objects_are_usable() {
        struct Echo;

        #[async_trait]
        impl StructuringOracle for Echo {
            async fn structure(&self, prompt: &str) -> Result<String, OracleError> {
                Ok(prompt.to_uppercase())
            }
        }

        let oracle: Arc<dyn StructuringOracle> = Arc::new(Echo);
        assert_eq!(oracle.structure("abc").await.unwrap(), "ABC");
    }
}
