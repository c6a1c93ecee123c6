//! Language model adapters
//!
//! A [`Generator`] turns one prompt into raw text. It knows nothing about contracts or
//! response formats; parsing happens in the answer pipeline.

mod gemini;
mod ollama;

pub use gemini::GeminiGenerator;
pub use ollama::OllamaGenerator;

use crate::config::{LlmConfig, LlmProvider};
use crate::error::{ContractIqError, Result};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("Model service unreachable: {0}")]
    Unavailable(String),

    #[error("Model service error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Unexpected response: {0}")]
    InvalidResponse(String),

    #[error("Response blocked: {0}")]
    Blocked(String),
}

/// Prompt in, raw text out
pub trait Generator: Send + Sync {
    fn generate(&self, prompt: &str) -> std::result::Result<String, GenerationError>;

    fn model_name(&self) -> &str;
}

/// Build the configured generation backend
pub fn from_config(config: &LlmConfig) -> Result<Arc<dyn Generator>> {
    let timeout = Duration::from_secs(config.timeout_secs);
    let generator: Arc<dyn Generator> = match config.provider {
        LlmProvider::Gemini => {
            let api_key = std::env::var(&config.api_key_env).map_err(|_| {
                ContractIqError::Config(format!(
                    "Environment variable {} is not set",
                    config.api_key_env
                ))
            })?;
            Arc::new(
                GeminiGenerator::new(
                    config.gemini_base_url(),
                    &config.model,
                    &api_key,
                    config.temperature,
                    timeout,
                )
                .map_err(|e| ContractIqError::GenerationUnavailable(e.to_string()))?,
            )
        }
        LlmProvider::Ollama => Arc::new(
            OllamaGenerator::new(
                config.ollama_base_url(),
                &config.model,
                config.temperature,
                timeout,
            )
            .map_err(|e| ContractIqError::GenerationUnavailable(e.to_string()))?,
        ),
    };

    tracing::debug!("Generation backend ready: {}", generator.model_name());
    Ok(generator)
}
