//! Ollama `/api/generate` client

use super::{GenerationError, Generator};
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

pub struct OllamaGenerator {
    client: Client,
    base_url: String,
    model: String,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
    #[serde(default)]
    done: bool,
}

impl OllamaGenerator {
    /// Create a client for a local Ollama server
    ///
    /// # Arguments
    /// * `base_url` - Base URL for Ollama API (default: http://127.0.0.1:11434)
    /// * `model` - Model name (e.g., "llama3.1:8b")
    pub fn new(
        base_url: &str,
        model: &str,
        temperature: f32,
        timeout: Duration,
    ) -> Result<Self, GenerationError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GenerationError::Unavailable(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            temperature,
        })
    }
}

impl Generator for OllamaGenerator {
    fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let url = format!("{}/api/generate", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(&json!({
                "model": self.model,
                "prompt": prompt,
                "stream": false,
                "options": { "temperature": self.temperature },
            }))
            .send()
            .map_err(|e| GenerationError::Unavailable(format!("Failed to connect to Ollama: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            if status.as_u16() == 404 {
                return Err(GenerationError::Api {
                    status: 404,
                    message: format!("Model '{}' not found", self.model),
                });
            }
            let message = response.text().unwrap_or_default();
            return Err(GenerationError::Api {
                status: status.as_u16(),
                message: message.trim().to_string(),
            });
        }

        let parsed: GenerateResponse = response
            .json()
            .map_err(|e| GenerationError::InvalidResponse(format!("Failed to parse response: {}", e)))?;

        if !parsed.done {
            tracing::warn!("Ollama returned an unfinished generation for {}", self.model);
        }

        Ok(parsed.response)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_parsing() {
        let raw = r#"{"model":"llama3.1:8b","created_at":"2024-01-01T00:00:00Z","response":"NOT FOUND","done":true,"eval_count":3}"#;
        let parsed: GenerateResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.response, "NOT FOUND");
        assert!(parsed.done);
    }

    #[test]
    fn test_unreachable_server() {
        let generator =
            OllamaGenerator::new("http://127.0.0.1:1", "llama3.1:8b", 0.0, Duration::from_secs(2))
                .unwrap();
        assert!(matches!(
            generator.generate("hello"),
            Err(GenerationError::Unavailable(_))
        ));
    }
}
