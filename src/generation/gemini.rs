//! Google Gemini `generateContent` client

use super::{GenerationError, Generator};
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

pub struct GeminiGenerator {
    client: Client,
    base_url: String,
    model: String,
    api_key: String,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

impl GeminiGenerator {
    /// Create a client for `model` (e.g. `gemini-2.5-flash`)
    pub fn new(
        base_url: &str,
        model: &str,
        api_key: &str,
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
            api_key: api_key.to_string(),
            temperature,
        })
    }
}

impl Generator for GeminiGenerator {
    fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        );

        let body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": { "temperature": self.temperature },
        });

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .map_err(|e| GenerationError::Unavailable(format!("Failed to connect to Gemini: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().unwrap_or_default();
            return Err(GenerationError::Api {
                status: status.as_u16(),
                message: message.trim().to_string(),
            });
        }

        let parsed: GenerateResponse = response
            .json()
            .map_err(|e| GenerationError::InvalidResponse(format!("Failed to parse response: {}", e)))?;

        extract_text(parsed)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Concatenated text parts of the first candidate
fn extract_text(response: GenerateResponse) -> Result<String, GenerationError> {
    let block_reason = response
        .prompt_feedback
        .and_then(|feedback| feedback.block_reason);

    let Some(candidate) = response.candidates.into_iter().next() else {
        return Err(match block_reason {
            Some(reason) => GenerationError::Blocked(reason),
            None => GenerationError::InvalidResponse("No candidates returned".to_string()),
        });
    };

    let text: String = candidate
        .content
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect()
        })
        .unwrap_or_default();

    if text.is_empty() {
        if let Some(reason) = candidate.finish_reason.filter(|r| r != "STOP") {
            return Err(GenerationError::Blocked(reason));
        }
    }

    Ok(text)
}
