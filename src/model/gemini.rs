//! Gemini `generateContent` over REST.
//!
//! Authentication uses `GEMINI_API_KEY` or `GOOGLE_API_KEY`, passed as the
//! `key` query parameter.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{GenerativeModel, ModelError};

pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";
const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const MAX_RETRIES: u32 = 2;

/// Gemini REST client.
#[derive(Debug, Clone)]
pub struct GeminiModel {
    model: String,
    api_key: String,
    client: reqwest::Client,
}

impl GeminiModel {
    pub fn new(model: impl Into<String>, api_key: impl Into<String>) -> Result<Self, ModelError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;
        Ok(Self {
            model: model.into(),
            api_key: api_key.into(),
            client,
        })
    }

    /// Build from the environment. `Ok(None)` when no key is set.
    pub fn from_env(model: Option<String>) -> Result<Option<Self>, ModelError> {
        let key = std::env::var("GEMINI_API_KEY")
            .ok()
            .or_else(|| std::env::var("GOOGLE_API_KEY").ok())
            .filter(|k| !k.is_empty());
        match key {
            Some(key) => {
                let model = model.unwrap_or_else(|| DEFAULT_MODEL.to_string());
                Self::new(model, key).map(Some)
            }
            None => Ok(None),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/{}:generateContent", API_BASE, self.model)
    }

    fn request_body(prompt: &str) -> Value {
        json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }]
        })
    }

    /// Concatenate the text parts of the first candidate.
    fn extract_text(response: &Value) -> Result<String, ModelError> {
        if let Some(error) = response.get("error") {
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("Unknown Gemini API error");
            return Err(ModelError::Api {
                status: error.get("code").and_then(Value::as_u64).unwrap_or(0) as u16,
                message: message.to_string(),
            });
        }

        let parts = response
            .get("candidates")
            .and_then(Value::as_array)
            .and_then(|c| c.first())
            .and_then(|c| c.get("content"))
            .and_then(|c| c.get("parts"))
            .and_then(Value::as_array)
            .ok_or_else(|| ModelError::MalformedResponse("no candidates in Gemini response".into()))?;

        let text: String = parts
            .iter()
            .filter_map(|p| p.get("text").and_then(Value::as_str))
            .collect();
        Ok(text)
    }
}

#[async_trait]
impl GenerativeModel for GeminiModel {
    async fn generate_content(&self, prompt: &str) -> Result<String, ModelError> {
        log::debug!("gemini generate_content: model={}, prompt_len={}", self.model, prompt.len());

        let body = Self::request_body(prompt);
        let endpoint = self.endpoint();
        let mut last_error = ModelError::Request("no attempt made".into());
        let mut retry_delay = Duration::from_secs(1);

        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                log::warn!("Gemini API retry attempt {} after {:?}", attempt, retry_delay);
                tokio::time::sleep(retry_delay).await;
                retry_delay *= 2;
            }

            let response = match self
                .client
                .post(&endpoint)
                .query(&[("key", self.api_key.as_str())])
                .json(&body)
                .send()
                .await
            {
                Ok(resp) => resp,
                Err(e) => {
                    last_error = e.into();
                    continue;
                }
            };

            let status = response.status();
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                last_error = ModelError::RateLimited;
                continue;
            }
            if status.is_server_error() {
                last_error = ModelError::Api {
                    status: status.as_u16(),
                    message: "server error".into(),
                };
                continue;
            }

            let text = response.text().await?;
            if status.is_client_error() {
                return Err(ModelError::Api {
                    status: status.as_u16(),
                    message: text,
                });
            }

            let json: Value = serde_json::from_str(&text).map_err(|e| {
                ModelError::MalformedResponse(format!(
                    "{} - Body: {}",
                    e,
                    &text[..text.len().min(500)]
                ))
            })?;
            return Self::extract_text(&json);
        }

        Err(last_error)
    }

    fn name(&self) -> &str {
        &self.model
    }
}
