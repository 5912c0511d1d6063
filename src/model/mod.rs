//! # Generative Model
//!
//! The narrative pass of the insight engine talks to an opaque text
//! completion service through [`GenerativeModel`]. The crate ships a Gemini
//! REST implementation; anything else plugs in behind the same trait.

pub mod gemini;

use async_trait::async_trait;
use thiserror::Error;

pub use gemini::GeminiModel;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model not configured: {0}")]
    NotConfigured(String),

    #[error("request failed: {0}")]
    Request(String),

    #[error("rate limited")]
    RateLimited,

    #[error("api error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl From<reqwest::Error> for ModelError {
    fn from(e: reqwest::Error) -> Self {
        ModelError::Request(e.to_string())
    }
}

/// Text completion: one prompt in, one text out.
#[async_trait]
pub trait GenerativeModel: Send + Sync {
    async fn generate_content(&self, prompt: &str) -> Result<String, ModelError>;

    /// Model identifier, used in logs.
    fn name(&self) -> &str;
}
