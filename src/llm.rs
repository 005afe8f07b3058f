//! Client for the hosted language model (Google Gemini `generateContent`).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("quota exceeded (429): {message}")]
    QuotaExceeded {
        message: String,
        retry_after: Option<Duration>,
    },

    #[error("model API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("model request failed: {0}")]
    Request(String),

    #[error("invalid response format from model: {0}")]
    InvalidResponse(String),
}

impl ModelError {
    /// Whether the remote service signaled that the call quota is exhausted.
    pub fn is_quota_exceeded(&self) -> bool {
        if matches!(self, ModelError::QuotaExceeded { .. }) {
            return true;
        }
        let text = self.to_string().to_lowercase();
        text.contains("quota") || text.contains("429")
    }

    /// Delay requested by the service before the next call, if it sent one.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ModelError::QuotaExceeded { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ModelError {
    fn from(err: reqwest::Error) -> Self {
        ModelError::Request(err.to_string())
    }
}

/// A text-in, text-out language model.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, ModelError>;
}

pub struct GeminiClient {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: &str, model: &str, base_url: &str) -> Result<Self, ModelError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(120))
            .build()?;

        Ok(Self {
            client,
            api_key: api_key.to_string(),
            model: model.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        )
    }
}

fn request_body(prompt: &str) -> Value {
    json!({
        "contents": [{
            "role": "user",
            "parts": [{ "text": prompt }]
        }],
        "generationConfig": {
            "temperature": 0.1,
            "topP": 0.8,
            "topK": 40,
            "maxOutputTokens": 2048
        }
    })
}

#[async_trait]
impl LanguageModel for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<String, ModelError> {
        debug!(model = %self.model, prompt_len = prompt.len(), "calling Gemini");

        let res = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&request_body(prompt))
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            let body = res
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable>".to_string());
            if status == StatusCode::TOO_MANY_REQUESTS {
                return Err(ModelError::QuotaExceeded {
                    retry_after: parse_retry_delay(&body),
                    message: body,
                });
            }
            return Err(ModelError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let json: Value = res.json().await?;
        extract_text(&json)
    }
}

/// Concatenate the text parts of the first candidate.
fn extract_text(json: &Value) -> Result<String, ModelError> {
    let parts = json["candidates"][0]["content"]["parts"]
        .as_array()
        .ok_or_else(|| {
            let reason = json["promptFeedback"]["blockReason"]
                .as_str()
                .unwrap_or("no candidates returned");
            ModelError::InvalidResponse(reason.to_string())
        })?;

    let text: String = parts
        .iter()
        .filter_map(|part| part["text"].as_str())
        .collect();

    if text.is_empty() {
        return Err(ModelError::InvalidResponse("candidate has no text".to_string()));
    }
    Ok(text)
}

/// Read `RetryInfo.retryDelay` (e.g. `"34s"`) from a Gemini error body.
fn parse_retry_delay(body: &str) -> Option<Duration> {
    let json: Value = serde_json::from_str(body).ok()?;
    json["error"]["details"]
        .as_array()?
        .iter()
        .filter_map(|detail| detail["retryDelay"].as_str())
        .find_map(|delay| {
            let secs: f64 = delay.trim().trim_end_matches('s').parse().ok()?;
            Duration::try_from_secs_f64(secs).ok()
        })
}
