//! Client for the remote model-hosting API.
//!
//! A call POSTs to `{api_base}/{model}` with the payload shape dictated by
//! the task kind, retrying transient failures (429, 503, transport errors)
//! on a linear backoff before giving up.

use std::time::Duration;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::warn;

use crate::config::AppConfig;

/// Cap applied to response bodies kept in errors and log lines.
const BODY_SNIPPET_CHARS: usize = 300;

/// One request to the inference API: which model, which task, what payload.
#[derive(Debug, Clone)]
pub enum InferenceRequest {
    /// Describe an image; the payload is the raw encoded image bytes.
    ImageToText { model: String, image: Vec<u8> },
    /// Generate text from a prompt.
    TextGeneration { model: String, prompt: String },
}

impl InferenceRequest {
    pub fn image_to_text(model: impl Into<String>, image: Vec<u8>) -> Self {
        InferenceRequest::ImageToText {
            model: model.into(),
            image,
        }
    }

    pub fn text_generation(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        InferenceRequest::TextGeneration {
            model: model.into(),
            prompt: prompt.into(),
        }
    }

    pub fn model(&self) -> &str {
        match self {
            InferenceRequest::ImageToText { model, .. } => model,
            InferenceRequest::TextGeneration { model, .. } => model,
        }
    }
}

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("HF_TOKEN is not set; cannot call the inference API")]
    MissingToken,
    #[error("inference API returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("inference API request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

impl InferenceError {
    /// Whether another attempt may succeed: rate limiting, a model still
    /// loading, or a transport-level failure.
    pub fn is_transient(&self) -> bool {
        match self {
            InferenceError::Status { status, .. } => *status == 429 || *status == 503,
            InferenceError::Transport(_) => true,
            InferenceError::MissingToken => false,
        }
    }
}

/// The response shapes the API is known to produce for generated text:
/// a sequence of objects, a bare object, or something else entirely.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ModelReply {
    Sequence(Vec<GeneratedText>),
    Single(GeneratedText),
    Other(Value),
}

#[derive(Debug, Deserialize)]
pub struct GeneratedText {
    pub generated_text: String,
}

impl ModelReply {
    /// First `generated_text` in the payload, if the response used one of
    /// the known shapes. An empty sequence yields `None`.
    pub fn first_generated_text(value: &Value) -> Option<String> {
        match ModelReply::deserialize(value).ok()? {
            ModelReply::Sequence(items) => items.into_iter().next().map(|item| item.generated_text),
            ModelReply::Single(item) => Some(item.generated_text),
            ModelReply::Other(_) => None,
        }
    }
}

pub struct InferenceClient {
    http: reqwest::Client,
    api_base: String,
    token: Option<String>,
    request_timeout: Duration,
    max_attempts: u32,
    retry_base: Duration,
}

impl InferenceClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            token: config.api_token.clone(),
            request_timeout: config.request_timeout,
            max_attempts: config.max_attempts,
            retry_base: config.retry_base,
        }
    }

    /// Issues the request, retrying transient failures up to the attempt
    /// cap with a `retry_base * attempt` sleep in between. Returns the
    /// parsed JSON body of the first 200 response.
    pub async fn call(&self, request: &InferenceRequest) -> Result<Value, InferenceError> {
        let token = self.token.as_deref().ok_or(InferenceError::MissingToken)?;
        let url = format!("{}/{}", self.api_base, request.model());

        for attempt in 1..=self.max_attempts {
            match self.attempt(request, &url, token).await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    warn!(
                        error = %err,
                        attempt,
                        max_attempts = self.max_attempts,
                        model = request.model(),
                        "inference attempt failed"
                    );
                    if attempt >= self.max_attempts || !err.is_transient() {
                        return Err(err);
                    }
                    tokio::time::sleep(self.retry_base * attempt).await;
                }
            }
        }
        unreachable!("retry loop either returns a payload or an error")
    }

    async fn attempt(
        &self,
        request: &InferenceRequest,
        url: &str,
        token: &str,
    ) -> Result<Value, InferenceError> {
        let builder = match request {
            InferenceRequest::ImageToText { image, .. } => self
                .http
                .post(url)
                .header(CONTENT_TYPE, "application/octet-stream")
                .body(image.clone()),
            InferenceRequest::TextGeneration { prompt, .. } => {
                self.http.post(url).json(&generation_body(prompt))
            }
        };

        let response = builder
            .header(AUTHORIZATION, format!("Bearer {token}"))
            .timeout(self.request_timeout)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::OK {
            // A 200 with an unparseable body is treated like a transport
            // failure and retried.
            return Ok(response.json::<Value>().await?);
        }

        let body = response.text().await.unwrap_or_default();
        Err(InferenceError::Status {
            status: status.as_u16(),
            body: truncate(&body, BODY_SNIPPET_CHARS),
        })
    }
}

/// JSON body for a text-generation task. `wait_for_model` asks the API to
/// queue the request instead of failing while the model is cold.
fn generation_body(prompt: &str) -> Value {
    json!({
        "inputs": prompt,
        "parameters": {
            "max_new_tokens": 120,
            "temperature": 0.9,
            "top_p": 0.95,
            "repetition_penalty": 1.05,
        },
        "options": { "wait_for_model": true },
    })
}

fn truncate(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}
