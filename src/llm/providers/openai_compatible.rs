//! OpenAI-compatible chat completion provider (`/v1/chat/completions`).
//!
//! Sends the prompt as a single user message and hands the decoded response
//! body back untouched; text extraction lives in [`crate::llm::normalize`]
//! because compatible servers disagree on the response shape.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, trace};

use crate::llm::ProviderError;

/// Adapter for a hosted endpoint implementing `/v1/chat/completions`.
///
/// Constructed once at startup, then cheaply cloned because
/// `reqwest::Client` is an `Arc` internally.
#[derive(Clone)]
pub struct OpenAiCompatibleProvider {
    client: Client,
    api_base_url: String,
    model: String,
    api_key: String,
}

impl std::fmt::Debug for OpenAiCompatibleProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatibleProvider")
            .field("api_base_url", &self.api_base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl OpenAiCompatibleProvider {
    /// Build a provider. `api_key` is sent as `Authorization: Bearer <key>`.
    ///
    /// `timeout_seconds = None` leaves requests unbounded.
    pub fn new(
        api_base_url: String,
        model: String,
        timeout_seconds: Option<u64>,
        api_key: String,
    ) -> Result<Self, ProviderError> {
        let mut builder = Client::builder();
        if let Some(secs) = timeout_seconds {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder
            .build()
            .map_err(|e| ProviderError::Unavailable(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, api_base_url, model, api_key })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// One chat-completion round-trip. Returns the decoded response body.
    pub async fn complete(
        &self,
        prompt: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<Value, ProviderError> {
        let payload = ChatCompletionRequest {
            model: &self.model,
            messages: vec![Message { role: "user", content: prompt }],
            max_tokens,
            temperature,
        };

        debug!(
            model = %self.model,
            max_tokens,
            temperature,
            prompt_len = prompt.len(),
            "sending hosted generation request"
        );
        if tracing::enabled!(tracing::Level::TRACE) {
            let json = serde_json::to_string_pretty(&payload)
                .unwrap_or_else(|e| format!("<serialization failed: {e}>"));
            trace!(payload = %json, "full hosted request payload");
        }

        let response = self
            .client
            .post(&self.api_base_url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                error!(url = %self.api_base_url, error = %e, "hosted request failed (transport)");
                ProviderError::Request(e.to_string())
            })?;

        let response = check_status(response).await?;

        let body = response.json::<Value>().await.map_err(|e| {
            error!(error = %e, "failed to decode hosted response");
            ProviderError::Request(format!("failed to parse response body: {e}"))
        })?;

        if tracing::enabled!(tracing::Level::TRACE) {
            let json = serde_json::to_string_pretty(&body)
                .unwrap_or_else(|e| format!("<serialization failed: {e}>"));
            trace!(response = %json, "full hosted response payload");
        }

        Ok(body)
    }
}

// ── Private wire types ────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    max_tokens: u32,
    temperature: f32,
}

// Error envelope used by OpenAI and compatible APIs.
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
    #[serde(default)]
    code: Option<Value>,
}

/// Return the response if successful, or a structured error.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<failed to read error body>".to_string());

    let message = error_message(status, &body);
    error!(%status, %message, "hosted request returned HTTP error");
    Err(ProviderError::Request(message))
}

fn error_message(status: reqwest::StatusCode, body: &str) -> String {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(env) => {
            let code = env
                .error
                .code
                .map(|v| match v {
                    Value::String(s) => format!(" [code={s}]"),
                    other => format!(" [code={other}]"),
                })
                .unwrap_or_default();
            format!("HTTP {status}{code}: {}", env.error.message)
        }
        Err(_) => format!("HTTP {status}: {body}"),
    }
}
