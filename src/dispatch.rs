//! Generation dispatcher. Validates a request, runs it on the process
//! backend and normalizes the result.
//!
//! This is the error boundary: nothing but [`GenerateError`] leaves here.
//! No timeouts and no retries; a failed attempt is reported as-is.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::GenerateError;
use crate::llm::{Backend, ProviderError, normalize};

pub const DEFAULT_MAX_TOKENS: u32 = 256;
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

/// One generation call. `max_tokens` and `temperature` are passed to the
/// backend unchecked.
#[derive(Debug, Clone, Deserialize)]
#[serde(from = "RawGenerationRequest")]
pub struct GenerationRequest {
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Wire form: optional fields may be absent or `null`.
#[derive(Deserialize)]
struct RawGenerationRequest {
    prompt: String,
    #[serde(default)]
    max_tokens: Option<u32>,
    #[serde(default)]
    temperature: Option<f32>,
}

impl From<RawGenerationRequest> for GenerationRequest {
    fn from(raw: RawGenerationRequest) -> Self {
        Self {
            prompt: raw.prompt,
            max_tokens: raw.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            temperature: raw.temperature.unwrap_or(DEFAULT_TEMPERATURE),
        }
    }
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationResult {
    pub text: String,
}

impl From<ProviderError> for GenerateError {
    fn from(e: ProviderError) -> Self {
        match e {
            ProviderError::Unavailable(msg) => GenerateError::BackendUnavailable(msg),
            other => GenerateError::GenerationFailed(other.to_string()),
        }
    }
}

/// Cheap to clone; the backend is shared.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    backend: Arc<Backend>,
}

impl Dispatcher {
    pub fn new(backend: Backend) -> Self {
        Self { backend: Arc::new(backend) }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub async fn dispatch(&self, req: GenerationRequest) -> Result<GenerationResult, GenerateError> {
        if req.prompt.trim().is_empty() {
            return Err(GenerateError::InvalidRequest("prompt is required".into()));
        }

        debug!(
            backend = self.backend.name(),
            max_tokens = req.max_tokens,
            temperature = req.temperature,
            "dispatching generation"
        );

        let result = match self.backend.as_ref() {
            Backend::Hosted(p) => p
                .complete(&req.prompt, req.max_tokens, req.temperature)
                .await
                .and_then(normalize::hosted_text),
            Backend::Local(l) => l
                .generate(req.prompt, req.max_tokens as usize, f64::from(req.temperature))
                .await
                .map(normalize::local_text),
            Backend::Unavailable { reason } => Err(ProviderError::Unavailable(reason.clone())),
        };

        match result {
            Ok(text) => Ok(GenerationResult { text }),
            Err(e) => {
                let e = GenerateError::from(e);
                warn!(backend = self.backend.name(), error = %e, "generation failed");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::providers::local::tests::ScriptedLoader;
    use crate::llm::providers::local::{LocalBackend, UnsupportedLoader};

    fn local_dispatcher(auto_ok: bool, cpu_ok: bool) -> Dispatcher {
        let loader = Arc::new(ScriptedLoader::new(auto_ok, cpu_ok));
        Dispatcher::new(Backend::Local(LocalBackend::new("m", loader)))
    }

    #[test]
    fn request_defaults() {
        let req: GenerationRequest = serde_json::from_str(r#"{"prompt":"hi"}"#).unwrap();
        assert_eq!(req.max_tokens, 256);
        assert!((req.temperature - 0.7).abs() < f32::EPSILON);
    }

    #[test]
    fn null_fields_take_defaults() {
        let req: GenerationRequest =
            serde_json::from_str(r#"{"prompt":"hi","max_tokens":null,"temperature":null}"#).unwrap();
        assert_eq!(req.max_tokens, DEFAULT_MAX_TOKENS);
        assert_eq!(req.temperature, DEFAULT_TEMPERATURE);

        let req: GenerationRequest =
            serde_json::from_str(r#"{"prompt":"hi","max_tokens":3,"temperature":null}"#).unwrap();
        assert_eq!(req.max_tokens, 3);
        assert_eq!(req.temperature, DEFAULT_TEMPERATURE);
    }

    #[test]
    fn prompt_is_still_required() {
        assert!(serde_json::from_str::<GenerationRequest>(r#"{"max_tokens":3}"#).is_err());
        assert!(serde_json::from_str::<GenerationRequest>(r#"{"prompt":null}"#).is_err());
    }

    #[tokio::test]
    async fn out_of_range_values_pass_through() {
        let d = local_dispatcher(true, true);
        let req: GenerationRequest =
            serde_json::from_str(r#"{"prompt":"hello","max_tokens":0,"temperature":9.5}"#).unwrap();
        assert_eq!(req.temperature, 9.5);
        assert_eq!(d.dispatch(req).await.unwrap().text, "hello [0]");
    }

    #[tokio::test]
    async fn blank_prompts_are_invalid() {
        let d = local_dispatcher(true, true);
        for prompt in ["", " ", "\n\t  "] {
            let err = d.dispatch(GenerationRequest::new(prompt)).await.unwrap_err();
            assert!(matches!(err, GenerateError::InvalidRequest(_)), "{prompt:?}");
        }
    }

    #[tokio::test]
    async fn local_result_is_normalized() {
        let d = local_dispatcher(true, true);
        let mut req = GenerationRequest::new("hello");
        req.max_tokens = 12;
        let out = d.dispatch(req).await.unwrap();
        assert_eq!(out.text, "hello [12]");
    }

    #[tokio::test]
    async fn load_failure_is_backend_unavailable() {
        let d = local_dispatcher(false, false);
        let err = d.dispatch(GenerationRequest::new("hello")).await.unwrap_err();
        assert!(matches!(err, GenerateError::BackendUnavailable(_)));
        assert!(err.to_string().contains("cpu fallback error"));
    }

    #[tokio::test]
    async fn unavailable_backend_reports_reason() {
        let d = Dispatcher::new(Backend::Unavailable { reason: "no credential".into() });
        let err = d.dispatch(GenerationRequest::new("hello")).await.unwrap_err();
        assert_eq!(err.to_string(), "backend unavailable: no credential");
    }

    #[tokio::test]
    async fn blank_prompt_checked_before_backend() {
        let d = Dispatcher::new(Backend::Local(LocalBackend::new("m", Arc::new(UnsupportedLoader))));
        let err = d.dispatch(GenerationRequest::new("  ")).await.unwrap_err();
        assert!(matches!(err, GenerateError::InvalidRequest(_)));
    }

    #[test]
    fn provider_errors_map_to_generation_failed() {
        let e: GenerateError = ProviderError::Request("HTTP 500".into()).into();
        assert!(matches!(e, GenerateError::GenerationFailed(_)));
        let e: GenerateError = ProviderError::Inference("oom".into()).into();
        assert!(matches!(e, GenerateError::GenerationFailed(_)));
        let e: GenerateError = ProviderError::Unavailable("gone".into()).into();
        assert!(matches!(e, GenerateError::BackendUnavailable(_)));
    }
}
