//! Backend implementations and the startup selector.
//!
//! `build(config, api_key)` is the factory, called once at startup. The
//! result is fixed for the life of the process.

#[cfg(feature = "local-candle")]
pub mod candle;
pub mod local;
pub mod openai_compatible;

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::config::{BackendConfig, BackendKind, CREDENTIAL_VARS};
use crate::llm::{Backend, ProviderError};

use local::{LocalBackend, PipelineLoader};

/// The pipeline loader this build ships with.
pub fn default_loader(config: &BackendConfig) -> Arc<dyn PipelineLoader> {
    #[cfg(feature = "local-candle")]
    {
        Arc::new(candle::CandleLoader::new(&config.local))
    }
    #[cfg(not(feature = "local-candle"))]
    {
        let _ = config;
        Arc::new(local::UnsupportedLoader)
    }
}

/// Resolve the process backend from config and the optional credential.
pub fn build(config: &BackendConfig, api_key: Option<String>) -> Backend {
    build_with_loader(config, api_key, default_loader(config))
}

/// Like [`build`], with an explicit loader for the local pipeline.
pub fn build_with_loader(
    config: &BackendConfig,
    api_key: Option<String>,
    loader: Arc<dyn PipelineLoader>,
) -> Backend {
    let local = || Backend::Local(LocalBackend::new(config.local.model.clone(), loader.clone()));

    let backend = match config.kind {
        BackendKind::Local => local(),
        BackendKind::Auto => match hosted(config, api_key) {
            Ok(b) => b,
            Err(e) => {
                info!(reason = %e, "hosted backend not available; using local pipeline");
                local()
            }
        },
        BackendKind::Hosted => match hosted(config, api_key) {
            Ok(b) => b,
            Err(e) => {
                error!(reason = %e, "hosted backend selected but cannot be used");
                Backend::Unavailable { reason: e.to_string() }
            }
        },
    };

    match &backend {
        Backend::Hosted(p) => info!(kind = %config.kind.as_str(), model = %p.model(), "backend: hosted"),
        Backend::Local(l) => info!(kind = %config.kind.as_str(), model = %l.model(), "backend: local (lazy)"),
        Backend::Unavailable { reason } => warn!(kind = %config.kind.as_str(), %reason, "backend: unavailable"),
    }
    backend
}

fn hosted(config: &BackendConfig, api_key: Option<String>) -> Result<Backend, ProviderError> {
    let api_key = api_key.ok_or_else(|| {
        ProviderError::Unavailable(format!(
            "{} environment variable must be set to use the hosted backend",
            CREDENTIAL_VARS.join(" or ")
        ))
    })?;
    let h = &config.hosted;
    let p = openai_compatible::OpenAiCompatibleProvider::new(
        h.api_base_url.clone(),
        h.model.clone(),
        h.timeout_seconds,
        api_key,
    )?;
    Ok(Backend::Hosted(p))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use local::UnsupportedLoader;

    fn backend_config(kind: BackendKind) -> BackendConfig {
        let mut cfg = Config::test_default().backend;
        cfg.kind = kind;
        cfg
    }

    fn loader() -> Arc<dyn PipelineLoader> {
        Arc::new(UnsupportedLoader)
    }

    #[test]
    fn auto_with_credential_is_hosted() {
        let b = build_with_loader(&backend_config(BackendKind::Auto), Some("k".into()), loader());
        assert_eq!(b.name(), "hosted");
    }

    #[test]
    fn auto_without_credential_is_local() {
        let b = build_with_loader(&backend_config(BackendKind::Auto), None, loader());
        assert_eq!(b.name(), "local");
    }

    #[test]
    fn local_ignores_credential() {
        let b = build_with_loader(&backend_config(BackendKind::Local), Some("k".into()), loader());
        assert_eq!(b.name(), "local");
    }

    #[test]
    fn hosted_without_credential_is_unavailable() {
        let b = build_with_loader(&backend_config(BackendKind::Hosted), None, loader());
        match b {
            Backend::Unavailable { reason } => {
                assert!(reason.contains("HF_TOKEN or AI_API_KEY"), "{reason}");
            }
            other => panic!("expected unavailable, got {other:?}"),
        }
    }

    #[test]
    fn local_backend_starts_unloaded() {
        match build_with_loader(&backend_config(BackendKind::Local), None, loader()) {
            Backend::Local(l) => {
                assert!(!l.is_loaded());
                assert_eq!(l.model(), "TheBloke/TinyLlama-1.1B-Chat-v1.0-GGUF");
            }
            other => panic!("expected local, got {other:?}"),
        }
    }
}
