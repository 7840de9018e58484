//! Local text-generation pipeline backend.
//!
//! The pipeline is built on first use, not at startup: loading weights is
//! slow and only needed when the hosted provider is not in play. Loading is
//! tried with automatic device placement first, then CPU-only. A failed load
//! is not remembered, so the next request tries again; a successful one is
//! kept for the life of the process.
//!
//! Concurrent first callers share a single load through a `OnceCell`.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::llm::ProviderError;

/// Where the loader should place the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Best available accelerator, CPU if none.
    Auto,
    Cpu,
}

impl std::fmt::Display for Placement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Placement::Auto => f.write_str("auto"),
            Placement::Cpu => f.write_str("cpu"),
        }
    }
}

/// A loaded text-generation pipeline.
///
/// `generate` is blocking and may take seconds; callers run it on the
/// blocking pool. `max_length` is the total token budget, prompt included.
pub trait TextGenerator: Send + Sync {
    fn generate(&self, prompt: &str, max_length: usize, temperature: f64) -> Result<Value, ProviderError>;
}

/// Builds a [`TextGenerator`] for a named model. Blocking.
pub trait PipelineLoader: Send + Sync {
    fn load(&self, model: &str, placement: Placement) -> Result<Arc<dyn TextGenerator>, ProviderError>;
}

/// Loader used when the crate is built without in-process inference.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnsupportedLoader;

impl PipelineLoader for UnsupportedLoader {
    fn load(&self, _model: &str, placement: Placement) -> Result<Arc<dyn TextGenerator>, ProviderError> {
        Err(ProviderError::Unavailable(format!(
            "local inference not compiled in (placement {placement}); rebuild with --features local-candle"
        )))
    }
}

#[derive(Clone)]
pub struct LocalBackend {
    model: String,
    loader: Arc<dyn PipelineLoader>,
    pipeline: Arc<OnceCell<Arc<dyn TextGenerator>>>,
}

impl LocalBackend {
    pub fn new(model: impl Into<String>, loader: Arc<dyn PipelineLoader>) -> Self {
        Self {
            model: model.into(),
            loader,
            pipeline: Arc::new(OnceCell::new()),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Whether the pipeline has been loaded yet.
    pub fn is_loaded(&self) -> bool {
        self.pipeline.initialized()
    }

    /// Return the cached pipeline, loading it first if needed.
    pub async fn pipeline(&self) -> Result<Arc<dyn TextGenerator>, ProviderError> {
        let pipeline = self
            .pipeline
            .get_or_try_init(|| async {
                let loader = Arc::clone(&self.loader);
                let model = self.model.clone();
                tokio::task::spawn_blocking(move || load_with_fallback(loader.as_ref(), &model))
                    .await
                    .map_err(|e| ProviderError::Unavailable(format!("model loader task failed: {e}")))?
            })
            .await?;
        Ok(Arc::clone(pipeline))
    }

    /// Run one generation on the blocking pool and return the raw result.
    pub async fn generate(
        &self,
        prompt: String,
        max_length: usize,
        temperature: f64,
    ) -> Result<Value, ProviderError> {
        let pipeline = self.pipeline().await?;
        tokio::task::spawn_blocking(move || pipeline.generate(&prompt, max_length, temperature))
            .await
            .map_err(|e| ProviderError::Inference(format!("generation task failed: {e}")))?
    }
}

fn load_with_fallback(
    loader: &dyn PipelineLoader,
    model: &str,
) -> Result<Arc<dyn TextGenerator>, ProviderError> {
    info!(%model, "loading local text-generation pipeline");
    let auto_err = match loader.load(model, Placement::Auto) {
        Ok(p) => {
            info!(%model, placement = %Placement::Auto, "local pipeline ready");
            return Ok(p);
        }
        Err(e) => e,
    };
    warn!(%model, error = %auto_err, "auto placement failed; retrying on cpu");

    match loader.load(model, Placement::Cpu) {
        Ok(p) => {
            info!(%model, placement = %Placement::Cpu, "local pipeline ready");
            Ok(p)
        }
        Err(cpu_err) => Err(ProviderError::Unavailable(format!(
            "failed to load model {model}: {auto_err} | cpu fallback error: {cpu_err}"
        ))),
    }
}
