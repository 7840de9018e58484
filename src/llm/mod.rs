//! Generation backends.
//!
//! `Backend` is an enum over the concrete backend kinds. It is resolved once
//! at startup by [`providers::build`] and never changes afterwards, so every
//! request is served by exactly one backend.
//!
//! Adapters return raw, backend-specific JSON. Turning that into text is the
//! job of [`normalize`]; turning [`ProviderError`] into the public error
//! surface is the job of the dispatcher.

pub mod normalize;
pub mod providers;

use thiserror::Error;

// ── Error ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ProviderError {
    /// The backend cannot be constructed (missing credential, missing
    /// inference support, model load failure).
    #[error("{0}")]
    Unavailable(String),
    /// Transport, HTTP status or body decoding failure on a hosted call.
    #[error("provider request failed: {0}")]
    Request(String),
    /// Local inference failed after the pipeline was loaded.
    #[error("inference failed: {0}")]
    Inference(String),
}

// ── Backend handle ────────────────────────────────────────────────────────────

/// The process-wide generation backend.
///
/// Enum dispatch keeps the set of backends closed and avoids trait objects at
/// this level; the local variant holds its own lazily-built pipeline.
#[derive(Clone)]
pub enum Backend {
    Hosted(providers::openai_compatible::OpenAiCompatibleProvider),
    Local(providers::local::LocalBackend),
    /// Selection failed at startup; every generation reports `reason`.
    Unavailable { reason: String },
}

impl Backend {
    pub fn name(&self) -> &'static str {
        match self {
            Backend::Hosted(_) => "hosted",
            Backend::Local(_) => "local",
            Backend::Unavailable { .. } => "unavailable",
        }
    }
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Backend::Hosted(p) => f.debug_tuple("Hosted").field(p).finish(),
            Backend::Local(l) => f.debug_tuple("Local").field(&l.model()).finish(),
            Backend::Unavailable { reason } => {
                f.debug_struct("Unavailable").field("reason", reason).finish()
            }
        }
    }
}
