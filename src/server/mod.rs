//! Axum HTTP surface.
//!
//! ```text
//! POST /generate   {prompt, max_tokens?, temperature?} → {text}
//! GET  /ping       → {status: "ok"}
//! ```
//!
//! `serve` drives the axum event loop until the [`CancellationToken`] fires.

mod api;

use axum::{
    Router,
    routing::{get, post},
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::dispatch::Dispatcher;
use crate::error::AppError;

/// Axum router state injected into every handler. Cheap to clone.
#[derive(Clone)]
pub(crate) struct AppState {
    pub dispatcher: Dispatcher,
}

pub fn build_router(dispatcher: Dispatcher) -> Router {
    Router::new()
        .route("/generate", post(api::generate))
        .route("/ping",     get(api::ping))
        .with_state(AppState { dispatcher })
}

pub async fn serve(
    bind_addr: &str,
    dispatcher: Dispatcher,
    shutdown: CancellationToken,
) -> Result<(), AppError> {
    let backend = dispatcher.backend_name();
    let router = build_router(dispatcher);

    let listener = TcpListener::bind(bind_addr)
        .await
        .map_err(|e| AppError::Server(format!("bind failed on {bind_addr}: {e}")))?;

    info!(%bind_addr, %backend, "http server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| AppError::Server(format!("axum server error: {e}")))?;

    info!("http server shut down");
    Ok(())
}
