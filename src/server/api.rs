//! Route handlers.
//!
//! Errors use the `{"detail": "..."}` body shape for every status.

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::debug;

use crate::dispatch::GenerationRequest;
use crate::error::GenerateError;

use super::AppState;

impl IntoResponse for GenerateError {
    fn into_response(self) -> Response {
        let status = match self {
            GenerateError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            GenerateError::BackendUnavailable(_) | GenerateError::GenerationFailed(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}

/// POST /generate
pub(super) async fn generate(
    State(state): State<AppState>,
    payload: Result<Json<GenerationRequest>, JsonRejection>,
) -> Response {
    let req = match payload {
        Ok(Json(req)) => req,
        Err(rejection) => {
            debug!(error = %rejection.body_text(), "malformed generate request");
            return (rejection.status(), Json(json!({ "detail": rejection.body_text() }))).into_response();
        }
    };
    debug!(prompt_len = req.prompt.len(), "generate request");
    match state.dispatcher.dispatch(req).await {
        Ok(result) => (StatusCode::OK, Json(result)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// GET /ping: liveness only; never touches the backend.
pub(super) async fn ping() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}
