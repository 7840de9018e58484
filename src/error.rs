//! Application-wide error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(String),

    #[error("logger error: {0}")]
    Logger(String),

    #[error("server error: {0}")]
    Server(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Uniform failure surface of the generation dispatcher.
///
/// Every backend failure is converted into one of these before it leaves
/// [`crate::dispatch`]; the HTTP layer maps them onto status codes.
#[derive(Debug, Error)]
pub enum GenerateError {
    /// Caller input violates a precondition (blank prompt).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// No backend could be constructed or used.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// The backend was reachable but the call itself failed.
    #[error("generation failed: {0}")]
    GenerationFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn config_error_display() {
        let e = AppError::Config("missing field".into());
        assert!(e.to_string().contains("config error"));
        assert!(e.to_string().contains("missing field"));
    }

    #[test]
    fn logger_error_display() {
        let e = AppError::Logger("already initialized".into());
        assert!(e.to_string().contains("already initialized"));
    }

    #[test]
    fn io_error_converts() {
        let io_err = std::io::Error::new(std::io::ErrorKind::AddrInUse, "port taken");
        let e: AppError = io_err.into();
        assert!(e.to_string().contains("io error"));
        let _: &dyn Error = &e;
    }

    #[test]
    fn generate_errors_keep_cause() {
        let e = GenerateError::GenerationFailed("HTTP 401: bad token".into());
        assert_eq!(e.to_string(), "generation failed: HTTP 401: bad token");

        let e = GenerateError::BackendUnavailable("no model".into());
        assert!(e.to_string().starts_with("backend unavailable"));
    }
}
