//! Logging initialisation via tracing-subscriber.
//!
//! Call [`init`] once at startup, after the effective level is known.

use tracing_subscriber::EnvFilter;

use crate::error::AppError;

/// Initialise the global tracing subscriber, writing to stderr.
///
/// When `force_level` is `true` (level came from the command line), `level`
/// wins over `RUST_LOG`. Otherwise `RUST_LOG` wins and `level` is the
/// fallback.
pub fn init(level: &str, force_level: bool) -> Result<(), AppError> {
    let filter = if force_level {
        match EnvFilter::try_new(level) {
            Ok(filter) => filter,
            Err(level_err) => EnvFilter::try_from_default_env().map_err(|env_err| {
                AppError::Logger(format!(
                    "invalid log level '{level}': {level_err}; RUST_LOG parse failed: {env_err}"
                ))
            })?,
        }
    } else {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(level))
            .map_err(|e| AppError::Logger(format!("invalid log level '{level}': {e}")))?
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| AppError::Logger(format!("failed to set subscriber: {e}")))?;

    Ok(())
}
