//! Error types for `FactorioMCd` core library.

use thiserror::Error;

/// Result type alias using the core `Error`.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A numeric telemetry key carried a value that is not an integer
    #[error("Telemetry value for {key} is not an integer: {value:?}")]
    InvalidTelemetry { key: String, value: String },

    /// A mission-control message had a known namespace but an unusable payload
    #[error("Malformed {namespace} message: {reason}")]
    MalformedMessage {
        namespace: String,
        reason: &'static str,
    },

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn malformed(namespace: &str, reason: &'static str) -> Self {
        Self::MalformedMessage {
            namespace: namespace.to_string(),
            reason,
        }
    }
}
