//! Mission-control channel error types.

/// Errors that can occur on the mission-control connection.
#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Send error: {0}")]
    Send(String),

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Encode error: {0}")]
    Encode(#[from] fmcd_core::Error),
}
