//! RCON client error types.

/// Errors that can occur talking to the game server over RCON.
#[derive(Debug, thiserror::Error)]
pub enum RconError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Authentication rejected by server")]
    Auth,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Command of {0} bytes exceeds the RCON frame limit")]
    TooLarge(usize),
}

impl RconError {
    /// The command itself can never be sent. Nothing reached the wire, so
    /// the session that raised this is still usable.
    pub const fn is_rejected(&self) -> bool {
        matches!(self, Self::TooLarge(_))
    }
}
