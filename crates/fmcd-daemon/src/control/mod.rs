//! Mission-control channel: authenticated, self-healing duplex connection
//! carrying JSON messages.

pub mod channel;
pub mod error;
pub mod transport;

pub use channel::{ControlChannel, ControlIo, ControlSettings, ControlState};
pub use error::ControlError;
pub use transport::{MessageConnection, MessageTransport, WsConnection, WsTransport};
