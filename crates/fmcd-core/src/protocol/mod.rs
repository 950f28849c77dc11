//! Message vocabulary of the bridge.
//!
//! Classifies Factorio console lines and translates between the three
//! vocabularies the daemon speaks: log telemetry, mission-control JSON
//! messages and RCON commands. Tolerant reader: unknown keys and namespaces
//! are ignored, only known-but-malformed input is an error.

mod chat;
mod inbound;
mod telemetry;
mod types;

pub use chat::{ChatEvent, LogLine, TELEMETRY_SENTINEL, classify_line};
pub use inbound::{BROADCAST_PREFIX, commands_for};
pub use telemetry::{TelemetryEvent, TelemetryKind};
pub use types::{AdminCommand, InboundMessage, OutboundMessage, namespace};
