//! Wire and queue types.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::Result;

/// Namespaces used on the mission-control channel.
pub mod namespace {
    pub const AUTH: &str = "auth";
    pub const CHAT: &str = "chat";
    pub const CONSUMPTION: &str = "consumption";
    pub const PRODUCTION: &str = "production";
    pub const UPDATE_COUNTER: &str = "updatecounter";
    pub const EVENT: &str = "event";
    pub const SCORES: &str = "scores";
    pub const VICTORY: &str = "victory";
    pub const RCON_COMMAND: &str = "rconcommand";
}

/// Message sent to mission control.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub namespace: String,
    pub data: Value,
}

impl OutboundMessage {
    pub fn new(namespace: impl Into<String>, data: Value) -> Self {
        Self {
            namespace: namespace.into(),
            data,
        }
    }

    /// Handshake message carrying the shared secret.
    pub fn auth(token: &str) -> Self {
        Self::new(namespace::AUTH, json!({ "token": token }))
    }

    /// Serialize to the JSON text sent over the wire.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Message received from mission control.
///
/// Both fields are optional on the wire; a missing namespace makes the
/// message a no-op for the dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub data: Value,
}

impl InboundMessage {
    pub fn new(namespace: impl Into<String>, data: Value) -> Self {
        Self {
            namespace: Some(namespace.into()),
            data,
        }
    }

    /// Decode a text frame. Anything but a JSON object is an error.
    pub fn decode(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Whether this is an acknowledgement of the auth handshake.
    pub fn is_auth(&self) -> bool {
        self.namespace.as_deref() == Some(namespace::AUTH)
    }
}

/// A console command for the Factorio server.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AdminCommand(String);

impl AdminCommand {
    pub fn new(command: impl Into<String>) -> Self {
        Self(command.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Report a stat of the opposing server through the `rconstats` mod.
    pub fn update_stats(key: &str, value: i64) -> Self {
        Self(format!(
            r#"/silent-command remote.call("rconstats", "updatestats", "{key}", "{value}")"#
        ))
    }

    /// Declare the match outcome through the `rconstats` mod.
    pub fn call_victory(winner: bool) -> Self {
        Self(format!(
            "/silent-command remote.call('rconstats', 'callvictory', {winner})"
        ))
    }
}

impl fmt::Display for AdminCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
