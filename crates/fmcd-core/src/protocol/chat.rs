//! Console log line grammar.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::types::{OutboundMessage, namespace};

/// Prefix the companion Factorio mod puts in front of telemetry lines.
pub const TELEMETRY_SENTINEL: &str = "##FMC::";

static CHAT_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<timestamp>\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}) (?P<namespace>\[\w+\]) (?P<username>\S+): (?P<message>.+)$",
    )
    .expect("static regex is valid")
});

/// One line of in-game chat as written to the server console.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatEvent {
    /// `YYYY-MM-DD HH:MM:SS` as printed by the server.
    pub timestamp: String,
    /// Bracketed channel tag, e.g. `[CHAT]`.
    pub namespace: String,
    pub username: String,
    pub message: String,
}

impl ChatEvent {
    /// Match a line against the chat grammar.
    pub fn parse(line: &str) -> Option<Self> {
        let caps = CHAT_LINE_RE.captures(line)?;
        Some(Self {
            timestamp: caps["timestamp"].to_string(),
            namespace: caps["namespace"].to_string(),
            username: caps["username"].to_string(),
            message: caps["message"].to_string(),
        })
    }

    /// Wrap as a `chat` message. The envelope namespace is always `chat`; the
    /// bracketed channel tag travels inside `data`.
    pub fn to_outbound(&self) -> OutboundMessage {
        OutboundMessage::new(
            namespace::CHAT,
            json!({
                "timestamp": self.timestamp,
                "namespace": self.namespace,
                "username": self.username,
                "message": self.message,
            }),
        )
    }
}

/// Classification of a console line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogLine {
    /// Sentinel-prefixed telemetry, with the sentinel stripped.
    Telemetry(String),
    Chat(ChatEvent),
    /// Anything else the server prints.
    Other,
}

/// Classify a line with its line terminator already removed.
pub fn classify_line(line: &str) -> LogLine {
    if let Some(rest) = line.strip_prefix(TELEMETRY_SENTINEL) {
        return LogLine::Telemetry(rest.trim().to_string());
    }
    ChatEvent::parse(line.trim()).map_or(LogLine::Other, LogLine::Chat)
}
