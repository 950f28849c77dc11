//! Mission-control messages that turn into RCON commands.

use serde_json::Value;
use tracing::debug;

use super::telemetry::TelemetryKind;
use super::types::{AdminCommand, InboundMessage, namespace};
use crate::error::{Error, Result};

/// Prefix the server-side mod uses to broadcast a line to every player.
pub const BROADCAST_PREFIX: &str = "#GLOBAL: ";

/// Translate an inbound message into the commands it asks for.
///
/// Unknown or missing namespaces produce no commands. A known namespace with
/// an unusable payload is an error so the caller can log it.
pub fn commands_for(message: &InboundMessage, server_id: &str) -> Result<Vec<AdminCommand>> {
    let Some(ns) = message.namespace.as_deref() else {
        return Ok(Vec::new());
    };
    let data = &message.data;
    match ns {
        namespace::CHAT => {
            let text = data
                .get("msg")
                .and_then(Value::as_str)
                .ok_or_else(|| Error::malformed(ns, "data.msg is not a string"))?;
            Ok(vec![AdminCommand::new(format!("{BROADCAST_PREFIX}{text}"))])
        }
        namespace::SCORES => score_commands(data, server_id),
        namespace::VICTORY => {
            let winner = data
                .get("winner")
                .and_then(Value::as_bool)
                .ok_or_else(|| Error::malformed(ns, "data.winner is not a boolean"))?;
            Ok(vec![AdminCommand::call_victory(winner)])
        }
        namespace::RCON_COMMAND => {
            let command = data
                .as_str()
                .ok_or_else(|| Error::malformed(ns, "data is not a command string"))?;
            Ok(vec![AdminCommand::new(command)])
        }
        other => {
            debug!(namespace = other, "Ignoring message with unhandled namespace");
            Ok(Vec::new())
        }
    }
}

/// Relay the opposing server's stats into this game.
///
/// Only the first entry whose key is not `server_id` is used; matches with
/// more than two servers are not supported.
fn score_commands(data: &Value, server_id: &str) -> Result<Vec<AdminCommand>> {
    let servers = data
        .as_object()
        .ok_or_else(|| Error::malformed(namespace::SCORES, "data is not an object"))?;

    let Some((enemy_id, enemy)) = servers.iter().find(|(id, _)| id.as_str() != server_id) else {
        return Ok(Vec::new());
    };
    let Some(stats) = enemy.as_object() else {
        debug!(enemy = %enemy_id, "Enemy scores are not an object");
        return Ok(Vec::new());
    };

    let commands = stats
        .iter()
        .filter_map(|(key, value)| {
            let key = match key.as_str() {
                "players-online" => "player-online-count",
                k if TelemetryKind::of(k).is_numeric() => k,
                _ => return None,
            };
            match coerce_int(value) {
                Some(n) => Some(AdminCommand::update_stats(key, n)),
                None => {
                    debug!(key, value = %value, "Skipping non-numeric enemy score");
                    None
                }
            }
        })
        .collect();
    Ok(commands)
}

/// Integers, floats (truncated) and integer strings; nothing else.
#[allow(clippy::cast_possible_truncation)]
fn coerce_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
