//! Sentinel telemetry emitted by the companion Factorio mod.

use serde_json::json;

use super::types::{OutboundMessage, namespace};
use crate::error::{Error, Result};

/// What a telemetry key reports, which decides its outbound shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TelemetryKind {
    /// Science packs consumed; positive counts only.
    Consumption,
    /// Tier-3 modules produced; positive counts only.
    Production,
    /// Absolute game-state counters; zero is meaningful.
    Counter,
    /// A player joined or left; value is the player name.
    PlayerEvent,
    RocketLaunched,
    /// A rocket silo was built or mined; value is the player name.
    RocketSilo,
    Unknown,
}

impl TelemetryKind {
    pub fn of(key: &str) -> Self {
        match key {
            "science-pack-1" | "science-pack-2" | "science-pack-3" | "alien-science-pack" => {
                Self::Consumption
            }
            "productivity-module-3" | "efficiency-module-3" | "speed-module-3" => Self::Production,
            "player-online-count" | "rocket-progress" => Self::Counter,
            "player_joined" | "player_left" => Self::PlayerEvent,
            "rocket_launched" => Self::RocketLaunched,
            "rocket-silo-built" | "rocket-silo-mined" => Self::RocketSilo,
            _ => Self::Unknown,
        }
    }

    /// Whether values of this kind are integer stats.
    pub const fn is_numeric(self) -> bool {
        matches!(self, Self::Consumption | Self::Production | Self::Counter)
    }
}

/// A `key::value` fact from a telemetry line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryEvent {
    pub key: String,
    pub value: String,
}

impl TelemetryEvent {
    /// Split the sentinel-stripped remainder at the first `::`.
    ///
    /// The value keeps any further `::`. A line without a separator has an
    /// empty value.
    pub fn parse(raw: &str) -> Self {
        let (key, value) = raw.split_once("::").unwrap_or((raw, ""));
        Self {
            key: key.to_string(),
            value: value.to_string(),
        }
    }

    pub fn kind(&self) -> TelemetryKind {
        TelemetryKind::of(&self.key)
    }

    /// Build the mission-control message for this event.
    ///
    /// `Ok(None)` when the event is filtered out (non-positive consumption or
    /// production, negative counter) or the key is unknown.
    pub fn to_outbound(&self) -> Result<Option<OutboundMessage>> {
        let kind = self.kind();
        let message = match kind {
            TelemetryKind::Consumption | TelemetryKind::Production | TelemetryKind::Counter => {
                let value = self.integer_value()?;
                let keep = if kind == TelemetryKind::Counter {
                    value >= 0
                } else {
                    value > 0
                };
                if !keep {
                    return Ok(None);
                }
                let ns = match kind {
                    TelemetryKind::Consumption => namespace::CONSUMPTION,
                    TelemetryKind::Production => namespace::PRODUCTION,
                    _ => namespace::UPDATE_COUNTER,
                };
                OutboundMessage::new(ns, json!({ "type": self.key, "data": value }))
            }
            TelemetryKind::PlayerEvent => OutboundMessage::new(
                namespace::EVENT,
                json!({ "type": self.key, "data": { "playername": self.value } }),
            ),
            TelemetryKind::RocketLaunched => {
                OutboundMessage::new(namespace::EVENT, json!({ "type": self.key }))
            }
            // Mission control only knows the "built" event type; mined silos
            // are reported under it as well.
            TelemetryKind::RocketSilo => OutboundMessage::new(
                namespace::EVENT,
                json!({ "type": "rocket-silo-built", "playername": self.value }),
            ),
            TelemetryKind::Unknown => {
                tracing::debug!(key = %self.key, value = %self.value, "Left telemetry key untouched");
                return Ok(None);
            }
        };
        Ok(Some(message))
    }

    fn integer_value(&self) -> Result<i64> {
        self.value
            .trim()
            .parse()
            .map_err(|_| Error::InvalidTelemetry {
                key: self.key.clone(),
                value: self.value.clone(),
            })
    }
}
