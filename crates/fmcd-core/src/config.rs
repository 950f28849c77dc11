//! Configuration resolution for `FactorioMCd`.
//!
//! Resolution order (lowest to highest priority):
//! 1. Built-in defaults
//! 2. Config file (`--config`, else `/etc/fmcd.toml`, else `~/.fmcd.toml`)
//! 3. Environment variables and CLI arguments (applied by the binary)

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A credential that never shows up in `Debug` output or logs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The raw secret, for the one place that has to put it on the wire.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(<redacted>)")
    }
}

/// Complete bridge configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Factorio server console log that is tailed.
    pub log_file: PathBuf,
    /// This server's identifier in mission control's `scores` messages.
    pub server_id: String,
    pub rcon: RconConfig,
    pub mission_control: MissionControlConfig,
    pub timing: TimingConfig,
    /// Debug-level logging.
    pub verbose: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            log_file: PathBuf::from("/opt/factorio/server.out"),
            server_id: "1".to_string(),
            rcon: RconConfig::default(),
            mission_control: MissionControlConfig::default(),
            timing: TimingConfig::default(),
            verbose: false,
        }
    }
}

/// Factorio RCON endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RconConfig {
    pub host: String,
    pub port: u16,
    pub password: Secret,
}

impl Default for RconConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 31337,
            password: Secret::new("asdasd"),
        }
    }
}

impl RconConfig {
    /// `host:port` suitable for `TcpStream::connect`.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Mission-control WebSocket endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MissionControlConfig {
    pub url: String,
    /// Shared secret sent in the `auth` message after every connect.
    pub password: Secret,
    /// Sub-protocols offered in the WebSocket handshake.
    pub protocols: Vec<String>,
}

impl Default for MissionControlConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:8000/ws_v1/server_callback/1/".to_string(),
            password: Secret::new("asdasd"),
            protocols: vec!["http-only".to_string(), "chat".to_string()],
        }
    }
}

/// Poll intervals, timeouts and retry delays of the bridge loops.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Pause between reads when the log file has no new line.
    pub tail_poll_ms: u64,
    /// Interval of the tailer throughput report.
    pub tail_report_secs: u64,
    /// How long the command and control loops wait on their queues.
    pub queue_wait_secs: u64,
    /// Idle time after which the RCON connection is closed.
    pub rcon_idle_close_secs: u64,
    /// Delay between RCON reconnect attempts.
    pub rcon_retry_secs: u64,
    /// Timeout for RCON connect and for each command round trip.
    pub rcon_io_timeout_secs: u64,
    /// Delay between mission-control reconnect attempts.
    pub control_retry_secs: u64,
    /// Dispatcher pause after a tick that moved messages.
    pub dispatch_busy_ms: u64,
    /// Dispatcher pause after an idle tick.
    pub dispatch_idle_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            tail_poll_ms: 100,
            tail_report_secs: 10,
            queue_wait_secs: 3,
            rcon_idle_close_secs: 30,
            rcon_retry_secs: 1,
            rcon_io_timeout_secs: 10,
            control_retry_secs: 3,
            dispatch_busy_ms: 100,
            dispatch_idle_ms: 500,
        }
    }
}

impl TimingConfig {
    pub const fn tail_poll(&self) -> Duration {
        Duration::from_millis(self.tail_poll_ms)
    }

    pub const fn tail_report(&self) -> Duration {
        Duration::from_secs(self.tail_report_secs)
    }

    pub const fn queue_wait(&self) -> Duration {
        Duration::from_secs(self.queue_wait_secs)
    }

    pub const fn rcon_idle_close(&self) -> Duration {
        Duration::from_secs(self.rcon_idle_close_secs)
    }

    pub const fn rcon_retry(&self) -> Duration {
        Duration::from_secs(self.rcon_retry_secs)
    }

    pub const fn rcon_io_timeout(&self) -> Duration {
        Duration::from_secs(self.rcon_io_timeout_secs)
    }

    pub const fn control_retry(&self) -> Duration {
        Duration::from_secs(self.control_retry_secs)
    }

    pub const fn dispatch_busy(&self) -> Duration {
        Duration::from_millis(self.dispatch_busy_ms)
    }

    pub const fn dispatch_idle(&self) -> Duration {
        Duration::from_millis(self.dispatch_idle_ms)
    }

    /// Every interval must be non-zero; a zero pause turns a loop into a
    /// busy spin.
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("tail_poll_ms", self.tail_poll_ms),
            ("tail_report_secs", self.tail_report_secs),
            ("queue_wait_secs", self.queue_wait_secs),
            ("rcon_idle_close_secs", self.rcon_idle_close_secs),
            ("rcon_retry_secs", self.rcon_retry_secs),
            ("rcon_io_timeout_secs", self.rcon_io_timeout_secs),
            ("control_retry_secs", self.control_retry_secs),
            ("dispatch_busy_ms", self.dispatch_busy_ms),
            ("dispatch_idle_ms", self.dispatch_idle_ms),
        ];
        match fields.iter().find(|(_, value)| *value == 0) {
            Some((name, _)) => Err(Error::Config(format!(
                "timing.{name} must be greater than 0"
            ))),
            None => Ok(()),
        }
    }
}

/// Config files consulted when no explicit path is given, in order.
pub fn default_config_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("/etc/fmcd.toml")];
    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(".fmcd.toml"));
    }
    paths
}

/// Load configuration.
///
/// An explicit path must exist and parse. Without one, the first existing
/// file of [`default_config_paths`] is used, and built-in defaults when none
/// exists.
pub fn load_config(explicit: Option<&Path>) -> Result<BridgeConfig> {
    if let Some(path) = explicit {
        return load_config_file(path);
    }
    match default_config_paths().into_iter().find(|p| p.exists()) {
        Some(path) => load_config_file(&path),
        None => Ok(BridgeConfig::default()),
    }
}

fn load_config_file(path: &Path) -> Result<BridgeConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    let config = parse_config(&content).map_err(|e| {
        Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
    })?;
    config.timing.validate()?;
    tracing::debug!(path = %path.display(), "Loaded config file");
    Ok(config)
}

/// Parse a TOML document; missing keys keep their defaults.
pub fn parse_config(content: &str) -> std::result::Result<BridgeConfig, toml::de::Error> {
    toml::from_str(content)
}
