//! `FactorioMCd` Daemon
//!
//! Tails a Factorio server's console log, forwards telemetry and chat to
//! mission control over WebSocket and runs the commands mission control
//! sends back through RCON.

use std::path::PathBuf;

use clap::Parser;
use tracing::info;

use fmcd_core::config::{BridgeConfig, load_config};
use fmcd_core::{Secret, tracing_init};
use fmcd_daemon::control::WsTransport;
use fmcd_daemon::rcon::RconConnector;
use fmcd_daemon::shutdown;
use fmcd_daemon::supervisor::Supervisor;

#[derive(Parser, Debug)]
#[command(name = "fmcd")]
#[command(version, about = "FactorioMCd - Factorio to mission control bridge")]
struct Args {
    /// TOML config file (default: /etc/fmcd.toml, then ~/.fmcd.toml)
    #[arg(short, long, env = "FMCD_CONFIG")]
    config: Option<PathBuf>,

    /// Factorio server console log to tail
    #[arg(long, env = "FMCD_LOG_FILE")]
    log_file: Option<PathBuf>,

    /// This server's id in mission control
    #[arg(long, env = "FMCD_SERVER_ID")]
    server_id: Option<String>,

    #[arg(long, env = "FMCD_RCON_HOST")]
    rcon_host: Option<String>,

    #[arg(long, env = "FMCD_RCON_PORT")]
    rcon_port: Option<u16>,

    #[arg(long, env = "FMCD_RCON_PASSWORD", hide_env_values = true)]
    rcon_password: Option<String>,

    /// Mission-control WebSocket URL
    #[arg(long, env = "FMCD_WS_URL")]
    ws_url: Option<String>,

    /// Shared secret for the mission-control auth handshake
    #[arg(long, env = "FMCD_WS_PASSWORD", hide_env_values = true)]
    ws_password: Option<String>,

    /// Debug-level logging
    #[arg(short, long, env = "FMCD_VERBOSE")]
    verbose: bool,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long, env = "FMCD_LOG_JSON")]
    log_json: bool,
}

impl Args {
    /// Layer command-line and environment values over the file config.
    fn apply_to(self, config: &mut BridgeConfig) {
        if let Some(path) = self.log_file {
            config.log_file = path;
        }
        if let Some(id) = self.server_id {
            config.server_id = id;
        }
        if let Some(host) = self.rcon_host {
            config.rcon.host = host;
        }
        if let Some(port) = self.rcon_port {
            config.rcon.port = port;
        }
        if let Some(password) = self.rcon_password {
            config.rcon.password = Secret::new(password);
        }
        if let Some(url) = self.ws_url {
            config.mission_control.url = url;
        }
        if let Some(password) = self.ws_password {
            config.mission_control.password = Secret::new(password);
        }
        config.verbose |= self.verbose;
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let log_json = args.log_json;

    let mut config = load_config(args.config.as_deref())?;
    args.apply_to(&mut config);
    tracing_init::init_tracing(&tracing_init::default_filter(config.verbose), log_json);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        log_file = %config.log_file.display(),
        server_id = %config.server_id,
        rcon = %config.rcon.address(),
        ws_url = %config.mission_control.url,
        "Starting fmcd"
    );

    let transport = WsTransport::new(
        config.mission_control.url.clone(),
        config.mission_control.protocols.clone(),
    )?;
    let connector = RconConnector::new(
        config.rcon.address(),
        config.rcon.password.clone(),
        config.timing.rcon_io_timeout(),
    );

    let (shutdown_tx, shutdown_rx) = shutdown::channel();
    let supervisor = tokio::spawn(Supervisor::new(config, connector, transport).run(shutdown_rx));

    #[cfg(unix)]
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    #[cfg(unix)]
    sd_notify::notify(true, &[sd_notify::NotifyState::Ready])?;

    #[cfg(unix)]
    let sigterm_future = sigterm.recv();
    #[cfg(not(unix))]
    let sigterm_future = std::future::pending::<Option<()>>();

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, terminating");
        }
        _ = sigterm_future => {
            info!("Received SIGTERM, terminating");
        }
    }

    let _ = shutdown_tx.send(true);
    supervisor.await?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn cli_values_override_file_values() {
        let args = Args::try_parse_from([
            "fmcd",
            "--server-id",
            "2",
            "--rcon-port",
            "27015",
            "--ws-password",
            "hunter2",
            "-v",
        ])
        .unwrap();
        let mut config = BridgeConfig::default();
        config.rcon.host = "factorio.lan".into();

        args.apply_to(&mut config);

        assert_eq!(config.server_id, "2");
        assert_eq!(config.rcon.address(), "factorio.lan:27015");
        assert_eq!(config.mission_control.password.expose(), "hunter2");
        assert!(config.verbose);
    }

    #[test]
    fn absent_flags_keep_the_file_config() {
        let args = Args::try_parse_from(["fmcd"]).unwrap();
        let mut config = BridgeConfig::default();
        config.server_id = "7".into();
        let expected = config.clone();

        args.apply_to(&mut config);

        assert_eq!(config, expected);
    }
}
