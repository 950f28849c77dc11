//! Wires the loops together and owns their lifecycle.

use fmcd_core::BridgeConfig;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::command::{CommandChannel, CommandSettings, ExecutorConnector};
use crate::control::{ControlChannel, ControlSettings, MessageTransport};
use crate::dispatcher::{DispatchSettings, Dispatcher};
use crate::tailer::{LogTailer, TailConfig};

/// Starts the tailer, command and control loops as tasks, runs the
/// dispatcher in place and joins everything once shutdown is requested.
pub struct Supervisor<C, T> {
    config: BridgeConfig,
    connector: C,
    transport: T,
}

impl<C: ExecutorConnector, T: MessageTransport> Supervisor<C, T> {
    pub const fn new(config: BridgeConfig, connector: C, transport: T) -> Self {
        Self {
            config,
            connector,
            transport,
        }
    }

    pub async fn run(self, shutdown: watch::Receiver<bool>) {
        let timing = &self.config.timing;

        let (tailer, tail_output) = LogTailer::new(TailConfig {
            path: self.config.log_file.clone(),
            poll_interval: timing.tail_poll(),
            report_interval: timing.tail_report(),
        });
        let (commands, command_tx) =
            CommandChannel::new(self.connector, CommandSettings::from_timing(timing));
        let (control, control_io) = ControlChannel::new(
            self.transport,
            self.config.mission_control.password.clone(),
            ControlSettings::from_timing(timing),
        );
        let dispatcher = Dispatcher::new(
            DispatchSettings::from_timing(self.config.server_id.clone(), timing),
            tail_output,
            control_io.inbound,
            control_io.outbound,
            command_tx,
        );

        info!(
            log_file = %self.config.log_file.display(),
            server_id = %self.config.server_id,
            rcon = %self.config.rcon.address(),
            "Starting bridge loops"
        );
        let tailer_handle = tokio::spawn(tailer.run(shutdown.clone()));
        let command_handle = tokio::spawn(commands.run(shutdown.clone()));
        let control_handle = tokio::spawn(control.run(shutdown.clone()));

        dispatcher.run(shutdown).await;

        debug!("Stopping log tailer");
        join("log tailer", tailer_handle).await;
        debug!("Stopping command channel");
        join("command channel", command_handle).await;
        debug!("Stopping control channel");
        join("control channel", control_handle).await;

        info!("Terminated");
    }
}

async fn join<R>(name: &'static str, handle: JoinHandle<R>) {
    if let Err(e) = handle.await {
        error!(task = name, error = %e, "Task failed");
    }
}
