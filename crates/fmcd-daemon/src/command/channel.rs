//! Serialized command delivery with transparent reconnection.

use std::time::Duration;

use fmcd_core::config::TimingConfig;
use fmcd_core::protocol::AdminCommand;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, timeout};
use tracing::{debug, info, warn};

use super::executor::{CommandExecutor, ExecutorConnector};
use crate::rcon::RconError;
use crate::reconnect::{self, ReconnectPolicy};
use crate::shutdown;

/// Printed on the server console after every (re)connect so operators can
/// see the bridge attach.
pub const ANNOUNCE_COMMAND: &str = "/silent-command print('FactorioMCd connected.')";

/// Connection state of the command channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

/// Outcome of one execution attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attempt {
    Executed,
    /// The server can never take this command; the session is still fine.
    Rejected,
    /// The session broke and has been closed.
    Failed,
}

/// Timing of the command channel loop.
#[derive(Debug, Clone)]
pub struct CommandSettings {
    /// How long one wait on the queue lasts before idle bookkeeping runs.
    pub wait_timeout: Duration,
    /// Close the session after this long without a command.
    pub idle_close: Duration,
    pub reconnect: ReconnectPolicy,
}

impl CommandSettings {
    pub const fn from_timing(timing: &TimingConfig) -> Self {
        Self {
            wait_timeout: timing.queue_wait(),
            idle_close: timing.rcon_idle_close(),
            reconnect: ReconnectPolicy::fixed(timing.rcon_retry()),
        }
    }
}

/// Owns the executor session and drains the command queue one at a time.
pub struct CommandChannel<C: ExecutorConnector> {
    connector: C,
    settings: CommandSettings,
    commands: mpsc::UnboundedReceiver<AdminCommand>,
    session: Option<C::Executor>,
    state: CommandState,
    last_command: Instant,
}

impl<C: ExecutorConnector> CommandChannel<C> {
    /// Create the channel and the sender side of its queue.
    pub fn new(
        connector: C,
        settings: CommandSettings,
    ) -> (Self, mpsc::UnboundedSender<AdminCommand>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let channel = Self {
            connector,
            settings,
            commands: rx,
            session: None,
            state: CommandState::Disconnected,
            last_command: Instant::now(),
        };
        (channel, tx)
    }

    /// Run until shutdown is requested or every sender is dropped.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!("Command channel started");
        self.open_initial_session().await;
        self.last_command = Instant::now();

        loop {
            if shutdown::is_requested(&shutdown) {
                break;
            }
            let next = tokio::select! {
                next = timeout(self.settings.wait_timeout, self.commands.recv()) => next,
                () = shutdown::cancelled(&mut shutdown) => break,
            };
            match next {
                Ok(Some(command)) => {
                    self.last_command = Instant::now();
                    if !self.deliver(&command, &mut shutdown).await {
                        warn!(command = %command, "Command abandoned");
                        if shutdown::is_requested(&shutdown) {
                            break;
                        }
                    }
                }
                Ok(None) => {
                    info!("Command queue closed");
                    break;
                }
                Err(_) => self.close_if_idle().await,
            }
        }

        let mut remaining: usize = 0;
        while self.commands.try_recv().is_ok() {
            remaining += 1;
        }
        if remaining > 0 {
            warn!(remaining, "Dropping queued commands on shutdown");
        }
        if let Some(session) = self.session.take() {
            session.close().await;
        }
        self.set_state(CommandState::Disconnected);
        info!("Command channel stopped");
    }

    async fn open_initial_session(&mut self) {
        self.set_state(CommandState::Connecting);
        match Self::connect_announced(&self.connector).await {
            Ok(session) => {
                self.session = Some(session);
                self.set_state(CommandState::Connected);
                info!("RCON connected");
            }
            Err(e) => {
                warn!(error = %e, "Could not connect to RCON, retry delayed");
                self.set_state(CommandState::Disconnected);
            }
        }
    }

    /// Execute `command`, reconnecting as often as it takes.
    ///
    /// A command the server can never accept is logged and dropped. Returns
    /// `false` only when shutdown interrupted delivery.
    async fn deliver(
        &mut self,
        command: &AdminCommand,
        shutdown: &mut watch::Receiver<bool>,
    ) -> bool {
        debug!(command = %command, "Sending command to RCON");
        if self.try_execute(command).await != Attempt::Failed {
            return true;
        }

        loop {
            self.set_state(CommandState::Reconnecting);
            let connector = &self.connector;
            let Some(session) = reconnect::retry(&self.settings.reconnect, "rcon", shutdown, || {
                Self::connect_announced(connector)
            })
            .await
            else {
                self.set_state(CommandState::Disconnected);
                return false;
            };
            self.session = Some(session);
            self.set_state(CommandState::Connected);
            info!("RCON reconnected");

            if self.try_execute(command).await != Attempt::Failed {
                return true;
            }
            // A server that accepts sessions but fails this command must not
            // be reconnected to in a tight loop.
            if shutdown::sleep_or_cancelled(self.settings.reconnect.delay(), shutdown).await {
                self.set_state(CommandState::Disconnected);
                return false;
            }
        }
    }

    /// One attempt on the current session. A failed session is closed.
    async fn try_execute(&mut self, command: &AdminCommand) -> Attempt {
        let Some(session) = self.session.as_mut() else {
            return Attempt::Failed;
        };
        match session.execute(command.as_str()).await {
            Ok(reply) => {
                debug!(command = %command, reply = %reply, "Command executed");
                Attempt::Executed
            }
            Err(e) if e.is_rejected() => {
                warn!(error = %e, len = command.as_str().len(), "Dropping command");
                Attempt::Rejected
            }
            Err(e) => {
                warn!(error = %e, command = %command, "Error sending command to RCON");
                if let Some(failed) = self.session.take() {
                    failed.close().await;
                }
                self.set_state(CommandState::Disconnected);
                Attempt::Failed
            }
        }
    }

    async fn connect_announced(connector: &C) -> Result<C::Executor, RconError> {
        let mut session = connector.connect().await?;
        match session.execute(ANNOUNCE_COMMAND).await {
            Ok(_) => Ok(session),
            Err(e) => {
                session.close().await;
                Err(e)
            }
        }
    }

    async fn close_if_idle(&mut self) {
        if self.session.is_none() || self.last_command.elapsed() < self.settings.idle_close {
            return;
        }
        if let Some(session) = self.session.take() {
            session.close().await;
        }
        self.set_state(CommandState::Disconnected);
        info!(
            idle_secs = self.last_command.elapsed().as_secs(),
            "RCON connection closed due to inactivity"
        );
    }

    fn set_state(&mut self, next: CommandState) {
        if self.state != next {
            debug!(from = ?self.state, to = ?next, "RCON state change");
            self.state = next;
        }
    }
}
