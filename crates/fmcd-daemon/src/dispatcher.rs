//! Translation hub between the tailer, mission control and the game server.
//!
//! The dispatcher owns no connection. Each tick it drains telemetry, then
//! chat, then inbound mission-control messages, applies the mapping rules
//! from `fmcd_core::protocol` and pushes the results onto the outbound or
//! command queue.

use std::time::Duration;

use fmcd_core::config::TimingConfig;
use fmcd_core::protocol::{
    AdminCommand, ChatEvent, InboundMessage, OutboundMessage, TelemetryEvent, commands_for,
};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::shutdown;
use crate::tailer::TailOutput;

/// Items taken from one queue per tick, so a flooded source cannot starve
/// the others.
pub const DRAIN_LIMIT: usize = 64;

#[derive(Debug, Clone)]
pub struct DispatchSettings {
    /// This server's id in `scores` messages.
    pub server_id: String,
    /// Pause after a tick that moved at least one item.
    pub busy_interval: Duration,
    /// Pause after an idle tick.
    pub idle_interval: Duration,
}

impl DispatchSettings {
    pub fn from_timing(server_id: impl Into<String>, timing: &TimingConfig) -> Self {
        Self {
            server_id: server_id.into(),
            busy_interval: timing.dispatch_busy(),
            idle_interval: timing.dispatch_idle(),
        }
    }
}

/// Totals reported when the dispatcher stops.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchStats {
    pub dispatched: u64,
    /// Items still queued at shutdown, per source.
    pub dropped_telemetry: usize,
    pub dropped_chat: usize,
    pub dropped_inbound: usize,
}

impl DispatchStats {
    pub const fn dropped(&self) -> usize {
        self.dropped_telemetry + self.dropped_chat + self.dropped_inbound
    }
}

/// Where translated items go.
struct Router {
    server_id: String,
    outbound: mpsc::UnboundedSender<OutboundMessage>,
    commands: mpsc::UnboundedSender<AdminCommand>,
}

impl Router {
    fn telemetry(&self, raw: &str) {
        let event = TelemetryEvent::parse(raw);
        match event.to_outbound() {
            Ok(Some(message)) => {
                debug!(key = %event.key, namespace = %message.namespace, "Forwarding telemetry");
                self.emit(message);
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Dropping telemetry line"),
        }
    }

    fn chat(&self, chat: &ChatEvent) {
        debug!(username = %chat.username, channel = %chat.namespace, "Forwarding chat");
        self.emit(chat.to_outbound());
    }

    fn inbound(&self, message: &InboundMessage) {
        match commands_for(message, &self.server_id) {
            Ok(commands) => {
                for command in commands {
                    debug!(command = %command, "Queueing command");
                    if self.commands.send(command).is_err() {
                        warn!("Command queue closed, command dropped");
                    }
                }
            }
            Err(e) => warn!(error = %e, "Dropping mission-control message"),
        }
    }

    fn emit(&self, message: OutboundMessage) {
        if self.outbound.send(message).is_err() {
            warn!("Outbound queue closed, message dropped");
        }
    }
}

pub struct Dispatcher {
    telemetry: mpsc::UnboundedReceiver<String>,
    chat: mpsc::UnboundedReceiver<ChatEvent>,
    inbound: mpsc::UnboundedReceiver<InboundMessage>,
    router: Router,
    busy_interval: Duration,
    idle_interval: Duration,
}

impl Dispatcher {
    pub fn new(
        settings: DispatchSettings,
        tail: TailOutput,
        inbound: mpsc::UnboundedReceiver<InboundMessage>,
        outbound: mpsc::UnboundedSender<OutboundMessage>,
        commands: mpsc::UnboundedSender<AdminCommand>,
    ) -> Self {
        Self {
            telemetry: tail.telemetry,
            chat: tail.chat,
            inbound,
            router: Router {
                server_id: settings.server_id,
                outbound,
                commands,
            },
            busy_interval: settings.busy_interval,
            idle_interval: settings.idle_interval,
        }
    }

    /// Process what is queued right now. Returns the number of items taken.
    pub fn tick(&mut self) -> usize {
        let router = &self.router;
        drain(&mut self.telemetry, |raw| router.telemetry(&raw))
            + drain(&mut self.chat, |chat| router.chat(&chat))
            + drain(&mut self.inbound, |message| router.inbound(&message))
    }

    /// Tick until shutdown. Whatever is still queued then is counted,
    /// logged and dropped.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> DispatchStats {
        info!("Dispatcher started");
        let mut total: u64 = 0;
        loop {
            if shutdown::is_requested(&shutdown) {
                break;
            }
            let moved = self.tick();
            total += moved as u64;
            let pause = if moved > 0 {
                self.busy_interval
            } else {
                self.idle_interval
            };
            if shutdown::sleep_or_cancelled(pause, &mut shutdown).await {
                break;
            }
        }

        let stats = DispatchStats {
            dispatched: total,
            dropped_telemetry: discard(&mut self.telemetry),
            dropped_chat: discard(&mut self.chat),
            dropped_inbound: discard(&mut self.inbound),
        };
        if stats.dropped() > 0 {
            warn!(
                telemetry = stats.dropped_telemetry,
                chat = stats.dropped_chat,
                inbound = stats.dropped_inbound,
                "Dropping queued items on shutdown"
            );
        }
        info!(dispatched = total, "Dispatcher stopped");
        stats
    }
}

fn discard<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> usize {
    rx.close();
    std::iter::from_fn(|| rx.try_recv().ok()).count()
}

fn drain<T>(rx: &mut mpsc::UnboundedReceiver<T>, mut handle: impl FnMut(T)) -> usize {
    let mut taken = 0;
    while taken < DRAIN_LIMIT {
        let Ok(item) = rx.try_recv() else { break };
        handle(item);
        taken += 1;
    }
    taken
}
