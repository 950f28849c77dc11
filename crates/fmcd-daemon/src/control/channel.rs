//! Connection lifecycle and message pumping for mission control.

use std::time::Duration;

use fmcd_core::Secret;
use fmcd_core::config::TimingConfig;
use fmcd_core::protocol::{InboundMessage, OutboundMessage};
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::error::ControlError;
use super::transport::{MessageConnection, MessageTransport};
use crate::reconnect::{self, ReconnectPolicy};
use crate::shutdown;

/// Connection state of the control channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlState {
    Disconnected,
    Connecting,
    /// Auth message sent, acknowledgement not seen yet.
    AuthPending,
    Authenticated,
}

#[derive(Debug, Clone)]
pub struct ControlSettings {
    /// Longest single wait on the outbound queue.
    pub wait_timeout: Duration,
    pub reconnect: ReconnectPolicy,
}

impl ControlSettings {
    pub const fn from_timing(timing: &TimingConfig) -> Self {
        Self {
            wait_timeout: timing.queue_wait(),
            reconnect: ReconnectPolicy::fixed(timing.control_retry()),
        }
    }
}

/// Queue ends handed to the dispatcher.
#[derive(Debug)]
pub struct ControlIo {
    /// Decoded non-auth messages from mission control.
    pub inbound: mpsc::UnboundedReceiver<InboundMessage>,
    /// Messages to deliver to mission control.
    pub outbound: mpsc::UnboundedSender<OutboundMessage>,
}

/// Why a session ended.
enum SessionEnd {
    Shutdown,
    Disconnected(String),
}

pub struct ControlChannel<T: MessageTransport> {
    transport: T,
    token: Secret,
    settings: ControlSettings,
    outbound: mpsc::UnboundedReceiver<OutboundMessage>,
    inbound: mpsc::UnboundedSender<InboundMessage>,
    state: ControlState,
}

impl<T: MessageTransport> ControlChannel<T> {
    pub fn new(transport: T, token: Secret, settings: ControlSettings) -> (Self, ControlIo) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let channel = Self {
            transport,
            token,
            settings,
            outbound: outbound_rx,
            inbound: inbound_tx,
            state: ControlState::Disconnected,
        };
        let io = ControlIo {
            inbound: inbound_rx,
            outbound: outbound_tx,
        };
        (channel, io)
    }

    /// Keep a session open until shutdown, reconnecting whenever it drops.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!("Control channel started");
        loop {
            self.set_state(ControlState::Connecting);
            let transport = &self.transport;
            let Some(conn) = reconnect::retry(
                &self.settings.reconnect,
                "mission-control",
                &mut shutdown,
                || transport.connect(),
            )
            .await
            else {
                break;
            };
            info!("WebSocket connection established");

            match self.session(conn, &mut shutdown).await {
                SessionEnd::Shutdown => break,
                SessionEnd::Disconnected(reason) => {
                    info!(reason = %reason, "Connection to mission control closed");
                    self.set_state(ControlState::Disconnected);
                    let delay = self.settings.reconnect.delay();
                    if shutdown::sleep_or_cancelled(delay, &mut shutdown).await {
                        break;
                    }
                }
            }
        }

        self.set_state(ControlState::Disconnected);
        let mut pending: usize = 0;
        while self.outbound.try_recv().is_ok() {
            pending += 1;
        }
        if pending > 0 {
            warn!(pending, "Dropping undelivered outbound messages on shutdown");
        }
        info!("Control channel stopped");
    }

    async fn session(
        &mut self,
        mut conn: T::Connection,
        shutdown: &mut watch::Receiver<bool>,
    ) -> SessionEnd {
        self.set_state(ControlState::AuthPending);
        let auth = OutboundMessage::auth(self.token.expose());
        if let Err(e) = Self::send(&mut conn, &auth).await {
            conn.close().await;
            return SessionEnd::Disconnected(e.to_string());
        }

        loop {
            tokio::select! {
                () = shutdown::cancelled(shutdown) => {
                    conn.close().await;
                    return SessionEnd::Shutdown;
                }
                frame = conn.recv_text() => match frame {
                    Some(Ok(text)) => self.handle_frame(&text),
                    Some(Err(e)) => {
                        conn.close().await;
                        return SessionEnd::Disconnected(e.to_string());
                    }
                    None => return SessionEnd::Disconnected("closed by peer".to_string()),
                },
                next = timeout(self.settings.wait_timeout, self.outbound.recv()) => match next {
                    Ok(Some(message)) => {
                        if let Err(e) = Self::send(&mut conn, &message).await {
                            warn!(
                                error = %e,
                                namespace = %message.namespace,
                                "Dropping outbound message"
                            );
                            conn.close().await;
                            return SessionEnd::Disconnected(e.to_string());
                        }
                    }
                    Ok(None) => {
                        info!("Outbound queue closed");
                        conn.close().await;
                        return SessionEnd::Shutdown;
                    }
                    Err(_) => {}
                },
            }
        }
    }

    fn handle_frame(&mut self, text: &str) {
        match InboundMessage::decode(text) {
            Ok(message) if message.is_auth() => {
                debug!(data = %message.data, "Auth response");
                self.set_state(ControlState::Authenticated);
            }
            Ok(message) => {
                debug!(namespace = ?message.namespace, "Got a mission-control message");
                if self.inbound.send(message).is_err() {
                    debug!("Inbound queue closed, message discarded");
                }
            }
            Err(e) => warn!(error = %e, frame = %text, "Could not decode mission-control message"),
        }
    }

    async fn send(conn: &mut T::Connection, message: &OutboundMessage) -> Result<(), ControlError> {
        let text = message.to_json()?;
        debug!(namespace = %message.namespace, "Sending message to mission control");
        conn.send_text(text).await
    }

    fn set_state(&mut self, next: ControlState) {
        if self.state != next {
            debug!(from = ?self.state, to = ?next, "Control state change");
            self.state = next;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use serde_json::{Value, json};
    use tokio::task::JoinHandle;

    use super::*;

    struct FakeConnection {
        incoming: mpsc::UnboundedReceiver<String>,
        outgoing: mpsc::UnboundedSender<String>,
    }

    impl MessageConnection for FakeConnection {
        async fn send_text(&mut self, text: String) -> Result<(), ControlError> {
            self.outgoing
                .send(text)
                .map_err(|_| ControlError::Send("peer gone".into()))
        }

        async fn recv_text(&mut self) -> Option<Result<String, ControlError>> {
            self.incoming.recv().await.map(Ok)
        }

        async fn close(self) {}
    }

    /// The mission-control side of one fake connection.
    struct Peer {
        to_bridge: mpsc::UnboundedSender<String>,
        from_bridge: mpsc::UnboundedReceiver<String>,
    }

    impl Peer {
        async fn next_json(&mut self) -> Value {
            serde_json::from_str(&self.from_bridge.recv().await.unwrap()).unwrap()
        }
    }

    /// Hands out queued connections; refuses when none is queued.
    #[derive(Clone, Default)]
    struct FakeTransport {
        ready: Arc<Mutex<VecDeque<FakeConnection>>>,
    }

    impl FakeTransport {
        fn accept_one(&self) -> Peer {
            let (to_bridge, incoming) = mpsc::unbounded_channel();
            let (outgoing, from_bridge) = mpsc::unbounded_channel();
            self.ready.lock().unwrap().push_back(FakeConnection { incoming, outgoing });
            Peer {
                to_bridge,
                from_bridge,
            }
        }
    }

    impl MessageTransport for FakeTransport {
        type Connection = FakeConnection;

        async fn connect(&self) -> Result<FakeConnection, ControlError> {
            self.ready
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| ControlError::Connection("refused".into()))
        }
    }

    fn start(transport: &FakeTransport) -> (ControlIo, watch::Sender<bool>, JoinHandle<()>) {
        let settings = ControlSettings {
            wait_timeout: Duration::from_secs(3),
            reconnect: ReconnectPolicy::fixed(Duration::from_secs(3)),
        };
        let (channel, io) = ControlChannel::new(transport.clone(), Secret::new("s3cret"), settings);
        let (stop, rx) = shutdown::channel();
        (io, stop, tokio::spawn(channel.run(rx)))
    }

    fn auth_json() -> Value {
        json!({"namespace": "auth", "data": {"token": "s3cret"}})
    }

    #[tokio::test(start_paused = true)]
    async fn auth_is_sent_first_then_outbound() {
        let transport = FakeTransport::default();
        let mut peer = transport.accept_one();
        let (io, stop, handle) = start(&transport);

        io.outbound
            .send(OutboundMessage::new("event", json!({"type": "rocket_launched"})))
            .unwrap();

        assert_eq!(peer.next_json().await, auth_json());
        assert_eq!(
            peer.next_json().await,
            json!({"namespace": "event", "data": {"type": "rocket_launched"}})
        );
        stop.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn inbound_auth_and_garbage_are_not_forwarded() {
        let transport = FakeTransport::default();
        let mut peer = transport.accept_one();
        let (mut io, stop, handle) = start(&transport);
        assert_eq!(peer.next_json().await, auth_json());

        for frame in [
            r#"{"namespace":"auth","data":{"ok":true}}"#,
            "not json",
            "[1, 2, 3]",
            r#"{"namespace":"victory","data":{"winner":true}}"#,
        ] {
            peer.to_bridge.send(frame.to_string()).unwrap();
        }

        let forwarded = io.inbound.recv().await.unwrap();
        assert_eq!(forwarded, InboundMessage::new("victory", json!({"winner": true})));
        assert!(io.inbound.try_recv().is_err());

        stop.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn outbound_waits_through_reconnect_and_auth_is_resent() {
        let transport = FakeTransport::default();
        let mut first = transport.accept_one();
        let (io, stop, handle) = start(&transport);
        assert_eq!(first.next_json().await, auth_json());

        drop(first);
        tokio::time::sleep(Duration::from_secs(1)).await;
        io.outbound
            .send(OutboundMessage::new("chat", json!({"message": "hi"})))
            .unwrap();
        let mut second = transport.accept_one();

        assert_eq!(second.next_json().await, auth_json());
        assert_eq!(
            second.next_json().await,
            json!({"namespace": "chat", "data": {"message": "hi"}})
        );
        stop.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn refused_connections_are_retried() {
        let transport = FakeTransport::default();
        let (_io, stop, handle) = start(&transport);

        tokio::time::sleep(Duration::from_secs(10)).await;
        let mut peer = transport.accept_one();
        assert_eq!(peer.next_json().await, auth_json());

        stop.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn shutdown_stops_an_idle_session() {
        let transport = FakeTransport::default();
        let mut peer = transport.accept_one();
        let (_io, stop, handle) = start(&transport);
        assert_eq!(peer.next_json().await, auth_json());

        stop.send(true).unwrap();
        tokio::time::timeout(Duration::from_millis(500), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
