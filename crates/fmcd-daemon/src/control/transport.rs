//! Text-message transport to mission control.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, trace};

use super::error::ControlError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// An open duplex connection carrying JSON text frames.
pub trait MessageConnection: Send {
    fn send_text(&mut self, text: String)
    -> impl Future<Output = Result<(), ControlError>> + Send;

    /// Next text frame, or `None` once the peer has closed the connection.
    ///
    /// Must be cancel safe: it is raced against the outbound queue.
    fn recv_text(&mut self) -> impl Future<Output = Option<Result<String, ControlError>>> + Send;

    fn close(self) -> impl Future<Output = ()> + Send;
}

/// Opens [`MessageConnection`]s to mission control.
pub trait MessageTransport: Send + Sync + 'static {
    type Connection: MessageConnection;

    fn connect(&self) -> impl Future<Output = Result<Self::Connection, ControlError>> + Send;
}

/// WebSocket client transport.
#[derive(Debug, Clone)]
pub struct WsTransport {
    url: String,
    protocols: Vec<String>,
}

impl WsTransport {
    /// Validate `url` up front so a typo is a start-up error rather than an
    /// endless reconnect loop. Only plain `ws://` is supported.
    pub fn new(url: String, protocols: Vec<String>) -> Result<Self, ControlError> {
        let request = url
            .as_str()
            .into_client_request()
            .map_err(|e| ControlError::Connection(format!("invalid URL {url}: {e}")))?;
        match request.uri().scheme_str() {
            Some("ws") => Ok(Self { url, protocols }),
            other => Err(ControlError::Connection(format!(
                "unsupported URL scheme {other:?} in {url}, expected ws://"
            ))),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl MessageTransport for WsTransport {
    type Connection = WsConnection;

    async fn connect(&self) -> Result<WsConnection, ControlError> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| ControlError::Connection(format!("{}: {e}", self.url)))?;
        if !self.protocols.is_empty() {
            let offered = HeaderValue::from_str(&self.protocols.join(", "))
                .map_err(|e| ControlError::Connection(format!("invalid sub-protocol: {e}")))?;
            request.headers_mut().insert(SEC_WEBSOCKET_PROTOCOL, offered);
        }

        let (stream, response) = timeout(CONNECT_TIMEOUT, connect_async(request))
            .await
            .map_err(|_| ControlError::Connection(format!("{}: connect timed out", self.url)))?
            .map_err(|e| ControlError::Connection(format!("{}: {e}", self.url)))?;
        debug!(
            status = %response.status(),
            protocol = ?response.headers().get(SEC_WEBSOCKET_PROTOCOL),
            "WebSocket handshake complete"
        );
        Ok(WsConnection { stream })
    }
}

pub struct WsConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl MessageConnection for WsConnection {
    async fn send_text(&mut self, text: String) -> Result<(), ControlError> {
        self.stream
            .send(Message::Text(text))
            .await
            .map_err(|e| ControlError::Send(e.to_string()))
    }

    async fn recv_text(&mut self) -> Option<Result<String, ControlError>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text)),
                Ok(Message::Close(frame)) => {
                    debug!(frame = ?frame, "Close frame from mission control");
                    return None;
                }
                Ok(other) => trace!(kind = ?other, "Ignoring non-text frame"),
                Err(e) => return Some(Err(ControlError::Stream(e.to_string()))),
            }
        }
    }

    async fn close(mut self) {
        let _ = self.stream.close(None).await;
    }
}
