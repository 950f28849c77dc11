//! Loopback stand-ins for the Factorio RCON port and mission control.

#![allow(dead_code, clippy::unwrap_used)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;

use fmcd_daemon::rcon::packet::{
    Packet, SERVERDATA_AUTH, SERVERDATA_AUTH_RESPONSE, SERVERDATA_RESPONSE_VALUE,
};

/// Upper bound for any single wait in the integration tests.
pub const STEP: Duration = Duration::from_secs(5);

pub async fn within<F: Future>(future: F) -> F::Output {
    tokio::time::timeout(STEP, future).await.unwrap()
}

/// Commands received by the fake RCON server, tagged with the index of the
/// connection that carried them.
pub struct FakeRcon {
    pub addr: String,
    pub commands: mpsc::UnboundedReceiver<(usize, String)>,
}

/// Serve RCON on `listener`. With `drop_first` the first connection is cut
/// right after it has answered one command.
pub fn serve_rcon(listener: TcpListener, password: &'static str, drop_first: bool) -> FakeRcon {
    let addr = listener.local_addr().unwrap().to_string();
    let (tx, commands) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let mut index = 0;
        while let Ok((stream, _)) = listener.accept().await {
            let limit = (drop_first && index == 0).then_some(1);
            tokio::spawn(rcon_session(stream, index, password, limit, tx.clone()));
            index += 1;
        }
    });
    FakeRcon { addr, commands }
}

pub async fn spawn_rcon(password: &'static str, drop_first: bool) -> FakeRcon {
    serve_rcon(TcpListener::bind("127.0.0.1:0").await.unwrap(), password, drop_first)
}

async fn rcon_session(
    mut stream: TcpStream,
    index: usize,
    password: &str,
    limit: Option<usize>,
    tx: mpsc::UnboundedSender<(usize, String)>,
) {
    let Ok(auth) = Packet::read_from(&mut stream).await else {
        return;
    };
    assert_eq!(auth.kind, SERVERDATA_AUTH);
    let id = if auth.body == password { auth.id } else { -1 };
    Packet::new(id, SERVERDATA_AUTH_RESPONSE, "")
        .write_to(&mut stream)
        .await
        .unwrap();

    let mut served = 0;
    while let Ok(command) = Packet::read_from(&mut stream).await {
        let _ = tx.send((index, command.body.clone()));
        Packet::new(command.id, SERVERDATA_RESPONSE_VALUE, "")
            .write_to(&mut stream)
            .await
            .unwrap();
        served += 1;
        if limit == Some(served) {
            return;
        }
    }
}

/// Mission-control side of one accepted WebSocket connection.
pub struct WsPeer {
    /// `Sec-WebSocket-Protocol` offered by the client.
    pub offered: Option<String>,
    stream: WebSocketStream<TcpStream>,
}

impl WsPeer {
    pub async fn next_json(&mut self) -> Value {
        loop {
            match within(self.stream.next()).await.unwrap().unwrap() {
                Message::Text(text) => return serde_json::from_str(&text).unwrap(),
                _ => continue,
            }
        }
    }

    pub async fn send_json(&mut self, value: &Value) {
        self.stream
            .send(Message::Text(value.to_string()))
            .await
            .unwrap();
    }

    pub async fn send_raw(&mut self, text: &str) {
        self.stream.send(Message::Text(text.to_string())).await.unwrap();
    }

    pub async fn close(mut self) {
        let _ = self.stream.close(None).await;
    }
}

pub struct FakeMissionControl {
    pub url: String,
    pub connections: mpsc::UnboundedReceiver<WsPeer>,
}

impl FakeMissionControl {
    pub async fn accept(&mut self) -> WsPeer {
        within(self.connections.recv()).await.unwrap()
    }
}

/// Accept WebSocket clients, agreeing to the first offered sub-protocol.
pub async fn spawn_mission_control() -> FakeMissionControl {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}/ws_v1/server_callback/1/", listener.local_addr().unwrap());
    let (tx, connections) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let offered = Arc::new(Mutex::new(None));
            let seen = Arc::clone(&offered);
            let callback = move |request: &Request, mut response: Response| {
                if let Some(value) = request.headers().get(SEC_WEBSOCKET_PROTOCOL) {
                    let text = value.to_str().unwrap().to_string();
                    if let Some(first) = text.split(',').map(str::trim).find(|p| !p.is_empty()) {
                        response
                            .headers_mut()
                            .insert(SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_str(first).unwrap());
                    }
                    *seen.lock().unwrap() = Some(text);
                }
                Ok::<_, ErrorResponse>(response)
            };
            let Ok(stream) = tokio_tungstenite::accept_hdr_async(stream, callback).await else {
                continue;
            };
            let offered = offered.lock().unwrap().take();
            let _ = tx.send(WsPeer { offered, stream });
        }
    });
    FakeMissionControl { url, connections }
}
