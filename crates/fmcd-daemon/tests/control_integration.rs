#![allow(clippy::unwrap_used)] // Integration tests use unwrap for brevity

//! Control channel over a real WebSocket connection.

mod common;

use std::time::Duration;

use fmcd_core::Secret;
use fmcd_core::protocol::{InboundMessage, OutboundMessage};
use fmcd_daemon::control::{ControlChannel, ControlSettings, WsTransport};
use fmcd_daemon::reconnect::ReconnectPolicy;
use fmcd_daemon::shutdown;
use serde_json::json;

use common::{spawn_mission_control, within};

fn settings() -> ControlSettings {
    ControlSettings {
        wait_timeout: Duration::from_millis(100),
        reconnect: ReconnectPolicy::fixed(Duration::from_millis(100)),
    }
}

#[tokio::test]
async fn handshake_auth_and_message_flow() {
    let mut server = spawn_mission_control().await;
    let transport = WsTransport::new(
        server.url.clone(),
        vec!["http-only".to_string(), "chat".to_string()],
    )
    .unwrap();
    let (channel, mut io) = ControlChannel::new(transport, Secret::new("s3cret"), settings());
    let (stop, rx) = shutdown::channel();
    let handle = tokio::spawn(channel.run(rx));

    let mut peer = server.accept().await;
    assert_eq!(peer.offered.as_deref(), Some("http-only, chat"));
    assert_eq!(
        peer.next_json().await,
        json!({"namespace": "auth", "data": {"token": "s3cret"}})
    );

    peer.send_json(&json!({"namespace": "auth", "data": {"authenticated": true}}))
        .await;
    peer.send_raw("{ broken").await;
    peer.send_json(&json!({"namespace": "rconcommand", "data": "/time"}))
        .await;
    assert_eq!(
        within(io.inbound.recv()).await.unwrap(),
        InboundMessage::new("rconcommand", json!("/time"))
    );

    io.outbound
        .send(OutboundMessage::new(
            "updatecounter",
            json!({"type": "rocket-progress", "data": 42}),
        ))
        .unwrap();
    assert_eq!(
        peer.next_json().await,
        json!({"namespace": "updatecounter", "data": {"type": "rocket-progress", "data": 42}})
    );

    stop.send(true).unwrap();
    within(handle).await.unwrap();
}

#[tokio::test]
async fn reconnects_and_reauthenticates_after_server_close() {
    let mut server = spawn_mission_control().await;
    let transport = WsTransport::new(server.url.clone(), Vec::new()).unwrap();
    let (channel, io) = ControlChannel::new(transport, Secret::new("s3cret"), settings());
    let (stop, rx) = shutdown::channel();
    let handle = tokio::spawn(channel.run(rx));

    let mut first = server.accept().await;
    assert_eq!(first.next_json().await["namespace"], "auth");
    first.close().await;

    let mut second = server.accept().await;
    assert_eq!(second.next_json().await["namespace"], "auth");
    io.outbound
        .send(OutboundMessage::new("event", json!({"type": "rocket_launched"})))
        .unwrap();
    assert_eq!(second.next_json().await["namespace"], "event");

    stop.send(true).unwrap();
    within(handle).await.unwrap();
}
