//! The websocket channel against a local echo server

use std::time::Duration;

use serde_json::json;

use jobmarket_lib::{ChannelState, SessionChannel, WebSocketChannel};

use super::harness::{realtime_config, wait_for_state, EchoServer};

async fn next_message(
    inbound: &mut tokio::sync::broadcast::Receiver<jobmarket_lib::RealtimeMessage>,
) -> jobmarket_lib::RealtimeMessage {
    tokio::time::timeout(Duration::from_secs(5), inbound.recv())
        .await
        .expect("no message in time")
        .expect("inbound channel closed")
}

#[tokio::test]
async fn test_handshake_carries_bearer_and_messages_flow_both_ways() {
    let mut server = EchoServer::start().await;
    let channel = WebSocketChannel::new(&realtime_config(&server.url, 0));
    let mut states = channel.state_changes();
    let mut inbound = channel.subscribe();

    channel.connect("a1").await.unwrap();
    assert_eq!(server.next_handshake().await.as_deref(), Some("Bearer a1"));
    wait_for_state(&mut states, ChannelState::Connected).await;

    let welcome = next_message(&mut inbound).await;
    assert_eq!(welcome.event, "welcome");

    assert!(channel.emit("typing", json!({ "conversation_id": "c1" })).await);
    let echo = next_message(&mut inbound).await;
    assert_eq!(echo.event, "echo");
    assert_eq!(
        echo.data,
        json!({ "event": "typing", "data": { "conversation_id": "c1" } })
    );

    channel.disconnect().await;
    assert_eq!(channel.state(), ChannelState::Disconnected);
    channel.disconnect().await;
    assert_eq!(channel.state(), ChannelState::Disconnected);
    assert!(!channel.emit("typing", json!({})).await);
}

#[tokio::test]
async fn test_dropped_connection_reconnects_with_same_token() {
    let mut server = EchoServer::start().await;
    let channel = WebSocketChannel::new(&realtime_config(&server.url, 3));
    let mut states = channel.state_changes();

    channel.connect("a1").await.unwrap();
    assert_eq!(server.next_handshake().await.as_deref(), Some("Bearer a1"));
    wait_for_state(&mut states, ChannelState::Connected).await;

    server.drop_connections();
    wait_for_state(&mut states, ChannelState::Reconnecting).await;
    assert_eq!(server.next_handshake().await.as_deref(), Some("Bearer a1"));
    wait_for_state(&mut states, ChannelState::Connected).await;

    channel.disconnect().await;
}

#[tokio::test]
async fn test_gives_up_after_reconnect_attempts() {
    let mut server = EchoServer::start().await;
    let channel = WebSocketChannel::new(&realtime_config(&server.url, 2));
    let mut states = channel.state_changes();

    channel.connect("a1").await.unwrap();
    server.next_handshake().await;
    wait_for_state(&mut states, ChannelState::Connected).await;

    server.stop();
    wait_for_state(&mut states, ChannelState::Disconnected).await;
    assert!(!channel.emit("typing", json!({})).await);

    // Still safe to close after giving up
    channel.disconnect().await;
    assert_eq!(channel.state(), ChannelState::Disconnected);
}

#[tokio::test]
async fn test_reconnect_replaces_the_session() {
    let mut server = EchoServer::start().await;
    let channel = WebSocketChannel::new(&realtime_config(&server.url, 0));
    let mut states = channel.state_changes();

    channel.connect("a1").await.unwrap();
    assert_eq!(server.next_handshake().await.as_deref(), Some("Bearer a1"));
    wait_for_state(&mut states, ChannelState::Connected).await;

    channel.connect("b1").await.unwrap();
    assert_eq!(server.next_handshake().await.as_deref(), Some("Bearer b1"));
    wait_for_state(&mut states, ChannelState::Connected).await;

    channel.disconnect().await;
}

#[tokio::test]
async fn test_unreachable_server_ends_disconnected() {
    let server = EchoServer::start().await;
    let url = server.url.clone();
    server.stop();
    // Let the listener close
    tokio::time::sleep(Duration::from_millis(50)).await;

    let channel = WebSocketChannel::new(&realtime_config(&url, 1));
    let mut states = channel.state_changes();
    channel.connect("a1").await.unwrap();

    wait_for_state(&mut states, ChannelState::Disconnected).await;
}
