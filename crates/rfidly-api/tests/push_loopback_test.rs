#![allow(clippy::unwrap_used)]
// End-to-end tests for `PushHandle` against an in-process push service.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use url::Url;

use rfidly_api::{PushConfig, PushHandle, PushState, ReconnectConfig};

/// Accept one client, announce the connection, and forward every frame the
/// client sends to `seen`. After the first subscribe, push one scan event.
async fn spawn_service(seen: mpsc::UnboundedSender<Value>) -> Url {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

        let established = json!({
            "event": "pusher:connection_established",
            "data": json!({ "socket_id": "1.1", "activity_timeout": 120 }).to_string()
        });
        ws.send(Message::Text(established.to_string().into()))
            .await
            .unwrap();

        while let Some(Ok(Message::Text(text))) = ws.next().await {
            let frame: Value = serde_json::from_str(&text).unwrap();
            let _ = seen.send(frame.clone());
            if frame["event"] == "pusher:subscribe" {
                let channel = frame["data"]["channel"].clone();
                let ack = json!({
                    "event": "pusher_internal:subscription_succeeded",
                    "channel": channel,
                    "data": "{}"
                });
                ws.send(Message::Text(ack.to_string().into())).await.unwrap();

                let scan = json!({
                    "event": "tag-scanned",
                    "channel": channel,
                    "data": json!({
                        "epc": "E2A", "rssi": "-50.00",
                        "timestamp": "2025-05-01T09:00:00Z", "mode": "single"
                    }).to_string()
                });
                ws.send(Message::Text(scan.to_string().into())).await.unwrap();

                let ping = json!({ "event": "pusher:ping", "data": {} });
                ws.send(Message::Text(ping.to_string().into())).await.unwrap();
            }
        }
    });

    Url::parse(&format!("ws://{addr}")).unwrap()
}

#[tokio::test]
async fn test_join_receives_decoded_events_and_answers_ping() {
    let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
    let host = spawn_service(seen_tx).await;

    let mut config = PushConfig::new("local-key", "ap1");
    config.host = Some(host);
    config.reconnect = ReconnectConfig {
        max_retries: Some(0),
        ..ReconnectConfig::default()
    };

    let cancel = CancellationToken::new();
    let handle = PushHandle::connect(config, cancel.clone()).unwrap();
    let mut events = handle.events();

    assert!(handle.join("rfid-scan"));
    assert!(!handle.join("rfid-scan"), "second join must be a no-op");

    let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.channel, "rfid-scan");
    assert_eq!(event.event, "tag-scanned");
    assert_eq!(event.data["epc"], "E2A");
    assert_eq!(*handle.state().borrow(), PushState::Connected);

    let mut frames = Vec::new();
    while frames.len() < 2 {
        let frame = tokio::time::timeout(Duration::from_secs(5), seen_rx.recv())
            .await
            .unwrap()
            .unwrap();
        frames.push(frame["event"].as_str().unwrap_or_default().to_owned());
    }
    // Exactly one subscribe for the channel, then the pong.
    assert_eq!(frames, vec!["pusher:subscribe", "pusher:pong"]);

    handle.shutdown();
}
