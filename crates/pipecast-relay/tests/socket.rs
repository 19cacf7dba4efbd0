//! End-to-end WebSocket sessions against a served router.
#![cfg(unix)]
#![allow(clippy::unwrap_used, clippy::expect_used)] // Integration tests use unwrap for brevity

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use pipecast_core::{EncoderConfig, SessionConfig};
use pipecast_relay::encoder::FfmpegTranscoder;
use pipecast_relay::registry::SessionRegistry;
use pipecast_relay::server::{AppState, build_router};

const TIMEOUT: Duration = Duration::from_secs(10);

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Serve the relay on an ephemeral port with `program` as the encoder.
async fn boot_server(program: &str) -> (SocketAddr, SessionRegistry) {
    let transcoder = Arc::new(FfmpegTranscoder::new(EncoderConfig {
        program: program.into(),
        ..EncoderConfig::default()
    }));
    let registry = SessionRegistry::new(transcoder, SessionConfig::default());
    let app = build_router(
        AppState {
            registry: registry.clone(),
        },
        "/socket",
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, registry)
}

async fn connect(addr: SocketAddr) -> WsStream {
    let (ws, _) = connect_async(format!("ws://{addr}/socket")).await.unwrap();
    ws
}

async fn start_stream(ws: &mut WsStream) {
    ws.send(Message::text(
        r#"{"event":"start-stream","data":{"destination_base":"rtmp://127.0.0.1/live","key":"k"}}"#,
    ))
    .await
    .unwrap();
}

async fn next_status(ws: &mut WsStream) -> String {
    loop {
        let msg = timeout(TIMEOUT, ws.next())
            .await
            .expect("timed out waiting for status")
            .expect("socket closed")
            .unwrap();
        if let Message::Text(text) = msg {
            let value: serde_json::Value = serde_json::from_str(text.as_str()).unwrap();
            assert_eq!(value["event"], "stream-status");
            return value["data"].as_str().unwrap().to_string();
        }
    }
}

async fn wait_until_empty(registry: &SessionRegistry) {
    timeout(TIMEOUT, async {
        while !registry.is_empty().await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("session was not removed");
}

#[tokio::test]
async fn encoder_lifecycle_reaches_the_client() {
    let (addr, registry) = boot_server("true").await;
    let mut ws = connect(addr).await;

    start_stream(&mut ws).await;
    assert_eq!(next_status(&mut ws).await, "started");
    assert_eq!(next_status(&mut ws).await, "ended");

    ws.close(None).await.unwrap();
    wait_until_empty(&registry).await;
}

#[tokio::test]
async fn spawn_failure_is_reported_and_restart_is_allowed() {
    let (addr, _registry) = boot_server("/nonexistent/pipecast-ffmpeg").await;
    let mut ws = connect(addr).await;

    start_stream(&mut ws).await;
    let status = next_status(&mut ws).await;
    assert!(status.starts_with("error:failed to spawn encoder"), "{status}");

    start_stream(&mut ws).await;
    assert!(next_status(&mut ws).await.starts_with("error:"));
}

#[tokio::test]
async fn statuses_go_only_to_the_owning_socket() {
    let (addr, registry) = boot_server("true").await;
    let mut a = connect(addr).await;
    let mut b = connect(addr).await;

    start_stream(&mut a).await;
    assert_eq!(next_status(&mut a).await, "started");
    assert_eq!(next_status(&mut a).await, "ended");

    assert!(
        timeout(Duration::from_millis(200), b.next()).await.is_err(),
        "idle socket received a frame"
    );

    drop(a);
    drop(b);
    wait_until_empty(&registry).await;
}
