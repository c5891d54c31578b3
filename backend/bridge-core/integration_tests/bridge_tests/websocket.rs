//! End-to-end tests over a real WebSocket on localhost.

use bridge_core::wire::{Incoming, Outgoing, PushFrame, ReplyFrame};
use bridge_core::{Bridge, CallOptions, ConnectionState, WebSocketTransport};

use crate::bridge_tests::helpers::test_config;

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::spawn as TokioSpawn;
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

/// Test helper: start a host that answers every request with `{"echo": method}` and
/// announces each answer with an `echoed` push.
async fn start_echo_host() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test host");
    let addr = listener.local_addr().expect("Failed to read local addr");

    TokioSpawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            TokioSpawn(async move {
                let Ok(ws) = accept_async(stream).await else {
                    return;
                };
                let (mut write, mut read) = ws.split();

                while let Some(Ok(message)) = read.next().await {
                    if !(message.is_binary() || message.is_text()) {
                        continue;
                    }
                    let Ok(frame) = Outgoing::decode(&message.into_data()) else {
                        continue;
                    };

                    let replies = match frame {
                        Outgoing::Request(request) => vec![
                            Incoming::Reply(ReplyFrame::success(
                                request.id,
                                json!({"echo": request.method}),
                            )),
                            Incoming::Push(PushFrame {
                                topic: "echoed".to_string(),
                                payload: json!(request.method),
                            }),
                        ],
                        Outgoing::Ping(seq) => vec![Incoming::Pong(seq)],
                        Outgoing::Batch(_) => Vec::new(),
                    };

                    for reply in replies {
                        let bytes = reply.encode().expect("Failed to encode reply");
                        if write.send(Message::Binary(bytes.into())).await.is_err() {
                            return;
                        }
                    }
                }
            });
        }
    });

    addr
}

/// **VALUE**: Verifies a call round-trips over a real WebSocket.
///
/// **WHY THIS MATTERS**: The memory transport cannot catch framing mistakes such as
/// sending text where the host expects binary, or losing the reader task.
///
/// **BUG THIS CATCHES**: Would catch if:
/// - The writer task never flushes frames
/// - Incoming binary frames are not forwarded to the bridge
/// - Pushes and replies on the same socket are confused
#[tokio::test]
async fn given_websocket_host_when_call_made_then_reply_and_push_received() {
    // GIVEN: A bridge connected to a local echo host
    let addr = start_echo_host().await;
    let transport = WebSocketTransport::parse(&format!("ws://{addr}")).unwrap();
    let bridge = Bridge::start(transport, test_config());
    tokio::time::timeout(
        Duration::from_secs(5),
        bridge.wait_for_state(ConnectionState::Connected),
    )
    .await
    .expect("connect timed out")
    .unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let _subscription = bridge.subscribe("echoed", move |payload| {
        let _ = tx.send(payload.clone());
    });

    // WHEN: Calling a method
    let value = tokio::time::timeout(
        Duration::from_secs(5),
        bridge.call("getFields", json!({}), CallOptions::new()),
    )
    .await
    .expect("call timed out")
    .unwrap();

    // THEN: Reply and push both arrive
    assert_eq!(value, json!({"echo": "getFields"}));
    let pushed = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("push timed out");
    assert_eq!(pushed, Some(json!("getFields")));

    bridge.shutdown().await;
}

/// **VALUE**: Verifies an unreachable host leaves the bridge offline with calls queued.
#[tokio::test]
async fn given_no_host_when_call_submitted_then_queued() {
    // GIVEN: A port with nothing listening
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let transport = WebSocketTransport::parse(&format!("ws://{addr}")).unwrap();
    let bridge = Bridge::start(transport, test_config());

    // WHEN: Submitting a call
    let _call = bridge
        .submit("getFields", json!({}), CallOptions::new())
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    // THEN: It waits in the queue
    assert_eq!(bridge.queue_depth(), 1);
    assert_ne!(bridge.connection_state(), ConnectionState::Connected);

    bridge.shutdown().await;
}

/// **VALUE**: Verifies non-WebSocket URLs are refused up front.
#[test]
fn given_http_url_when_transport_built_then_error() {
    assert!(WebSocketTransport::parse("http://127.0.0.1:1").is_err());
    assert!(WebSocketTransport::parse("not a url").is_err());
}
