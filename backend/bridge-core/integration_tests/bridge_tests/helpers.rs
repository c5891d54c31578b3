//! Test helpers for bridge integration tests.
//!
//! Most tests run the bridge against a [`MemoryHost`] with tokio's clock
//! paused, so timeouts, backoff and batch windows elapse instantly and
//! deterministically.

use bridge_core::wire::{
    BatchReplyFrame, BatchRequestFrame, Incoming, Outgoing, PushFrame, ReplyFrame, RequestFrame,
};
use bridge_core::{Bridge, BridgeConfig, ConnectionState, MemoryHost, RequestId, memory_pair};

use std::time::Duration;

use serde_json::Value;

/// Config with probing off and no jitter.
pub fn test_config() -> BridgeConfig {
    let mut config = BridgeConfig::default();
    config.health.interval_ms = 0;
    config.retry.jitter = 0.0;
    config
}

/// Same as [`test_config`] with `methods` on the batch allow-list.
pub fn batching_config(methods: &[&str]) -> BridgeConfig {
    let mut config = test_config();
    config.batch.methods = methods.iter().map(|m| m.to_string()).collect();
    config
}

/// Start a bridge over a memory channel and wait until it is connected.
pub async fn start_connected(config: BridgeConfig) -> (Bridge, MemoryHost) {
    let (transport, host) = memory_pair();
    let bridge = Bridge::start(transport, config);
    bridge
        .wait_for_state(ConnectionState::Connected)
        .await
        .expect("bridge should connect");
    (bridge, host)
}

/// Start a bridge whose host refuses connections, and let the first attempt fail.
pub async fn start_offline(config: BridgeConfig) -> (Bridge, MemoryHost) {
    let (transport, host) = memory_pair();
    host.set_available(false);
    let bridge = Bridge::start(transport, config);
    bridge
        .wait_for_state(ConnectionState::Disconnected)
        .await
        .expect("bridge should report disconnected");
    settle().await;
    (bridge, host)
}

/// Let the actor drain its mailboxes without letting meaningful time pass.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

/// Next frame, which must be a single request.
pub async fn expect_request(host: &MemoryHost) -> RequestFrame {
    match host.next_frame().await.expect("bridge stopped sending") {
        Outgoing::Request(frame) => frame,
        other => panic!("Expected a single request, got {other:?}"),
    }
}

/// Next frame, which must be a batch.
pub async fn expect_batch(host: &MemoryHost) -> BatchRequestFrame {
    match host.next_frame().await.expect("bridge stopped sending") {
        Outgoing::Batch(frame) => frame,
        other => panic!("Expected a batch, got {other:?}"),
    }
}

pub fn reply_ok(host: &MemoryHost, id: &RequestId, value: Value) {
    host.send(&Incoming::Reply(ReplyFrame::success(id.clone(), value)))
        .expect("Failed to send reply");
}

pub fn reply_err(host: &MemoryHost, id: &RequestId, error: Value) {
    host.send(&Incoming::Reply(ReplyFrame::failure(id.clone(), error)))
        .expect("Failed to send reply");
}

pub fn reply_batch(host: &MemoryHost, batch_id: &str, items: Vec<ReplyFrame>) {
    host.send(&Incoming::BatchReply(BatchReplyFrame {
        batch_id: batch_id.to_string(),
        items,
    }))
    .expect("Failed to send batch reply");
}

pub fn push(host: &MemoryHost, topic: &str, payload: Value) {
    host.send(&Incoming::Push(PushFrame {
        topic: topic.to_string(),
        payload,
    }))
    .expect("Failed to send push");
}
