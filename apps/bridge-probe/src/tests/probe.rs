// Unit tests for a probe run over an in-memory host.

use crate::args::ProbeArgs;
use crate::error::ProbeError;
use crate::probe::run_with;

use bridge_core::wire::{Incoming, Outgoing, PushFrame, ReplyFrame};
use bridge_core::{BridgeConfig, MemoryHost, memory_pair};

use serde_json::{Value, json};

fn args(watch: &[&str], method: &str) -> ProbeArgs {
    ProbeArgs {
        watch: watch.iter().map(|t| t.to_string()).collect(),
        url: "ws://unused".to_string(),
        method: method.to_string(),
        params: json!({"id": 1}),
    }
}

fn config() -> BridgeConfig {
    let mut config = BridgeConfig::default();
    config.health.interval_ms = 0;
    config
}

/// Answer the first request with `reply`, pushing `pushes` just before it.
fn spawn_host(host: MemoryHost, pushes: Vec<(&'static str, Value)>, reply: Result<Value, Value>) {
    tokio::spawn(async move {
        let Some(Outgoing::Request(request)) = host.next_frame().await else {
            return;
        };
        for (topic, payload) in pushes {
            let _ = host.send(&Incoming::Push(PushFrame {
                topic: topic.to_string(),
                payload,
            }));
        }
        let frame = match reply {
            Ok(value) => ReplyFrame::success(request.id, value),
            Err(error) => ReplyFrame::failure(request.id, error),
        };
        let _ = host.send(&Incoming::Reply(frame));
        // Keep the link up until the bridge shuts down
        while host.next_frame().await.is_some() {}
    });
}

/// **VALUE**: Verifies the probe returns the reply and the watched pushes.
///
/// **BUG THIS CATCHES**: Pushes on unwatched topics leaking into output, or
/// pushes received before the reply being lost.
#[tokio::test(start_paused = true)]
async fn given_host_replies_when_probe_runs_then_reply_and_watched_pushes_returned() {
    // GIVEN: A host that pushes on two topics and then replies
    let (transport, host) = memory_pair();
    spawn_host(
        host,
        vec![("progress", json!(50)), ("other", json!("ignored"))],
        Ok(json!({"fields": ["a", "b"]})),
    );

    // WHEN: Probing with one watched topic
    let outcome = run_with(transport, &args(&["progress"], "getFields"), config())
        .await
        .unwrap();

    // THEN: Reply plus the watched push only
    assert_eq!(outcome.reply, json!({"fields": ["a", "b"]}));
    assert_eq!(outcome.pushes, vec![("progress".to_string(), json!(50))]);
}

/// **VALUE**: Verifies a host error reply surfaces as a Call error.
#[tokio::test(start_paused = true)]
async fn given_host_error_when_probe_runs_then_call_error_with_host_category() {
    // GIVEN: A host that rejects the call
    let (transport, host) = memory_pair();
    spawn_host(host, Vec::new(), Err(json!({"code": 404})));

    // WHEN: Probing
    let result = run_with(transport, &args(&[], "getFields"), config()).await;

    // THEN: Host category
    match result {
        Err(ProbeError::Call { category, .. }) => assert_eq!(category, "host"),
        other => panic!("Expected Call error, got {other:?}"),
    }
}

/// **VALUE**: Verifies an unreachable host fails after the connect timeout.
///
/// **WHY THIS MATTERS**: Without the bound the probe would wait in the
/// offline queue forever.
#[tokio::test(start_paused = true)]
async fn given_unreachable_host_when_probe_runs_then_connect_error() {
    // GIVEN: A host refusing connections and a short connect timeout
    let (transport, host) = memory_pair();
    host.set_available(false);
    let mut config = config();
    config.transport.connect_timeout_ms = 200;

    // WHEN: Probing
    let result = run_with(transport, &args(&[], "getFields"), config).await;

    // THEN: Connect error
    assert!(matches!(result, Err(ProbeError::Connect { .. })), "{result:?}");
}
