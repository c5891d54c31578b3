use crate::bridge_tests::helpers::{
    expect_request, reply_ok, settle, start_connected, test_config,
};

use bridge_core::wire::{Incoming, Outgoing};
use bridge_core::{Bridge, BridgeConfig, BridgeError, CallOptions, ConnectionState, memory_pair};

use serde_json::json;

fn probing_config() -> BridgeConfig {
    let mut config = test_config();
    config.health.interval_ms = 1_000;
    config.health.degraded_interval_ms = 250;
    config.health.misses_before_degraded = 2;
    config
}

/// Latest probe sequence written by the bridge so far.
fn latest_ping(host: &bridge_core::MemoryHost) -> Option<u64> {
    let mut latest = None;
    while let Some(frame) = host.try_next_frame() {
        if let Outgoing::Ping(seq) = frame {
            latest = Some(seq);
        }
    }
    latest
}

/// **VALUE**: Unanswered probes degrade the connection and a pong restores it.
///
/// **WHY THIS MATTERS**: Degraded tells the UI the host is slow without tearing down a
/// connection that is merely busy.
///
/// **BUG THIS CATCHES**: Would catch if:
/// - Missed probes are never counted
/// - Recovery from Degraded requires a reconnect
#[tokio::test(start_paused = true)]
async fn given_silent_host_when_probes_missed_then_degraded_and_pong_recovers() {
    // GIVEN: A connected bridge probing every second
    let (bridge, host) = start_connected(probing_config()).await;

    // WHEN: The host ignores probes
    bridge
        .wait_for_state(ConnectionState::Degraded)
        .await
        .unwrap();

    // THEN: Degraded still sends
    assert!(bridge.connection_state().can_send());

    // WHEN: The host answers the latest probe
    let seq = latest_ping(&host).expect("bridge should have probed");
    host.send(&Incoming::Pong(seq)).unwrap();

    // THEN: Back to Connected
    bridge
        .wait_for_state(ConnectionState::Connected)
        .await
        .unwrap();
}

/// **VALUE**: Continued silence while Degraded drops the connection and reconnects.
///
/// **BUG THIS CATCHES**: Staying Degraded forever on a dead host, or never reconnecting.
#[tokio::test(start_paused = true)]
async fn given_degraded_when_silence_continues_then_disconnected_and_reconnected() {
    // GIVEN: A degraded bridge
    let (bridge, host) = start_connected(probing_config()).await;
    bridge
        .wait_for_state(ConnectionState::Degraded)
        .await
        .unwrap();

    // WHEN: One more probe goes unanswered
    bridge
        .wait_for_state(ConnectionState::Disconnected)
        .await
        .unwrap();

    // THEN: The bridge reconnects with backoff
    bridge
        .wait_for_state(ConnectionState::Connected)
        .await
        .unwrap();
    assert_eq!(host.connect_count(), 2);
}

/// **VALUE**: A request in flight when the host drops the link completes after reconnect.
///
/// **WHY THIS MATTERS**: Short host restarts must be invisible to callers.
///
/// **BUG THIS CATCHES**: Would catch if:
/// - A stale `Closed` tears down the new connection
/// - The retry is written to the dead channel instead of queued or resent
#[tokio::test(start_paused = true)]
async fn given_in_flight_request_when_link_drops_then_retried_on_new_connection() {
    // GIVEN: A request the host received
    let (bridge, host) = start_connected(test_config()).await;
    let call = bridge
        .submit("saveTemplate", json!({"v": 1}), CallOptions::new())
        .unwrap();
    let first = expect_request(&host).await;

    // WHEN: The host drops the link before answering
    host.drop_link();
    bridge
        .wait_for_state(ConnectionState::Disconnected)
        .await
        .unwrap();
    bridge
        .wait_for_state(ConnectionState::Connected)
        .await
        .unwrap();

    // THEN: The request is retried on the new connection and resolves
    let retried = expect_request(&host).await;
    assert_eq!(retried.id, first.id);
    reply_ok(&host, &retried.id, json!("saved"));
    assert_eq!(call.await.unwrap(), json!("saved"));
    assert_eq!(bridge.metrics().total_retries, 1);
}

/// **VALUE**: Shutdown rejects outstanding requests and refuses new ones.
///
/// **BUG THIS CATCHES**: Callers hanging forever after the bridge stops.
#[tokio::test(start_paused = true)]
async fn given_outstanding_request_when_shutdown_then_channel_closed() {
    // GIVEN: One in-flight request
    let (bridge, host) = start_connected(test_config()).await;
    let call = bridge
        .submit("getFields", json!({}), CallOptions::new())
        .unwrap();
    expect_request(&host).await;

    // WHEN: Shutting down
    bridge.shutdown().await;

    // THEN: The call is rejected, the link is closed and new calls fail
    assert!(matches!(
        call.await.unwrap_err(),
        BridgeError::ChannelClosed { .. }
    ));
    assert!(!host.is_linked());
    assert_eq!(bridge.connection_state(), ConnectionState::Disconnected);
    assert!(matches!(
        bridge.submit("getFields", json!({}), CallOptions::new()),
        Err(BridgeError::ChannelClosed { .. })
    ));
}

/// **VALUE**: Dropping every handle stops the actor and closes the transport.
#[tokio::test(start_paused = true)]
async fn given_running_bridge_when_all_handles_dropped_then_transport_closed() {
    // GIVEN: A connected bridge with two handles
    let (transport, host) = memory_pair();
    let bridge = Bridge::start(transport, test_config());
    let clone = bridge.clone();
    bridge
        .wait_for_state(ConnectionState::Connected)
        .await
        .unwrap();

    // WHEN: Dropping both
    drop(bridge);
    drop(clone);
    settle().await;

    // THEN: The link is gone
    assert!(!host.is_linked());
}

/// **VALUE**: Two bridges in one process do not share state.
#[tokio::test(start_paused = true)]
async fn given_two_bridges_when_one_shuts_down_then_other_unaffected() {
    let (first, _first_host) = start_connected(test_config()).await;
    let (second, second_host) = start_connected(test_config()).await;

    first.shutdown().await;

    let call = second
        .submit("getFields", json!({}), CallOptions::new())
        .unwrap();
    let frame = expect_request(&second_host).await;
    reply_ok(&second_host, &frame.id, json!(2));
    assert_eq!(call.await.unwrap(), json!(2));
    assert_eq!(second.connection_state(), ConnectionState::Connected);
}
