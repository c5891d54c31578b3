use crate::bridge_tests::helpers::{
    batching_config, expect_request, reply_ok, settle, start_connected, start_offline,
    test_config,
};

use bridge_core::{BridgeError, CallOptions};

use serde_json::json;

/// **VALUE**: Cancelling an in-flight request rejects its caller and drops the late reply.
///
/// **WHY THIS MATTERS**: A user navigating away cancels outstanding loads; the reply that
/// arrives afterwards must not resurrect anything.
///
/// **BUG THIS CATCHES**: Would catch if:
/// - Cancellation leaves the pending entry behind
/// - The late reply counts as a success
/// - Cancellations count as failures in success_rate
#[tokio::test(start_paused = true)]
async fn given_in_flight_request_when_cancelled_then_cancelled_and_late_reply_dropped() {
    // GIVEN: A request the host has received
    let (bridge, host) = start_connected(test_config()).await;
    let call = bridge
        .submit("getBlocks", json!({}), CallOptions::new())
        .unwrap();
    let frame = expect_request(&host).await;

    // WHEN: Cancelling, then the host answers anyway
    bridge.cancel(call.id());
    let err = call.await.unwrap_err();
    reply_ok(&host, &frame.id, json!("too late"));
    settle().await;

    // THEN: The caller saw Cancelled and metrics ignore the late reply
    assert!(matches!(err, BridgeError::Cancelled { .. }), "got {err:?}");
    let metrics = bridge.metrics();
    assert_eq!(metrics.total_cancelled, 1);
    assert_eq!(metrics.total_successes, 0);
    assert_eq!(metrics.success_rate, 1.0);
    assert_eq!(bridge.pending_count(), 0);
}

/// **VALUE**: `cancel` on an already-resolved id is a no-op.
///
/// **BUG THIS CATCHES**: Counting a cancellation, or panicking, for a settled request.
#[tokio::test(start_paused = true)]
async fn given_resolved_request_when_cancelled_then_noop() {
    // GIVEN: A request that already resolved
    let (bridge, host) = start_connected(test_config()).await;
    let call = bridge
        .submit("getFields", json!({}), CallOptions::new())
        .unwrap();
    let id = call.id().clone();
    let frame = expect_request(&host).await;
    reply_ok(&host, &frame.id, json!(1));
    assert_eq!(call.await.unwrap(), json!(1));

    // WHEN: Cancelling it
    bridge.cancel(&id);
    settle().await;

    // THEN: Nothing changes
    let metrics = bridge.metrics();
    assert_eq!(metrics.total_cancelled, 0);
    assert_eq!(metrics.total_successes, 1);
}

/// **VALUE**: Cancelling a queued request removes it from the offline queue.
///
/// **BUG THIS CATCHES**: Replaying a cancelled request after reconnect.
#[tokio::test(start_paused = true)]
async fn given_queued_request_when_cancelled_then_removed_and_not_replayed() {
    // GIVEN: Two queued requests
    let (bridge, host) = start_offline(test_config()).await;
    let dropped = bridge
        .submit("getFields", json!({"n": 1}), CallOptions::new())
        .unwrap();
    let kept = bridge
        .submit("getFields", json!({"n": 2}), CallOptions::new())
        .unwrap();
    settle().await;
    assert_eq!(bridge.queue_depth(), 2);

    // WHEN: Cancelling the first and letting the host come up
    bridge.cancel(dropped.id());
    assert!(matches!(
        dropped.await.unwrap_err(),
        BridgeError::Cancelled { .. }
    ));
    settle().await;
    assert_eq!(bridge.queue_depth(), 1);
    host.set_available(true);

    // THEN: Only the second request is replayed
    let frame = expect_request(&host).await;
    assert_eq!(&frame.id, kept.id());
    reply_ok(&host, &frame.id, json!("ok"));
    assert_eq!(kept.await.unwrap(), json!("ok"));
}

/// **VALUE**: Cancelling a request waiting in a batch window keeps it out of the batch.
#[tokio::test(start_paused = true)]
async fn given_batched_request_when_cancelled_then_excluded_from_flush() {
    // GIVEN: Two requests in an open batch window
    let (bridge, host) = start_connected(batching_config(&["getFields"])).await;
    let dropped = bridge
        .submit("getFields", json!({"n": 1}), CallOptions::new())
        .unwrap();
    let kept = bridge
        .submit("getFields", json!({"n": 2}), CallOptions::new())
        .unwrap();

    // WHEN: Cancelling one before the window elapses
    bridge.cancel(dropped.id());

    // THEN: The flushed batch only carries the other
    let batch = match host.next_frame().await.unwrap() {
        bridge_core::wire::Outgoing::Batch(batch) => batch,
        other => panic!("Expected batch, got {other:?}"),
    };
    assert_eq!(batch.items.len(), 1);
    assert_eq!(&batch.items[0].id, kept.id());
    assert!(dropped.await.is_err());
}
