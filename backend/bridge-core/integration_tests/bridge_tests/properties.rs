use crate::bridge_tests::helpers::{
    batching_config, expect_batch, expect_request, reply_batch, reply_err, reply_ok, settle,
    start_connected, start_offline, test_config,
};

use bridge_core::config::OverflowPolicy;
use bridge_core::wire::ReplyFrame;
use bridge_core::{BridgeError, CallOptions, ConnectionState, Priority};

use std::time::Duration;

use serde_json::json;
use tokio::time::Instant;

/// **VALUE**: Requests issued while connected never touch the offline queue.
///
/// **BUG THIS CATCHES**: Routing through the queue unconditionally, which adds latency and
/// makes queue overflow possible while the channel is healthy.
#[tokio::test(start_paused = true)]
async fn given_connected_when_requests_sent_then_queue_never_used() {
    // GIVEN: A connected bridge
    let (bridge, host) = start_connected(test_config()).await;

    // WHEN: Completing several calls
    for n in 0..5 {
        let call = bridge
            .submit("getFields", json!({"n": n}), CallOptions::new())
            .unwrap();
        let frame = expect_request(&host).await;
        reply_ok(&host, &frame.id, json!(n));
        assert_eq!(call.await.unwrap(), json!(n));
    }

    // THEN: Nothing was queued
    assert_eq!(bridge.metrics().total_queued, 0);
    assert_eq!(bridge.queue_depth(), 0);
}

/// **VALUE**: Requests issued while disconnected reach the host in issue order.
///
/// **WHY THIS MATTERS**: Edits queued offline (rename, then save) must apply in order.
///
/// **BUG THIS CATCHES**: Draining the queue in reverse or hash order.
#[tokio::test(start_paused = true)]
async fn given_disconnected_when_requests_issued_then_drained_in_order() {
    // GIVEN: An offline bridge with three queued requests
    let (bridge, host) = start_offline(test_config()).await;
    let calls: Vec<_> = ["rename", "move", "saveTemplate"]
        .iter()
        .map(|method| bridge.submit(*method, json!({}), CallOptions::new()).unwrap())
        .collect();
    settle().await;
    assert_eq!(bridge.queue_depth(), 3);

    // WHEN: The host comes up
    host.set_available(true);

    // THEN: They arrive in issue order
    for call in &calls {
        let frame = expect_request(&host).await;
        assert_eq!(&frame.id, call.id());
    }
}

/// **VALUE**: success_rate is exactly successes / (successes + failures).
#[tokio::test(start_paused = true)]
async fn given_three_successes_and_one_host_error_when_measured_then_rate_is_three_quarters() {
    // GIVEN: A connected bridge
    let (bridge, host) = start_connected(test_config()).await;

    // WHEN: Three calls succeed and one fails on the host
    for n in 0..4 {
        let call = bridge
            .submit("getFields", json!({}), CallOptions::new())
            .unwrap();
        let frame = expect_request(&host).await;
        if n == 3 {
            reply_err(&host, &frame.id, json!({"code": "E_DENIED"}));
            let err = call.await.unwrap_err();
            assert_eq!(err.host_payload(), Some(&json!({"code": "E_DENIED"})));
        } else {
            reply_ok(&host, &frame.id, json!(n));
            call.await.unwrap();
        }
    }

    // THEN: 3 / 4
    let metrics = bridge.metrics();
    assert_eq!(metrics.success_rate, 0.75);
    assert_eq!(metrics.total_requests, 4);
    assert_eq!(metrics.retry_rate, 0.0);
}

/// **VALUE**: Host errors are final and never retried.
///
/// **BUG THIS CATCHES**: Resending a non-idempotent call the host already rejected.
#[tokio::test(start_paused = true)]
async fn given_host_error_when_replied_then_not_retried() {
    let (bridge, host) = start_connected(test_config()).await;
    let call = bridge
        .submit("saveTemplate", json!({}), CallOptions::new())
        .unwrap();
    let frame = expect_request(&host).await;

    reply_err(&host, &frame.id, json!("conflict"));
    assert!(matches!(call.await.unwrap_err(), BridgeError::Host { .. }));

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert!(host.try_next_frame().is_none());
    assert_eq!(bridge.metrics().total_retries, 0);
}

/// **VALUE**: Both batch flush triggers: size fills immediately, the window flushes after
/// `max_window`.
///
/// **BUG THIS CATCHES**: Only one trigger implemented, so either bursts wait or singletons
/// never leave.
#[tokio::test(start_paused = true)]
async fn given_batch_limits_when_size_or_window_reached_then_flushed() {
    // GIVEN: Batches of at most two, 50ms window
    let mut config = batching_config(&["getFields"]);
    config.batch.max_size = 2;
    let (bridge, host) = start_connected(config).await;

    // WHEN: Two calls fill the batch
    let started = Instant::now();
    let _a = bridge.submit("getFields", json!(1), CallOptions::new()).unwrap();
    let _b = bridge.submit("getFields", json!(2), CallOptions::new()).unwrap();
    let full = expect_batch(&host).await;

    // THEN: Flushed without waiting for the window
    assert_eq!(full.items.len(), 2);
    assert!(started.elapsed() < Duration::from_millis(50));

    // WHEN: A single call opens a new window
    let started = Instant::now();
    let _c = bridge.submit("getFields", json!(3), CallOptions::new()).unwrap();
    let single = expect_batch(&host).await;

    // THEN: It flushes once the window elapses, under a new batch id
    assert_eq!(single.items.len(), 1);
    assert!(started.elapsed() >= Duration::from_millis(50));
    assert_ne!(single.batch_id, full.batch_id);
}

/// **VALUE**: High priority calls bypass batching even for batchable methods.
#[tokio::test(start_paused = true)]
async fn given_high_priority_batchable_call_when_sent_then_sent_alone() {
    let (bridge, host) = start_connected(batching_config(&["getFields"])).await;

    let _call = bridge
        .submit(
            "getFields",
            json!({}),
            CallOptions::new().with_priority(Priority::High),
        )
        .unwrap();

    let frame = expect_request(&host).await;
    assert_eq!(frame.method, "getFields");
}

/// **VALUE**: EvictOldest rejects the oldest queued request with QueueOverflow.
///
/// **WHY THIS MATTERS**: A long outage must not grow memory without bound, and the evicted
/// caller must learn its request will never be sent.
#[tokio::test(start_paused = true)]
async fn given_full_queue_when_another_request_issued_then_oldest_overflows() {
    // GIVEN: An offline bridge with room for two
    let mut config = test_config();
    config.queue.capacity = 2;
    let (bridge, _host) = start_offline(config).await;

    // WHEN: Issuing three requests
    let first = bridge.submit("a", json!({}), CallOptions::new()).unwrap();
    let _second = bridge.submit("b", json!({}), CallOptions::new()).unwrap();
    let _third = bridge.submit("c", json!({}), CallOptions::new()).unwrap();

    // THEN: The first is evicted and the queue stays at capacity
    let err = first.await.unwrap_err();
    assert!(
        matches!(err, BridgeError::QueueOverflow { capacity: 2, .. }),
        "got {err:?}"
    );
    settle().await;
    assert_eq!(bridge.queue_depth(), 2);
}

/// **VALUE**: RejectNewest refuses the new request with ChannelClosed.
#[tokio::test(start_paused = true)]
async fn given_full_queue_with_reject_newest_when_request_issued_then_channel_closed() {
    let mut config = test_config();
    config.queue.capacity = 1;
    config.queue.overflow = OverflowPolicy::RejectNewest;
    let (bridge, _host) = start_offline(config).await;

    let _first = bridge.submit("a", json!({}), CallOptions::new()).unwrap();
    let second = bridge.submit("b", json!({}), CallOptions::new()).unwrap();

    let err = second.await.unwrap_err();
    assert!(matches!(err, BridgeError::ChannelClosed { .. }), "got {err:?}");
    assert_ne!(bridge.connection_state(), ConnectionState::Connected);
}

/// **VALUE**: A call with an enormous timeout does not take the bridge down.
///
/// **WHY THIS MATTERS**: Timeouts come from callers. One bad value must not fail every
/// other request on the bridge.
///
/// **BUG THIS CATCHES**: Overflowing `Instant + Duration` when computing the deadline,
/// which panics the actor.
#[tokio::test(start_paused = true)]
async fn given_call_with_duration_max_timeout_when_sent_then_bridge_keeps_serving() {
    // GIVEN: A connected bridge and a call that effectively never times out
    let (bridge, host) = start_connected(test_config()).await;
    let slow = bridge
        .submit(
            "exportAll",
            json!({}),
            CallOptions::new().with_timeout(Duration::MAX),
        )
        .unwrap();
    let slow_frame = expect_request(&host).await;

    // WHEN: Another call is made
    let call = bridge
        .submit("getFields", json!({}), CallOptions::new())
        .unwrap();
    let frame = expect_request(&host).await;
    reply_ok(&host, &frame.id, json!(["title"]));

    // THEN: Both calls complete on the same live bridge
    assert_eq!(call.await.unwrap(), json!(["title"]));
    reply_ok(&host, &slow_frame.id, json!("exported"));
    assert_eq!(slow.await.unwrap(), json!("exported"));
    assert_eq!(bridge.connection_state(), ConnectionState::Connected);
}

/// **VALUE**: Send failures retry on the backoff schedule without waiting for the
/// deadline, and exhausted send failures reject with ChannelClosed.
///
/// **WHY THIS MATTERS**: A channel that refuses writes should fail fast. Waiting out a
/// 5s deadline per attempt would freeze the UI for 15s.
///
/// **BUG THIS CATCHES**: Treating a failed write as in flight, or reporting it as Timeout.
#[tokio::test(start_paused = true)]
async fn given_channel_refusing_writes_when_called_then_retried_then_channel_closed() {
    // GIVEN: A bridge that believes it is connected but whose host end is gone
    let (bridge, host) = start_connected(test_config()).await;
    drop(host);
    let started = Instant::now();

    // WHEN: Calling with the default three attempts
    let err = bridge
        .call("saveTemplate", json!({}), CallOptions::new())
        .await
        .unwrap_err();

    // THEN: ChannelClosed after the 250ms + 500ms backoff, well before any deadline
    assert_eq!(err.error_category(), "channel_closed", "got {err:?}");
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(750), "{elapsed:?}");
    assert!(elapsed < Duration::from_millis(800), "{elapsed:?}");

    let metrics = bridge.metrics();
    assert_eq!(metrics.total_retries, 2);
    assert_eq!(metrics.total_failures, 1);
    assert_eq!(metrics.total_timeouts, 0);
}

/// **VALUE**: A batch window that flushes while the channel is down moves its requests
/// into the offline queue, and they are batched again after reconnecting.
///
/// **BUG THIS CATCHES**: Writing the batch to a dead channel and losing the requests, or
/// failing them instead of queueing.
#[tokio::test(start_paused = true)]
async fn given_open_batch_window_when_link_drops_before_flush_then_requests_queued_and_replayed() {
    // GIVEN: One batchable request sitting in the 50ms window
    let (bridge, host) = start_connected(batching_config(&["getFields"])).await;
    let call = bridge
        .submit("getFields", json!({}), CallOptions::new())
        .unwrap();
    settle().await;

    // WHEN: The link drops and the window elapses before the 250ms reconnect
    host.drop_link();
    bridge
        .wait_for_state(ConnectionState::Disconnected)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(60)).await;

    // THEN: The request waits in the queue and nothing was written
    assert_eq!(bridge.queue_depth(), 1);
    assert_eq!(bridge.metrics().total_queued, 1);
    assert!(host.try_next_frame().is_none());

    // THEN: After reconnecting it goes out in a batch and resolves
    let batch = expect_batch(&host).await;
    assert_eq!(batch.items.len(), 1);
    assert_eq!(&batch.items[0].id, call.id());
    reply_batch(
        &host,
        &batch.batch_id,
        vec![ReplyFrame::success(call.id().clone(), json!(["title"]))],
    );
    assert_eq!(call.await.unwrap(), json!(["title"]));
    assert_eq!(bridge.queue_depth(), 0);
}
