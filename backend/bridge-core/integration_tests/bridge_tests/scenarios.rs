use crate::bridge_tests::helpers::{
    batching_config, expect_batch, expect_request, push, reply_batch, reply_ok, settle,
    start_connected, start_offline, test_config,
};

use bridge_core::wire::ReplyFrame;
use bridge_core::{BridgeError, CallOptions, ConnectionState};

use std::time::Duration;

use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// **VALUE**: A `getFields` call made while the host is unreachable is queued, then sent
/// and resolved once the channel comes up.
///
/// **WHY THIS MATTERS**: The UI issues calls during startup before the host is ready. They
/// must complete transparently instead of failing.
///
/// **BUG THIS CATCHES**: Would catch if:
/// - Offline calls are written to a dead channel and lost
/// - The queue is never drained on reconnect
/// - The reply to a replayed request is not matched to the original caller
#[tokio::test(start_paused = true)]
async fn given_host_unreachable_when_get_fields_called_then_queued_and_resolved_after_connect() {
    // GIVEN: A bridge whose host refuses connections
    let (bridge, host) = start_offline(test_config()).await;
    assert_ne!(bridge.connection_state(), ConnectionState::Connected);

    // WHEN: Calling getFields
    let call = bridge
        .submit("getFields", json!({"panel": "p1"}), CallOptions::new())
        .unwrap();
    settle().await;

    // THEN: It waits in the queue and nothing reaches the host
    assert_eq!(bridge.queue_depth(), 1);
    assert!(host.try_next_frame().is_none());

    // WHEN: The host becomes reachable
    host.set_available(true);
    bridge
        .wait_for_state(ConnectionState::Connected)
        .await
        .unwrap();

    // THEN: The request is replayed and its reply resolves the call
    let frame = expect_request(&host).await;
    assert_eq!(&frame.id, call.id());
    assert_eq!(frame.method, "getFields");
    assert_eq!(frame.params, json!({"panel": "p1"}));
    reply_ok(&host, &frame.id, json!(["title", "body"]));

    assert_eq!(call.await.unwrap(), json!(["title", "body"]));
    assert_eq!(bridge.queue_depth(), 0);

    let metrics = bridge.metrics();
    assert_eq!(metrics.total_queued, 1);
    assert_eq!(metrics.total_successes, 1);
}

/// **VALUE**: A `saveTemplate` call the host never answers is sent `max_attempts` times with
/// backoff between attempts, then fails with `Timeout` exactly once.
///
/// **WHY THIS MATTERS**: Callers need a definite outcome; a silent host must not leave a
/// future pending forever, and retries must follow the configured schedule.
///
/// **BUG THIS CATCHES**: Would catch if:
/// - The request is retried more or fewer than `max_attempts` times
/// - Timeouts are measured from creation instead of the latest send
/// - The pending entry survives the final timeout
#[tokio::test(start_paused = true)]
async fn given_silent_host_when_save_template_called_then_retried_then_timeout() {
    // GIVEN: A connected bridge, 5s timeout, 3 attempts, 250ms doubling backoff
    let (bridge, host) = start_connected(test_config()).await;
    let started = Instant::now();

    // WHEN: Calling saveTemplate and never replying
    let call = bridge
        .submit("saveTemplate", json!({"name": "invoice"}), CallOptions::new())
        .unwrap();

    // THEN: The same request goes out three times
    for attempt in 1..=3 {
        let frame = expect_request(&host).await;
        assert_eq!(&frame.id, call.id(), "attempt {attempt} reuses the id");
        assert_eq!(frame.method, "saveTemplate");
    }

    // THEN: The caller gets Timeout after every attempt's deadline and both backoffs
    let err = call.await.unwrap_err();
    match err {
        BridgeError::Timeout {
            ref method,
            attempts,
            ..
        } => {
            assert_eq!(method, "saveTemplate");
            assert_eq!(attempts, 3);
        }
        other => panic!("Expected Timeout, got {other:?}"),
    }
    assert!(started.elapsed() >= Duration::from_millis(3 * 5_000 + 250 + 500));
    assert!(host.try_next_frame().is_none(), "no fourth attempt");

    let metrics = bridge.metrics();
    assert_eq!(metrics.total_retries, 2);
    assert_eq!(metrics.total_timeouts, 1);
    assert_eq!(metrics.total_failures, 1);
    assert_eq!(bridge.pending_count(), 0);
}

/// **VALUE**: Three batchable calls issued within one window travel as one batch frame and
/// are resolved from one batch reply, matched by id.
///
/// **WHY THIS MATTERS**: Batching cuts per-message overhead during panel loads; a mismatch
/// between items and callers would hand one panel another panel's data.
///
/// **BUG THIS CATCHES**: Would catch if:
/// - Each call is sent separately despite batching
/// - Batch replies are matched by position instead of id
#[tokio::test(start_paused = true)]
async fn given_three_batchable_calls_in_one_window_when_flushed_then_one_frame_and_all_resolved()
{
    // GIVEN: getFields is batchable
    let (bridge, host) = start_connected(batching_config(&["getFields"])).await;

    // WHEN: Issuing three calls back to back
    let calls: Vec<_> = ["a", "b", "c"]
        .iter()
        .map(|panel| {
            bridge
                .submit("getFields", json!({"panel": panel}), CallOptions::new())
                .unwrap()
        })
        .collect();

    // THEN: One batch frame carries all three in call order
    let batch = expect_batch(&host).await;
    let ids: Vec<_> = batch.items.iter().map(|item| item.id.clone()).collect();
    let expected: Vec<_> = calls.iter().map(|call| call.id().clone()).collect();
    assert_eq!(ids, expected);
    assert!(host.try_next_frame().is_none());

    // WHEN: The host answers out of order
    let items = batch
        .items
        .iter()
        .rev()
        .map(|item| ReplyFrame::success(item.id.clone(), item.params["panel"].clone()))
        .collect();
    reply_batch(&host, &batch.batch_id, items);

    // THEN: Each caller gets its own answer
    for (call, panel) in calls.into_iter().zip(["a", "b", "c"]) {
        assert_eq!(call.await.unwrap(), json!(panel));
    }
}

/// **VALUE**: A `fieldsUpdated` push reaches subscribed listeners.
///
/// **WHY THIS MATTERS**: Panels refresh on host-side edits only through pushes.
///
/// **BUG THIS CATCHES**: Would catch if pushes (frames without an id) were dropped as
/// unmatched replies.
#[tokio::test(start_paused = true)]
async fn given_subscriber_when_fields_updated_pushed_then_listener_receives_payload() {
    // GIVEN: A listener on fieldsUpdated
    let (bridge, host) = start_connected(test_config()).await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let _subscription = bridge.subscribe("fieldsUpdated", move |payload| {
        let _ = tx.send(payload.clone());
    });

    // WHEN: The host pushes
    push(&host, "fieldsUpdated", json!({"fields": ["title"]}));

    // THEN: The listener sees the payload
    assert_eq!(rx.recv().await.unwrap(), json!({"fields": ["title"]}));
}

/// **VALUE**: An unsubscribed listener stops receiving pushes.
#[tokio::test(start_paused = true)]
async fn given_unsubscribed_listener_when_pushed_then_not_called() {
    // GIVEN: A listener that unsubscribed, and one that stays
    let (bridge, host) = start_connected(test_config()).await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let gone_tx = tx.clone();
    let gone = bridge.subscribe("fieldsUpdated", move |_| {
        let _ = gone_tx.send("gone");
    });
    let _kept = bridge.subscribe("fieldsUpdated", move |_| {
        let _ = tx.send("kept");
    });
    assert!(gone.unsubscribe());

    // WHEN: The host pushes
    push(&host, "fieldsUpdated", json!(null));
    settle().await;

    // THEN: Only the remaining listener ran
    assert_eq!(rx.recv().await.unwrap(), "kept");
    assert!(rx.try_recv().is_err());
}

/// **VALUE**: A reply with an unknown id but a topic is delivered as a push.
#[tokio::test(start_paused = true)]
async fn given_unmatched_reply_with_topic_when_received_then_routed_to_listeners() {
    let (bridge, host) = start_connected(test_config()).await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let _subscription = bridge.subscribe("selectionChanged", move |payload| {
        let _ = tx.send(payload.clone());
    });

    let mut frame = ReplyFrame::success("not-a-request".into(), json!({"block": 7}));
    frame.topic = Some("selectionChanged".to_string());
    host.send(&bridge_core::wire::Incoming::Reply(frame)).unwrap();

    assert_eq!(rx.recv().await.unwrap(), json!({"block": 7}));
}
