// Unit tests for the batch aggregator.

use crate::batch::BatchAggregator;
use crate::wire::RequestId;

use std::time::Duration;

use tokio::time::Instant;

fn ids(n: usize) -> Vec<RequestId> {
    (0..n).map(|i| RequestId::from(format!("req-{i}"))).collect()
}

/// **VALUE**: Verifies the size trigger flushes exactly when the window fills.
///
/// **WHY THIS MATTERS**: Large bursts must not wait for the time window.
///
/// **BUG THIS CATCHES**: Flushing one request late (len > max_size) or early.
#[test]
fn given_max_size_three_when_third_request_added_then_window_returned_in_order() {
    // GIVEN: An aggregator holding at most three requests
    let mut batch = BatchAggregator::new(3, Duration::from_millis(50));
    let now = Instant::now();
    let ids = ids(3);

    // WHEN: Adding three requests
    assert!(batch.add(ids[0].clone(), now).is_none());
    assert!(batch.add(ids[1].clone(), now).is_none());
    let window = batch.add(ids[2].clone(), now);

    // THEN: The third add returns the full window, in insertion order
    let window = window.expect("window should flush at max size");
    assert_eq!(window.ids(), ids.as_slice());
    assert_eq!(batch.pending_len(), 0);
    assert!(batch.deadline().is_none());
}

/// **VALUE**: Verifies the time trigger.
///
/// **WHY THIS MATTERS**: A lone batchable request must not wait forever.
///
/// **BUG THIS CATCHES**: Deadline computed from the last add instead of window open.
#[test]
fn given_open_window_when_max_window_elapses_then_take_due_returns_it() {
    // GIVEN: A window opened at t0 with two requests added later
    let mut batch = BatchAggregator::new(10, Duration::from_millis(50));
    let t0 = Instant::now();
    batch.add(RequestId::from("a"), t0);
    batch.add(RequestId::from("b"), t0 + Duration::from_millis(30));

    // WHEN: Checking before and at the deadline
    let early = batch.take_due(t0 + Duration::from_millis(49));
    let due = batch.take_due(t0 + Duration::from_millis(50));

    // THEN: Only the check at the deadline flushes
    assert!(early.is_none());
    assert_eq!(batch.deadline(), None);
    let due = due.expect("window should be due");
    assert_eq!(due.len(), 2);
    assert_eq!(due.opened_at(), t0);
}

/// **VALUE**: Verifies a flushed window is never reused.
///
/// **BUG THIS CATCHES**: New requests landing in an already-sent batch id.
#[test]
fn given_flushed_window_when_new_request_added_then_fresh_window_opens() {
    // GIVEN: A window flushed by size
    let mut batch = BatchAggregator::new(1, Duration::from_millis(50));
    let now = Instant::now();
    let first = batch.add(RequestId::from("a"), now).expect("flush at size 1");

    // WHEN: Adding another request
    let second = batch.add(RequestId::from("b"), now).expect("flush at size 1");

    // THEN: It gets a different batch id
    assert_ne!(first.batch_id(), second.batch_id());
}

/// **VALUE**: Verifies removal for cancellation, including discarding emptied windows.
///
/// **BUG THIS CATCHES**: Sending an empty batch frame after its only request was cancelled.
#[test]
fn given_single_request_window_when_removed_then_window_discarded() {
    // GIVEN: A window with one request
    let mut batch = BatchAggregator::new(10, Duration::from_millis(50));
    let id = RequestId::from("only");
    batch.add(id.clone(), Instant::now());

    // WHEN: Removing it
    let removed = batch.remove(&id);

    // THEN: No window remains
    assert!(removed);
    assert!(batch.deadline().is_none());
    assert!(batch.take().is_none());
    assert!(!batch.remove(&id));
}
