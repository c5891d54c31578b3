// Unit tests for the offline queue.

use crate::config::OverflowPolicy;
use crate::queue::{EnqueueOutcome, OfflineQueue};
use crate::wire::RequestId;

use tokio::time::Instant;

/// **VALUE**: Verifies FIFO order on drain.
///
/// **WHY THIS MATTERS**: Requests issued offline must reach the host in the order issued.
///
/// **BUG THIS CATCHES**: Using a stack or a hash-ordered container.
#[test]
fn given_enqueued_requests_when_drained_then_returned_in_enqueue_order() {
    // GIVEN: Three queued requests
    let mut queue = OfflineQueue::new(10, OverflowPolicy::EvictOldest);
    let now = Instant::now();
    for id in ["a", "b", "c"] {
        assert_eq!(queue.enqueue(RequestId::from(id), now), EnqueueOutcome::Queued);
    }

    // WHEN: Draining
    let drained: Vec<String> = queue
        .drain_all()
        .into_iter()
        .map(|e| e.id.to_string())
        .collect();

    // THEN: Order is preserved and the queue is empty
    assert_eq!(drained, ["a", "b", "c"]);
    assert!(queue.is_empty());
}

/// **VALUE**: Verifies EvictOldest keeps the queue at capacity and reports the victim.
///
/// **WHY THIS MATTERS**: The evicted caller must be rejected; a silent drop hangs it forever.
///
/// **BUG THIS CATCHES**: Evicting the newest entry, or growing past capacity.
#[test]
fn given_full_queue_when_evict_oldest_then_oldest_returned() {
    // GIVEN: A full queue of capacity two
    let mut queue = OfflineQueue::new(2, OverflowPolicy::EvictOldest);
    let now = Instant::now();
    queue.enqueue(RequestId::from("a"), now);
    queue.enqueue(RequestId::from("b"), now);

    // WHEN: Enqueuing a third
    let outcome = queue.enqueue(RequestId::from("c"), now);

    // THEN: "a" is evicted and capacity holds
    match outcome {
        EnqueueOutcome::Evicted(entry) => assert_eq!(entry.id.as_str(), "a"),
        other => panic!("expected eviction, got {other:?}"),
    }
    assert_eq!(queue.len(), 2);
    assert!(queue.contains(&RequestId::from("c")));
}

/// **VALUE**: Verifies RejectNewest leaves the queue untouched.
///
/// **BUG THIS CATCHES**: Queueing the new entry anyway under the reject policy.
#[test]
fn given_full_queue_when_reject_newest_then_rejected() {
    // GIVEN: A full queue of capacity one
    let mut queue = OfflineQueue::new(1, OverflowPolicy::RejectNewest);
    let now = Instant::now();
    queue.enqueue(RequestId::from("a"), now);

    // WHEN: Enqueuing another
    let outcome = queue.enqueue(RequestId::from("b"), now);

    // THEN: It is rejected
    assert_eq!(outcome, EnqueueOutcome::Rejected);
    assert!(!queue.contains(&RequestId::from("b")));
    assert_eq!(queue.len(), 1);
}

/// **VALUE**: Verifies cancellation removes exactly one entry.
#[test]
fn given_queued_request_when_removed_then_others_keep_order() {
    // GIVEN: Three queued requests
    let mut queue = OfflineQueue::new(10, OverflowPolicy::EvictOldest);
    let now = Instant::now();
    for id in ["a", "b", "c"] {
        queue.enqueue(RequestId::from(id), now);
    }

    // WHEN: Removing the middle one (twice)
    let first = queue.remove(&RequestId::from("b"));
    let second = queue.remove(&RequestId::from("b"));

    // THEN: Only the first removal reports success
    assert!(first);
    assert!(!second);
    let ids: Vec<String> = queue.drain_all().into_iter().map(|e| e.id.to_string()).collect();
    assert_eq!(ids, ["a", "c"]);
}
