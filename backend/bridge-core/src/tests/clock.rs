// Unit tests for timer instant arithmetic.

use crate::clock::{FAR_FUTURE, instant_after};

use std::time::Duration;

use tokio::time::Instant;

/// **VALUE**: Verifies ordinary delays are added exactly.
#[test]
fn given_small_delay_when_added_then_exact() {
    let now = Instant::now();

    assert_eq!(instant_after(now, Duration::from_millis(250)), now + Duration::from_millis(250));
}

/// **VALUE**: Verifies a delay past the representable range clamps instead of panicking.
///
/// **WHY THIS MATTERS**: Call timeouts come straight from callers; a panic here would
/// stop the actor and fail every request on the bridge.
///
/// **BUG THIS CATCHES**: Plain `Instant + Duration`, which panics on overflow.
#[test]
fn given_duration_max_when_added_then_clamped_to_far_future() {
    let now = Instant::now();

    let at = instant_after(now, Duration::MAX);

    assert_eq!(at, now + FAR_FUTURE);
}
