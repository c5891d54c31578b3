// Unit tests for the retry coordinator.

use crate::config::RetryConfig;
use crate::retry::RetryPolicy;

use std::time::Duration;

use backoff::backoff::Backoff;

fn policy() -> RetryPolicy {
    RetryPolicy::from_config(&RetryConfig::default())
}

/// **VALUE**: Pins the un-jittered delay curve: 250ms doubling up to the 8s cap.
///
/// **WHY THIS MATTERS**: Every retry and reconnect waits on this curve. A wrong exponent
/// either hammers a struggling host or makes the UI wait far longer than configured.
///
/// **BUG THIS CATCHES**: Off-by-one in the exponent (first retry at 500ms) or a missing cap.
#[test]
fn given_default_policy_when_base_delay_computed_then_doubles_until_cap() {
    // GIVEN: The default policy
    let policy = policy();

    // WHEN/THEN: Delays double per attempt and stop at the cap
    assert_eq!(policy.base_delay(1), Duration::from_millis(250));
    assert_eq!(policy.base_delay(2), Duration::from_millis(500));
    assert_eq!(policy.base_delay(3), Duration::from_millis(1_000));
    assert_eq!(policy.base_delay(6), Duration::from_millis(8_000));
    assert_eq!(policy.base_delay(40), Duration::from_millis(8_000));
}

/// **VALUE**: Verifies jittered delays stay within ±20% of the base delay.
///
/// **WHY THIS MATTERS**: Jitter spreads resends; unbounded jitter breaks the cap contract.
///
/// **BUG THIS CATCHES**: Applying the randomization factor to the wrong interval, or twice.
#[test]
fn given_jitter_when_next_delay_sampled_then_within_bounds() {
    // GIVEN: The default policy (jitter 0.2)
    let policy = policy();

    for attempt in 1..=8 {
        let base = policy.base_delay(attempt).as_secs_f64();

        for _ in 0..50 {
            // WHEN: Sampling a delay
            let delay = policy.next_delay(attempt).as_secs_f64();

            // THEN: It lies within the jitter envelope
            assert!(
                delay >= base * 0.8 - 1e-9 && delay <= base * 1.2 + 1e-9,
                "attempt {attempt}: {delay} outside [{}, {}]",
                base * 0.8,
                base * 1.2
            );
        }
    }
}

/// **VALUE**: Verifies the delay sequence never shrinks beyond what jitter allows.
///
/// **WHY THIS MATTERS**: Backoff must back off. A sequence that drops sharply would resend
/// faster as failures pile up.
///
/// **BUG THIS CATCHES**: Exponent overflow wrapping to small values for large attempts.
#[test]
fn given_increasing_attempts_when_delays_sampled_then_non_decreasing_within_jitter() {
    // GIVEN: The default policy
    let policy = policy();

    // WHEN: Sampling one delay per attempt
    let delays: Vec<f64> = (1..=12).map(|a| policy.next_delay(a).as_secs_f64()).collect();

    // THEN: Each delay is at least the previous one's lower jitter bound
    for pair in delays.windows(2) {
        assert!(
            pair[1] >= pair[0] * (0.8 / 1.2) - 1e-9,
            "delay sequence dropped: {:?}",
            delays
        );
    }
    assert!(delays.iter().all(|d| *d <= 8.0 * 1.2 + 1e-9));
}

/// **VALUE**: Verifies zero jitter produces exact delays.
///
/// **WHY THIS MATTERS**: Deterministic configs are used for tests and tight latency budgets.
///
/// **BUG THIS CATCHES**: Randomization applied even when the factor is zero.
#[test]
fn given_zero_jitter_when_next_delay_computed_then_exact() {
    // GIVEN: A policy without jitter
    let policy = RetryPolicy::new(
        Duration::from_millis(100),
        3.0,
        Duration::from_millis(1_000),
        0.0,
    );

    // WHEN/THEN: Delays are exact
    assert_eq!(policy.next_delay(1), Duration::from_millis(100));
    assert_eq!(policy.next_delay(2), Duration::from_millis(300));
    assert_eq!(policy.next_delay(3), Duration::from_millis(900));
    assert_eq!(policy.next_delay(4), Duration::from_millis(1_000));
}

/// **VALUE**: Verifies the attempt limit check.
///
/// **BUG THIS CATCHES**: `<=` instead of `<`, which would allow one extra attempt.
#[test]
fn given_attempt_counts_when_should_retry_checked_then_stops_at_max() {
    assert!(RetryPolicy::should_retry(1, 3));
    assert!(RetryPolicy::should_retry(2, 3));
    assert!(!RetryPolicy::should_retry(3, 3));
    assert!(!RetryPolicy::should_retry(1, 1));
}

/// **VALUE**: Verifies the reconnect backoff never gives up and respects the cap.
///
/// **WHY THIS MATTERS**: The bridge must keep trying to reach the host for as long as it runs.
///
/// **BUG THIS CATCHES**: Leaving `max_elapsed_time` at the crate default (15 minutes).
#[test]
fn given_reconnect_backoff_when_polled_repeatedly_then_always_some_and_capped() {
    // GIVEN: The reconnect backoff
    let mut backoff = policy().reconnect_backoff();

    // WHEN: Polling it many times
    for _ in 0..100 {
        let delay = backoff.next_backoff();

        // THEN: It keeps producing capped delays
        let delay = delay.expect("reconnect backoff gave up");
        assert!(delay <= Duration::from_millis(9_600));
    }
}

/// **VALUE**: Verifies an unvalidated policy with a negative multiplier still yields delays.
///
/// **WHY THIS MATTERS**: `Bridge::start` accepts configs built in code without validation,
/// and the actor computes delays on every retry.
///
/// **BUG THIS CATCHES**: `Duration::from_secs_f64` panicking on a negative product.
#[test]
fn given_negative_multiplier_when_delays_computed_then_no_panic_and_capped() {
    // GIVEN: A multiplier that flips the sign on odd exponents
    let policy = RetryPolicy::new(
        Duration::from_millis(250),
        -2.0,
        Duration::from_millis(8_000),
        0.0,
    );

    // WHEN: Computing the first few delays
    let delays: Vec<Duration> = (1..=4).map(|attempt| policy.next_delay(attempt)).collect();

    // THEN: Every delay is within [0, cap]; the negative step clamps to zero
    assert_eq!(policy.base_delay(2), Duration::ZERO);
    assert!(delays.iter().all(|d| *d <= Duration::from_millis(8_000)), "{delays:?}");
}
