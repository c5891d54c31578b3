// Unit tests for the connection state machine.

use crate::config::HealthConfig;
use crate::monitor::{ConnectionMonitor, ConnectionState};

use std::time::Duration;

use tokio::time::Instant;

fn health(misses: u32) -> HealthConfig {
    HealthConfig {
        interval_ms: 1_000,
        degraded_interval_ms: 250,
        misses_before_degraded: misses,
    }
}

fn connected(config: &HealthConfig, now: Instant) -> ConnectionMonitor {
    let mut monitor = ConnectionMonitor::new(config);
    monitor.begin_connect();
    monitor.handshake_succeeded(now);
    monitor
}

/// **VALUE**: Walks the happy path Disconnected → Connecting → Connected.
///
/// **BUG THIS CATCHES**: Skipping Connecting, which would let callers send before the handshake.
#[test]
fn given_new_monitor_when_handshake_succeeds_then_connected_with_tick_scheduled() {
    // GIVEN: A fresh monitor
    let now = Instant::now();
    let mut monitor = ConnectionMonitor::new(&health(3));
    assert_eq!(monitor.state(), ConnectionState::Disconnected);

    // WHEN: Connecting and completing the handshake
    let connecting = monitor.begin_connect();
    let connected = monitor.handshake_succeeded(now);

    // THEN: Both transitions are reported and probing is scheduled
    assert_eq!(connecting, Some(ConnectionState::Connecting));
    assert_eq!(connected, Some(ConnectionState::Connected));
    assert_eq!(monitor.next_tick(), Some(now + Duration::from_secs(1)));
}

/// **VALUE**: Verifies a failed handshake returns to Disconnected.
#[test]
fn given_connecting_when_handshake_fails_then_disconnected() {
    // GIVEN: A monitor mid-connect
    let mut monitor = ConnectionMonitor::new(&health(3));
    monitor.begin_connect();

    // WHEN: The handshake fails
    let transition = monitor.handshake_failed();

    // THEN: Back to Disconnected
    assert_eq!(transition, Some(ConnectionState::Disconnected));
    assert!(!monitor.state().can_send());
}

/// **VALUE**: Verifies the miss threshold moves Connected → Degraded → Disconnected.
///
/// **WHY THIS MATTERS**: A silent host must eventually be treated as gone so the bridge
/// reconnects and queues, instead of writing into the void forever.
///
/// **BUG THIS CATCHES**: Counting the first tick (no probe outstanding yet) as a miss,
/// or never leaving Degraded.
#[test]
fn given_unanswered_probes_when_ticks_pass_then_degraded_then_disconnected() {
    // GIVEN: A connected monitor that degrades after two misses
    let t0 = Instant::now();
    let mut monitor = connected(&health(2), t0);

    // WHEN: Ticking without any pong
    let first = monitor.on_tick(t0 + Duration::from_secs(1));
    let second = monitor.on_tick(t0 + Duration::from_secs(2));
    let third = monitor.on_tick(t0 + Duration::from_secs(3));

    // THEN: First tick only probes, second miss degrades, next miss disconnects
    assert_eq!(first.transition, None);
    assert_eq!(first.probe, Some(1));
    assert_eq!(second.transition, None);
    assert_eq!(monitor.missed_probes(), 1);
    assert_eq!(third.transition, Some(ConnectionState::Degraded));
    assert_eq!(third.probe, Some(3));
    assert_eq!(
        monitor.next_tick(),
        Some(t0 + Duration::from_secs(3) + Duration::from_millis(250)),
        "degraded probing uses the faster interval"
    );

    let fourth = monitor.on_tick(t0 + Duration::from_millis(3_250));
    assert_eq!(fourth.transition, Some(ConnectionState::Disconnected));
    assert_eq!(fourth.probe, None);
    assert_eq!(monitor.next_tick(), None);
}

/// **VALUE**: Verifies a pong restores Connected from Degraded and clears the miss count.
///
/// **BUG THIS CATCHES**: Staying Degraded after recovery, keeping the fast probe interval.
#[test]
fn given_degraded_when_pong_arrives_then_connected_again() {
    // GIVEN: A degraded monitor
    let t0 = Instant::now();
    let mut monitor = connected(&health(1), t0);
    monitor.on_tick(t0 + Duration::from_secs(1));
    let degraded = monitor.on_tick(t0 + Duration::from_secs(2));
    assert_eq!(degraded.transition, Some(ConnectionState::Degraded));

    // WHEN: The latest probe is answered
    let probe = degraded.probe.expect("degraded tick still probes");
    let transition = monitor.on_pong(probe, t0 + Duration::from_secs(2));

    // THEN: Connected, with no misses
    assert_eq!(transition, Some(ConnectionState::Connected));
    assert_eq!(monitor.missed_probes(), 0);
}

/// **VALUE**: Verifies pongs for probes never sent are ignored.
#[test]
fn given_connected_when_unknown_pong_arrives_then_ignored() {
    // GIVEN: A connected monitor with one probe out
    let t0 = Instant::now();
    let mut monitor = connected(&health(3), t0);
    monitor.on_tick(t0 + Duration::from_secs(1));

    // WHEN: A pong for a future sequence arrives
    let transition = monitor.on_pong(99, t0);

    // THEN: Nothing changes; the real probe is still outstanding
    assert_eq!(transition, None);
    monitor.on_tick(t0 + Duration::from_secs(2));
    assert_eq!(monitor.missed_probes(), 1);
}

/// **VALUE**: Verifies a zero interval disables probing entirely.
#[test]
fn given_probing_disabled_when_connected_then_no_tick_scheduled() {
    // GIVEN: Health checks disabled
    let config = HealthConfig {
        interval_ms: 0,
        ..HealthConfig::default()
    };

    // WHEN: Connecting
    let monitor = connected(&config, Instant::now());

    // THEN: No tick
    assert_eq!(monitor.state(), ConnectionState::Connected);
    assert_eq!(monitor.next_tick(), None);
}
