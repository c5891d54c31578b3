//! Connection state machine and liveness probing.
//!
//! ```text
//! Disconnected ──connect──▶ Connecting ──handshake ok──▶ Connected
//!      ▲                        │                          │   ▲
//!      │◀──handshake failed─────┘          missed probes   ▼   │ pong
//!      │◀──────────── closed / further miss ─────────── Degraded
//! ```
//!
//! The monitor is a plain state machine owned by the dispatcher actor. It
//! never performs I/O itself: ticks hand back the probe to send and the
//! resulting transition, if any.

use crate::clock::instant_after;
use crate::config::HealthConfig;

use std::fmt::{Display, Formatter, Result as FormatResult};
use std::time::Duration;

use log::{debug, info, warn};
use serde::Serialize;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Probes are going unanswered; sending is best-effort.
    Degraded,
}

impl ConnectionState {
    /// Whether requests may be written to the channel in this state.
    pub fn can_send(&self) -> bool {
        matches!(self, ConnectionState::Connected | ConnectionState::Degraded)
    }
}

impl Display for ConnectionState {
    fn fmt(&self, f: &mut Formatter<'_>) -> FormatResult {
        let name = match self {
            ConnectionState::Disconnected => "Disconnected",
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Connected => "Connected",
            ConnectionState::Degraded => "Degraded",
        };
        f.write_str(name)
    }
}

/// What the owner must do after a health tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TickOutcome {
    /// New state, when the tick changed it.
    pub transition: Option<ConnectionState>,
    /// Sequence number of the probe to send.
    pub probe: Option<u64>,
}

#[derive(Debug)]
pub struct ConnectionMonitor {
    state: ConnectionState,
    interval: Option<Duration>,
    degraded_interval: Duration,
    misses_before_degraded: u32,
    missed: u32,
    outstanding_probe: Option<u64>,
    last_probe_seq: u64,
    next_tick: Option<Instant>,
}

impl ConnectionMonitor {
    pub fn new(config: &HealthConfig) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            interval: config.interval(),
            degraded_interval: config.degraded_interval(),
            misses_before_degraded: config.misses_before_degraded.max(1),
            missed: 0,
            outstanding_probe: None,
            last_probe_seq: 0,
            next_tick: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn missed_probes(&self) -> u32 {
        self.missed
    }

    /// When the next health tick is due, if probing is active.
    pub fn next_tick(&self) -> Option<Instant> {
        self.next_tick
    }

    /// Disconnected → Connecting.
    pub fn begin_connect(&mut self) -> Option<ConnectionState> {
        match self.state {
            ConnectionState::Disconnected => self.set_state(ConnectionState::Connecting),
            _ => None,
        }
    }

    /// Connecting → Connected. Resets probe bookkeeping.
    pub fn handshake_succeeded(&mut self, now: Instant) -> Option<ConnectionState> {
        if self.state != ConnectionState::Connecting {
            debug!("Ignoring handshake success while {}", self.state);
            return None;
        }

        self.reset_probes();
        self.next_tick = self.interval.map(|interval| instant_after(now, interval));
        self.set_state(ConnectionState::Connected)
    }

    /// Connecting → Disconnected.
    pub fn handshake_failed(&mut self) -> Option<ConnectionState> {
        match self.state {
            ConnectionState::Connecting => self.set_state(ConnectionState::Disconnected),
            _ => None,
        }
    }

    /// Any state → Disconnected when the channel reports closure.
    pub fn channel_closed(&mut self) -> Option<ConnectionState> {
        self.reset_probes();
        self.next_tick = None;
        self.set_state(ConnectionState::Disconnected)
    }

    /// Run one health tick: account for an unanswered probe, then issue the next one.
    pub fn on_tick(&mut self, now: Instant) -> TickOutcome {
        let mut outcome = TickOutcome::default();

        if !self.state.can_send() || self.interval.is_none() {
            self.next_tick = None;
            return outcome;
        }

        if let Some(seq) = self.outstanding_probe.take() {
            self.missed += 1;
            warn!(
                "Liveness probe {} unanswered ({} consecutive miss(es))",
                seq, self.missed
            );

            match self.state {
                ConnectionState::Connected if self.missed >= self.misses_before_degraded => {
                    outcome.transition = self.set_state(ConnectionState::Degraded);
                }
                ConnectionState::Degraded if self.missed > self.misses_before_degraded => {
                    outcome.transition = self.channel_closed();
                    return outcome;
                }
                _ => {}
            }
        }

        self.last_probe_seq += 1;
        self.outstanding_probe = Some(self.last_probe_seq);
        outcome.probe = Some(self.last_probe_seq);
        self.next_tick = Some(instant_after(now, self.current_interval()));
        outcome
    }

    /// Record a probe answer. Degraded → Connected on recovery.
    pub fn on_pong(&mut self, seq: u64, now: Instant) -> Option<ConnectionState> {
        if seq == 0 || seq > self.last_probe_seq {
            debug!("Ignoring pong {} for a probe never sent", seq);
            return None;
        }

        self.outstanding_probe = None;
        self.missed = 0;

        if self.state == ConnectionState::Degraded {
            info!("Liveness recovered");
            self.next_tick = self.interval.map(|interval| instant_after(now, interval));
            return self.set_state(ConnectionState::Connected);
        }

        None
    }

    fn current_interval(&self) -> Duration {
        match (self.state, self.interval) {
            (ConnectionState::Degraded, _) => self.degraded_interval,
            (_, Some(interval)) => interval,
            (_, None) => self.degraded_interval,
        }
    }

    fn reset_probes(&mut self) {
        self.missed = 0;
        self.outstanding_probe = None;
    }

    fn set_state(&mut self, next: ConnectionState) -> Option<ConnectionState> {
        if self.state == next {
            return None;
        }

        info!("Connection state {} -> {}", self.state, next);
        self.state = next;
        Some(next)
    }
}
