//! Request metrics.
//!
//! Counters only ever grow. Latency samples live in a fixed-size rolling
//! window; the oldest sample is dropped once the window is full. Only the
//! dispatcher actor records; everyone else reads snapshots.

use crate::monitor::ConnectionState;

use std::collections::VecDeque;
use std::time::Duration;

use serde::Serialize;

#[derive(Debug)]
pub struct MetricsCollector {
    total_requests: u64,
    total_successes: u64,
    total_failures: u64,
    total_retries: u64,
    total_timeouts: u64,
    total_cancelled: u64,
    total_queued: u64,
    latencies: VecDeque<Duration>,
    latency_window: usize,
}

/// Read-only view of the collector at one instant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    /// successes / (successes + failures); 1.0 before anything completed.
    pub success_rate: f64,
    pub avg_latency_ms: f64,
    pub p95_latency_ms: f64,
    /// retries / requests; 0.0 before any request.
    pub retry_rate: f64,
    pub queue_depth: usize,
    pub connection_state: ConnectionState,
    pub total_requests: u64,
    pub total_successes: u64,
    pub total_failures: u64,
    pub total_retries: u64,
    pub total_timeouts: u64,
    pub total_cancelled: u64,
    pub total_queued: u64,
}

impl MetricsCollector {
    pub fn new(latency_window: usize) -> Self {
        let latency_window = latency_window.max(1);
        Self {
            total_requests: 0,
            total_successes: 0,
            total_failures: 0,
            total_retries: 0,
            total_timeouts: 0,
            total_cancelled: 0,
            total_queued: 0,
            latencies: VecDeque::with_capacity(latency_window),
            latency_window,
        }
    }

    pub fn record_request(&mut self) {
        self.total_requests += 1;
    }

    pub fn record_success(&mut self, latency: Duration) {
        self.total_successes += 1;
        self.push_latency(latency);
    }

    pub fn record_failure(&mut self) {
        self.total_failures += 1;
    }

    /// The host answered `ok: false`: a failure with a round-trip time.
    pub fn record_host_error(&mut self, latency: Duration) {
        self.total_failures += 1;
        self.push_latency(latency);
    }

    /// A final timeout; counted as a failure too.
    pub fn record_timeout(&mut self) {
        self.total_timeouts += 1;
        self.total_failures += 1;
    }

    pub fn record_retry(&mut self) {
        self.total_retries += 1;
    }

    /// Cancellations are neither successes nor failures.
    pub fn record_cancelled(&mut self) {
        self.total_cancelled += 1;
    }

    pub fn record_queued(&mut self) {
        self.total_queued += 1;
    }

    pub fn snapshot(&self, queue_depth: usize, connection_state: ConnectionState) -> MetricsSnapshot {
        let completed = self.total_successes + self.total_failures;
        let success_rate = if completed == 0 {
            1.0
        } else {
            self.total_successes as f64 / completed as f64
        };

        let retry_rate = if self.total_requests == 0 {
            0.0
        } else {
            self.total_retries as f64 / self.total_requests as f64
        };

        MetricsSnapshot {
            success_rate,
            avg_latency_ms: self.avg_latency_ms(),
            p95_latency_ms: self.p95_latency_ms(),
            retry_rate,
            queue_depth,
            connection_state,
            total_requests: self.total_requests,
            total_successes: self.total_successes,
            total_failures: self.total_failures,
            total_retries: self.total_retries,
            total_timeouts: self.total_timeouts,
            total_cancelled: self.total_cancelled,
            total_queued: self.total_queued,
        }
    }

    fn push_latency(&mut self, latency: Duration) {
        if self.latencies.len() == self.latency_window {
            self.latencies.pop_front();
        }
        self.latencies.push_back(latency);
    }

    fn avg_latency_ms(&self) -> f64 {
        if self.latencies.is_empty() {
            return 0.0;
        }
        let total: f64 = self.latencies.iter().map(duration_ms).sum();
        total / self.latencies.len() as f64
    }

    // Nearest-rank percentile.
    fn p95_latency_ms(&self) -> f64 {
        if self.latencies.is_empty() {
            return 0.0;
        }
        let mut sorted: Vec<f64> = self.latencies.iter().map(duration_ms).collect();
        sorted.sort_by(f64::total_cmp);
        let rank = ((sorted.len() as f64) * 0.95).ceil() as usize;
        sorted[rank.clamp(1, sorted.len()) - 1]
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new(1_024)
    }
}

fn duration_ms(duration: &Duration) -> f64 {
    duration.as_secs_f64() * 1_000.0
}
