//! Per-call options.

use crate::config::BridgeConfig;

use std::time::Duration;

/// Scheduling hint for a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Priority {
    #[default]
    Normal,
    /// Never batched; sent as soon as the channel allows.
    High,
}

/// Options recognized by [`Bridge::submit`](crate::dispatcher::Bridge::submit).
///
/// Unset fields fall back to the bridge configuration: `timeout` and
/// `max_attempts` to the `[request]` section, `batchable` to the `[batch]`
/// method allow-list.
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    pub timeout: Option<Duration>,
    pub max_attempts: Option<u32>,
    pub batchable: Option<bool>,
    pub priority: Priority,
}

impl CallOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    pub fn with_batchable(mut self, batchable: bool) -> Self {
        self.batchable = Some(batchable);
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Resolve every option against the bridge configuration.
    pub(crate) fn resolve(&self, method: &str, config: &BridgeConfig) -> ResolvedOptions {
        let batchable = match self.priority {
            Priority::High => false,
            _ => self.batchable.unwrap_or_else(|| config.is_batchable(method)),
        };

        ResolvedOptions {
            timeout: self.timeout.unwrap_or_else(|| config.request.timeout()),
            max_attempts: self
                .max_attempts
                .unwrap_or(config.request.max_attempts)
                .max(1),
            batchable,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ResolvedOptions {
    pub(crate) timeout: Duration,
    pub(crate) max_attempts: u32,
    pub(crate) batchable: bool,
}
