//! Batch aggregation of outbound requests.
//!
//! A window opens lazily on the first batchable request and flushes when it
//! holds `max_size` requests or `max_window` has elapsed since it opened,
//! whichever comes first. A flushed window is handed to the caller by value
//! and never reused.

use crate::clock::instant_after;
use crate::config::BatchConfig;
use crate::wire::RequestId;

use std::time::Duration;

use tokio::time::Instant;
use uuid::Uuid;

/// Requests collected for one batch wire message, in insertion order.
#[derive(Debug)]
pub struct BatchWindow {
    batch_id: String,
    ids: Vec<RequestId>,
    opened_at: Instant,
}

impl BatchWindow {
    fn open(now: Instant) -> Self {
        Self {
            batch_id: Uuid::new_v4().to_string(),
            ids: Vec::new(),
            opened_at: now,
        }
    }

    pub fn batch_id(&self) -> &str {
        &self.batch_id
    }

    pub fn ids(&self) -> &[RequestId] {
        &self.ids
    }

    pub fn opened_at(&self) -> Instant {
        self.opened_at
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn into_parts(self) -> (String, Vec<RequestId>) {
        (self.batch_id, self.ids)
    }
}

#[derive(Debug)]
pub struct BatchAggregator {
    max_size: usize,
    max_window: Duration,
    window: Option<BatchWindow>,
}

impl BatchAggregator {
    pub fn new(max_size: usize, max_window: Duration) -> Self {
        Self {
            max_size: max_size.max(1),
            max_window,
            window: None,
        }
    }

    pub fn from_config(config: &BatchConfig) -> Self {
        Self::new(config.max_size, config.max_window())
    }

    /// Append a request, opening a window if none is open.
    ///
    /// Returns the window when this request filled it.
    pub fn add(&mut self, id: RequestId, now: Instant) -> Option<BatchWindow> {
        let window = self.window.get_or_insert_with(|| BatchWindow::open(now));
        window.ids.push(id);

        if window.ids.len() >= self.max_size {
            self.window.take()
        } else {
            None
        }
    }

    /// Instant at which the open window must flush.
    pub fn deadline(&self) -> Option<Instant> {
        self.window
            .as_ref()
            .map(|w| instant_after(w.opened_at, self.max_window))
    }

    /// Take the open window if its time limit has elapsed.
    pub fn take_due(&mut self, now: Instant) -> Option<BatchWindow> {
        match self.deadline() {
            Some(deadline) if now >= deadline => self.window.take(),
            _ => None,
        }
    }

    /// Take the open window regardless of its age.
    pub fn take(&mut self) -> Option<BatchWindow> {
        self.window.take()
    }

    /// Drop a request from the open window. An emptied window is discarded.
    pub fn remove(&mut self, id: &RequestId) -> bool {
        let Some(window) = self.window.as_mut() else {
            return false;
        };

        let before = window.ids.len();
        window.ids.retain(|existing| existing != id);
        let removed = window.ids.len() != before;

        if window.ids.is_empty() {
            self.window = None;
        }

        removed
    }

    pub fn pending_len(&self) -> usize {
        self.window.as_ref().map_or(0, BatchWindow::len)
    }
}
