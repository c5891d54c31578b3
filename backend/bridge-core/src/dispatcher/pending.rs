//! Pending request table.
//!
//! The table is the single owner of every outstanding request. The offline
//! queue and the batch window only hold ids; the request's `location` says
//! which of them (if any) currently references it.

use crate::config::options::ResolvedOptions;
use crate::error::BridgeError;
use crate::wire::{RequestFrame, RequestId};

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio::sync::oneshot;
use tokio::time::Instant;

pub(crate) type Responder = oneshot::Sender<Result<Value, BridgeError>>;

/// Where an outstanding request currently sits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RequestLocation {
    /// Waiting in the offline queue for the channel to come back.
    Queued,
    /// Waiting in the open batch window.
    Batched,
    /// Written to the channel; times out at `deadline`.
    InFlight { deadline: Instant },
    /// Attempt failed; next attempt goes out at `resend_at`.
    Backoff { resend_at: Instant },
}

#[derive(Debug)]
pub(crate) struct PendingRequest {
    pub(crate) id: RequestId,
    pub(crate) method: String,
    pub(crate) params: Value,
    pub(crate) created_at: Instant,
    /// Current attempt number, starting at 1.
    pub(crate) attempt: u32,
    pub(crate) options: ResolvedOptions,
    pub(crate) location: RequestLocation,
    responder: Responder,
}

impl PendingRequest {
    pub(crate) fn new(
        id: RequestId,
        method: String,
        params: Value,
        options: ResolvedOptions,
        responder: Responder,
        now: Instant,
    ) -> Self {
        Self {
            id,
            method,
            params,
            created_at: now,
            attempt: 1,
            options,
            location: RequestLocation::Queued,
            responder,
        }
    }

    pub(crate) fn frame(&self) -> RequestFrame {
        RequestFrame {
            id: self.id.clone(),
            method: self.method.clone(),
            params: self.params.clone(),
        }
    }

    /// When the actor must look at this request again, if ever.
    pub(crate) fn wake_at(&self) -> Option<Instant> {
        match self.location {
            RequestLocation::InFlight { deadline } => Some(deadline),
            RequestLocation::Backoff { resend_at } => Some(resend_at),
            RequestLocation::Queued | RequestLocation::Batched => None,
        }
    }

    /// Hand the outcome to the caller. A caller that dropped its future is ignored.
    pub(crate) fn settle(self, outcome: Result<Value, BridgeError>) {
        let _ = self.responder.send(outcome);
    }
}

/// Timer that fired for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Due {
    Timeout,
    Resend,
}

/// Ids handed out to callers and not yet settled.
///
/// Shared between the `Bridge` handles, which reserve ids, and the actor,
/// which releases them.
#[derive(Debug, Clone, Default)]
pub(crate) struct ReservedIds {
    ids: Arc<Mutex<HashSet<RequestId>>>,
}

impl ReservedIds {
    /// Generate an id no outstanding request uses.
    pub(crate) fn reserve(&self) -> RequestId {
        let mut ids = self.ids.lock().unwrap_or_else(|e| e.into_inner());
        loop {
            let id = RequestId::generate();
            if ids.insert(id.clone()) {
                return id;
            }
        }
    }

    pub(crate) fn release(&self, id: &RequestId) {
        self.ids
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(id);
    }

    pub(crate) fn clear(&self) {
        self.ids.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.ids.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[derive(Debug)]
pub(crate) struct PendingTable {
    requests: HashMap<RequestId, PendingRequest>,
    reserved: ReservedIds,
}

impl PendingTable {
    pub(crate) fn new(reserved: ReservedIds) -> Self {
        Self {
            requests: HashMap::new(),
            reserved,
        }
    }

    /// Track a new request. Gives the request back if its id is already tracked.
    pub(crate) fn insert(&mut self, request: PendingRequest) -> Result<(), PendingRequest> {
        if self.requests.contains_key(&request.id) {
            return Err(request);
        }
        self.requests.insert(request.id.clone(), request);
        Ok(())
    }

    pub(crate) fn get(&self, id: &RequestId) -> Option<&PendingRequest> {
        self.requests.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: &RequestId) -> Option<&mut PendingRequest> {
        self.requests.get_mut(id)
    }

    pub(crate) fn contains(&self, id: &RequestId) -> bool {
        self.requests.contains_key(id)
    }

    /// Stop tracking a request and release its id.
    pub(crate) fn remove(&mut self, id: &RequestId) -> Option<PendingRequest> {
        let request = self.requests.remove(id)?;
        self.reserved.release(id);
        Some(request)
    }

    pub(crate) fn drain(&mut self) -> Vec<PendingRequest> {
        let drained: Vec<PendingRequest> = self.requests.drain().map(|(_, r)| r).collect();
        self.reserved.clear();
        drained
    }

    pub(crate) fn len(&self) -> usize {
        self.requests.len()
    }

    /// Earliest deadline or resend instant across all requests.
    pub(crate) fn next_wake(&self) -> Option<Instant> {
        self.requests.values().filter_map(PendingRequest::wake_at).min()
    }

    /// Requests whose timer fired at or before `now`, earliest first.
    pub(crate) fn due(&self, now: Instant) -> Vec<(RequestId, Due)> {
        let mut due: Vec<(Instant, Instant, RequestId, Due)> = self
            .requests
            .values()
            .filter_map(|request| match request.location {
                RequestLocation::InFlight { deadline } if deadline <= now => Some((
                    deadline,
                    request.created_at,
                    request.id.clone(),
                    Due::Timeout,
                )),
                RequestLocation::Backoff { resend_at } if resend_at <= now => Some((
                    resend_at,
                    request.created_at,
                    request.id.clone(),
                    Due::Resend,
                )),
                _ => None,
            })
            .collect();

        due.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));
        due.into_iter().map(|(_, _, id, kind)| (id, kind)).collect()
    }
}
