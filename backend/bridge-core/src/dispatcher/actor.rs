//! The dispatcher actor.
//!
//! One task owns the pending table, batch window, offline queue, connection
//! monitor and retry schedule. It waits on three things at once: commands
//! from `Bridge` handles, events from the channel adapter, and the earliest
//! internal deadline. Every state mutation happens here.

use crate::batch::{BatchAggregator, BatchWindow};
use crate::channel::{AdapterEvent, ChannelAdapter, SendFailure, TransportEvent};
use crate::clock::instant_after;
use crate::config::BridgeConfig;
use crate::dispatcher::pending::{Due, PendingRequest, PendingTable, RequestLocation};
use crate::error::{BridgeError, TransportError};
use crate::metrics::MetricsCollector;
use crate::monitor::{ConnectionMonitor, ConnectionState};
use crate::queue::{EnqueueOutcome, OfflineQueue};
use crate::registry::SubscriptionRegistry;
use crate::retry::RetryPolicy;
use crate::wire::{BatchRequestFrame, Incoming, Outgoing, ReplyFrame, RequestId};

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use backoff::ExponentialBackoff;
use backoff::backoff::Backoff;
use log::{debug, info, trace, warn};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Instant, sleep_until};

/// Messages from `Bridge` handles to the actor.
#[derive(Debug)]
pub(crate) enum Command {
    Submit(PendingRequest),
    Cancel(RequestId),
    Shutdown(oneshot::Sender<()>),
}

/// Views the actor publishes for `Bridge` handles to read.
pub(crate) struct SharedViews {
    pub(crate) state: watch::Sender<ConnectionState>,
    pub(crate) metrics: Arc<RwLock<MetricsCollector>>,
    pub(crate) queue_depth: Arc<AtomicUsize>,
    pub(crate) registry: SubscriptionRegistry,
}

pub(crate) struct BridgeActor {
    commands: mpsc::UnboundedReceiver<Command>,
    events: mpsc::UnboundedReceiver<AdapterEvent>,
    adapter: ChannelAdapter,
    pending: PendingTable,
    queue: OfflineQueue,
    batch: BatchAggregator,
    monitor: ConnectionMonitor,
    retry: RetryPolicy,
    reconnect: ExponentialBackoff,
    reconnect_at: Option<Instant>,
    views: SharedViews,
}

impl BridgeActor {
    pub(crate) fn new(
        commands: mpsc::UnboundedReceiver<Command>,
        events: mpsc::UnboundedReceiver<AdapterEvent>,
        adapter: ChannelAdapter,
        pending: PendingTable,
        config: &BridgeConfig,
        views: SharedViews,
    ) -> Self {
        let retry = RetryPolicy::from_config(&config.retry);

        Self {
            commands,
            events,
            adapter,
            pending,
            queue: OfflineQueue::from_config(&config.queue),
            batch: BatchAggregator::from_config(&config.batch),
            monitor: ConnectionMonitor::new(&config.health),
            reconnect: retry.reconnect_backoff(),
            retry,
            reconnect_at: None,
            views,
        }
    }

    /// Run until shut down or until every `Bridge` handle is dropped.
    pub(crate) async fn run(mut self) {
        info!("Bridge actor started");
        self.start_connect();

        loop {
            let wake = self.next_wake();

            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Submit(request)) => self.submit(request),
                    Some(Command::Cancel(id)) => self.cancel(&id),
                    Some(Command::Shutdown(done)) => {
                        self.commands.close();
                        self.shutdown().await;
                        let _ = done.send(());
                        break;
                    }
                    None => {
                        debug!("Every bridge handle dropped");
                        self.shutdown().await;
                        break;
                    }
                },
                Some(event) = self.events.recv() => self.on_adapter_event(event).await,
                _ = sleep_until_some(wake) => self.on_timers(Instant::now()).await,
            }

            self.publish_queue_depth();
        }

        info!("Bridge actor stopped");
    }

    // ============================================
    // COMMANDS
    // ============================================

    fn submit(&mut self, request: PendingRequest) {
        let id = request.id.clone();
        debug!("Submit {} ({})", request.method, id);

        if let Err(duplicate) = self.pending.insert(request) {
            warn!("Request id {} is already pending; rejecting duplicate", id);
            duplicate.settle(Err(BridgeError::protocol(format!(
                "Request id {id} is already pending"
            ))));
            return;
        }

        self.record(|m| m.record_request());
        self.route(id, Instant::now());
    }

    fn cancel(&mut self, id: &RequestId) {
        let Some(request) = self.pending.remove(id) else {
            trace!("Cancel for {} ignored; nothing pending", id);
            return;
        };

        self.detach(&request);
        debug!("Cancelled {} ({})", request.method, id);
        self.record(|m| m.record_cancelled());
        request.settle(Err(BridgeError::cancelled(id.as_str())));
    }

    async fn shutdown(&mut self) {
        info!(
            "Shutting down bridge with {} outstanding request(s)",
            self.pending.len()
        );

        self.queue.drain_all();
        self.batch.take();
        for request in self.pending.drain() {
            request.settle(Err(BridgeError::channel_closed("Bridge shut down")));
        }

        self.reconnect_at = None;
        self.adapter.close().await;
        if let Some(state) = self.monitor.channel_closed() {
            self.publish_state(state);
        }
    }

    // ============================================
    // ROUTING
    // ============================================

    /// Queue, batch or send a request depending on the connection and options.
    fn route(&mut self, id: RequestId, now: Instant) {
        let Some(batchable) = self.pending.get(&id).map(|r| r.options.batchable) else {
            return;
        };

        if !self.monitor.state().can_send() {
            self.enqueue(id, now);
            return;
        }

        if batchable {
            self.set_location(&id, RequestLocation::Batched);
            if let Some(window) = self.batch.add(id, now) {
                debug!("Batch window full; flushing");
                self.flush(window, now);
            }
        } else {
            self.send_single(&id, now);
        }
    }

    fn enqueue(&mut self, id: RequestId, now: Instant) {
        match self.queue.enqueue(id.clone(), now) {
            EnqueueOutcome::Queued => {
                debug!("Queued {} while {}", id, self.monitor.state());
                self.set_location(&id, RequestLocation::Queued);
                self.record(|m| m.record_queued());
            }
            EnqueueOutcome::Evicted(evicted) => {
                self.set_location(&id, RequestLocation::Queued);
                self.record(|m| m.record_queued());

                warn!("Offline queue full; evicting oldest request {}", evicted.id);
                let capacity = self.queue.capacity();
                self.fail(
                    &evicted.id,
                    BridgeError::queue_overflow(evicted.id.as_str(), capacity),
                );
            }
            EnqueueOutcome::Rejected => {
                warn!("Offline queue full; rejecting request {}", id);
                self.fail(
                    &id,
                    BridgeError::channel_closed(format!(
                        "Channel is down and the offline queue is full (capacity {})",
                        self.queue.capacity()
                    )),
                );
            }
        }
    }

    fn send_single(&mut self, id: &RequestId, now: Instant) {
        let Some(request) = self.pending.get(id) else {
            return;
        };

        let frame = Outgoing::Request(request.frame());
        let timeout = request.options.timeout;
        trace!("Sending {} attempt {}", id, request.attempt);

        match self.adapter.send(&frame) {
            Ok(()) => self.set_location(
                id,
                RequestLocation::InFlight {
                    deadline: instant_after(now, timeout),
                },
            ),
            Err(SendFailure::Encode(e)) => self.fail(id, e),
            Err(SendFailure::Transport(e)) => self.on_send_failure(id, &e, now),
        }
    }

    /// Send one batch frame for the window's requests that are still pending.
    fn flush(&mut self, window: BatchWindow, now: Instant) {
        let (batch_id, ids) = window.into_parts();
        let ids: Vec<RequestId> = ids
            .into_iter()
            .filter(|id| self.pending.contains(id))
            .collect();

        if ids.is_empty() {
            return;
        }

        if !self.monitor.state().can_send() {
            debug!(
                "Channel {} at batch flush; queueing {} request(s)",
                self.monitor.state(),
                ids.len()
            );
            for id in ids {
                self.enqueue(id, now);
            }
            return;
        }

        let items = ids
            .iter()
            .filter_map(|id| self.pending.get(id).map(PendingRequest::frame))
            .collect();
        let frame = Outgoing::Batch(BatchRequestFrame {
            batch_id: batch_id.clone(),
            items,
        });

        debug!("Flushing batch {} with {} request(s)", batch_id, ids.len());

        match self.adapter.send(&frame) {
            Ok(()) => {
                for id in &ids {
                    let Some(timeout) = self.pending.get(id).map(|r| r.options.timeout) else {
                        continue;
                    };
                    self.set_location(
                        id,
                        RequestLocation::InFlight {
                            deadline: instant_after(now, timeout),
                        },
                    );
                }
            }
            Err(SendFailure::Encode(e)) => {
                for id in &ids {
                    self.fail(id, e.clone());
                }
            }
            Err(SendFailure::Transport(e)) => {
                for id in &ids {
                    self.on_send_failure(id, &e, now);
                }
            }
        }
    }

    // ============================================
    // FAILURES AND RETRIES
    // ============================================

    /// Send failures retry without waiting for the deadline.
    fn on_send_failure(&mut self, id: &RequestId, error: &TransportError, now: Instant) {
        warn!("Send of {} failed: {}", id, error);

        if !self.schedule_retry(id, now) {
            self.fail(
                id,
                BridgeError::channel_closed(format!("Send failed on every attempt: {error}")),
            );
        }
    }

    fn on_timeout(&mut self, id: &RequestId, now: Instant) {
        if self.schedule_retry(id, now) {
            return;
        }

        let Some(request) = self.pending.remove(id) else {
            return;
        };

        warn!(
            "{} ({}) timed out after {} attempt(s)",
            request.method, id, request.attempt
        );
        self.record(|m| m.record_timeout());
        let error = BridgeError::timeout(request.method.as_str(), request.attempt);
        request.settle(Err(error));
    }

    /// Move a request into backoff if it has attempts left.
    fn schedule_retry(&mut self, id: &RequestId, now: Instant) -> bool {
        let retry = self.retry;
        let Some(request) = self.pending.get_mut(id) else {
            return false;
        };

        if !RetryPolicy::should_retry(request.attempt, request.options.max_attempts) {
            return false;
        }

        let delay = retry.next_delay(request.attempt);
        request.attempt += 1;
        request.location = RequestLocation::Backoff {
            resend_at: instant_after(now, delay),
        };

        debug!(
            "Retrying {} ({}) as attempt {} in {:?}",
            request.method, id, request.attempt, delay
        );
        self.record(|m| m.record_retry());
        true
    }

    fn resend(&mut self, id: &RequestId, now: Instant) {
        if self.monitor.state().can_send() {
            self.send_single(id, now);
        } else {
            self.enqueue(id.clone(), now);
        }
    }

    /// Reject a request with `error` and count it as failed.
    fn fail(&mut self, id: &RequestId, error: BridgeError) {
        let Some(request) = self.pending.remove(id) else {
            return;
        };

        self.detach(&request);
        debug!("{} ({}) failed: {}", request.method, id, error);
        self.record(|m| m.record_failure());
        request.settle(Err(error));
    }

    /// Drop queue and batch references to a request leaving the table.
    fn detach(&mut self, request: &PendingRequest) {
        match request.location {
            RequestLocation::Queued => {
                self.queue.remove(&request.id);
            }
            RequestLocation::Batched => {
                self.batch.remove(&request.id);
            }
            RequestLocation::InFlight { .. } | RequestLocation::Backoff { .. } => {}
        }
    }

    // ============================================
    // CHANNEL EVENTS
    // ============================================

    async fn on_adapter_event(&mut self, event: AdapterEvent) {
        if !self.adapter.is_current(&event) {
            return;
        }

        let now = Instant::now();
        match event.event {
            TransportEvent::Opened => self.on_opened(now),
            TransportEvent::ConnectFailed(reason) => {
                warn!("Connect attempt failed: {}", reason);
                if let Some(state) = self.monitor.handshake_failed() {
                    self.publish_state(state);
                }
                self.schedule_reconnect(now);
            }
            TransportEvent::Closed => {
                warn!("Channel closed by host");
                self.on_disconnected(now).await;
            }
            TransportEvent::Message(bytes) => self.on_message(&bytes, now),
        }
    }

    fn on_opened(&mut self, now: Instant) {
        let Some(state) = self.monitor.handshake_succeeded(now) else {
            return;
        };

        self.reconnect.reset();
        self.publish_state(state);

        let entries = self.queue.drain_all();
        if !entries.is_empty() {
            info!("Replaying {} queued request(s)", entries.len());
        }
        for entry in entries {
            self.route(entry.id, now);
        }
    }

    async fn on_disconnected(&mut self, now: Instant) {
        self.adapter.close().await;
        if let Some(state) = self.monitor.channel_closed() {
            self.publish_state(state);
        }
        self.schedule_reconnect(now);
    }

    fn on_message(&mut self, bytes: &[u8], now: Instant) {
        let incoming = match Incoming::decode(bytes) {
            Ok(incoming) => incoming,
            Err(e) => {
                warn!("Dropping undecodable frame: {}", e);
                return;
            }
        };

        match incoming {
            Incoming::Reply(reply) => self.on_reply(reply, now),
            Incoming::BatchReply(batch) => {
                trace!(
                    "Batch reply {} with {} item(s)",
                    batch.batch_id,
                    batch.items.len()
                );
                for reply in batch.items {
                    self.on_reply(reply, now);
                }
            }
            Incoming::Push(push) => {
                let delivered = self.views.registry.publish(&push.topic, &push.payload);
                trace!("Push '{}' delivered to {} listener(s)", push.topic, delivered);
            }
            Incoming::Pong(seq) => {
                if let Some(state) = self.monitor.on_pong(seq, now) {
                    self.publish_state(state);
                }
            }
        }
    }

    fn on_reply(&mut self, reply: ReplyFrame, now: Instant) {
        let Some(request) = self.pending.remove(&reply.id) else {
            match reply.topic.as_deref() {
                Some(topic) => {
                    self.views.registry.publish(topic, &reply.push_payload());
                }
                None => warn!(
                    "Dropping reply: {}",
                    BridgeError::protocol(format!("no pending request with id {}", reply.id))
                ),
            }
            return;
        };

        self.detach(&request);
        let latency = now.saturating_duration_since(request.created_at);
        let outcome = reply.into_result();

        match &outcome {
            Ok(_) => self.record(|m| m.record_success(latency)),
            Err(_) => self.record(|m| m.record_host_error(latency)),
        }

        trace!("{} ({}) settled after {:?}", request.method, request.id, latency);
        request.settle(outcome);
    }

    // ============================================
    // TIMERS
    // ============================================

    fn next_wake(&self) -> Option<Instant> {
        [
            self.pending.next_wake(),
            self.batch.deadline(),
            self.monitor.next_tick(),
            self.reconnect_at,
        ]
        .into_iter()
        .flatten()
        .min()
    }

    async fn on_timers(&mut self, now: Instant) {
        if self.reconnect_at.is_some_and(|at| at <= now) {
            self.reconnect_at = None;
            self.start_connect();
        }

        if self.monitor.next_tick().is_some_and(|at| at <= now) {
            self.on_health_tick(now).await;
        }

        if let Some(window) = self.batch.take_due(now) {
            self.flush(window, now);
        }

        for (id, due) in self.pending.due(now) {
            match due {
                Due::Timeout => self.on_timeout(&id, now),
                Due::Resend => self.resend(&id, now),
            }
        }
    }

    async fn on_health_tick(&mut self, now: Instant) {
        let outcome = self.monitor.on_tick(now);

        match outcome.transition {
            Some(ConnectionState::Disconnected) => {
                warn!("Host stopped answering liveness probes; dropping connection");
                self.adapter.close().await;
                self.publish_state(ConnectionState::Disconnected);
                self.schedule_reconnect(now);
                return;
            }
            Some(state) => self.publish_state(state),
            None => {}
        }

        if let Some(seq) = outcome.probe {
            trace!("Sending liveness probe {}", seq);
            match self.adapter.send(&Outgoing::Ping(seq)) {
                Ok(()) => {}
                Err(SendFailure::Transport(e)) => debug!("Liveness probe {} not sent: {}", seq, e),
                Err(SendFailure::Encode(e)) => warn!("Liveness probe {} not encoded: {}", seq, e),
            }
        }
    }

    // ============================================
    // CONNECTION
    // ============================================

    fn start_connect(&mut self) {
        if let Some(state) = self.monitor.begin_connect() {
            self.publish_state(state);
        }
        let generation = self.adapter.connect();
        info!("Connecting (attempt generation {})", generation);
    }

    fn schedule_reconnect(&mut self, now: Instant) {
        let delay = self
            .reconnect
            .next_backoff()
            .unwrap_or(self.reconnect.max_interval);
        info!("Reconnecting in {:?}", delay);
        self.reconnect_at = Some(instant_after(now, delay));
    }

    // ============================================
    // SHARED VIEWS
    // ============================================

    fn set_location(&mut self, id: &RequestId, location: RequestLocation) {
        if let Some(request) = self.pending.get_mut(id) {
            request.location = location;
        }
    }

    fn record(&self, update: impl FnOnce(&mut MetricsCollector)) {
        let mut metrics = self
            .views
            .metrics
            .write()
            .unwrap_or_else(|e| e.into_inner());
        update(&mut metrics);
    }

    fn publish_state(&self, state: ConnectionState) {
        self.views.state.send_replace(state);
    }

    fn publish_queue_depth(&self) {
        self.views
            .queue_depth
            .store(self.queue.len(), Ordering::SeqCst);
    }
}

async fn sleep_until_some(at: Option<Instant>) {
    match at {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}
