//! Request dispatcher.
//!
//! [`Bridge`] is the handle UI code holds. It is cheap to clone; every clone
//! talks to the same actor task started by [`Bridge::start`].
//!
//! # Architecture
//!
//! ```text
//! Bridge (any number of clones)
//!     │ Command (mpsc)
//!     ▼
//! BridgeActor ──▶ ChannelAdapter ──▶ Transport ──▶ host
//!     ▲                                 │
//!     └──────── AdapterEvent (mpsc) ◀───┘
//! ```
//!
//! Reads never go through the actor: connection state is a `watch` channel,
//! metrics sit behind an `RwLock` and queue depth is an atomic, all written
//! only by the actor.

mod actor;
pub(crate) mod pending;

use crate::channel::{ChannelAdapter, Transport};
use crate::config::{BridgeConfig, CallOptions};
use crate::error::BridgeError;
use crate::metrics::{MetricsCollector, MetricsSnapshot};
use crate::monitor::ConnectionState;
use crate::registry::{Subscription, SubscriptionRegistry};
use crate::wire::RequestId;

use actor::{BridgeActor, Command, SharedViews};
use pending::{PendingRequest, PendingTable, ReservedIds};

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::task::{Context, Poll};

use log::info;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;

/// Handle to a running bridge.
#[derive(Clone)]
pub struct Bridge {
    command_tx: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ConnectionState>,
    metrics: Arc<RwLock<MetricsCollector>>,
    queue_depth: Arc<AtomicUsize>,
    reserved: ReservedIds,
    registry: SubscriptionRegistry,
    config: Arc<BridgeConfig>,
}

impl Bridge {
    /// Spawn the bridge actor and begin connecting.
    ///
    /// Must be called from within a tokio runtime. The actor runs until
    /// [`shutdown`](Self::shutdown) or until every handle is dropped.
    pub fn start(transport: impl Transport + 'static, config: BridgeConfig) -> Self {
        Self::start_shared(Arc::new(transport), config)
    }

    /// Like [`start`](Self::start) for an already shared transport.
    pub fn start_shared(transport: Arc<dyn Transport>, config: BridgeConfig) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);

        let metrics = Arc::new(RwLock::new(MetricsCollector::new(
            config.metrics.latency_window,
        )));
        let queue_depth = Arc::new(AtomicUsize::new(0));
        let reserved = ReservedIds::default();
        let registry = SubscriptionRegistry::new();

        let adapter = ChannelAdapter::new(
            transport,
            event_tx,
            config.transport.connect_timeout(),
        );
        let views = SharedViews {
            state: state_tx,
            metrics: Arc::clone(&metrics),
            queue_depth: Arc::clone(&queue_depth),
            registry: registry.clone(),
        };
        let actor = BridgeActor::new(
            command_rx,
            event_rx,
            adapter,
            PendingTable::new(reserved.clone()),
            &config,
            views,
        );

        tokio::spawn(actor.run());
        info!("Bridge started");

        Self {
            command_tx,
            state: state_rx,
            metrics,
            queue_depth,
            reserved,
            registry,
            config: Arc::new(config),
        }
    }

    /// Issue a request and return a future for its outcome.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::ChannelClosed`] if the bridge has shut down.
    pub fn submit(
        &self,
        method: impl Into<String>,
        params: Value,
        options: CallOptions,
    ) -> Result<PendingCall, BridgeError> {
        let method = method.into();
        let resolved = options.resolve(&method, &self.config);
        let id = self.reserved.reserve();
        let (tx, rx) = oneshot::channel();

        let request = PendingRequest::new(id.clone(), method, params, resolved, tx, Instant::now());

        if self.command_tx.send(Command::Submit(request)).is_err() {
            self.reserved.release(&id);
            return Err(BridgeError::channel_closed("Bridge is shut down"));
        }

        Ok(PendingCall { id, rx })
    }

    /// Issue a request and wait for its outcome.
    pub async fn call(
        &self,
        method: impl Into<String>,
        params: Value,
        options: CallOptions,
    ) -> Result<Value, BridgeError> {
        self.submit(method, params, options)?.await
    }

    /// Reject a pending request with [`BridgeError::Cancelled`].
    ///
    /// No-op if the request already settled.
    pub fn cancel(&self, id: &RequestId) {
        let _ = self.command_tx.send(Command::Cancel(id.clone()));
    }

    /// Listen for host pushes on `topic`.
    pub fn subscribe<F>(&self, topic: impl Into<String>, callback: F) -> Subscription
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.registry.subscribe(topic, callback)
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Wait until the connection reaches `target`.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::ChannelClosed`] if the bridge stops first.
    pub async fn wait_for_state(&self, target: ConnectionState) -> Result<(), BridgeError> {
        let mut state = self.state.clone();
        state
            .wait_for(|current| *current == target)
            .await
            .map(|_| ())
            .map_err(|_| BridgeError::channel_closed("Bridge stopped"))
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        let metrics = self.metrics.read().unwrap_or_else(|e| e.into_inner());
        metrics.snapshot(self.queue_depth(), self.connection_state())
    }

    /// Requests currently waiting in the offline queue.
    pub fn queue_depth(&self) -> usize {
        self.queue_depth.load(Ordering::SeqCst)
    }

    /// Requests submitted and not yet settled.
    pub fn pending_count(&self) -> usize {
        self.reserved.len()
    }

    /// Reject every outstanding request with `ChannelClosed`, close the
    /// transport and stop the actor. Returns once the actor has stopped.
    pub async fn shutdown(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.command_tx.send(Command::Shutdown(done_tx)).is_err() {
            return;
        }
        let _ = done_rx.await;
    }
}

/// Future for one submitted request.
///
/// Dropping it does not cancel the request; use [`Bridge::cancel`] with
/// [`id`](Self::id).
#[derive(Debug)]
pub struct PendingCall {
    id: RequestId,
    rx: oneshot::Receiver<Result<Value, BridgeError>>,
}

impl PendingCall {
    pub fn id(&self) -> &RequestId {
        &self.id
    }
}

impl Future for PendingCall {
    type Output = Result<Value, BridgeError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        Pin::new(&mut this.rx).poll(cx).map(|received| match received {
            Ok(outcome) => outcome,
            Err(_) => Err(BridgeError::channel_closed(
                "Bridge stopped before the request settled",
            )),
        })
    }
}
