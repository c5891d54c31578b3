//! Message channel adapter.
//!
//! A [`Transport`] moves opaque frames between the bridge and the host. The
//! [`ChannelAdapter`] wraps one transport for the dispatcher actor: it encodes
//! outgoing frames, runs connect attempts off the actor, and forwards the
//! transport's events tagged with a connection generation so that events from
//! an abandoned connection can be told apart from the live one.
//!
//! # Architecture
//!
//! ```text
//! Transport (trait)
//!     │
//!     ├── MemoryTransport    in-process, paired with a MemoryHost
//!     │
//!     └── WebSocketTransport tokio-tungstenite client
//! ```

pub mod memory;
pub mod websocket;

pub use memory::{MemoryHost, MemoryTransport, memory_pair};
pub use websocket::WebSocketTransport;

use crate::error::{BridgeError, TransportError};
use crate::wire::Outgoing;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info};
use tokio::sync::mpsc;

/// Something the channel reports to the bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Handshake completed; frames may flow.
    Opened,
    /// A frame from the host.
    Message(Vec<u8>),
    /// The channel closed.
    Closed,
    /// A connect attempt failed or timed out.
    ConnectFailed(String),
}

pub type EventSender = mpsc::UnboundedSender<TransportEvent>;

/// Raw duplex channel to the host.
///
/// Implementations deliver [`TransportEvent::Message`] and
/// [`TransportEvent::Closed`] on the sender handed to [`connect`](Self::connect)
/// for as long as that connection lives. `Opened` and `ConnectFailed` are
/// produced by the adapter, not the transport.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open the channel and complete any handshake.
    async fn connect(&self, events: EventSender) -> Result<(), TransportError>;

    /// Hand a frame to the transport. Success means hand-off, not delivery.
    fn send_raw(&self, bytes: Vec<u8>) -> Result<(), TransportError>;

    /// Close the current connection, if any.
    async fn close(&self);
}

/// Transport event stamped with the connection it belongs to.
#[derive(Debug)]
pub(crate) struct AdapterEvent {
    pub(crate) generation: u64,
    pub(crate) event: TransportEvent,
}

/// Why a frame could not be handed to the transport.
#[derive(Debug)]
pub(crate) enum SendFailure {
    Encode(BridgeError),
    Transport(TransportError),
}

pub(crate) struct ChannelAdapter {
    transport: Arc<dyn Transport>,
    events: mpsc::UnboundedSender<AdapterEvent>,
    connect_timeout: Duration,
    generation: u64,
}

impl ChannelAdapter {
    pub(crate) fn new(
        transport: Arc<dyn Transport>,
        events: mpsc::UnboundedSender<AdapterEvent>,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            transport,
            events,
            connect_timeout,
            generation: 0,
        }
    }

    #[cfg(test)]
    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    /// Start a connect attempt in the background.
    ///
    /// Reports `Opened` or `ConnectFailed`, then forwards the connection's
    /// events, all stamped with the returned generation.
    pub(crate) fn connect(&mut self) -> u64 {
        self.generation += 1;
        let generation = self.generation;
        let transport = Arc::clone(&self.transport);
        let events = self.events.clone();
        let connect_timeout = self.connect_timeout;

        debug!("Starting connect attempt (generation {})", generation);

        tokio::spawn(async move {
            let (tx, mut rx) = mpsc::unbounded_channel();

            let outcome =
                match tokio::time::timeout(connect_timeout, transport.connect(tx)).await {
                    Ok(Ok(())) => TransportEvent::Opened,
                    Ok(Err(e)) => TransportEvent::ConnectFailed(e.to_string()),
                    Err(_) => TransportEvent::ConnectFailed(
                        TransportError::handshake(format!(
                            "Handshake timed out after {connect_timeout:?}"
                        ))
                        .to_string(),
                    ),
                };

            let opened = outcome == TransportEvent::Opened;
            if events
                .send(AdapterEvent {
                    generation,
                    event: outcome,
                })
                .is_err()
                || !opened
            {
                return;
            }

            while let Some(event) = rx.recv().await {
                if events.send(AdapterEvent { generation, event }).is_err() {
                    break;
                }
            }

            debug!("Event forwarding for generation {} ended", generation);
        });

        generation
    }

    /// Encode and hand a frame to the transport.
    pub(crate) fn send(&self, frame: &Outgoing) -> Result<(), SendFailure> {
        let bytes = frame.encode().map_err(SendFailure::Encode)?;
        self.transport
            .send_raw(bytes)
            .map_err(SendFailure::Transport)
    }

    /// Close the live connection; its late events are ignored from now on.
    pub(crate) async fn close(&mut self) {
        self.generation += 1;
        self.transport.close().await;
        info!("Channel closed by bridge");
    }

    /// Whether an event belongs to the live connection.
    pub(crate) fn is_current(&self, event: &AdapterEvent) -> bool {
        if event.generation == self.generation {
            true
        } else {
            debug!(
                "Dropping {} from stale connection generation {} (current {})",
                event_kind(&event.event),
                event.generation,
                self.generation
            );
            false
        }
    }
}

fn event_kind(event: &TransportEvent) -> &'static str {
    match event {
        TransportEvent::Opened => "Opened",
        TransportEvent::Message(_) => "Message",
        TransportEvent::Closed => "Closed",
        TransportEvent::ConnectFailed(_) => "ConnectFailed",
    }
}
