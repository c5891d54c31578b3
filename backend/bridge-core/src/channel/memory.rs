//! In-process transport.
//!
//! [`memory_pair`] returns the bridge side ([`MemoryTransport`]) and the host
//! side ([`MemoryHost`]) of one channel. The host side controls whether
//! connect attempts succeed, can drop the link, and reads and writes frames.
//! Used by the test suites and by embedders hosting both ends in one process.

use crate::channel::{EventSender, Transport, TransportEvent};
use crate::error::{BridgeError, TransportError};
use crate::wire::{Incoming, Outgoing};

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use log::{debug, warn};
use tokio::sync::Mutex as AsyncMutex;
use tokio::sync::mpsc;

#[derive(Debug)]
struct Shared {
    available: AtomicBool,
    connects: AtomicUsize,
    link: Mutex<Option<EventSender>>,
}

impl Shared {
    fn link(&self) -> Option<EventSender> {
        self.link.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn take_link(&self) -> Option<EventSender> {
        self.link.lock().unwrap_or_else(|e| e.into_inner()).take()
    }
}

/// Bridge side of an in-process channel.
#[derive(Debug)]
pub struct MemoryTransport {
    shared: Arc<Shared>,
    to_host: mpsc::UnboundedSender<Vec<u8>>,
}

/// Host side of an in-process channel.
#[derive(Debug)]
pub struct MemoryHost {
    shared: Arc<Shared>,
    from_bridge: AsyncMutex<mpsc::UnboundedReceiver<Vec<u8>>>,
}

/// Create a connected transport/host pair. The host starts available.
pub fn memory_pair() -> (MemoryTransport, MemoryHost) {
    let shared = Arc::new(Shared {
        available: AtomicBool::new(true),
        connects: AtomicUsize::new(0),
        link: Mutex::new(None),
    });
    let (to_host, from_bridge) = mpsc::unbounded_channel();

    (
        MemoryTransport {
            shared: Arc::clone(&shared),
            to_host,
        },
        MemoryHost {
            shared,
            from_bridge: AsyncMutex::new(from_bridge),
        },
    )
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn connect(&self, events: EventSender) -> Result<(), TransportError> {
        if !self.shared.available.load(Ordering::SeqCst) {
            return Err(TransportError::connect("Memory host unavailable"));
        }

        *self.shared.link.lock().unwrap_or_else(|e| e.into_inner()) = Some(events);
        self.shared.connects.fetch_add(1, Ordering::SeqCst);
        debug!("Memory transport linked");
        Ok(())
    }

    fn send_raw(&self, bytes: Vec<u8>) -> Result<(), TransportError> {
        if self.shared.link().is_none() {
            return Err(TransportError::not_connected());
        }

        self.to_host
            .send(bytes)
            .map_err(|_| TransportError::send("Memory host endpoint dropped"))
    }

    async fn close(&self) {
        if self.shared.take_link().is_some() {
            debug!("Memory transport unlinked by bridge");
        }
    }
}

impl MemoryHost {
    /// Control whether future connect attempts succeed.
    pub fn set_available(&self, available: bool) {
        self.shared.available.store(available, Ordering::SeqCst);
    }

    /// Whether the bridge currently holds a live link.
    pub fn is_linked(&self) -> bool {
        self.shared.link().is_some()
    }

    /// Number of successful connects so far.
    pub fn connect_count(&self) -> usize {
        self.shared.connects.load(Ordering::SeqCst)
    }

    /// Close the channel from the host side.
    pub fn drop_link(&self) {
        if let Some(link) = self.shared.take_link() {
            let _ = link.send(TransportEvent::Closed);
        }
    }

    /// Next raw frame written by the bridge.
    pub async fn recv_raw(&self) -> Option<Vec<u8>> {
        self.from_bridge.lock().await.recv().await
    }

    /// Next decodable frame written by the bridge.
    pub async fn next_frame(&self) -> Option<Outgoing> {
        loop {
            let bytes = self.recv_raw().await?;
            match Outgoing::decode(&bytes) {
                Ok(frame) => return Some(frame),
                Err(e) => warn!("Memory host skipping undecodable frame: {}", e),
            }
        }
    }

    /// Frame already written by the bridge, without waiting.
    pub fn try_next_frame(&self) -> Option<Outgoing> {
        let mut rx = self.from_bridge.try_lock().ok()?;
        while let Ok(bytes) = rx.try_recv() {
            if let Ok(frame) = Outgoing::decode(&bytes) {
                return Some(frame);
            }
        }
        None
    }

    /// Deliver a frame to the bridge.
    pub fn send(&self, frame: &Incoming) -> Result<(), BridgeError> {
        let bytes = frame.encode()?;
        self.send_raw(bytes)
            .map_err(|e| BridgeError::channel_closed(e.to_string()))
    }

    /// Deliver raw bytes to the bridge.
    pub fn send_raw(&self, bytes: Vec<u8>) -> Result<(), TransportError> {
        let link = self.shared.link().ok_or_else(TransportError::not_connected)?;
        link.send(TransportEvent::Message(bytes))
            .map_err(|_| TransportError::send("Bridge stopped listening"))
    }
}
