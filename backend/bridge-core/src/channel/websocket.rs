//! WebSocket transport.
//!
//! Connects to the host with `tokio-tungstenite` and splits the stream into a
//! writer task fed by an unbounded queue (so `send_raw` is a synchronous
//! hand-off) and a reader task forwarding binary and text frames to the
//! bridge. Frames go out as binary messages.
//!
//! # Security
//!
//! The URL comes from configuration; only `ws` and `wss` schemes are accepted.

use crate::channel::{EventSender, Transport, TransportEvent};
use crate::error::TransportError;

use std::sync::Mutex;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use tokio::spawn as TokioSpawn;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

#[derive(Debug)]
pub struct WebSocketTransport {
    url: Url,
    outbound: Mutex<Option<mpsc::UnboundedSender<Message>>>,
}

impl WebSocketTransport {
    /// # Errors
    ///
    /// Returns [`TransportError::Connect`] if `url` is not a `ws`/`wss` URL.
    pub fn new(url: Url) -> Result<Self, TransportError> {
        match url.scheme() {
            "ws" | "wss" => Ok(Self {
                url,
                outbound: Mutex::new(None),
            }),
            other => Err(TransportError::connect(format!(
                "Unsupported WebSocket scheme '{other}' in {url}"
            ))),
        }
    }

    /// # Errors
    ///
    /// Returns [`TransportError::Connect`] if `url` does not parse or is not a WebSocket URL.
    pub fn parse(url: &str) -> Result<Self, TransportError> {
        let url = Url::parse(url)
            .map_err(|e| TransportError::connect(format!("Invalid WebSocket URL '{url}': {e}")))?;
        Self::new(url)
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn connect(&self, events: EventSender) -> Result<(), TransportError> {
        let (ws_stream, _response) = connect_async(self.url.as_str()).await.map_err(|e| {
            warn!("WebSocket connect to {} failed: {}", self.url, e);
            TransportError::from(e)
        })?;

        info!("WebSocket connected to {}", self.url);

        let (mut write, mut read) = ws_stream.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

        TokioSpawn(async move {
            while let Some(message) = rx.recv().await {
                if let Err(e) = write.send(message).await {
                    warn!("WebSocket write failed: {}", e);
                    break;
                }
            }
            let _ = write.close().await;
            debug!("WebSocket writer stopped");
        });

        TokioSpawn(async move {
            while let Some(message) = read.next().await {
                match message {
                    Ok(message) if message.is_binary() || message.is_text() => {
                        let bytes = message.into_data().to_vec();
                        if events.send(TransportEvent::Message(bytes)).is_err() {
                            break;
                        }
                    }
                    Ok(Message::Close(frame)) => {
                        debug!("WebSocket close frame received: {:?}", frame);
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        error!("{}", TransportError::read(e.to_string()));
                        break;
                    }
                }
            }
            let _ = events.send(TransportEvent::Closed);
            debug!("WebSocket reader stopped");
        });

        *self.outbound.lock().unwrap_or_else(|e| e.into_inner()) = Some(tx);
        Ok(())
    }

    fn send_raw(&self, bytes: Vec<u8>) -> Result<(), TransportError> {
        let guard = self.outbound.lock().unwrap_or_else(|e| e.into_inner());
        let tx = guard.as_ref().ok_or_else(TransportError::not_connected)?;

        tx.send(Message::Binary(bytes.into()))
            .map_err(|_| TransportError::send("WebSocket writer stopped"))
    }

    async fn close(&self) {
        let previous = self
            .outbound
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if previous.is_some() {
            debug!("WebSocket outbound queue dropped; writer will close the socket");
        }
    }
}
