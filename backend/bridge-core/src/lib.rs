pub mod batch;
pub mod channel;
mod clock;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod metrics;
pub mod monitor;
pub mod queue;
pub mod registry;
pub mod retry;
pub mod wire;

#[cfg(test)]
mod tests;

pub use channel::{MemoryHost, MemoryTransport, Transport, TransportEvent, WebSocketTransport, memory_pair};
pub use config::{BridgeConfig, CallOptions, Priority};
pub use dispatcher::{Bridge, PendingCall};
pub use error::{BridgeError, ConfigError, TransportError};
pub use metrics::MetricsSnapshot;
pub use monitor::ConnectionState;
pub use registry::Subscription;
pub use wire::RequestId;
