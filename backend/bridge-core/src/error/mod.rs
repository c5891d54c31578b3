pub mod bridge;
pub mod config;
pub mod transport;

pub use bridge::BridgeError;
pub use config::ConfigError;
pub use transport::TransportError;
