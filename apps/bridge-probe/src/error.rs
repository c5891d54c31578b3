use bridge_core::{BridgeError, ConfigError, TransportError};

use common::ErrorLocation;

use std::panic::Location;

use serde::Serialize;
use thiserror::Error;

/// Errors surfaced by the probe.
///
/// Library errors are flattened to their message so the probe can report
/// them uniformly, keeping the location where the probe saw them.
#[derive(Debug, Error, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum ProbeError {
    /// Error from this app (logging, directories, output)
    #[error("Probe Error: {message} {location}")]
    Probe {
        message: String,
        location: ErrorLocation,
    },

    /// Bad command line
    #[error("Usage Error: {message} {location}")]
    Usage {
        message: String,
        location: ErrorLocation,
    },

    /// Config file could not be loaded
    #[error("Config Error: {message} {location}")]
    Config {
        message: String,
        location: ErrorLocation,
    },

    /// The host could not be reached
    #[error("Connect Error: {message} {location}")]
    Connect {
        message: String,
        location: ErrorLocation,
    },

    /// The call itself failed
    #[error("Call Error: {category}: {message} {location}")]
    Call {
        category: String,
        message: String,
        location: ErrorLocation,
    },
}

impl From<ConfigError> for ProbeError {
    #[track_caller]
    fn from(error: ConfigError) -> Self {
        ProbeError::Config {
            message: error.to_string(),
            location: ErrorLocation::from(Location::caller()),
        }
    }
}

impl From<TransportError> for ProbeError {
    #[track_caller]
    fn from(error: TransportError) -> Self {
        ProbeError::Connect {
            message: error.to_string(),
            location: ErrorLocation::from(Location::caller()),
        }
    }
}

impl From<BridgeError> for ProbeError {
    #[track_caller]
    fn from(error: BridgeError) -> Self {
        ProbeError::Call {
            category: error.error_category().to_string(),
            message: error.to_string(),
            location: ErrorLocation::from(Location::caller()),
        }
    }
}
