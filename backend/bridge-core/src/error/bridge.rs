//! Errors surfaced to bridge callers.
//!
//! Key design decisions:
//! - One variant per outcome a caller can react to differently
//! - Host application errors carry the host payload verbatim
//! - `is_retryable()` uses the variant, never message content
//! - All errors include ErrorLocation for debugging

use common::ErrorLocation;

use std::panic::Location;

use serde_json::Value;
use thiserror::Error as ThisError;

#[derive(Debug, Clone, ThisError)]
pub enum BridgeError {
    /// Deadline exceeded on the final attempt.
    #[error("Timeout Error: '{method}' got no reply after {attempts} attempt(s) {location}")]
    Timeout {
        method: String,
        attempts: u32,
        location: ErrorLocation,
    },

    /// The caller cancelled the request.
    #[error("Cancelled: request {id} {location}")]
    Cancelled { id: String, location: ErrorLocation },

    /// Sending was impossible: channel down and the request could not be queued,
    /// the bridge shut down, or send failures exhausted every attempt.
    #[error("Channel Closed Error: {message} {location}")]
    ChannelClosed {
        message: String,
        location: ErrorLocation,
    },

    /// Evicted from the offline queue before it was ever sent.
    #[error("Queue Overflow Error: request {id} evicted from offline queue (capacity {capacity}) {location}")]
    QueueOverflow {
        id: String,
        capacity: usize,
        location: ErrorLocation,
    },

    /// The host answered `ok: false`.
    #[error("Host Error: {payload} {location}")]
    Host {
        payload: Value,
        location: ErrorLocation,
    },

    /// Malformed or unmatched wire message.
    #[error("Protocol Error: {message} {location}")]
    Protocol {
        message: String,
        location: ErrorLocation,
    },
}

impl BridgeError {
    #[track_caller]
    pub fn timeout(method: impl Into<String>, attempts: u32) -> Self {
        BridgeError::Timeout {
            method: method.into(),
            attempts,
            location: ErrorLocation::from(Location::caller()),
        }
    }

    #[track_caller]
    pub fn cancelled(id: impl Into<String>) -> Self {
        BridgeError::Cancelled {
            id: id.into(),
            location: ErrorLocation::from(Location::caller()),
        }
    }

    #[track_caller]
    pub fn channel_closed(message: impl Into<String>) -> Self {
        BridgeError::ChannelClosed {
            message: message.into(),
            location: ErrorLocation::from(Location::caller()),
        }
    }

    #[track_caller]
    pub fn queue_overflow(id: impl Into<String>, capacity: usize) -> Self {
        BridgeError::QueueOverflow {
            id: id.into(),
            capacity,
            location: ErrorLocation::from(Location::caller()),
        }
    }

    #[track_caller]
    pub fn host(payload: Value) -> Self {
        BridgeError::Host {
            payload,
            location: ErrorLocation::from(Location::caller()),
        }
    }

    #[track_caller]
    pub fn protocol(message: impl Into<String>) -> Self {
        BridgeError::Protocol {
            message: message.into(),
            location: ErrorLocation::from(Location::caller()),
        }
    }

    /// Whether issuing the same call again may succeed.
    ///
    /// Host errors are logical failures and retrying a non-idempotent method is
    /// not safe, so they are never retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            BridgeError::Timeout { .. } => true,
            BridgeError::ChannelClosed { .. } => true,
            BridgeError::QueueOverflow { .. } => true,

            BridgeError::Cancelled { .. } => false,
            BridgeError::Host { .. } => false,
            BridgeError::Protocol { .. } => false,
        }
    }

    /// Get error category for metrics and logs.
    pub fn error_category(&self) -> &'static str {
        match self {
            BridgeError::Timeout { .. } => "timeout",
            BridgeError::Cancelled { .. } => "cancelled",
            BridgeError::ChannelClosed { .. } => "channel_closed",
            BridgeError::QueueOverflow { .. } => "queue_overflow",
            BridgeError::Host { .. } => "host",
            BridgeError::Protocol { .. } => "protocol",
        }
    }

    /// Host payload for `Host` errors.
    pub fn host_payload(&self) -> Option<&Value> {
        match self {
            BridgeError::Host { payload, .. } => Some(payload),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for BridgeError {
    #[track_caller]
    fn from(error: serde_json::Error) -> Self {
        BridgeError::Protocol {
            message: error.to_string(),
            location: ErrorLocation::from(Location::caller()),
        }
    }
}
