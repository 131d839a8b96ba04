//! Error types for the sensor bridge.

use serde_json::Value;
use std::any::Any;
use thiserror::Error;

/// Main error type for registry, subscription and event ingress failures.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Malformed sensor event: {0}")]
    MalformedEvent(String),

    #[error("Received unexpected event from non subscribed sensor: {sensor} ({sampling})")]
    UnsubscribedSensor { sensor: String, sampling: String },

    #[error("{failed} listener(s) of {sensor} ({sampling}) failed: {message}")]
    ListenerFailed {
        sensor: String,
        sampling: String,
        failed: usize,
        message: String,
    },

    #[error("Expecting confirmation for the callback registration but received: {0}")]
    HandshakeFailed(String),

    #[error("Bridge call failed: {0}")]
    Remote(Value),

    #[error("Event conduit failed: {0}")]
    Conduit(Value),

    #[error("Sensor bridge unavailable: callback registration failed")]
    Unavailable,

    #[error("Event callback already registered")]
    AlreadyConnected,

    #[error("Subscription manager has been dropped")]
    Detached,

    #[error("Operation panicked: {0}")]
    Panicked(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for BridgeError {
    fn from(e: serde_json::Error) -> Self {
        BridgeError::Serialization(e.to_string())
    }
}

/// Best-effort text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Result type for sensor bridge operations.
pub type Result<T> = std::result::Result<T, BridgeError>;
