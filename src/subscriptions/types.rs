//! Subscription manager types.

use serde::{Deserialize, Serialize};

use crate::bridge::SERVICE_NAME;
use crate::registry::FailurePolicy;

/// Handshake lifecycle of the manager.
///
/// Starts in `Init`, moves once to `Registered` or `Error` and never back.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManagerState {
    /// Handshake not confirmed yet; calls are queued.
    Init,
    /// Event conduit is live; calls run immediately.
    Registered,
    /// Handshake failed; calls fail fast.
    Error,
}

/// How an add or remove request completed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// First listener for the key; the native side confirmed `subscribe`.
    Subscribed,
    /// The key was already subscribed; no bridge call was made.
    AlreadySubscribed,
    /// Last listener removed; the native side confirmed `unsubscribe`.
    Unsubscribed,
    /// Listener removed, others remain for the key.
    StillSubscribed,
    /// The listener was not registered for the key.
    NotFound,
}

/// Configuration for a subscription manager.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Service name addressed on the bridge.
    /// Default: "Sensors"
    pub service: String,

    /// Handshake confirmation literal.
    /// Default: "registered"
    pub confirmation: String,

    /// Send the sampling rate along with the sensor type on `unsubscribe`.
    /// Default: true
    pub unsubscribe_with_sampling: bool,

    /// Fan-out behavior when a listener panics.
    pub listener_failures: FailurePolicy,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            service: SERVICE_NAME.to_string(),
            confirmation: "registered".to_string(),
            unsubscribe_with_sampling: true,
            listener_failures: FailurePolicy::Isolate,
        }
    }
}
