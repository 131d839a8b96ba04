//! Core types shared by the registry and the subscription manager.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::error::{BridgeError, Result};

/// Composite lookup key: sensor type plus sampling rate.
///
/// Both parts are compared exactly (case-sensitive). Keys only live as
/// long as the process.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SensorKey {
    pub sensor: String,
    pub sampling: String,
}

impl SensorKey {
    pub fn new(sensor: impl Into<String>, sampling: impl Into<String>) -> Self {
        Self {
            sensor: sensor.into(),
            sampling: sampling.into(),
        }
    }
}

impl fmt::Debug for SensorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SensorKey({}:{})", self.sensor, self.sampling)
    }
}

impl fmt::Display for SensorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.sensor, self.sampling)
    }
}

/// Event pushed by the native side for a subscribed sensor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SensorEvent {
    /// The sensor type that is listened to.
    pub sensor: String,
    /// The sampling rate the receiving listeners were registered with.
    #[serde(default)]
    pub sampling: String,
    /// Time the event was emitted.
    #[serde(rename = "timeStamp", default)]
    pub time_stamp: i64,
    #[serde(default)]
    pub values: Vec<f64>,
}

impl SensorEvent {
    /// Decode an event from the payload delivered on the bridge conduit.
    ///
    /// An absent or empty `sensor` field is a protocol error.
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let has_sensor = value
            .get("sensor")
            .and_then(|s| s.as_str())
            .is_some_and(|s| !s.is_empty());
        if !has_sensor {
            return Err(BridgeError::MalformedEvent(format!(
                "missing sensor field in {}",
                value
            )));
        }
        Ok(serde_json::from_value(value)?)
    }

    pub fn key(&self) -> SensorKey {
        SensorKey::new(self.sensor.clone(), self.sampling.clone())
    }
}

/// Callable listener handle, compared by identity.
///
/// Cloning a `Listener` yields the same identity; wrapping the same
/// closure twice with [`Listener::new`] yields two distinct listeners.
#[derive(Clone)]
pub struct Listener(Arc<dyn Fn(&SensorEvent) + Send + Sync>);

impl Listener {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&SensorEvent) + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// True if both handles refer to the same listener instance.
    pub fn same(&self, other: &Listener) -> bool {
        self.addr() == other.addr()
    }

    pub(crate) fn call(&self, event: &SensorEvent) {
        (self.0)(event)
    }

    fn addr(&self) -> *const () {
        Arc::as_ptr(&self.0) as *const ()
    }
}

impl PartialEq for Listener {
    fn eq(&self, other: &Self) -> bool {
        self.same(other)
    }
}

impl Eq for Listener {}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Listener({:p})", self.addr())
    }
}
