//! # Sensor Bridge
//!
//! Application-side half of a native sensor plugin: listeners register for
//! a sensor type at a sampling rate, and the native side is asked to
//! subscribe or unsubscribe only when the first listener of a key arrives
//! or the last one leaves.
//!
//! ## Core Concepts
//!
//! - **Registry**: ordered listeners per (sensor, sampling) key, with
//!   first/last transition detection and live fan-out
//! - **Bridge**: opaque asynchronous RPC to the native platform
//! - **Subscriptions**: handshake state machine, pending-call queue and
//!   event ingress
//!
//! ## Example
//!
//! ```ignore
//! use sensor_bridge::{ChannelBridge, Completion, Listener, SubscriptionManager};
//!
//! let (bridge, native) = ChannelBridge::new();
//! let manager = SubscriptionManager::new(bridge);
//! manager.connect()?;
//!
//! let listener = Listener::new(|event| println!("{:?}", event.values));
//! manager.add_sensor_listener("ACCELEROMETER", "UI", &listener, Completion::none());
//!
//! // ... the native side serves `native` requests and pushes events ...
//!
//! manager.remove_sensor_listener("ACCELEROMETER", "UI", &listener, Completion::none());
//! ```

pub mod bridge;
pub mod error;
pub mod registry;
pub mod subscriptions;
pub mod types;

// Re-exports
pub use bridge::channel::{ChannelBridge, NativeEndpoint, NativeRequest};
pub use bridge::{Bridge, BridgeCall, Conduit, Method, Reply, SERVICE_NAME};
pub use error::{BridgeError, Result};
pub use registry::{DispatchReport, Dispatcher, FailurePolicy, ListenerRegistry};
pub use subscriptions::{Completion, ManagerConfig, ManagerState, Outcome, SubscriptionManager};
pub use types::{Listener, SensorEvent, SensorKey};
