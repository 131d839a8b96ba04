//! Reference-counted sensor subscriptions over the native bridge.
//!
//! This module turns listener registrations into bridge traffic:
//! - `subscribe` when a (sensor, sampling) key gets its first listener
//! - `unsubscribe` when it loses its last one
//! - inbound events fanned out to the registered listeners
//!
//! Requests issued before the `registerCallback` handshake is confirmed are
//! queued and replayed in order once it is.
//!
//! # Example
//!
//! ```ignore
//! let (bridge, native) = ChannelBridge::new();
//! let manager = SubscriptionManager::new(bridge);
//! manager.connect()?;
//!
//! let listener = Listener::new(|event| println!("rotation {:?}", event.values));
//! manager.add_sensor_listener(
//!     "ROTATION_VECTOR",
//!     "GAME",
//!     &listener,
//!     Completion::new(|result| {
//!         if let Err(e) = result {
//!             eprintln!("could not listen to sensor: {}", e);
//!         }
//!     }),
//! );
//! ```

mod completion;
mod manager;
mod types;

pub use completion::Completion;
pub use manager::SubscriptionManager;
pub use types::{ManagerConfig, ManagerState, Outcome};
