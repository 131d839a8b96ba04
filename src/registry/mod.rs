//! In-memory listener registry.
//!
//! Listeners are grouped by [`SensorKey`](crate::SensorKey) in insertion
//! order. The registry reports the two transitions the subscription layer
//! cares about:
//! - first listener added for a key (time to subscribe)
//! - last listener removed for a key (time to unsubscribe)
//!
//! # Example
//!
//! ```ignore
//! let registry = ListenerRegistry::new();
//! let key = SensorKey::new("ACCELEROMETER", "UI");
//! let listener = Listener::new(|event| println!("{:?}", event.values));
//!
//! assert!(registry.add_listener(&key, listener.clone()));
//! registry.dispatcher(key.clone()).dispatch(&event);
//! assert!(registry.remove_listener(&key, &listener));
//! ```

mod listeners;

pub use listeners::{DispatchReport, Dispatcher, FailurePolicy, ListenerRegistry};
