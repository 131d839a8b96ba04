//! Listener registry keyed by sensor type and sampling rate.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use crate::error::panic_message;
use crate::types::{Listener, SensorEvent, SensorKey};

type ListenerMap = HashMap<SensorKey, Vec<Listener>>;

/// What to do when a listener panics during fan-out.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Keep calling the remaining listeners; failures are reported afterwards.
    #[default]
    Isolate,
    /// Stop the fan-out at the first failing listener.
    Abort,
}

/// Result of one fan-out.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Listeners that returned normally.
    pub delivered: usize,
    /// Panic messages of listeners that failed, in call order.
    pub failures: Vec<String>,
    /// Listeners skipped because an earlier one failed under `Abort`.
    pub skipped: usize,
}

impl DispatchReport {
    /// True if at least one listener was registered for the key.
    pub fn had_listeners(&self) -> bool {
        self.delivered + self.failures.len() + self.skipped > 0
    }
}

/// Ordered listener lists per key.
///
/// An empty list is never stored: removing the last listener drops the key.
#[derive(Clone, Default)]
pub struct ListenerRegistry {
    listeners: Arc<RwLock<ListenerMap>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a listener for `key`.
    ///
    /// Returns true if no listener was registered for this key before.
    /// Registering the same listener twice creates two entries.
    pub fn add_listener(&self, key: &SensorKey, listener: Listener) -> bool {
        match self.listeners.write().entry(key.clone()) {
            Entry::Occupied(mut entry) => {
                entry.get_mut().push(listener);
                false
            }
            Entry::Vacant(entry) => {
                entry.insert(vec![listener]);
                true
            }
        }
    }

    /// Remove the first occurrence of `listener` under `key`.
    ///
    /// Returns true only if the listener was found and was the last one for
    /// the key; the key is dropped in that case. An unknown key or listener
    /// leaves the registry untouched and returns false.
    pub fn remove_listener(&self, key: &SensorKey, listener: &Listener) -> bool {
        let mut map = self.listeners.write();
        let Some(list) = map.get_mut(key) else {
            return false;
        };
        let Some(pos) = list.iter().position(|l| l.same(listener)) else {
            return false;
        };
        list.remove(pos);
        if list.is_empty() {
            map.remove(key);
            true
        } else {
            false
        }
    }

    pub fn contains_listener(&self, key: &SensorKey, listener: &Listener) -> bool {
        self.listeners
            .read()
            .get(key)
            .is_some_and(|list| list.iter().any(|l| l.same(listener)))
    }

    /// Number of entries registered under `key`, duplicates included.
    pub fn listener_count(&self, key: &SensorKey) -> usize {
        self.listeners.read().get(key).map_or(0, Vec::len)
    }

    /// Keys that currently have at least one listener, sorted.
    pub fn keys(&self) -> Vec<SensorKey> {
        let mut keys: Vec<_> = self
            .listeners
            .read()
            .iter()
            .filter(|(_, list)| !list.is_empty())
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.read().values().all(Vec::is_empty)
    }

    /// Build a dispatcher bound to `key`.
    ///
    /// The dispatcher reads the live list on every call, so listeners added
    /// or removed later are taken into account.
    pub fn dispatcher(&self, key: SensorKey) -> Dispatcher {
        Dispatcher {
            listeners: Arc::clone(&self.listeners),
            key,
            policy: FailurePolicy::default(),
        }
    }
}

/// Fan-out callable for a single key.
#[derive(Clone)]
pub struct Dispatcher {
    listeners: Arc<RwLock<ListenerMap>>,
    key: SensorKey,
    policy: FailurePolicy,
}

impl Dispatcher {
    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn key(&self) -> &SensorKey {
        &self.key
    }

    /// Call every listener of the key in insertion order.
    ///
    /// The list is snapshotted before the first call, so listeners may add
    /// or remove listeners without deadlocking; such changes apply from the
    /// next dispatch on.
    pub fn dispatch(&self, event: &SensorEvent) -> DispatchReport {
        let snapshot = match self.listeners.read().get(&self.key) {
            Some(list) => list.clone(),
            None => return DispatchReport::default(),
        };

        let mut report = DispatchReport::default();
        for (i, listener) in snapshot.iter().enumerate() {
            match catch_unwind(AssertUnwindSafe(|| listener.call(event))) {
                Ok(()) => report.delivered += 1,
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    tracing::warn!(key = %self.key, %message, "sensor listener panicked");
                    report.failures.push(message);
                    if self.policy == FailurePolicy::Abort {
                        report.skipped = snapshot.len() - i - 1;
                        break;
                    }
                }
            }
        }
        report
    }
}
