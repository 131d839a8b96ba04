//! Subscription manager translating listener changes into bridge calls.

use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use super::completion::{guarded, Completion};
use super::types::{ManagerConfig, ManagerState, Outcome};
use crate::bridge::{Bridge, BridgeCall, Conduit, Method, Reply};
use crate::error::{panic_message, BridgeError, Result};
use crate::registry::ListenerRegistry;
use crate::types::{Listener, SensorEvent, SensorKey};

/// Handler currently bound to the conduit.
type Handler = fn(&Arc<Inner>, Value) -> Result<()>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CallKind {
    Add,
    Remove,
}

/// A recorded add/remove request.
struct PendingCall {
    kind: CallKind,
    key: SensorKey,
    listener: Listener,
    completion: Completion,
    /// Already parked behind a transition of its key once.
    deferred: bool,
}

/// Per-key bookkeeping while a `subscribe` or `unsubscribe` is outstanding.
///
/// The entry lives until the reply has arrived and every call deferred
/// behind it has been replayed.
#[derive(Default)]
struct Transition {
    in_flight: bool,
    replaying: bool,
    deferred: VecDeque<PendingCall>,
}

struct Lifecycle {
    state: ManagerState,
    connected: bool,
    /// Present while calls must be queued: before the handshake and while
    /// the queue is being replayed.
    pending: Option<VecDeque<PendingCall>>,
    transitions: HashMap<SensorKey, Transition>,
    handler: Handler,
}

impl Lifecycle {
    /// Park `call` behind the transition of its key, or hand it back if
    /// it may run now.
    fn defer(&mut self, mut call: PendingCall) -> Option<PendingCall> {
        if call.deferred {
            return Some(call);
        }
        let Some(transition) = self.transitions.get_mut(&call.key) else {
            return Some(call);
        };
        tracing::debug!(key = %call.key, kind = ?call.kind, "waiting for in-flight transition");
        call.deferred = true;
        transition.deferred.push_back(call);
        None
    }

    fn begin(&mut self, key: &SensorKey) {
        self.transitions.entry(key.clone()).or_default().in_flight = true;
    }
}

struct Inner {
    config: ManagerConfig,
    registry: ListenerRegistry,
    bridge: Box<dyn Bridge>,
    lifecycle: Mutex<Lifecycle>,
}

/// Multiplexes sensor listeners onto native subscriptions.
///
/// At most one `subscribe` is issued when a key gets its first listener
/// and one `unsubscribe` when it loses its last. Requests made before the
/// handshake completes are queued and replayed in order. While either call
/// is outstanding, later requests for the same key wait for its reply and
/// then run in order.
#[derive(Clone)]
pub struct SubscriptionManager {
    inner: Arc<Inner>,
}

impl SubscriptionManager {
    /// Create a manager with the default configuration.
    pub fn new(bridge: impl Bridge + 'static) -> Self {
        Self::with_config(bridge, ManagerConfig::default())
    }

    pub fn with_config(bridge: impl Bridge + 'static, config: ManagerConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                registry: ListenerRegistry::new(),
                bridge: Box::new(bridge),
                lifecycle: Mutex::new(Lifecycle {
                    state: ManagerState::Init,
                    connected: false,
                    pending: Some(VecDeque::new()),
                    transitions: HashMap::new(),
                    handler: Inner::handle_confirmation,
                }),
            }),
        }
    }

    /// Send `registerCallback` and start waiting for the confirmation.
    ///
    /// Call once, when the host runtime is ready.
    pub fn connect(&self) -> Result<()> {
        {
            let mut life = self.inner.lifecycle.lock();
            if life.connected {
                return Err(BridgeError::AlreadyConnected);
            }
            life.connected = true;
        }

        let weak = Arc::downgrade(&self.inner);
        let conduit = Conduit::new(move |message| match weak.upgrade() {
            Some(inner) => inner.on_message(message),
            None => Err(BridgeError::Detached),
        });
        let call = BridgeCall::new(
            self.inner.config.service.clone(),
            Method::RegisterCallback,
            Vec::new(),
        );

        tracing::debug!(service = %call.service, "registering event callback");
        self.inner.bridge.register_callback(call, conduit);
        Ok(())
    }

    /// Register `listener` for events of `sensor_type` at `sampling_rate`.
    ///
    /// Completion reports `Subscribed` when this opened the native
    /// subscription, `AlreadySubscribed` when it was already open. A failed
    /// `subscribe` removes the listener again before rejecting.
    pub fn add_sensor_listener(
        &self,
        sensor_type: &str,
        sampling_rate: &str,
        listener: &Listener,
        completion: Completion,
    ) {
        self.inner.submit(PendingCall {
            kind: CallKind::Add,
            key: SensorKey::new(sensor_type, sampling_rate),
            listener: listener.clone(),
            completion,
            deferred: false,
        });
    }

    /// Remove one registration of `listener`.
    ///
    /// When it is the last listener of its key, `unsubscribe` is sent first
    /// and the listener keeps receiving events until the native side
    /// confirms; on failure it stays registered.
    pub fn remove_sensor_listener(
        &self,
        sensor_type: &str,
        sampling_rate: &str,
        listener: &Listener,
        completion: Completion,
    ) {
        self.inner.submit(PendingCall {
            kind: CallKind::Remove,
            key: SensorKey::new(sensor_type, sampling_rate),
            listener: listener.clone(),
            completion,
            deferred: false,
        });
    }

    pub fn state(&self) -> ManagerState {
        self.inner.lifecycle.lock().state
    }

    /// Requests waiting for the handshake.
    pub fn pending_calls(&self) -> usize {
        self.inner
            .lifecycle
            .lock()
            .pending
            .as_ref()
            .map_or(0, VecDeque::len)
    }

    /// True while a `subscribe` or `unsubscribe` for the key awaits its reply
    /// or the requests that waited for it are being replayed.
    pub fn in_transition(&self, sensor_type: &str, sampling_rate: &str) -> bool {
        self.inner
            .lifecycle
            .lock()
            .transitions
            .contains_key(&SensorKey::new(sensor_type, sampling_rate))
    }

    /// True if at least one listener is registered for the key.
    pub fn is_subscribed(&self, sensor_type: &str, sampling_rate: &str) -> bool {
        self.inner
            .registry
            .listener_count(&SensorKey::new(sensor_type, sampling_rate))
            > 0
    }

    pub fn registry(&self) -> &ListenerRegistry {
        &self.inner.registry
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.inner.config
    }
}

impl Inner {
    fn submit(self: &Arc<Self>, call: PendingCall) {
        let state = {
            let mut life = self.lifecycle.lock();
            if let Some(queue) = life.pending.as_mut() {
                tracing::debug!(key = %call.key, kind = ?call.kind, "queueing call until registered");
                queue.push_back(call);
                return;
            }
            life.state
        };

        if state == ManagerState::Error {
            call.completion.reject(BridgeError::Unavailable);
        } else {
            self.execute(call);
        }
    }

    fn execute(self: &Arc<Self>, call: PendingCall) {
        let completion = call.completion.clone();
        let kind = call.kind;
        guarded(&completion, |_| match kind {
            CallKind::Add => self.add(call),
            CallKind::Remove => self.remove(call),
        });
    }

    fn add(self: &Arc<Self>, call: PendingCall) {
        let (call, first) = {
            let mut life = self.lifecycle.lock();
            let Some(call) = life.defer(call) else {
                return;
            };
            let first = self.registry.add_listener(&call.key, call.listener.clone());
            if first {
                life.begin(&call.key);
            }
            (call, first)
        };
        if !first {
            call.completion.resolve(Outcome::AlreadySubscribed);
            return;
        }

        tracing::debug!(key = %call.key, "subscribing");
        let request = BridgeCall::new(
            self.config.service.clone(),
            Method::Subscribe,
            vec![call.key.sensor.clone(), call.key.sampling.clone()],
        );
        self.issue(request, call);
    }

    fn remove(self: &Arc<Self>, call: PendingCall) {
        let (call, outcome) = {
            let mut life = self.lifecycle.lock();
            let Some(call) = life.defer(call) else {
                return;
            };
            let outcome = if !self.registry.contains_listener(&call.key, &call.listener) {
                Some(Outcome::NotFound)
            } else if self.registry.listener_count(&call.key) > 1 {
                self.registry.remove_listener(&call.key, &call.listener);
                Some(Outcome::StillSubscribed)
            } else {
                life.begin(&call.key);
                None
            };
            (call, outcome)
        };
        if let Some(outcome) = outcome {
            call.completion.resolve(outcome);
            return;
        }

        tracing::debug!(key = %call.key, "unsubscribing");
        let mut args = vec![call.key.sensor.clone()];
        if self.config.unsubscribe_with_sampling {
            args.push(call.key.sampling.clone());
        }
        let request = BridgeCall::new(self.config.service.clone(), Method::Unsubscribe, args);
        self.issue(request, call);
    }

    /// Send the call that opens or closes the native subscription for
    /// `call.key` and route its reply to [`Inner::finish`].
    fn issue(self: &Arc<Self>, request: BridgeCall, call: PendingCall) {
        let PendingCall {
            kind,
            key,
            listener,
            completion,
            ..
        } = call;
        let weak = Arc::downgrade(self);
        let (k, l, c) = (key.clone(), listener.clone(), completion.clone());
        let reply = Reply::new(move |outcome| {
            let result = match outcome {
                Ok(_) if kind == CallKind::Add => Ok(Outcome::Subscribed),
                Ok(_) => Ok(Outcome::Unsubscribed),
                Err(value) => Err(BridgeError::Remote(value)),
            };
            match weak.upgrade() {
                Some(inner) => inner.finish(kind, &k, &l, &c, result),
                None => settle(&c, result),
            }
        });

        if let Err(message) = self.exec(request, reply) {
            if !completion.is_settled() {
                self.finish(
                    kind,
                    &key,
                    &listener,
                    &completion,
                    Err(BridgeError::Panicked(message)),
                );
            }
        }
    }

    /// Apply the native answer to the registry, settle the caller, then
    /// replay the calls that waited for it.
    ///
    /// The listener leaves the registry when the subscription is closed on
    /// the native side: a failed `subscribe` or a confirmed `unsubscribe`.
    fn finish(
        self: &Arc<Self>,
        kind: CallKind,
        key: &SensorKey,
        listener: &Listener,
        completion: &Completion,
        result: Result<Outcome>,
    ) {
        {
            let mut life = self.lifecycle.lock();
            let closed = match kind {
                CallKind::Add => result.is_err(),
                CallKind::Remove => result.is_ok(),
            };
            if closed {
                self.registry.remove_listener(key, listener);
            }
            if let Some(transition) = life.transitions.get_mut(key) {
                transition.in_flight = false;
            }
        }

        if let Err(error) = &result {
            match kind {
                CallKind::Add => {
                    tracing::debug!(%key, %error, "subscribe failed, rolling back")
                }
                CallKind::Remove => {
                    tracing::debug!(%key, %error, "unsubscribe failed, keeping listener")
                }
            }
        }
        settle(completion, result);
        self.replay(key);
    }

    /// Run the calls deferred behind the transition of `key` in arrival
    /// order. Stops early when one of them starts a new transition; its
    /// reply resumes the replay.
    fn replay(self: &Arc<Self>, key: &SensorKey) {
        {
            let mut life = self.lifecycle.lock();
            match life.transitions.get_mut(key) {
                Some(transition) if !transition.replaying => transition.replaying = true,
                _ => return,
            }
        }
        loop {
            let next = {
                let mut life = self.lifecycle.lock();
                let Some(transition) = life.transitions.get_mut(key) else {
                    return;
                };
                if transition.in_flight {
                    transition.replaying = false;
                    return;
                }
                let next = transition.deferred.pop_front();
                if next.is_none() {
                    life.transitions.remove(key);
                }
                next
            };
            let Some(call) = next else {
                break;
            };
            self.execute(call);
        }
    }

    /// Issue a bridge call, reporting a panic inside the bridge as an error.
    fn exec(&self, call: BridgeCall, reply: Reply) -> std::result::Result<(), String> {
        catch_unwind(AssertUnwindSafe(|| self.bridge.exec(call, reply)))
            .map_err(|payload| panic_message(payload.as_ref()))
    }

    // --- Conduit ---

    fn on_message(self: &Arc<Self>, message: std::result::Result<Value, Value>) -> Result<()> {
        match message {
            Ok(value) => {
                let handler = self.lifecycle.lock().handler;
                handler(self, value)
            }
            Err(value) => self.handle_conduit_failure(value),
        }
    }

    fn handle_confirmation(self: &Arc<Self>, message: Value) -> Result<()> {
        let confirmed = message.as_str() == Some(self.config.confirmation.as_str());
        {
            let mut life = self.lifecycle.lock();
            let state = life.state;
            match state {
                ManagerState::Init => {}
                // Only when an event races the handler swap.
                ManagerState::Registered => {
                    drop(life);
                    return self.handle_event(message);
                }
                ManagerState::Error => return Err(BridgeError::Unavailable),
            }
            if confirmed {
                life.state = ManagerState::Registered;
                life.handler = Inner::handle_event;
            } else {
                life.state = ManagerState::Error;
            }
        }

        if confirmed {
            tracing::info!(service = %self.config.service, "event callback registered");
            self.drain_pending();
            Ok(())
        } else {
            let received = describe(&message);
            tracing::error!(%received, "unexpected callback registration confirmation");
            self.fail_pending();
            Err(BridgeError::HandshakeFailed(received))
        }
    }

    fn handle_event(self: &Arc<Self>, message: Value) -> Result<()> {
        let event = SensorEvent::from_value(message)?;
        let report = self
            .registry
            .dispatcher(event.key())
            .with_policy(self.config.listener_failures)
            .dispatch(&event);

        if !report.had_listeners() {
            return Err(BridgeError::UnsubscribedSensor {
                sensor: event.sensor,
                sampling: event.sampling,
            });
        }
        if !report.failures.is_empty() {
            return Err(BridgeError::ListenerFailed {
                sensor: event.sensor,
                sampling: event.sampling,
                failed: report.failures.len(),
                message: report.failures.join("; "),
            });
        }
        Ok(())
    }

    fn handle_conduit_failure(self: &Arc<Self>, error: Value) -> Result<()> {
        tracing::error!(error = %describe(&error), "event callback failed");
        let was_init = {
            let mut life = self.lifecycle.lock();
            let was_init = life.state == ManagerState::Init;
            if was_init {
                life.state = ManagerState::Error;
            }
            was_init
        };
        if was_init {
            self.fail_pending();
        }
        Err(BridgeError::Conduit(error))
    }

    /// Replay queued calls in order. Calls arriving meanwhile keep queueing
    /// behind them until the queue is empty and released.
    fn drain_pending(self: &Arc<Self>) {
        let mut drained = 0usize;
        loop {
            let next = {
                let mut life = self.lifecycle.lock();
                let next = life.pending.as_mut().and_then(VecDeque::pop_front);
                if next.is_none() {
                    life.pending = None;
                }
                next
            };
            let Some(call) = next else {
                break;
            };
            self.execute(call);
            drained += 1;
        }
        if drained > 0 {
            tracing::debug!(drained, "replayed queued calls");
        }
    }

    fn fail_pending(&self) {
        let queued = self.lifecycle.lock().pending.take().unwrap_or_default();
        for call in queued {
            call.completion.reject(BridgeError::Unavailable);
        }
    }
}

fn settle(completion: &Completion, result: Result<Outcome>) {
    match result {
        Ok(outcome) => completion.resolve(outcome),
        Err(error) => completion.reject(error),
    };
}

fn describe(value: &Value) -> String {
    match value.as_str() {
        Some(s) => s.to_string(),
        None => value.to_string(),
    }
}
