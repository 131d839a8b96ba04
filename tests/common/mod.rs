//! Scripted native side shared by the integration tests.

#![allow(dead_code)]

use parking_lot::Mutex;
use sensor_bridge::{
    BridgeCall, ChannelBridge, Completion, Conduit, Listener, ManagerConfig, Method,
    NativeEndpoint, NativeRequest, Outcome, Reply, Result, SensorEvent, SubscriptionManager,
};
use serde_json::{json, Value};
use std::sync::Arc;

pub type Seen = Arc<Mutex<Vec<Result<Outcome>>>>;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// Completion that records every settlement.
pub fn recorder() -> (Completion, Seen) {
    let seen: Seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    (Completion::new(move |r| sink.lock().push(r)), seen)
}

/// Listener that records the events it receives under `name`.
pub fn recording(log: &Arc<Mutex<Vec<(String, SensorEvent)>>>, name: &str) -> Listener {
    let log = Arc::clone(log);
    let name = name.to_string();
    Listener::new(move |event| log.lock().push((name.clone(), event.clone())))
}

pub fn event(sensor: &str, sampling: &str) -> Value {
    json!({
        "sensor": sensor,
        "sampling": sampling,
        "timeStamp": 1_700_000_000_000i64,
        "values": [0.1, 9.8, 0.3]
    })
}

pub struct Native {
    endpoint: NativeEndpoint,
}

impl Native {
    pub fn new(endpoint: NativeEndpoint) -> Self {
        Self { endpoint }
    }

    /// Take the `registerCallback` request and keep its conduit.
    pub fn expect_register(&self) -> Conduit {
        match self.endpoint.try_recv() {
            Ok(NativeRequest::Register { call, conduit }) => {
                assert_eq!(call.method, Method::RegisterCallback);
                assert_eq!(call.service, "Sensors");
                assert!(call.args.is_empty());
                conduit
            }
            other => panic!("Expected registerCallback, got {:?}", other),
        }
    }

    /// Take the next subscribe/unsubscribe request.
    pub fn expect_call(&self) -> (BridgeCall, Reply) {
        match self.endpoint.try_recv() {
            Ok(NativeRequest::Call { call, reply }) => (call, reply),
            other => panic!("Expected bridge call, got {:?}", other),
        }
    }

    pub fn assert_idle(&self) {
        assert_eq!(self.endpoint.pending(), 0, "unexpected bridge request");
    }

    pub fn into_endpoint(self) -> NativeEndpoint {
        self.endpoint
    }
}

pub fn args(call: &BridgeCall) -> Vec<&str> {
    call.args.iter().map(String::as_str).collect()
}

/// Manager whose handshake is already confirmed.
pub fn registered_manager(config: ManagerConfig) -> (SubscriptionManager, Native, Conduit) {
    init_tracing();
    let (bridge, endpoint) = ChannelBridge::new();
    let manager = SubscriptionManager::with_config(bridge, config);
    let native = Native::new(endpoint);

    manager.connect().unwrap();
    let conduit = native.expect_register();
    conduit.deliver(json!("registered")).unwrap();
    (manager, native, conduit)
}

/// Add a listener and confirm the subscribe if one is issued.
pub fn add_confirmed(
    manager: &SubscriptionManager,
    native: &Native,
    sensor: &str,
    sampling: &str,
    listener: &Listener,
) -> Outcome {
    let (completion, seen) = recorder();
    manager.add_sensor_listener(sensor, sampling, listener, completion);
    if seen.lock().is_empty() {
        let (call, reply) = native.expect_call();
        assert_eq!(call.method, Method::Subscribe);
        reply.succeed(Value::Null);
    }
    let result = seen.lock().pop().unwrap();
    result.unwrap()
}
