//! The native bridge seen from this side: an opaque, callback-style RPC.
//!
//! Every call yields exactly one outcome through its [`Reply`]. The
//! `registerCallback` call is special: the native side keeps the
//! [`Conduit`] it receives and pushes messages through it for the whole
//! session (first the handshake confirmation, then sensor events).

pub mod channel;

use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use crate::error::Result;

/// Default service name the native plugin is registered under.
pub const SERVICE_NAME: &str = "Sensors";

/// Bridge methods used by the subscription manager.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Method {
    RegisterCallback,
    Subscribe,
    Unsubscribe,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::RegisterCallback => "registerCallback",
            Method::Subscribe => "subscribe",
            Method::Unsubscribe => "unsubscribe",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single request addressed to the native side.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BridgeCall {
    pub service: String,
    pub method: Method,
    pub args: Vec<String>,
}

impl BridgeCall {
    pub fn new(service: impl Into<String>, method: Method, args: Vec<String>) -> Self {
        Self {
            service: service.into(),
            method,
            args,
        }
    }
}

type ReplyFn = Box<dyn FnOnce(std::result::Result<Value, Value>) + Send>;

/// One-shot completion for a bridge call.
///
/// Consumed by [`Reply::succeed`] or [`Reply::fail`], so a call can only
/// ever settle once. Dropping a reply without settling it leaves the
/// request pending forever.
pub struct Reply(ReplyFn);

impl Reply {
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce(std::result::Result<Value, Value>) + Send + 'static,
    {
        Self(Box::new(f))
    }

    pub fn succeed(self, value: Value) {
        (self.0)(Ok(value))
    }

    pub fn fail(self, value: Value) {
        (self.0)(Err(value))
    }

    pub fn settle(self, outcome: std::result::Result<Value, Value>) {
        (self.0)(outcome)
    }
}

impl fmt::Debug for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Reply")
    }
}

type ConduitFn = dyn Fn(std::result::Result<Value, Value>) -> Result<()> + Send + Sync;

/// Long-lived delivery channel handed over by `registerCallback`.
///
/// `deliver` returns the fatal errors raised while handling a message
/// (bad handshake, malformed or unexpected events) to the native side.
#[derive(Clone)]
pub struct Conduit(Arc<ConduitFn>);

impl Conduit {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(std::result::Result<Value, Value>) -> Result<()> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Push a success message (handshake confirmation or event).
    pub fn deliver(&self, message: Value) -> Result<()> {
        (self.0)(Ok(message))
    }

    /// Push a failure message.
    pub fn deliver_error(&self, error: Value) -> Result<()> {
        (self.0)(Err(error))
    }
}

impl fmt::Debug for Conduit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Conduit")
    }
}

/// Asynchronous RPC channel to the native platform.
///
/// Implementations may settle replies synchronously inside `exec` or later
/// from any thread.
pub trait Bridge: Send + Sync {
    /// Issue `subscribe` or `unsubscribe`.
    fn exec(&self, call: BridgeCall, reply: Reply);

    /// Issue `registerCallback`, handing over the conduit for pushed messages.
    fn register_callback(&self, call: BridgeCall, conduit: Conduit);
}

impl<B: Bridge + ?Sized> Bridge for Arc<B> {
    fn exec(&self, call: BridgeCall, reply: Reply) {
        (**self).exec(call, reply)
    }

    fn register_callback(&self, call: BridgeCall, conduit: Conduit) {
        (**self).register_callback(call, conduit)
    }
}
