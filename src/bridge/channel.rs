//! Channel-backed bridge transport.
//!
//! [`ChannelBridge`] queues every request on a crossbeam channel; the host
//! (or a test) owns the [`NativeEndpoint`] and serves the requests on
//! whatever thread runs the native side.

use crossbeam_channel::{unbounded, Receiver, RecvError, RecvTimeoutError, Sender, TryRecvError};
use std::time::Duration;

use super::{Bridge, BridgeCall, Conduit, Reply};

/// A request waiting for the native side.
#[derive(Debug)]
pub enum NativeRequest {
    /// `registerCallback`: keep the conduit and confirm through it.
    Register { call: BridgeCall, conduit: Conduit },
    /// `subscribe` / `unsubscribe`: settle the reply exactly once.
    Call { call: BridgeCall, reply: Reply },
}

impl NativeRequest {
    pub fn call(&self) -> &BridgeCall {
        match self {
            NativeRequest::Register { call, .. } | NativeRequest::Call { call, .. } => call,
        }
    }
}

/// Sending half, handed to the subscription manager.
#[derive(Clone, Debug)]
pub struct ChannelBridge {
    sender: Sender<NativeRequest>,
}

/// Receiving half, served by the native side.
#[derive(Debug)]
pub struct NativeEndpoint {
    receiver: Receiver<NativeRequest>,
}

impl ChannelBridge {
    pub fn new() -> (Self, NativeEndpoint) {
        let (sender, receiver) = unbounded();
        (Self { sender }, NativeEndpoint { receiver })
    }

    fn send(&self, request: NativeRequest) {
        if self.sender.send(request).is_err() {
            // The reply or conduit is dropped with the request; the call stays pending.
            tracing::warn!("native endpoint disconnected, request dropped");
        }
    }
}

impl Bridge for ChannelBridge {
    fn exec(&self, call: BridgeCall, reply: Reply) {
        self.send(NativeRequest::Call { call, reply });
    }

    fn register_callback(&self, call: BridgeCall, conduit: Conduit) {
        self.send(NativeRequest::Register { call, conduit });
    }
}

impl NativeEndpoint {
    /// Receive the next request (blocking).
    pub fn recv(&self) -> Result<NativeRequest, RecvError> {
        self.receiver.recv()
    }

    /// Try to receive a request (non-blocking).
    pub fn try_recv(&self) -> Result<NativeRequest, TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<NativeRequest, RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Requests queued and not yet received.
    pub fn pending(&self) -> usize {
        self.receiver.len()
    }
}
