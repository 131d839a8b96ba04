//! Caller-facing completion callbacks.

use parking_lot::Mutex;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::types::Outcome;
use crate::error::{panic_message, BridgeError, Result};

type CompletionFn = Box<dyn FnOnce(Result<Outcome>) + Send>;

/// Error-first style completion of an add or remove request.
///
/// Settles at most once: the first `resolve` or `reject` wins and later
/// ones are ignored. Clones share the same slot.
#[derive(Clone, Default)]
pub struct Completion {
    callback: Arc<Mutex<Option<CompletionFn>>>,
    settled: Arc<AtomicBool>,
}

impl Completion {
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce(Result<Outcome>) + Send + 'static,
    {
        Self {
            callback: Arc::new(Mutex::new(Some(Box::new(f)))),
            settled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A completion nobody listens to.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_settled(&self) -> bool {
        self.settled.load(Ordering::SeqCst)
    }

    pub(crate) fn resolve(&self, outcome: Outcome) -> bool {
        self.settle(Ok(outcome))
    }

    pub(crate) fn reject(&self, error: BridgeError) -> bool {
        self.settle(Err(error))
    }

    /// Returns false if the completion was already settled.
    fn settle(&self, result: Result<Outcome>) -> bool {
        if self.settled.swap(true, Ordering::SeqCst) {
            return false;
        }
        let callback = self.callback.lock().take();
        if let Some(callback) = callback {
            // A panicking callback must not unwind into the bridge.
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| callback(result))) {
                tracing::warn!(
                    message = %panic_message(payload.as_ref()),
                    "completion callback panicked"
                );
            }
        }
        true
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("settled", &self.is_settled())
            .finish()
    }
}

/// Run `body`, turning a panic into a rejection of `completion`.
pub(crate) fn guarded<F>(completion: &Completion, body: F)
where
    F: FnOnce(&Completion),
{
    if let Err(payload) = catch_unwind(AssertUnwindSafe(|| body(completion))) {
        let message = panic_message(payload.as_ref());
        if !completion.reject(BridgeError::Panicked(message.clone())) {
            tracing::warn!(%message, "request panicked after completing");
        }
    }
}
