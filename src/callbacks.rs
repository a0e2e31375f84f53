use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::{CallbackError, CallbackResult};

/// Action run once after a successful commit, receiving the context and the
/// total number of rows affected by the committed unit of work.
///
/// Closures of the form `Fn(&C, u64) -> CallbackResult` implement this trait,
/// so most callers register a closure. Components that carry their own state
/// can implement it directly.
pub trait CommitCallback<C>: Send + Sync {
    fn on_commit(&self, context: &C, affected: u64) -> CallbackResult;
}

impl<C, F> CommitCallback<C> for F
where
    F: Fn(&C, u64) -> CallbackResult + Send + Sync,
{
    fn on_commit(&self, context: &C, affected: u64) -> CallbackResult {
        self(context, affected)
    }
}

/// Receives every error raised by a commit callback.
pub type ErrorSink = Arc<dyn Fn(CallbackError) + Send + Sync>;

/// Ordered set of commit callbacks, keyed by `Arc` identity.
pub struct CallbackQueue<C> {
    callbacks: Vec<Arc<dyn CommitCallback<C>>>,
    error_sink: Option<ErrorSink>,
}

impl<C> Default for CallbackQueue<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> CallbackQueue<C> {
    /// An empty queue with no error sink.
    pub fn new() -> Self {
        Self {
            callbacks: Vec::with_capacity(5),
            error_sink: None,
        }
    }

    /// Append a callback. Returns false, leaving the queue unchanged, when the
    /// same callback is already registered.
    pub fn register(&mut self, callback: Arc<dyn CommitCallback<C>>) -> bool {
        if self.position(&callback).is_some() {
            return false;
        }
        self.callbacks.push(callback);
        true
    }

    /// Remove a callback by identity. Returns whether it was registered.
    pub fn unregister(&mut self, callback: &Arc<dyn CommitCallback<C>>) -> bool {
        match self.position(callback) {
            Some(index) => {
                self.callbacks.remove(index);
                true
            }
            None => false,
        }
    }

    /// Number of registered callbacks.
    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    /// True when no callback is registered.
    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    /// Drop every registered callback without running it.
    pub fn clear(&mut self) {
        self.callbacks.clear();
    }

    /// Replace the sink receiving callback errors; `None` logs them instead.
    pub fn set_error_sink(&mut self, sink: Option<ErrorSink>) {
        self.error_sink = sink;
    }

    /// Whether callback errors go to a sink rather than the log.
    pub fn has_error_sink(&self) -> bool {
        self.error_sink.is_some()
    }

    /// Detach the registered callbacks so they can be run against a borrow of
    /// the context that owns this queue.
    pub(crate) fn take(&mut self) -> Vec<Arc<dyn CommitCallback<C>>> {
        std::mem::take(&mut self.callbacks)
    }

    /// Run `callbacks` in order. Each failure, whether returned or a panic, is
    /// reported on its own and does not stop the remaining callbacks.
    ///
    /// Returns the number of callbacks that failed.
    pub(crate) fn dispatch(
        &self,
        callbacks: &[Arc<dyn CommitCallback<C>>],
        context: &C,
        affected: u64,
    ) -> usize {
        let mut failures = 0;
        for callback in callbacks {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                callback.on_commit(context, affected)
            }));
            let error = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(err)) => err,
                Err(payload) => CallbackError::Panicked(panic_message(payload)),
            };
            failures += 1;
            self.report(error);
        }
        failures
    }

    fn report(&self, error: CallbackError) {
        match &self.error_sink {
            Some(sink) => sink(error),
            None => tracing::warn!(error = %error, "commit callback failed"),
        }
    }

    fn position(&self, callback: &Arc<dyn CommitCallback<C>>) -> Option<usize> {
        // Compare data pointers only; vtable pointers are not unique per type.
        let target = Arc::as_ptr(callback) as *const ();
        self.callbacks
            .iter()
            .position(|existing| Arc::as_ptr(existing) as *const () == target)
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
