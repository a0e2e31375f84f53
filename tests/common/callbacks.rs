use parking_lot::RwLock;
use std::sync::Arc;

use transactional_context::{
    CallbackError, CallbackResult, CommitCallback, ContextCallback, TransactionalContext,
};

use super::session::MockSession;

pub type MockContext = TransactionalContext<MockSession>;

/// Commit callback that records every count it is invoked with.
pub struct RecordingCallback {
    calls: RwLock<Vec<u64>>,
    observed_in_transaction: RwLock<Vec<bool>>,
}

impl RecordingCallback {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: RwLock::new(Vec::new()),
            observed_in_transaction: RwLock::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<u64> {
        self.calls.read().clone()
    }

    /// Whether the context reported an open transaction at each invocation.
    pub fn observed_in_transaction(&self) -> Vec<bool> {
        self.observed_in_transaction.read().clone()
    }
}

impl CommitCallback<MockContext> for RecordingCallback {
    fn on_commit(&self, context: &MockContext, affected: u64) -> CallbackResult {
        self.calls.write().push(affected);
        self.observed_in_transaction
            .write()
            .push(context.is_in_transaction());
        Ok(())
    }
}

/// Upcast a recorder for registration on a context.
pub fn as_callback(recorder: &Arc<RecordingCallback>) -> ContextCallback<MockSession> {
    recorder.clone()
}

/// Callback that always fails with `message`.
pub fn failing(message: &'static str) -> ContextCallback<MockSession> {
    Arc::new(move |_: &MockContext, _: u64| -> CallbackResult {
        Err(CallbackError::new(message))
    })
}

/// Error sink that collects the rendered errors it receives.
pub fn collecting_sink() -> (Arc<RwLock<Vec<String>>>, impl Fn(CallbackError) + Send + Sync) {
    let seen = Arc::new(RwLock::new(Vec::new()));
    let sink_seen = Arc::clone(&seen);
    (seen, move |err: CallbackError| sink_seen.write().push(err.to_string()))
}
