use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

use transactional_context::{
    ActiveTransaction, IsolationLevel, PersistenceSession, SessionError, SessionResult,
};

/// Collaborator call observed by the mock session, in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Begin(Option<IsolationLevel>),
    Flush(u64),
    Commit,
    Rollback,
    /// Handle dropped without commit or rollback.
    Abandoned,
    Close,
}

#[derive(Default)]
struct MockState {
    events: Vec<SessionEvent>,
    flush_rows: VecDeque<u64>,
    open: bool,
    fail_next_flush: bool,
    fail_next_commit: bool,
    fail_next_rollback: bool,
    hang_async_flush: bool,
}

/// Shared handle used by tests to script a `MockSession` after it has been
/// moved into a context, and to inspect what the context asked of it.
#[derive(Clone, Default)]
pub struct MockControl {
    state: Arc<Mutex<MockState>>,
}

impl MockControl {
    /// Rows reported by the next flushes, in order. Unscripted flushes report 0.
    pub fn queue_flush(&self, rows: u64) {
        self.state.lock().flush_rows.push_back(rows);
    }

    pub fn fail_next_flush(&self) {
        self.state.lock().fail_next_flush = true;
    }

    pub fn fail_next_commit(&self) {
        self.state.lock().fail_next_commit = true;
    }

    pub fn fail_next_rollback(&self) {
        self.state.lock().fail_next_rollback = true;
    }

    /// Make asynchronous flushes wait forever.
    pub fn hang_async_flush(&self) {
        self.state.lock().hang_async_flush = true;
    }

    pub fn is_open(&self) -> bool {
        self.state.lock().open
    }

    pub fn events(&self) -> Vec<SessionEvent> {
        self.state.lock().events.clone()
    }
}

/// In-memory `PersistenceSession` with scripted flush results.
pub struct MockSession {
    control: MockControl,
}

impl MockSession {
    pub fn scripted() -> (Self, MockControl) {
        let control = MockControl::default();
        (
            Self {
                control: control.clone(),
            },
            control,
        )
    }

    fn next_flush(&self) -> SessionResult<u64> {
        let mut state = self.control.state.lock();
        if std::mem::take(&mut state.fail_next_flush) {
            return Err(SessionError::other("unique constraint violated"));
        }
        let rows = state.flush_rows.pop_front().unwrap_or(0);
        state.events.push(SessionEvent::Flush(rows));
        Ok(rows)
    }
}

#[async_trait]
impl PersistenceSession for MockSession {
    async fn begin(
        &mut self,
        isolation: Option<IsolationLevel>,
    ) -> SessionResult<Box<dyn ActiveTransaction>> {
        let mut state = self.control.state.lock();
        if state.open {
            return Err(SessionError::TransactionInProgress);
        }
        state.open = true;
        state.events.push(SessionEvent::Begin(isolation));
        Ok(Box::new(MockTransaction {
            control: self.control.clone(),
            finished: false,
        }))
    }

    fn flush(&mut self) -> SessionResult<u64> {
        self.next_flush()
    }

    async fn flush_async(&mut self) -> SessionResult<u64> {
        let hang = self.control.state.lock().hang_async_flush;
        if hang {
            std::future::pending::<()>().await;
        }
        tokio::task::yield_now().await;
        self.next_flush()
    }

    async fn close(&mut self) -> SessionResult<()> {
        self.control.state.lock().events.push(SessionEvent::Close);
        Ok(())
    }
}

pub struct MockTransaction {
    control: MockControl,
    finished: bool,
}

#[async_trait]
impl ActiveTransaction for MockTransaction {
    async fn commit(&mut self) -> SessionResult<()> {
        let mut state = self.control.state.lock();
        if std::mem::take(&mut state.fail_next_commit) {
            return Err(SessionError::other("connection reset during commit"));
        }
        state.open = false;
        state.events.push(SessionEvent::Commit);
        self.finished = true;
        Ok(())
    }

    async fn rollback(&mut self) -> SessionResult<()> {
        let mut state = self.control.state.lock();
        if std::mem::take(&mut state.fail_next_rollback) {
            return Err(SessionError::other("connection reset during rollback"));
        }
        state.open = false;
        state.events.push(SessionEvent::Rollback);
        self.finished = true;
        Ok(())
    }
}

impl Drop for MockTransaction {
    fn drop(&mut self) {
        if !self.finished {
            let mut state = self.control.state.lock();
            state.open = false;
            state.events.push(SessionEvent::Abandoned);
        }
    }
}
