//! Transactional Context Module
//!
//! This module wraps a persistence session in a unit of work that opens at most one
//! transaction at a time, sums the rows affected by each flush, and runs commit
//! callbacks exactly once after a successful commit, explicit or implicit.

pub mod callbacks;
pub mod cancel;
pub mod context;
pub mod error;
pub mod executor;
pub mod postgres;
pub mod session;

pub use callbacks::{CallbackQueue, CommitCallback, ErrorSink};
pub use cancel::{cancellation, CancelHandle, CancelSignal};
pub use context::{ContextCallback, TransactionId, TransactionalContext};
pub use error::{
    BoxError, CallbackError, CallbackResult, ContextError, ContextResult, SessionError,
    SessionResult,
};
pub use executor::Executor;
pub use postgres::{PendingStatement, PgSession, PgTransaction, SqlParam};
pub use session::{ActiveTransaction, IsolationLevel, PersistenceSession};
