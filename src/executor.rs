use sqlx::{Postgres, Transaction};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::{SessionError, SessionResult};

/// Executor wraps an open PostgreSQL transaction.
///
/// The session and the transaction handle it hands out share one Executor:
/// the session flushes through it, the handle takes the transaction out of it
/// to commit or roll back.
///
/// The transaction is settled once a commit or rollback succeeds or the
/// handle is dropped. A transaction that was taken out but not settled (a
/// failed commit) still belongs to the caller, who has to roll it back.
#[derive(Clone, Debug)]
pub struct Executor {
    tx: Arc<Mutex<Option<Transaction<'static, Postgres>>>>,
    settled: Arc<AtomicBool>,
}

impl Executor {
    /// Creates a new Executor from a PostgreSQL transaction.
    pub fn new(tx: Transaction<'static, Postgres>) -> Self {
        Self {
            tx: Arc::new(Mutex::new(Some(tx))),
            settled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Whether the transaction has been committed, rolled back or abandoned.
    pub fn is_settled(&self) -> bool {
        self.settled.load(Ordering::Acquire)
    }

    pub(crate) fn settle(&self) {
        self.settled.store(true, Ordering::Release);
    }

    /// Lock the transaction slot. `None` inside an unsettled Executor means
    /// the transaction was consumed by a failed commit.
    pub(crate) async fn lock(
        &self,
    ) -> tokio::sync::MutexGuard<'_, Option<Transaction<'static, Postgres>>> {
        self.tx.lock().await
    }

    /// Takes ownership of the transaction, leaving None in its place.
    /// This should only be called when committing or rolling back.
    pub(crate) async fn take_transaction(&self) -> SessionResult<Transaction<'static, Postgres>> {
        self.tx
            .lock()
            .await
            .take()
            .ok_or(SessionError::NoActiveTransaction)
    }

    /// Settles the Executor and drops the transaction without waiting, which
    /// makes sqlx roll it back when the connection is next used. Returns false
    /// if the lock is busy and the transaction could not be dropped yet.
    pub(crate) fn abandon(&self) -> bool {
        self.settle();
        match self.tx.try_lock() {
            Ok(mut guard) => {
                guard.take();
                true
            }
            Err(_) => false,
        }
    }
}
