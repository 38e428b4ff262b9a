//! Domain transactions: one connection plus one open database transaction.

use crate::SessionInner;
use dataunit_core::{Connection, Error, Result, Transaction, TransactionErrorKind};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

static NEXT_TRANSACTION_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_transaction_id() -> u64 {
    NEXT_TRANSACTION_ID.fetch_add(1, Ordering::Relaxed)
}

/// Outcome of a domain transaction so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    Active,
    Committed,
    RolledBack,
}

/// An open database transaction owned by a session.
///
/// The transaction exclusively owns its connection. Releasing it (explicitly
/// via [`release`](Self::release) or by dropping it) closes that connection
/// exactly once and detaches the transaction from its session. Releasing
/// never commits: work that was not committed is abandoned and the driver
/// rolls it back when the connection closes. Entities inserted through the
/// session while the transaction was open leave the identity map unless the
/// transaction committed.
///
/// ```ignore
/// let tx = session.begin_transaction()?;
/// repo.add(order)?;
/// tx.commit()?;
/// // tx dropped here: connection closed, session back to NoTransaction
/// ```
pub struct DomainTransaction {
    id: u64,
    connection: Arc<dyn Connection>,
    transaction: Arc<dyn Transaction>,
    session: Weak<SessionInner>,
    status: Mutex<TransactionStatus>,
    released: AtomicBool,
}

impl DomainTransaction {
    /// Wrap an open connection and transaction with no owning session.
    pub fn new(connection: Arc<dyn Connection>, transaction: Arc<dyn Transaction>) -> Self {
        Self::attached(next_transaction_id(), connection, transaction, Weak::new())
    }

    pub(crate) fn attached(
        id: u64,
        connection: Arc<dyn Connection>,
        transaction: Arc<dyn Transaction>,
        session: Weak<SessionInner>,
    ) -> Self {
        Self {
            id,
            connection,
            transaction,
            session,
            status: Mutex::new(TransactionStatus::Active),
            released: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// The connection this transaction runs on.
    pub fn connection(&self) -> &Arc<dyn Connection> {
        &self.connection
    }

    /// The underlying driver transaction.
    pub fn transaction(&self) -> &Arc<dyn Transaction> {
        &self.transaction
    }

    pub fn status(&self) -> TransactionStatus {
        *self.status.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Commit the transaction.
    ///
    /// If the commit fails the transaction is rolled back exactly once and the
    /// commit error is returned unchanged. A failing rollback is logged; it
    /// never replaces the commit error.
    pub fn commit(&self) -> Result<()> {
        let mut status = self.status.lock().unwrap_or_else(|e| e.into_inner());
        self.ensure_active(*status)?;

        match self.transaction.commit() {
            Ok(()) => {
                *status = TransactionStatus::Committed;
                self.with_session(|session| session.keep_added(self.id));
                tracing::debug!(transaction = self.id, "Transaction committed");
                Ok(())
            }
            Err(err) => {
                tracing::warn!(transaction = self.id, error = %err, "Commit failed, rolling back");
                if let Err(rollback_err) = self.transaction.rollback() {
                    tracing::error!(
                        transaction = self.id,
                        error = %rollback_err,
                        "Rollback after failed commit also failed"
                    );
                }
                *status = TransactionStatus::RolledBack;
                self.with_session(|session| session.discard_added(self.id));
                Err(err)
            }
        }
    }

    /// Roll the transaction back.
    pub fn rollback(&self) -> Result<()> {
        let mut status = self.status.lock().unwrap_or_else(|e| e.into_inner());
        self.ensure_active(*status)?;
        *status = TransactionStatus::RolledBack;
        self.with_session(|session| session.discard_added(self.id));
        tracing::debug!(transaction = self.id, "Transaction rolled back");
        self.transaction.rollback()
    }

    /// Close the connection and detach from the owning session.
    ///
    /// Only the first call does anything.
    pub fn release(&self) -> Result<()> {
        if self.released.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let closed = self.connection.close();
        let status = self.status();
        self.with_session(|session| {
            if status == TransactionStatus::Active {
                session.discard_added(self.id);
            }
            session.clear_transaction(self.id);
        });
        tracing::debug!(
            transaction = self.id,
            status = ?status,
            "Transaction released"
        );
        closed
    }

    fn with_session(&self, f: impl FnOnce(&SessionInner)) {
        if let Some(session) = self.session.upgrade() {
            f(&session);
        }
    }

    fn ensure_active(&self, status: TransactionStatus) -> Result<()> {
        if self.is_released() {
            return Err(Error::transaction(
                TransactionErrorKind::Released,
                format!("transaction {} was released", self.id),
            ));
        }
        match status {
            TransactionStatus::Active => Ok(()),
            TransactionStatus::Committed => Err(Error::transaction(
                TransactionErrorKind::AlreadyCommitted,
                format!("transaction {} is already committed", self.id),
            )),
            TransactionStatus::RolledBack => Err(Error::transaction(
                TransactionErrorKind::AlreadyRolledBack,
                format!("transaction {} is already rolled back", self.id),
            )),
        }
    }
}

impl Drop for DomainTransaction {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            tracing::warn!(transaction = self.id, error = %e, "Failed to close transaction connection");
        }
    }
}

impl fmt::Debug for DomainTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DomainTransaction")
            .field("id", &self.id)
            .field("status", &self.status())
            .field("released", &self.is_released())
            .finish_non_exhaustive()
    }
}
