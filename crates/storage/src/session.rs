//! Store client interface
//!
//! The harness talks to a transactional store only through these two traits.
//! A [`StoreClient`] opens independent sessions; a [`Session`] is a single
//! connection with its own isolation level, autocommit flag and at most one
//! open transaction.
//!
//! Sessions follow driver semantics:
//!
//! - With autocommit off, the first statement implicitly opens a transaction
//!   that lasts until `commit` or `rollback`.
//! - With autocommit on, each statement outside an explicit `begin` is its own
//!   transaction.
//! - The isolation level can only change while no transaction is open.
//! - After a statement fails inside a transaction, the transaction is aborted
//!   and every further statement fails until `rollback`.

use std::sync::Arc;
use txanomaly_core::{ExecResult, IsolationLevel, Statement, StoreResult};

/// Factory of independent store sessions
pub trait StoreClient: Send + Sync {
    /// Open a new session.
    ///
    /// Fresh sessions start at read-committed with autocommit off.
    fn connect(&self) -> StoreResult<Box<dyn Session>>;

    /// Human-readable target, for logs.
    fn describe(&self) -> String;
}

impl<C: StoreClient + ?Sized> StoreClient for Arc<C> {
    fn connect(&self) -> StoreResult<Box<dyn Session>> {
        (**self).connect()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// One connection to the store
pub trait Session: Send {
    /// Set the isolation level for subsequent transactions.
    ///
    /// Fails with a generic store error while a transaction is open.
    fn set_isolation(&mut self, level: IsolationLevel) -> StoreResult<()>;

    /// Isolation level that the next (or current) transaction uses.
    fn isolation(&self) -> IsolationLevel;

    /// Switch autocommit mode. Fails while a transaction is open.
    fn set_autocommit(&mut self, autocommit: bool) -> StoreResult<()>;

    /// Open an explicit transaction.
    fn begin(&mut self) -> StoreResult<()>;

    /// Execute one statement.
    fn execute(&mut self, statement: &Statement) -> StoreResult<ExecResult>;

    /// Commit the open transaction. Committing with no open transaction is a
    /// no-op.
    fn commit(&mut self) -> StoreResult<()>;

    /// Roll back the open transaction. Rolling back with no open transaction
    /// is a no-op.
    fn rollback(&mut self) -> StoreResult<()>;

    /// Close the session, discarding any open transaction. Idempotent.
    fn close(&mut self) -> StoreResult<()>;

    /// Whether a transaction is open.
    fn in_transaction(&self) -> bool;
}
