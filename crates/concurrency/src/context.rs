//! Transaction context
//!
//! A [`TransactionContext`] owns one store session for the lifetime of one
//! work unit and enforces the transaction lifecycle:
//!
//! ```text
//! Idle ──begin──> Active ──commit──> Committed ──┐
//!                   │ ├────rollback──> RolledBack ─┼──close──> Closed
//!                   │ └──error──────> Failed(kind)─┘
//! ```
//!
//! - The isolation level is applied to the session before any statement and
//!   can only change while Idle.
//! - A failed statement or commit rolls the session back at once and leaves
//!   the context in `Failed(kind)`.
//! - `Closed` is terminal; every operation on a closed context is an
//!   `InvalidState` error.
//! - Dropping a context rolls back any open transaction and closes the
//!   session.

use std::fmt;
use tracing::{debug, warn};
use txanomaly_core::{ErrorKind, ExecResult, HarnessError, IsolationLevel, Result, Statement};
use txanomaly_storage::{Session, StoreClient};

/// Lifecycle state of a context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    /// Session open, no transaction yet
    Idle,
    /// Transaction open
    Active,
    /// Transaction committed
    Committed,
    /// Transaction rolled back on request
    RolledBack,
    /// Transaction rolled back because of an error
    Failed(ErrorKind),
    /// Session released
    Closed,
}

impl ContextState {
    /// Whether the transaction has finished (or never started and the
    /// context is closed).
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ContextState::Idle | ContextState::Active)
    }
}

impl fmt::Display for ContextState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextState::Idle => write!(f, "Idle"),
            ContextState::Active => write!(f, "Active"),
            ContextState::Committed => write!(f, "Committed"),
            ContextState::RolledBack => write!(f, "RolledBack"),
            ContextState::Failed(kind) => write!(f, "Failed({})", kind),
            ContextState::Closed => write!(f, "Closed"),
        }
    }
}

/// One session, one transaction, one role
pub struct TransactionContext {
    session: Box<dyn Session>,
    role: String,
    isolation: IsolationLevel,
    state: ContextState,
}

impl TransactionContext {
    /// Connect, apply `isolation` and disable autocommit.
    pub fn open(
        client: &dyn StoreClient,
        role: impl Into<String>,
        isolation: IsolationLevel,
    ) -> Result<Self> {
        let role = role.into();
        let mut session = client.connect()?;
        session.set_isolation(isolation)?;
        session.set_autocommit(false)?;
        debug!(role = %role, isolation = %isolation, "context opened");
        Ok(TransactionContext {
            session,
            role,
            isolation,
            state: ContextState::Idle,
        })
    }

    /// Role label used in logs
    pub fn role(&self) -> &str {
        &self.role
    }

    /// Isolation level of the (next) transaction
    pub fn isolation(&self) -> IsolationLevel {
        self.isolation
    }

    /// Current lifecycle state
    pub fn state(&self) -> ContextState {
        self.state
    }

    fn require(&self, expected: ContextState) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(HarnessError::invalid_state(expected, self.state))
        }
    }

    /// Change the isolation level. Only allowed while Idle.
    pub fn set_isolation(&mut self, isolation: IsolationLevel) -> Result<()> {
        self.require(ContextState::Idle)?;
        self.session.set_isolation(isolation)?;
        self.isolation = isolation;
        Ok(())
    }

    /// Open the transaction.
    pub fn begin(&mut self) -> Result<()> {
        self.require(ContextState::Idle)?;
        if let Err(e) = self.session.begin() {
            return Err(self.fail(e.into()));
        }
        self.state = ContextState::Active;
        debug!(role = %self.role, isolation = %self.isolation, "begin");
        Ok(())
    }

    /// Execute one statement inside the open transaction.
    pub fn execute(&mut self, statement: &Statement) -> Result<ExecResult> {
        self.require(ContextState::Active)?;
        debug!(role = %self.role, statement = statement.name(), "execute");
        match self.session.execute(statement) {
            Ok(result) => Ok(result),
            Err(e) => Err(self.fail(e.into())),
        }
    }

    /// Commit the open transaction.
    pub fn commit(&mut self) -> Result<()> {
        self.require(ContextState::Active)?;
        match self.session.commit() {
            Ok(()) => {
                self.state = ContextState::Committed;
                debug!(role = %self.role, "commit");
                Ok(())
            }
            Err(e) => Err(self.fail(e.into())),
        }
    }

    /// Roll back the open transaction.
    ///
    /// Rolling back a failed context is a no-op: the failure already rolled
    /// the session back.
    pub fn rollback(&mut self) -> Result<()> {
        match self.state {
            ContextState::Failed(_) => Ok(()),
            ContextState::Active => {
                self.state = ContextState::RolledBack;
                self.session.rollback()?;
                debug!(role = %self.role, "rollback");
                Ok(())
            }
            other => Err(HarnessError::invalid_state(ContextState::Active, other)),
        }
    }

    /// Release the session, rolling back any open transaction.
    ///
    /// Closing twice is an `InvalidState` error and never touches the
    /// session again.
    pub fn close(&mut self) -> Result<()> {
        if self.state == ContextState::Closed {
            return Err(HarnessError::invalid_state("open context", self.state));
        }
        let rollback = if self.state == ContextState::Active {
            self.session.rollback()
        } else {
            Ok(())
        };
        let close = self.session.close();
        self.state = ContextState::Closed;
        debug!(role = %self.role, "context closed");
        rollback?;
        close?;
        Ok(())
    }

    /// Record an error: roll the session back and enter `Failed(kind)`.
    fn fail(&mut self, error: HarnessError) -> HarnessError {
        let kind = error.kind();
        if let Err(e) = self.session.rollback() {
            debug!(role = %self.role, error = %e, "rollback after failure also failed");
        }
        self.state = ContextState::Failed(kind);
        if error.is_expected_conflict() {
            debug!(role = %self.role, "transaction aborted by serialization conflict");
        } else {
            warn!(role = %self.role, kind = %kind, error = %error, "transaction failed");
        }
        error
    }
}

impl Drop for TransactionContext {
    fn drop(&mut self) {
        if self.state != ContextState::Closed {
            if let Err(e) = self.close() {
                debug!(role = %self.role, error = %e, "close on drop failed");
            }
        }
    }
}

impl fmt::Debug for TransactionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionContext")
            .field("role", &self.role)
            .field("isolation", &self.isolation)
            .field("state", &self.state)
            .finish()
    }
}
