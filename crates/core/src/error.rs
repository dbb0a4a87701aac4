//! Error taxonomy
//!
//! Two layers:
//!
//! - [`StoreError`] is what a store session reports. Its [`StoreErrorKind`]
//!   separates serialization conflicts from connectivity loss and from
//!   everything else the store rejects.
//! - [`HarnessError`] is what the harness reports. It wraps store errors and
//!   adds the harness's own failures (barrier timeouts, restore mismatches,
//!   hung workers, ...).
//!
//! Callers branch on [`HarnessError::kind`], never on the message text. Only
//! [`ErrorKind::SerializationConflict`] may be treated as a scenario outcome;
//! every other kind means the harness itself failed.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// ============================================================================
// Store errors
// ============================================================================

/// Machine-checkable classification of a store error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StoreErrorKind {
    /// The session cannot reach the store (closed, refused, dropped)
    Connection,
    /// The store aborted the transaction to preserve its isolation guarantee
    SerializationConflict,
    /// Constraint violation, malformed statement, misuse of the session
    ConstraintOrGeneric,
}

impl fmt::Display for StoreErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreErrorKind::Connection => write!(f, "connection"),
            StoreErrorKind::SerializationConflict => write!(f, "serialization conflict"),
            StoreErrorKind::ConstraintOrGeneric => write!(f, "store error"),
        }
    }
}

/// Error reported by a store session
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct StoreError {
    /// Classification
    pub kind: StoreErrorKind,
    /// Store-provided detail
    pub message: String,
}

impl StoreError {
    /// Build an error of the given kind.
    pub fn new(kind: StoreErrorKind, message: impl Into<String>) -> Self {
        StoreError {
            kind,
            message: message.into(),
        }
    }

    /// Connectivity failure.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::Connection, message)
    }

    /// Serialization conflict.
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::SerializationConflict, message)
    }

    /// Constraint violation or any other store-side rejection.
    pub fn generic(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::ConstraintOrGeneric, message)
    }

    /// Check if this is a serialization conflict.
    pub fn is_serialization_conflict(&self) -> bool {
        self.kind == StoreErrorKind::SerializationConflict
    }

    /// Check if the session lost its connection.
    pub fn is_connection(&self) -> bool {
        self.kind == StoreErrorKind::Connection
    }
}

/// Result type for store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

// ============================================================================
// Harness errors
// ============================================================================

/// Flat classification of every failure the harness can report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    /// Store connectivity lost
    Connection,
    /// Store aborted a transaction to preserve isolation
    SerializationConflict,
    /// Constraint violation or generic store failure
    ConstraintOrGeneric,
    /// A rendezvous did not complete in time
    BarrierTimeout,
    /// A barrier was waited on after it had released
    BarrierReused,
    /// Post-restore state differs from the recorded baseline
    RestoreMismatch,
    /// A worker did not terminate before the join deadline
    WorkerHung,
    /// A worker thread panicked
    WorkerPanicked,
    /// Operation not allowed in the current lifecycle state
    InvalidState,
    /// Scenario parameters rejected before running
    InvalidScenario,
    /// A work unit's own safety check failed
    GuardViolation,
    /// Configuration could not be loaded, or the scenario configuration
    /// produced an impossible outcome
    Configuration,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Connection => "Connection",
            ErrorKind::SerializationConflict => "SerializationConflict",
            ErrorKind::ConstraintOrGeneric => "ConstraintOrGeneric",
            ErrorKind::BarrierTimeout => "BarrierTimeout",
            ErrorKind::BarrierReused => "BarrierReused",
            ErrorKind::RestoreMismatch => "RestoreMismatch",
            ErrorKind::WorkerHung => "WorkerHung",
            ErrorKind::WorkerPanicked => "WorkerPanicked",
            ErrorKind::InvalidState => "InvalidState",
            ErrorKind::InvalidScenario => "InvalidScenario",
            ErrorKind::GuardViolation => "GuardViolation",
            ErrorKind::Configuration => "Configuration",
        };
        f.write_str(name)
    }
}

/// All harness errors.
#[derive(Debug, Clone, Error)]
pub enum HarnessError {
    /// Error reported by the store
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A rendezvous did not complete before its deadline
    #[error("barrier timeout after {waited_ms}ms ({arrived}/{parties} parties arrived)")]
    BarrierTimeout {
        /// Time the reporting party waited
        waited_ms: u64,
        /// Parties that had arrived when the barrier broke
        arrived: usize,
        /// Parties required for release
        parties: usize,
    },

    /// Wait on a barrier whose single rendezvous already happened
    #[error("barrier already released; allocate a fresh barrier per rendezvous")]
    BarrierReused,

    /// Restored state differs from the baseline
    #[error("restore mismatch in {scenario}: {detail}")]
    RestoreMismatch {
        /// Scenario whose restore failed
        scenario: String,
        /// What differed
        detail: String,
    },

    /// A worker did not reach a terminal state before the join deadline
    #[error("worker {role} did not terminate within {timeout_ms}ms")]
    WorkerHung {
        /// Role of the hung worker
        role: String,
        /// Join deadline
        timeout_ms: u64,
    },

    /// A worker thread panicked
    #[error("worker {role} panicked: {message}")]
    WorkerPanicked {
        /// Role of the worker
        role: String,
        /// Panic payload, when it was a string
        message: String,
    },

    /// Lifecycle misuse (e.g. statement after commit)
    #[error("invalid state: expected {expected}, found {actual}")]
    InvalidState {
        /// Required state
        expected: String,
        /// Actual state
        actual: String,
    },

    /// Scenario parameters rejected before any statement ran
    #[error("invalid scenario: {0}")]
    InvalidScenario(String),

    /// A work unit's own safety check failed
    #[error("guard violation: {0}")]
    GuardViolation(String),

    /// Configuration problem
    #[error("configuration error: {0}")]
    Configuration(String),
}

/// Result type for harness operations
pub type Result<T> = std::result::Result<T, HarnessError>;

impl HarnessError {
    /// Flat classification.
    pub fn kind(&self) -> ErrorKind {
        match self {
            HarnessError::Store(e) => match e.kind {
                StoreErrorKind::Connection => ErrorKind::Connection,
                StoreErrorKind::SerializationConflict => ErrorKind::SerializationConflict,
                StoreErrorKind::ConstraintOrGeneric => ErrorKind::ConstraintOrGeneric,
            },
            HarnessError::BarrierTimeout { .. } => ErrorKind::BarrierTimeout,
            HarnessError::BarrierReused => ErrorKind::BarrierReused,
            HarnessError::RestoreMismatch { .. } => ErrorKind::RestoreMismatch,
            HarnessError::WorkerHung { .. } => ErrorKind::WorkerHung,
            HarnessError::WorkerPanicked { .. } => ErrorKind::WorkerPanicked,
            HarnessError::InvalidState { .. } => ErrorKind::InvalidState,
            HarnessError::InvalidScenario(_) => ErrorKind::InvalidScenario,
            HarnessError::GuardViolation(_) => ErrorKind::GuardViolation,
            HarnessError::Configuration(_) => ErrorKind::Configuration,
        }
    }

    /// Check if this error is a legitimate scenario outcome rather than a
    /// harness failure.
    ///
    /// Only serialization conflicts qualify.
    pub fn is_expected_conflict(&self) -> bool {
        self.kind() == ErrorKind::SerializationConflict
    }

    /// Check if this error must stop every subsequent scenario.
    pub fn is_fatal(&self) -> bool {
        matches!(self.kind(), ErrorKind::RestoreMismatch)
    }

    /// Lifecycle misuse helper.
    pub fn invalid_state(expected: impl fmt::Display, actual: impl fmt::Display) -> Self {
        HarnessError::InvalidState {
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }
}

impl From<toml::de::Error> for HarnessError {
    fn from(e: toml::de::Error) -> Self {
        HarnessError::Configuration(e.to_string())
    }
}
