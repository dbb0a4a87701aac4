//! Commit-time conflict detection
//!
//! Two checks, both run under the commit lock:
//!
//! - **Write set** (repeatable-read and serializable): a row this transaction
//!   wrote was committed by someone else after our snapshot. First committer
//!   wins.
//! - **Read set** (serializable, writing transactions only): a row this
//!   transaction read has a newer version than the one it read.
//!
//! Read-only transactions never conflict.

use crate::versions::VersionTable;
use rustc_hash::FxHashMap;
use std::fmt;
use txanomaly_core::{RecordId, StoreError};

/// One detected conflict
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictType {
    /// A written row was committed concurrently
    WriteWrite {
        /// Row
        id: RecordId,
        /// Snapshot of the validating transaction
        snapshot_ts: u64,
        /// Commit timestamp of the concurrent version
        committed_ts: u64,
    },
    /// A read row changed before commit
    ReadWrite {
        /// Row
        id: RecordId,
        /// Version the transaction read
        read_ts: u64,
        /// Newest version at validation time, `None` if the chain vanished
        current_ts: Option<u64>,
    },
}

impl fmt::Display for ConflictType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictType::WriteWrite {
                id,
                snapshot_ts,
                committed_ts,
            } => write!(
                f,
                "row {} updated at ts {} after snapshot {}",
                id, committed_ts, snapshot_ts
            ),
            ConflictType::ReadWrite {
                id,
                read_ts,
                current_ts,
            } => match current_ts {
                Some(ts) => write!(f, "row {} read at ts {} changed at ts {}", id, read_ts, ts),
                None => write!(f, "row {} read at ts {} no longer exists", id, read_ts),
            },
        }
    }
}

/// Outcome of validating one transaction
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationResult {
    /// Every conflict found
    pub conflicts: Vec<ConflictType>,
}

impl ValidationResult {
    /// No conflicts
    pub fn ok() -> Self {
        Self::default()
    }

    /// Whether the transaction may commit
    pub fn is_valid(&self) -> bool {
        self.conflicts.is_empty()
    }

    /// Append the conflicts of another check.
    pub fn merge(&mut self, other: ValidationResult) {
        self.conflicts.extend(other.conflicts);
    }

    /// Convert into the error reported to the session, if any conflict was
    /// found.
    pub fn into_error(self) -> Option<StoreError> {
        let first = self.conflicts.first()?;
        Some(StoreError::serialization(format!(
            "could not serialize access: {} ({} conflict(s))",
            first,
            self.conflicts.len()
        )))
    }
}

/// First-committer-wins check over the rows a transaction wrote.
///
/// Rows the transaction inserted itself have no committed chain and never
/// conflict.
pub fn validate_write_set<'a>(
    table: &VersionTable,
    written: impl IntoIterator<Item = &'a RecordId>,
    snapshot_ts: u64,
) -> ValidationResult {
    let conflicts = written
        .into_iter()
        .filter_map(|id| {
            let committed_ts = table.latest_ts(*id)?;
            (committed_ts > snapshot_ts).then_some(ConflictType::WriteWrite {
                id: *id,
                snapshot_ts,
                committed_ts,
            })
        })
        .collect();
    ValidationResult { conflicts }
}

/// Check that every row read is still at the version that was read.
pub fn validate_read_set(table: &VersionTable, reads: &FxHashMap<RecordId, u64>) -> ValidationResult {
    let mut conflicts: Vec<ConflictType> = reads
        .iter()
        .filter_map(|(id, read_ts)| {
            let current_ts = table.latest_ts(*id);
            (current_ts != Some(*read_ts)).then_some(ConflictType::ReadWrite {
                id: *id,
                read_ts: *read_ts,
                current_ts,
            })
        })
        .collect();
    conflicts.sort_by_key(|c| match c {
        ConflictType::WriteWrite { id, .. } | ConflictType::ReadWrite { id, .. } => *id,
    });
    ValidationResult { conflicts }
}
