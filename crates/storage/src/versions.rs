//! Multi-version row table
//!
//! Every record id maps to a chain of committed versions ordered by commit
//! timestamp. A tombstone (`record: None`) marks a delete. Readers pick the
//! newest version at or below their snapshot timestamp, so a snapshot never
//! changes underneath them.
//!
//! # Design
//!
//! - DashMap keyed by record id: readers and the committer only lock the
//!   shard holding the row they touch
//! - FxHash: record ids are small integers, no need for SipHash
//! - Global clock (AtomicU64): the commit timestamp of the newest *published*
//!   transaction. Versions are installed first and the clock advanced second,
//!   so a snapshot taken from the clock never observes half a commit.

use dashmap::DashMap;
use rustc_hash::FxHasher;
use std::hash::BuildHasherDefault;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use txanomaly_core::{DomainRecord, NewRecord, RecordId};

type FxBuildHasher = BuildHasherDefault<FxHasher>;

/// One committed version of a row
#[derive(Debug, Clone, PartialEq)]
pub struct RowVersion {
    /// Timestamp of the committing transaction
    pub commit_ts: u64,
    /// Row contents; `None` for a delete
    pub record: Option<DomainRecord>,
}

/// Version chains for all rows ever committed
pub struct VersionTable {
    rows: DashMap<RecordId, Vec<RowVersion>, FxBuildHasher>,
    clock: AtomicU64,
    next_id: AtomicI64,
}

impl VersionTable {
    /// Create an empty table at timestamp 0
    pub fn new() -> Self {
        VersionTable {
            rows: DashMap::with_hasher(FxBuildHasher::default()),
            clock: AtomicU64::new(0),
            next_id: AtomicI64::new(1),
        }
    }

    /// Load initial rows at timestamp 0, assigning consecutive ids.
    pub fn load(&self, records: impl IntoIterator<Item = NewRecord>) -> usize {
        let mut loaded = 0;
        for new in records {
            let id = self.allocate_id();
            self.rows.insert(
                id,
                vec![RowVersion {
                    commit_ts: 0,
                    record: Some(new.into_record(id)),
                }],
            );
            loaded += 1;
        }
        loaded
    }

    /// Timestamp of the newest published commit
    #[inline]
    pub fn clock(&self) -> u64 {
        self.clock.load(Ordering::Acquire)
    }

    /// Make every version at or below `ts` visible to new snapshots.
    ///
    /// Callers must hold the commit lock.
    #[inline]
    pub fn publish(&self, ts: u64) {
        self.clock.store(ts, Ordering::Release);
    }

    /// Allocate a fresh record id. Ids are never reused, even if the
    /// inserting transaction rolls back.
    pub fn allocate_id(&self) -> RecordId {
        RecordId(self.next_id.fetch_add(1, Ordering::AcqRel))
    }

    /// Newest version visible at `ts`, with the timestamp it was committed at.
    ///
    /// Returns `None` if the row did not exist or was deleted at `ts`.
    pub fn visible(&self, id: RecordId, ts: u64) -> Option<(u64, DomainRecord)> {
        let chain = self.rows.get(&id)?;
        let version = chain.iter().rev().find(|v| v.commit_ts <= ts)?;
        version
            .record
            .as_ref()
            .map(|record| (version.commit_ts, record.clone()))
    }

    /// Commit timestamp of the newest version of `id`, visible or not
    pub fn latest_ts(&self, id: RecordId) -> Option<u64> {
        self.rows
            .get(&id)
            .and_then(|chain| chain.last().map(|v| v.commit_ts))
    }

    /// All rows visible at `ts`, sorted by id.
    pub fn scan(&self, ts: u64) -> Vec<(u64, DomainRecord)> {
        let mut rows: Vec<(u64, DomainRecord)> = self
            .rows
            .iter()
            .filter_map(|entry| {
                let version = entry.value().iter().rev().find(|v| v.commit_ts <= ts)?;
                version
                    .record
                    .as_ref()
                    .map(|record| (version.commit_ts, record.clone()))
            })
            .collect();
        rows.sort_by_key(|(_, record)| record.id);
        rows
    }

    /// Append a version to the chain of `id`.
    ///
    /// Callers must hold the commit lock and publish `commit_ts` afterwards.
    pub fn install(&self, id: RecordId, commit_ts: u64, record: Option<DomainRecord>) {
        self.rows
            .entry(id)
            .or_default()
            .push(RowVersion { commit_ts, record });
    }

    /// Number of rows visible at the current clock
    pub fn live_count(&self) -> usize {
        let ts = self.clock();
        self.rows
            .iter()
            .filter(|entry| {
                entry
                    .value()
                    .iter()
                    .rev()
                    .find(|v| v.commit_ts <= ts)
                    .map(|v| v.record.is_some())
                    .unwrap_or(false)
            })
            .count()
    }

    /// Total number of versions across all chains
    pub fn version_count(&self) -> usize {
        self.rows.iter().map(|entry| entry.value().len()).sum()
    }
}

impl Default for VersionTable {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for VersionTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VersionTable")
            .field("clock", &self.clock())
            .field("chains", &self.rows.len())
            .field("versions", &self.version_count())
            .finish()
    }
}
