//! In-process reference store
//!
//! A multi-version store implementing exactly the visibility rules the
//! harness probes:
//!
//! | Level | Snapshot | Write check | Commit validation |
//! |-------|----------|-------------|-------------------|
//! | ReadCommitted | per statement | none | none |
//! | RepeatableRead | first statement | first updater wins | write set |
//! | Serializable | first statement | first updater wins | write set, read set if writing |
//!
//! Writes are buffered per transaction (read-your-writes) and installed under
//! the commit lock at a single new timestamp. Rolled back transactions leave
//! nothing behind except consumed ids.
//!
//! The store can be switched offline to simulate a lost connection: every
//! session operation then fails with a connection error.

use crate::seed;
use crate::session::{Session, StoreClient};
use crate::validation::{validate_read_set, validate_write_set, ValidationResult};
use crate::versions::VersionTable;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;
use txanomaly_core::statement::record_to_row;
use txanomaly_core::{
    Datum, DomainRecord, ExecResult, IsolationLevel, NewRecord, RecordId, Row, Statement,
    StoreError, StoreResult,
};

// ============================================================================
// Shared store
// ============================================================================

/// Shared state of the reference store
pub struct MemoryStore {
    table: VersionTable,
    /// Serializes validation and installation of commits
    commit_lock: Mutex<()>,
    next_txn_id: AtomicU64,
    next_session_id: AtomicU64,
    offline: AtomicBool,
}

impl MemoryStore {
    /// Empty store
    pub fn new() -> Self {
        MemoryStore {
            table: VersionTable::new(),
            commit_lock: Mutex::new(()),
            next_txn_id: AtomicU64::new(1),
            next_session_id: AtomicU64::new(1),
            offline: AtomicBool::new(false),
        }
    }

    /// Store preloaded with `records`
    pub fn with_records(records: impl IntoIterator<Item = NewRecord>) -> Self {
        let store = Self::new();
        store.table.load(records);
        store
    }

    /// Store preloaded with `rows` generated records.
    pub fn seeded(rows: usize, seed: u64) -> Self {
        Self::with_records(seed::generate(rows, seed))
    }

    /// Latest committed version of a record
    pub fn committed(&self, id: RecordId) -> Option<DomainRecord> {
        self.table.visible(id, self.table.clock()).map(|(_, r)| r)
    }

    /// Every committed record, sorted by id
    pub fn committed_records(&self) -> Vec<DomainRecord> {
        self.table
            .scan(self.table.clock())
            .into_iter()
            .map(|(_, r)| r)
            .collect()
    }

    /// Number of committed live rows
    pub fn len(&self) -> usize {
        self.table.live_count()
    }

    /// Whether the store holds no live rows
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Timestamp of the newest commit
    pub fn current_ts(&self) -> u64 {
        self.table.clock()
    }

    /// Simulate connectivity loss (or recovery) for every session.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Whether the store is simulating connectivity loss
    pub fn is_offline(&self) -> bool {
        self.offline.load(Ordering::SeqCst)
    }

    fn check_online(&self) -> StoreResult<()> {
        if self.is_offline() {
            Err(StoreError::connection(
                "server closed the connection unexpectedly",
            ))
        } else {
            Ok(())
        }
    }

    /// Validate and install a transaction's writes.
    fn commit_txn(&self, txn: Txn) -> StoreResult<Option<u64>> {
        if txn.writes.is_empty() {
            return Ok(None);
        }

        let _commit_guard = self.commit_lock.lock();

        if txn.isolation.uses_transaction_snapshot() {
            let snapshot_ts = txn.snapshot.unwrap_or_else(|| self.table.clock());
            let mut result = validate_write_set(&self.table, txn.writes.keys(), snapshot_ts);
            if txn.isolation == IsolationLevel::Serializable {
                result.merge(validate_read_set(&self.table, &txn.reads));
            }
            if let Some(err) = ValidationResult::into_error(result) {
                debug!(txn_id = txn.id, isolation = %txn.isolation, "commit rejected: {}", err.message);
                return Err(err);
            }
        }

        let commit_ts = self.table.clock() + 1;
        let written = txn.writes.len();
        for (id, record) in txn.writes {
            self.table.install(id, commit_ts, record);
        }
        self.table.publish(commit_ts);

        debug!(txn_id = txn.id, commit_ts, rows = written, "commit installed");
        Ok(Some(commit_ts))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("table", &self.table)
            .field("offline", &self.is_offline())
            .finish()
    }
}

// ============================================================================
// Client
// ============================================================================

/// [`StoreClient`] over a shared [`MemoryStore`]
#[derive(Debug, Clone)]
pub struct MemoryClient {
    store: Arc<MemoryStore>,
}

impl MemoryClient {
    /// Client over an existing store
    pub fn new(store: Arc<MemoryStore>) -> Self {
        MemoryClient { store }
    }

    /// Client over a freshly seeded store
    pub fn seeded(rows: usize, seed: u64) -> Self {
        Self::new(Arc::new(MemoryStore::seeded(rows, seed)))
    }

    /// Underlying store, for inspection
    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }
}

impl StoreClient for MemoryClient {
    fn connect(&self) -> StoreResult<Box<dyn Session>> {
        self.store.check_online()?;
        let id = self.store.next_session_id.fetch_add(1, Ordering::Relaxed);
        debug!(session = id, "memory session opened");
        Ok(Box::new(MemorySession {
            store: Arc::clone(&self.store),
            id,
            isolation: IsolationLevel::ReadCommitted,
            autocommit: false,
            txn: None,
            closed: false,
        }))
    }

    fn describe(&self) -> String {
        format!("memory ({} rows)", self.store.len())
    }
}

// ============================================================================
// Session
// ============================================================================

/// Per-transaction state
#[derive(Debug)]
struct Txn {
    id: u64,
    isolation: IsolationLevel,
    /// Transaction snapshot; taken lazily by the first statement
    snapshot: Option<u64>,
    /// Buffered writes; `None` deletes
    writes: BTreeMap<RecordId, Option<DomainRecord>>,
    /// Committed version timestamp of every row read
    reads: FxHashMap<RecordId, u64>,
    /// Set once a statement fails; further statements are refused
    aborted: Option<StoreError>,
}

impl Txn {
    fn new(id: u64, isolation: IsolationLevel) -> Self {
        Txn {
            id,
            isolation,
            snapshot: None,
            writes: BTreeMap::new(),
            reads: FxHashMap::default(),
            aborted: None,
        }
    }
}

/// One session against a [`MemoryStore`]
pub struct MemorySession {
    store: Arc<MemoryStore>,
    id: u64,
    isolation: IsolationLevel,
    autocommit: bool,
    txn: Option<Txn>,
    closed: bool,
}

impl MemorySession {
    fn check_usable(&mut self) -> StoreResult<()> {
        if self.closed {
            return Err(StoreError::connection("connection already closed"));
        }
        if let Err(e) = self.store.check_online() {
            // The server side of the transaction is gone with the connection
            self.txn = None;
            return Err(e);
        }
        Ok(())
    }

    fn new_txn(&self) -> Txn {
        Txn::new(
            self.store.next_txn_id.fetch_add(1, Ordering::Relaxed),
            self.isolation,
        )
    }
}

impl Session for MemorySession {
    fn set_isolation(&mut self, level: IsolationLevel) -> StoreResult<()> {
        self.check_usable()?;
        if self.txn.is_some() {
            return Err(StoreError::generic(
                "SET TRANSACTION ISOLATION LEVEL must be called before any query",
            ));
        }
        self.isolation = level;
        Ok(())
    }

    fn isolation(&self) -> IsolationLevel {
        self.isolation
    }

    fn set_autocommit(&mut self, autocommit: bool) -> StoreResult<()> {
        self.check_usable()?;
        if self.txn.is_some() {
            return Err(StoreError::generic(
                "autocommit cannot be changed inside a transaction",
            ));
        }
        self.autocommit = autocommit;
        Ok(())
    }

    fn begin(&mut self) -> StoreResult<()> {
        self.check_usable()?;
        if self.txn.is_some() {
            return Err(StoreError::generic("there is already a transaction in progress"));
        }
        let txn = self.new_txn();
        debug!(session = self.id, txn_id = txn.id, isolation = %txn.isolation, "begin");
        self.txn = Some(txn);
        Ok(())
    }

    fn execute(&mut self, statement: &Statement) -> StoreResult<ExecResult> {
        self.check_usable()?;

        if self.txn.is_none() && self.autocommit {
            let mut txn = self.new_txn();
            let result = eval(&self.store.table, &mut txn, statement)?;
            self.store.commit_txn(txn)?;
            return Ok(result);
        }

        if self.txn.is_none() {
            self.txn = Some(self.new_txn());
        }
        let txn = match self.txn.as_mut() {
            Some(txn) => txn,
            None => return Err(StoreError::generic("no transaction")),
        };

        if txn.aborted.is_some() {
            return Err(StoreError::generic(
                "current transaction is aborted, commands ignored until end of transaction block",
            ));
        }

        debug!(
            session = self.id,
            txn_id = txn.id,
            statement = statement.name(),
            "execute"
        );
        match eval(&self.store.table, txn, statement) {
            Ok(result) => Ok(result),
            Err(e) => {
                txn.aborted = Some(e.clone());
                Err(e)
            }
        }
    }

    fn commit(&mut self) -> StoreResult<()> {
        self.check_usable()?;
        let txn = match self.txn.take() {
            Some(txn) => txn,
            None => return Ok(()),
        };
        if let Some(cause) = &txn.aborted {
            return Err(StoreError::new(
                cause.kind,
                format!("transaction was aborted and has been rolled back: {}", cause.message),
            ));
        }
        self.store.commit_txn(txn).map(|_| ())
    }

    fn rollback(&mut self) -> StoreResult<()> {
        if self.closed {
            return Err(StoreError::connection("connection already closed"));
        }
        if let Some(txn) = self.txn.take() {
            debug!(session = self.id, txn_id = txn.id, discarded = txn.writes.len(), "rollback");
        }
        self.store.check_online()
    }

    fn close(&mut self) -> StoreResult<()> {
        if !self.closed {
            self.txn = None;
            self.closed = true;
            debug!(session = self.id, "memory session closed");
        }
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.txn.is_some()
    }
}

// ============================================================================
// Statement evaluation
// ============================================================================

/// A transaction's view of the table for one statement
struct View<'a> {
    table: &'a VersionTable,
    txn: &'a mut Txn,
    ts: u64,
}

impl<'a> View<'a> {
    fn open(table: &'a VersionTable, txn: &'a mut Txn) -> Self {
        let ts = if txn.isolation.uses_transaction_snapshot() {
            *txn.snapshot.get_or_insert_with(|| table.clock())
        } else {
            table.clock()
        };
        View { table, txn, ts }
    }

    fn get(&mut self, id: RecordId) -> Option<DomainRecord> {
        if let Some(written) = self.txn.writes.get(&id) {
            return written.clone();
        }
        let (version_ts, record) = self.table.visible(id, self.ts)?;
        self.txn.reads.insert(id, version_ts);
        Some(record)
    }

    /// Rows matching `predicate`, own writes applied, sorted by id.
    fn scan(&mut self, predicate: impl Fn(&DomainRecord) -> bool) -> Vec<DomainRecord> {
        let mut rows = Vec::new();
        for (version_ts, record) in self.table.scan(self.ts) {
            if self.txn.writes.contains_key(&record.id) || !predicate(&record) {
                continue;
            }
            self.txn.reads.insert(record.id, version_ts);
            rows.push(record);
        }
        rows.extend(
            self.txn
                .writes
                .values()
                .flatten()
                .filter(|r| predicate(r))
                .cloned(),
        );
        rows.sort_by_key(|r| r.id);
        rows
    }

    /// Refuse to overwrite a row someone committed after our snapshot.
    fn check_first_updater(&self, id: RecordId) -> StoreResult<()> {
        if !self.txn.isolation.uses_transaction_snapshot() || self.txn.writes.contains_key(&id) {
            return Ok(());
        }
        match self.table.latest_ts(id) {
            Some(committed_ts) if committed_ts > self.ts => Err(StoreError::serialization(format!(
                "could not serialize access due to concurrent update of row {}",
                id
            ))),
            _ => Ok(()),
        }
    }

    fn put(&mut self, record: DomainRecord) -> StoreResult<()> {
        self.check_first_updater(record.id)?;
        self.txn.writes.insert(record.id, Some(record));
        Ok(())
    }

    fn remove(&mut self, id: RecordId) -> StoreResult<()> {
        self.check_first_updater(id)?;
        self.txn.writes.insert(id, None);
        Ok(())
    }

    fn insert(&mut self, new: NewRecord) -> RecordId {
        let id = self.table.allocate_id();
        self.txn.writes.insert(id, Some(new.into_record(id)));
        id
    }

    /// Apply `change` to every row of `rows`; returns the affected count.
    fn update_all(
        &mut self,
        rows: Vec<DomainRecord>,
        change: impl Fn(&mut DomainRecord),
    ) -> StoreResult<ExecResult> {
        let affected = rows.len() as u64;
        for mut record in rows {
            change(&mut record);
            self.put(record)?;
        }
        Ok(ExecResult::RowsAffected(affected))
    }

    fn delete_all(&mut self, rows: Vec<DomainRecord>) -> StoreResult<ExecResult> {
        let affected = rows.len() as u64;
        for record in rows {
            self.remove(record.id)?;
        }
        Ok(ExecResult::RowsAffected(affected))
    }
}

fn single(datum: Datum) -> ExecResult {
    ExecResult::Rows(vec![Row(vec![datum])])
}

fn count(n: usize) -> ExecResult {
    single(Datum::Int(n as i64))
}

fn average(rows: &[DomainRecord]) -> Option<f64> {
    if rows.is_empty() {
        None
    } else {
        Some(rows.iter().map(|r| r.value).sum::<f64>() / rows.len() as f64)
    }
}

fn float_or_null(v: Option<f64>) -> Datum {
    v.map(Datum::Float).unwrap_or(Datum::Null)
}

/// Interpret one statement inside `txn`.
fn eval(table: &VersionTable, txn: &mut Txn, statement: &Statement) -> StoreResult<ExecResult> {
    let mut view = View::open(table, txn);

    match statement {
        Statement::SelectValue { id } => Ok(ExecResult::Rows(
            view.get(*id)
                .map(|r| vec![Row(vec![Datum::Float(r.value)])])
                .unwrap_or_default(),
        )),
        Statement::SelectRecord { id } => Ok(ExecResult::Rows(
            view.get(*id)
                .map(|r| vec![record_to_row(&r)])
                .unwrap_or_default(),
        )),
        Statement::CountAll => Ok(count(view.scan(|_| true).len())),
        Statement::SelectIdAt { offset } => {
            let rows = view.scan(|_| true);
            Ok(ExecResult::Rows(
                usize::try_from(*offset)
                    .ok()
                    .and_then(|i| rows.get(i))
                    .map(|r| vec![Row(vec![Datum::Int(r.id.as_i64())])])
                    .unwrap_or_default(),
            ))
        }
        Statement::SelectGroupName { group_code } => {
            let rows = view.scan(|r| r.group_code == *group_code);
            Ok(ExecResult::Rows(
                rows.first()
                    .map(|r| vec![Row(vec![Datum::Text(r.group_name.clone())])])
                    .unwrap_or_default(),
            ))
        }
        Statement::SelectGroupNames { group_code } => {
            let rows = view.scan(|r| r.group_code == *group_code);
            Ok(ExecResult::Rows(
                rows.into_iter()
                    .map(|r| Row(vec![Datum::Int(r.id.as_i64()), Datum::Text(r.group_name)]))
                    .collect(),
            ))
        }
        Statement::AverageGroupValue { group_code } => {
            let rows = view.scan(|r| r.group_code == *group_code);
            Ok(single(float_or_null(average(&rows))))
        }
        Statement::CountQualifying {
            group_code,
            min_value,
        } => Ok(count(view.scan(|r| r.qualifies(group_code, *min_value)).len())),
        Statement::InsertRecord(new) => {
            let id = view.insert(new.clone());
            Ok(single(Datum::Int(id.as_i64())))
        }
        Statement::UpdateValue { id, value } => {
            let rows: Vec<DomainRecord> = view.get(*id).into_iter().collect();
            view.update_all(rows, |r| r.value = *value)
        }
        Statement::RenameGroup {
            group_code,
            old_name,
            new_name,
        } => {
            let rows = view.scan(|r| r.group_code == *group_code && r.group_name == *old_name);
            view.update_all(rows, |r| r.group_name = new_name.clone())
        }
        Statement::SetRecordName { id, name } => {
            let rows: Vec<DomainRecord> = view.get(*id).into_iter().collect();
            view.update_all(rows, |r| r.group_name = name.clone())
        }
        Statement::ScaleValues {
            postal_code,
            factor,
        } => {
            let rows = view.scan(|r| r.postal_code == *postal_code && r.value > 0.0);
            view.update_all(rows, |r| r.value *= *factor)
        }
        Statement::ValueRange { postal_code } => {
            let rows = view.scan(|r| r.postal_code == *postal_code);
            let min = rows.iter().map(|r| r.value).reduce(f64::min);
            let max = rows.iter().map(|r| r.value).reduce(f64::max);
            Ok(ExecResult::Rows(vec![Row(vec![
                float_or_null(min),
                float_or_null(max),
            ])]))
        }
        Statement::AveragePostalValue { postal_code } => {
            let rows = view.scan(|r| r.postal_code == *postal_code);
            Ok(single(Datum::Float(average(&rows).unwrap_or(0.0))))
        }
        Statement::SelectPostalValues { postal_code } => {
            let rows = view.scan(|r| r.postal_code == *postal_code);
            Ok(ExecResult::Rows(
                rows.into_iter()
                    .map(|r| Row(vec![Datum::Int(r.id.as_i64()), Datum::Float(r.value)]))
                    .collect(),
            ))
        }
        Statement::CountOlderThan { cutoff } => {
            Ok(count(view.scan(|r| r.is_older_than(*cutoff)).len()))
        }
        Statement::DeleteOlderThan { cutoff } => {
            let rows = view.scan(|r| r.is_older_than(*cutoff));
            view.delete_all(rows)
        }
        Statement::CountMarked { marker } => {
            Ok(count(view.scan(|r| r.mutation_ref == *marker).len()))
        }
        Statement::DeleteMarked { marker } => {
            let rows = view.scan(|r| r.mutation_ref == *marker);
            view.delete_all(rows)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use txanomaly_core::StoreErrorKind;

    fn client() -> MemoryClient {
        MemoryClient::seeded(40, 11)
    }

    fn open(client: &MemoryClient, level: IsolationLevel) -> Box<dyn Session> {
        let mut session = client.connect().unwrap();
        session.set_isolation(level).unwrap();
        session
    }

    fn value_of(session: &mut Box<dyn Session>, id: RecordId) -> f64 {
        session
            .execute(&Statement::SelectValue { id })
            .unwrap()
            .scalar_f64()
            .unwrap()
            .unwrap()
    }

    fn committed_write(client: &MemoryClient, id: RecordId, value: f64) {
        let mut writer = open(client, IsolationLevel::ReadCommitted);
        writer
            .execute(&Statement::UpdateValue { id, value })
            .unwrap();
        writer.commit().unwrap();
    }

    #[test]
    fn test_read_committed_sees_concurrent_commit() {
        let client = client();
        let id = RecordId(1);
        let mut reader = open(&client, IsolationLevel::ReadCommitted);
        let first = value_of(&mut reader, id);

        committed_write(&client, id, first + 10_000.0);

        assert_eq!(value_of(&mut reader, id), first + 10_000.0);
    }

    #[test]
    fn test_repeatable_read_keeps_snapshot() {
        let client = client();
        let id = RecordId(1);
        for level in [IsolationLevel::RepeatableRead, IsolationLevel::Serializable] {
            let mut reader = open(&client, level);
            let first = value_of(&mut reader, id);
            committed_write(&client, id, first + 1.0);
            assert_eq!(value_of(&mut reader, id), first);
            reader.commit().unwrap();
            // A new transaction sees the write
            assert_eq!(value_of(&mut reader, id), first + 1.0);
            reader.rollback().unwrap();
        }
    }

    #[test]
    fn test_snapshot_is_taken_at_first_statement_not_begin() {
        let client = client();
        let id = RecordId(2);
        let mut reader = open(&client, IsolationLevel::RepeatableRead);
        reader.begin().unwrap();
        committed_write(&client, id, 1.5);
        assert_eq!(value_of(&mut reader, id), 1.5);
    }

    #[test]
    fn test_phantom_visible_only_at_read_committed() {
        let client = client();
        let marker = "PHANTOM-test".to_string();
        let insert = Statement::InsertRecord(NewRecord {
            mutation_ref: marker.clone(),
            date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            value: 9_999_999.0,
            group_code: "01053".into(),
            group_name: "Bourg-en-Bresse".into(),
            postal_code: "01000.0".into(),
            property_kind: "Maison".into(),
        });
        let query = Statement::CountQualifying {
            group_code: "01053".into(),
            min_value: 9_999_999.0,
        };

        let mut rc = open(&client, IsolationLevel::ReadCommitted);
        let mut rr = open(&client, IsolationLevel::RepeatableRead);
        let rc_before = rc.execute(&query).unwrap().count().unwrap();
        let rr_before = rr.execute(&query).unwrap().count().unwrap();

        let mut inserter = open(&client, IsolationLevel::ReadCommitted);
        inserter.execute(&insert).unwrap();
        inserter.commit().unwrap();

        assert_eq!(rc.execute(&query).unwrap().count().unwrap(), rc_before + 1);
        assert_eq!(rr.execute(&query).unwrap().count().unwrap(), rr_before);

        let mut cleanup = open(&client, IsolationLevel::ReadCommitted);
        cleanup.set_autocommit(true).unwrap();
        let deleted = cleanup
            .execute(&Statement::DeleteMarked { marker })
            .unwrap()
            .rows_affected()
            .unwrap();
        assert_eq!(deleted, 1);
    }

    #[test]
    fn test_first_updater_wins_after_commit() {
        let client = client();
        let id = RecordId(3);
        let mut a = open(&client, IsolationLevel::RepeatableRead);
        let mut b = open(&client, IsolationLevel::RepeatableRead);
        value_of(&mut a, id);
        value_of(&mut b, id);

        a.execute(&Statement::UpdateValue { id, value: 1.0 }).unwrap();
        a.commit().unwrap();

        let err = b
            .execute(&Statement::UpdateValue { id, value: 2.0 })
            .unwrap_err();
        assert_eq!(err.kind, StoreErrorKind::SerializationConflict);

        // Transaction is now aborted until rollback
        let err = b.execute(&Statement::SelectValue { id }).unwrap_err();
        assert_eq!(err.kind, StoreErrorKind::ConstraintOrGeneric);
        b.rollback().unwrap();

        assert_eq!(client.store().committed(id).unwrap().value, 1.0);
    }

    #[test]
    fn test_first_committer_wins_when_both_write_before_commit() {
        let client = client();
        let id = RecordId(4);
        let mut a = open(&client, IsolationLevel::Serializable);
        let mut b = open(&client, IsolationLevel::Serializable);
        a.execute(&Statement::UpdateValue { id, value: 10.0 }).unwrap();
        b.execute(&Statement::UpdateValue { id, value: 20.0 }).unwrap();

        a.commit().unwrap();
        let err = b.commit().unwrap_err();
        assert!(err.is_serialization_conflict());
        assert!(!b.in_transaction());
        assert_eq!(client.store().committed(id).unwrap().value, 10.0);
    }

    #[test]
    fn test_read_committed_never_conflicts() {
        let client = client();
        let id = RecordId(5);
        let mut a = open(&client, IsolationLevel::ReadCommitted);
        let mut b = open(&client, IsolationLevel::ReadCommitted);
        a.execute(&Statement::UpdateValue { id, value: 10.0 }).unwrap();
        b.execute(&Statement::UpdateValue { id, value: 20.0 }).unwrap();
        a.commit().unwrap();
        b.commit().unwrap();
        assert_eq!(client.store().committed(id).unwrap().value, 20.0);
    }

    #[test]
    fn test_serializable_read_only_transaction_commits() {
        let client = client();
        let id = RecordId(6);
        let mut reader = open(&client, IsolationLevel::Serializable);
        value_of(&mut reader, id);
        committed_write(&client, id, 7.0);
        reader.commit().unwrap();
    }

    #[test]
    fn test_serializable_writer_with_stale_read_conflicts() {
        let client = client();
        let mut txn = open(&client, IsolationLevel::Serializable);
        value_of(&mut txn, RecordId(7));
        txn.execute(&Statement::UpdateValue {
            id: RecordId(8),
            value: 1.0,
        })
        .unwrap();

        committed_write(&client, RecordId(7), 99.0);

        assert!(txn.commit().unwrap_err().is_serialization_conflict());
        assert_ne!(client.store().committed(RecordId(8)).unwrap().value, 1.0);
    }

    #[test]
    fn test_rollback_discards_writes_and_reads_own_writes() {
        let client = client();
        let cutoff = NaiveDate::from_ymd_opt(2018, 1, 1).unwrap();
        let before = client.store().len();
        let mut txn = open(&client, IsolationLevel::ReadCommitted);
        let deleted = txn
            .execute(&Statement::DeleteOlderThan { cutoff })
            .unwrap()
            .rows_affected()
            .unwrap();
        assert!(deleted > 0);
        let remaining = txn
            .execute(&Statement::CountOlderThan { cutoff })
            .unwrap()
            .count()
            .unwrap();
        assert_eq!(remaining, 0);

        txn.rollback().unwrap();
        assert_eq!(client.store().len(), before);
    }

    #[test]
    fn test_isolation_change_refused_inside_transaction() {
        let client = client();
        let mut session = open(&client, IsolationLevel::ReadCommitted);
        session.execute(&Statement::CountAll).unwrap();
        let err = session
            .set_isolation(IsolationLevel::Serializable)
            .unwrap_err();
        assert_eq!(err.kind, StoreErrorKind::ConstraintOrGeneric);
        assert_eq!(session.isolation(), IsolationLevel::ReadCommitted);
    }

    #[test]
    fn test_offline_store_reports_connection_errors() {
        let client = client();
        let mut session = open(&client, IsolationLevel::ReadCommitted);
        session.execute(&Statement::CountAll).unwrap();

        client.store().set_offline(true);
        assert!(session.execute(&Statement::CountAll).unwrap_err().is_connection());
        assert!(!session.in_transaction());
        assert!(client.connect().err().unwrap().is_connection());

        client.store().set_offline(false);
        assert!(session.execute(&Statement::CountAll).is_ok());
    }

    #[test]
    fn test_closed_session_refuses_statements() {
        let client = client();
        let mut session = open(&client, IsolationLevel::ReadCommitted);
        session.close().unwrap();
        session.close().unwrap();
        assert!(session.execute(&Statement::CountAll).unwrap_err().is_connection());
    }

    #[test]
    fn test_aggregates_and_range() {
        let client = client();
        let mut session = open(&client, IsolationLevel::ReadCommitted);
        let range = session
            .execute(&Statement::ValueRange {
                postal_code: "51200.0".into(),
            })
            .unwrap();
        let row = &range.rows().unwrap()[0];
        let min = row.get(0).unwrap().as_f64().unwrap().unwrap();
        let max = row.get(1).unwrap().as_f64().unwrap().unwrap();
        assert!(min > 0.0 && min <= max);

        let missing = session
            .execute(&Statement::AveragePostalValue {
                postal_code: "00000".into(),
            })
            .unwrap();
        assert_eq!(missing.scalar_f64().unwrap(), Some(0.0));

        let no_group = session
            .execute(&Statement::AverageGroupValue {
                group_code: "99999".into(),
            })
            .unwrap();
        assert_eq!(no_group.scalar_f64().unwrap(), None);
    }
}
