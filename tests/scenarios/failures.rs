//! Harness failures: lost connections, unreachable stores, and restorations
//! that do not take.

use crate::common::{harness_over, memory_harness_with, snapshot, ROWS, SEED};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use txanomaly::{
    ErrorKind, HarnessSettings, IsolationLevel, ScenarioSpec, ScenarioVerdict, StoreClient,
};
use txanomaly_core::{ExecResult, RecordId, Statement, StoreError, StoreResult};
use txanomaly_storage::{MemoryClient, Session};

// ============================================================================
// Lost connection
// ============================================================================

#[test]
fn test_connection_loss_mid_run_is_a_harness_failure() {
    let settings = HarnessSettings {
        grace_delay_ms: 300,
        ..HarnessSettings::fast()
    };
    let (store, harness) = memory_harness_with(ROWS, settings);

    // The reader is inside its grace pause when the store goes away
    let cutter = {
        let store = Arc::clone(&store);
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            store.set_offline(true);
        })
    };
    let result = harness
        .run(&ScenarioSpec::non_repeatable_read(IsolationLevel::ReadCommitted))
        .unwrap();
    cutter.join().unwrap();
    store.set_offline(false);

    assert_eq!(result.verdict, ScenarioVerdict::HarnessFailure);
    assert!(result.has_error(ErrorKind::Connection));
    assert!(!result.observed_anomaly);
    let reader = result.observation("reader").unwrap();
    assert_eq!(reader.outcome, "Failed(Connection)");
    assert!(reader.second.is_none());
    // Restoration ran against the offline store and could not take
    assert!(!result.restored);
    assert!(result.is_fatal());
}

#[test]
fn test_unreachable_store_rejects_every_scenario() {
    let (store, harness) = memory_harness_with(ROWS, HarnessSettings::fast());
    store.set_offline(true);

    let report = harness.run_all(&[
        ScenarioSpec::phantom_read(IsolationLevel::ReadCommitted),
        ScenarioSpec::bulk_adjustment(),
    ]);
    // Nothing could be written, so nothing needed restoring and the run
    // carries on to the next scenario
    assert_eq!(report.results().len(), 2);
    assert!(report.skipped().is_empty());
    for result in report.results() {
        assert_eq!(result.verdict, ScenarioVerdict::HarnessFailure);
        assert!(result.restored);
    }
    assert!(!report.all_passed());
}

// ============================================================================
// Restore mismatch
// ============================================================================

/// Client whose sessions silently drop record renames, so a restoration
/// never brings the original names back.
struct ForgetfulClient {
    inner: MemoryClient,
}

struct ForgetfulSession {
    inner: Box<dyn Session>,
}

impl StoreClient for ForgetfulClient {
    fn connect(&self) -> StoreResult<Box<dyn Session>> {
        Ok(Box::new(ForgetfulSession {
            inner: self.inner.connect()?,
        }))
    }

    fn describe(&self) -> String {
        format!("forgetful {}", self.inner.describe())
    }
}

impl Session for ForgetfulSession {
    fn set_isolation(&mut self, level: IsolationLevel) -> StoreResult<()> {
        self.inner.set_isolation(level)
    }

    fn isolation(&self) -> IsolationLevel {
        self.inner.isolation()
    }

    fn set_autocommit(&mut self, autocommit: bool) -> StoreResult<()> {
        self.inner.set_autocommit(autocommit)
    }

    fn begin(&mut self) -> StoreResult<()> {
        self.inner.begin()
    }

    fn execute(&mut self, statement: &Statement) -> StoreResult<ExecResult> {
        match statement {
            Statement::SetRecordName { .. } => Ok(ExecResult::RowsAffected(1)),
            other => self.inner.execute(other),
        }
    }

    fn commit(&mut self) -> StoreResult<()> {
        self.inner.commit()
    }

    fn rollback(&mut self) -> StoreResult<()> {
        self.inner.rollback()
    }

    fn close(&mut self) -> StoreResult<()> {
        self.inner.close()
    }

    fn in_transaction(&self) -> bool {
        self.inner.in_transaction()
    }
}

#[test]
fn test_restore_mismatch_stops_the_run() {
    let harness = harness_over(Arc::new(ForgetfulClient {
        inner: MemoryClient::seeded(ROWS, SEED),
    }));
    let specs = [
        ScenarioSpec::serialization_failure(IsolationLevel::RepeatableRead),
        ScenarioSpec::phantom_read(IsolationLevel::ReadCommitted),
        ScenarioSpec::bulk_adjustment(),
    ];

    let report = harness.run_all(&specs);

    assert_eq!(report.results().len(), 1);
    let result = &report.results()[0];
    assert!(!result.restored);
    assert!(result.has_error(ErrorKind::RestoreMismatch));
    assert_eq!(result.verdict, ScenarioVerdict::HarnessFailure);
    assert!(result.is_fatal());
    assert_eq!(report.skipped(), &[specs[1].name(), specs[2].name()][..]);
    assert!(report.render_table().contains("2 skipped"));
}

// ============================================================================
// Cancellation
// ============================================================================

/// Client that refuses exactly one connection attempt, counted from 1.
struct RefusingClient {
    inner: MemoryClient,
    refuse: usize,
    attempts: AtomicUsize,
}

impl StoreClient for RefusingClient {
    fn connect(&self) -> StoreResult<Box<dyn Session>> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt == self.refuse {
            return Err(StoreError::connection(format!("connection {} refused", attempt)));
        }
        self.inner.connect()
    }

    fn describe(&self) -> String {
        format!("refusing {}", self.inner.describe())
    }
}

#[test]
fn test_unit_failing_before_rendezvous_releases_its_peer() {
    // Connection 1 captures the baseline; 2 and 3 belong to the two roles
    for refuse in [2, 3] {
        let inner = MemoryClient::seeded(ROWS, SEED);
        let store = Arc::clone(inner.store());
        let before = snapshot(&store);
        let harness = harness_over(Arc::new(RefusingClient {
            inner,
            refuse,
            attempts: AtomicUsize::new(0),
        }));
        let spec = ScenarioSpec::NonRepeatableRead {
            reader_isolation: IsolationLevel::ReadCommitted,
            target: txanomaly::RecordTarget::Id(RecordId(3)),
            delta: 10_000.0,
        };

        let started = Instant::now();
        let result = harness.run(&spec).unwrap();
        let elapsed = started.elapsed();

        assert_eq!(result.verdict, ScenarioVerdict::HarnessFailure);
        let refused: Vec<&str> = result
            .errors
            .iter()
            .filter(|e| e.kind == ErrorKind::Connection)
            .map(|e| e.role.as_str())
            .collect();
        let released: Vec<&str> = result
            .errors
            .iter()
            .filter(|e| e.kind == ErrorKind::BarrierTimeout)
            .map(|e| e.role.as_str())
            .collect();
        assert_eq!(refused.len(), 1, "{:?}", result.errors);
        assert_eq!(released.len(), 1, "{:?}", result.errors);
        assert_ne!(refused[0], released[0]);
        // The surviving role is released by the abandoned barrier, not by its deadline
        assert!(elapsed < harness.settings().barrier_timeout() / 2, "{:?}", elapsed);
        assert!(result.restored);
        assert!(!result.observed_anomaly);
        assert_eq!(snapshot(&store), before);
    }
}

#[test]
fn test_hung_worker_skips_restore_and_stops_the_run() {
    let settings = HarnessSettings {
        barrier_timeout_ms: 100,
        grace_delay_ms: 800,
        commit_stagger_ms: 50,
        join_timeout_ms: 300,
    };
    let (_, harness) = memory_harness_with(ROWS, settings);
    let specs = [
        ScenarioSpec::non_repeatable_read(IsolationLevel::ReadCommitted),
        ScenarioSpec::bulk_adjustment(),
    ];

    let report = harness.run_all(&specs);

    assert_eq!(report.results().len(), 1);
    let result = &report.results()[0];
    assert_eq!(result.verdict, ScenarioVerdict::HarnessFailure);
    assert!(result
        .errors
        .iter()
        .any(|e| e.kind == ErrorKind::WorkerHung && e.role == "reader"));
    assert!(result.has_error(ErrorKind::RestoreMismatch));
    assert!(!result.restored);
    assert!(result.is_fatal());
    assert_eq!(report.skipped(), &[specs[1].name()][..]);
    assert!(!report.all_passed());
}
