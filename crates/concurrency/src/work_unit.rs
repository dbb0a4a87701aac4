//! Work units
//!
//! A [`WorkUnit`] is one named, all-or-nothing sequence of statements bound to
//! a single [`TransactionContext`]. The closure passed to [`WorkUnit::run`]
//! receives a [`UnitScope`] to execute statements, wait on barriers and mark
//! phases. When the closure returns:
//!
//! - `Ok` → the transaction commits (`run`) or rolls back (`run_dry`)
//! - `Err` → the transaction rolls back and the error's kind is recorded
//!
//! Either way the session is closed before the report is returned. A panic in
//! the closure still rolls back and closes, through the context's `Drop`.

use crate::barrier::BarrierParty;
use crate::context::{ContextState, TransactionContext};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use txanomaly_core::{ErrorKind, ExecResult, IsolationLevel, Result, Statement};
use txanomaly_storage::StoreClient;

/// Terminal state of a work unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitOutcome {
    /// All statements committed
    Committed,
    /// Rolled back on purpose (dry run)
    RolledBack,
    /// Rolled back because of an error of this kind
    Failed(ErrorKind),
}

impl UnitOutcome {
    /// Whether the unit committed
    pub fn is_committed(&self) -> bool {
        matches!(self, UnitOutcome::Committed)
    }

    /// Error kind for a failed unit
    pub fn failure_kind(&self) -> Option<ErrorKind> {
        match self {
            UnitOutcome::Failed(kind) => Some(*kind),
            _ => None,
        }
    }
}

impl fmt::Display for UnitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitOutcome::Committed => write!(f, "Committed"),
            UnitOutcome::RolledBack => write!(f, "RolledBack"),
            UnitOutcome::Failed(kind) => write!(f, "Failed({})", kind),
        }
    }
}

/// Milliseconds since unit start at which a phase was reached
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseTiming {
    /// Phase label
    pub phase: String,
    /// Offset from unit start
    pub at_ms: u64,
}

/// Everything a finished unit reports
#[derive(Debug)]
pub struct UnitReport<T> {
    /// Role label
    pub role: String,
    /// Isolation level the unit ran at
    pub isolation: IsolationLevel,
    /// Terminal state
    pub outcome: UnitOutcome,
    /// Closure value, or the error that ended the unit
    pub result: Result<T>,
    /// Phase marks in the order they were reached
    pub timings: Vec<PhaseTiming>,
}

impl<T> UnitReport<T> {
    /// Whether the unit committed
    pub fn is_committed(&self) -> bool {
        self.outcome.is_committed()
    }

    /// Value produced by the closure, if the unit did not fail
    pub fn value(&self) -> Option<&T> {
        self.result.as_ref().ok()
    }
}

/// Handle given to a unit's closure
pub struct UnitScope {
    ctx: TransactionContext,
    started: Instant,
    timings: Vec<PhaseTiming>,
}

impl UnitScope {
    /// Role label
    pub fn role(&self) -> &str {
        self.ctx.role()
    }

    /// Isolation level of the unit's transaction
    pub fn isolation(&self) -> IsolationLevel {
        self.ctx.isolation()
    }

    /// Execute a statement in the unit's transaction.
    pub fn execute(&mut self, statement: &Statement) -> Result<ExecResult> {
        self.ctx.execute(statement)
    }

    /// Record that `phase` was reached now.
    pub fn mark(&mut self, phase: impl Into<String>) {
        let timing = PhaseTiming {
            phase: phase.into(),
            at_ms: self.started.elapsed().as_millis() as u64,
        };
        debug!(role = %self.ctx.role(), phase = %timing.phase, at_ms = timing.at_ms, "phase");
        self.timings.push(timing);
    }

    /// Wait on a barrier, marking the release as phase `barrier`.
    pub fn rendezvous(&mut self, party: &BarrierParty) -> Result<()> {
        debug!(role = %self.ctx.role(), party = party.index(), "waiting at barrier");
        let waited = party.wait()?;
        debug!(
            role = %self.ctx.role(),
            waited_ms = waited.waited.as_millis() as u64,
            leader = waited.is_leader,
            "barrier released"
        );
        self.mark("barrier");
        Ok(())
    }

    /// Sleep for `delay` (grace or stagger delay), then mark `phase`.
    pub fn pause(&mut self, delay: Duration, phase: &str) {
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        self.mark(phase);
    }
}

/// A named unit of transactional work
pub struct WorkUnit {
    client: Arc<dyn StoreClient>,
    role: String,
    isolation: IsolationLevel,
}

impl WorkUnit {
    /// Unit running as `role` at `isolation`
    pub fn new(
        client: Arc<dyn StoreClient>,
        role: impl Into<String>,
        isolation: IsolationLevel,
    ) -> Self {
        WorkUnit {
            client,
            role: role.into(),
            isolation,
        }
    }

    /// Role label
    pub fn role(&self) -> &str {
        &self.role
    }

    /// Run `f` in one transaction; commit on `Ok`, roll back on `Err`.
    pub fn run<T>(self, f: impl FnOnce(&mut UnitScope) -> Result<T>) -> UnitReport<T> {
        self.execute(f, false)
    }

    /// Run `f` in one transaction that is always rolled back.
    pub fn run_dry<T>(self, f: impl FnOnce(&mut UnitScope) -> Result<T>) -> UnitReport<T> {
        self.execute(f, true)
    }

    fn execute<T>(self, f: impl FnOnce(&mut UnitScope) -> Result<T>, dry: bool) -> UnitReport<T> {
        let started = Instant::now();
        let WorkUnit {
            client,
            role,
            isolation,
        } = self;

        let opened = TransactionContext::open(client.as_ref(), role.clone(), isolation)
            .and_then(|mut ctx| ctx.begin().map(|()| ctx));
        let ctx = match opened {
            Ok(ctx) => ctx,
            Err(e) => {
                warn!(role = %role, error = %e, "work unit could not start");
                return UnitReport {
                    role,
                    isolation,
                    outcome: UnitOutcome::Failed(e.kind()),
                    result: Err(e),
                    timings: Vec::new(),
                };
            }
        };

        let mut scope = UnitScope {
            ctx,
            started,
            timings: Vec::new(),
        };
        scope.mark("begin");
        info!(role = %role, isolation = %isolation, dry, "work unit started");

        let mut result = f(&mut scope);

        let status = result.as_ref().map(|_| ()).map_err(|e| e.kind());
        let outcome = match status {
            Ok(()) if dry => match scope.ctx.rollback() {
                Ok(()) => UnitOutcome::RolledBack,
                Err(e) => {
                    let kind = e.kind();
                    result = Err(e);
                    UnitOutcome::Failed(kind)
                }
            },
            Ok(()) => match scope.ctx.commit() {
                Ok(()) => UnitOutcome::Committed,
                Err(e) => {
                    let kind = e.kind();
                    result = Err(e);
                    UnitOutcome::Failed(kind)
                }
            },
            Err(kind) => {
                if scope.ctx.state() == ContextState::Active {
                    if let Err(rollback_err) = scope.ctx.rollback() {
                        debug!(role = %role, error = %rollback_err, "rollback after error failed");
                    }
                }
                UnitOutcome::Failed(kind)
            }
        };
        scope.mark("end");

        if let Err(e) = scope.ctx.close() {
            debug!(role = %role, error = %e, "close after unit failed");
        }

        match outcome {
            UnitOutcome::Failed(ErrorKind::SerializationConflict) => {
                info!(role = %role, isolation = %isolation, "work unit aborted by serialization conflict")
            }
            UnitOutcome::Failed(kind) => {
                warn!(role = %role, isolation = %isolation, kind = %kind, "work unit failed")
            }
            _ => info!(role = %role, isolation = %isolation, outcome = %outcome, "work unit finished"),
        }

        UnitReport {
            role,
            isolation,
            outcome,
            result,
            timings: scope.timings,
        }
    }
}

impl fmt::Debug for WorkUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkUnit")
            .field("role", &self.role)
            .field("isolation", &self.isolation)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use txanomaly_core::{HarnessError, RecordId};
    use txanomaly_storage::{MemoryClient, MemoryStore};

    fn setup() -> (Arc<MemoryStore>, Arc<dyn StoreClient>) {
        let client = MemoryClient::seeded(20, 9);
        let store = Arc::clone(client.store());
        (store, Arc::new(client))
    }

    #[test]
    fn test_run_commits_on_ok() {
        let (store, client) = setup();
        let report = WorkUnit::new(client, "writer", IsolationLevel::ReadCommitted).run(|scope| {
            scope
                .execute(&Statement::UpdateValue {
                    id: RecordId(1),
                    value: 5.0,
                })?
                .rows_affected()
                .map_err(Into::into)
        });
        assert_eq!(report.outcome, UnitOutcome::Committed);
        assert_eq!(*report.value().unwrap(), 1);
        assert_eq!(store.committed(RecordId(1)).unwrap().value, 5.0);
        let phases: Vec<&str> = report.timings.iter().map(|t| t.phase.as_str()).collect();
        assert_eq!(phases, vec!["begin", "end"]);
    }

    #[test]
    fn test_run_rolls_back_on_err() {
        let (store, client) = setup();
        let before = store.committed(RecordId(2)).unwrap();
        let report: UnitReport<()> =
            WorkUnit::new(client, "writer", IsolationLevel::ReadCommitted).run(|scope| {
                scope.execute(&Statement::UpdateValue {
                    id: RecordId(2),
                    value: 0.0,
                })?;
                Err(HarnessError::GuardViolation("value dropped to zero".into()))
            });
        assert_eq!(report.outcome, UnitOutcome::Failed(ErrorKind::GuardViolation));
        assert_eq!(store.committed(RecordId(2)).unwrap(), before);
    }

    #[test]
    fn test_run_dry_always_rolls_back() {
        let (store, client) = setup();
        let before = store.len();
        let report = WorkUnit::new(client, "archiver", IsolationLevel::ReadCommitted).run_dry(|scope| {
            let deleted = scope
                .execute(&Statement::DeleteOlderThan {
                    cutoff: NaiveDate::from_ymd_opt(2030, 1, 1).unwrap(),
                })?
                .rows_affected()?;
            Ok(deleted)
        });
        assert_eq!(report.outcome, UnitOutcome::RolledBack);
        assert_eq!(*report.value().unwrap(), before as u64);
        assert_eq!(store.len(), before);
    }

    #[test]
    fn test_unit_fails_cleanly_when_store_unreachable() {
        let (store, client) = setup();
        store.set_offline(true);
        let report: UnitReport<()> =
            WorkUnit::new(client, "reader", IsolationLevel::RepeatableRead).run(|_| Ok(()));
        assert_eq!(report.outcome, UnitOutcome::Failed(ErrorKind::Connection));
        assert!(report.timings.is_empty());
    }

    #[test]
    fn test_marks_are_ordered() {
        let (_, client) = setup();
        let report = WorkUnit::new(client, "reader", IsolationLevel::ReadCommitted).run(|scope| {
            scope.mark("first_read");
            scope.pause(Duration::from_millis(5), "grace");
            scope.mark("second_read");
            Ok(())
        });
        let at: Vec<u64> = report.timings.iter().map(|t| t.at_ms).collect();
        assert!(at.windows(2).all(|w| w[0] <= w[1]));
        assert!(report.timings.iter().any(|t| t.phase == "grace" && t.at_ms >= 5));
    }
}
