//! Scenario runners
//!
//! Each runner follows the same shape: capture a baseline, spawn one work
//! unit per role, join them, restore, then fold everything into a result.
//! Helpers shared by the runners live here.

pub(crate) mod bulk_adjustment;
pub(crate) mod guarded_archive;
pub(crate) mod non_repeatable_read;
pub(crate) mod phantom_read;
pub(crate) mod serialization_failure;

use crate::result::ResultRecorder;
use crate::workers::WorkerExit;
use txanomaly_concurrency::{UnitReport, UnitScope};
use txanomaly_core::{ErrorKind, HarnessError, RecordId, Result, Statement};

/// Reports of the joined workers, in spawn order
pub(crate) struct Joined<T> {
    pub(crate) reports: Vec<Option<UnitReport<T>>>,
    /// Whether some worker never reached a terminal state
    pub(crate) hung: bool,
}

impl<T> Joined<T> {
    /// Value produced by the worker at `index`, if it finished without error
    pub(crate) fn value(&self, index: usize) -> Option<&T> {
        self.reports.get(index)?.as_ref()?.value()
    }

    /// Whether the worker at `index` committed
    pub(crate) fn committed(&self, index: usize) -> bool {
        self.reports
            .get(index)
            .and_then(Option::as_ref)
            .map(UnitReport::is_committed)
            .unwrap_or(false)
    }

    /// Failure kind of the worker at `index`
    pub(crate) fn failure(&self, index: usize) -> Option<ErrorKind> {
        self.reports
            .get(index)
            .and_then(Option::as_ref)
            .and_then(|r| r.outcome.failure_kind())
    }
}

/// Fold worker exits into `recorder`.
pub(crate) fn absorb<T>(recorder: &mut ResultRecorder, exits: Vec<(String, WorkerExit<T>)>) -> Joined<T> {
    let mut hung = false;
    let reports = exits
        .into_iter()
        .map(|(role, exit)| match exit {
            WorkerExit::Finished(report) => {
                recorder.absorb(&report);
                Some(report)
            }
            WorkerExit::Lost(err) => {
                hung |= err.kind() == ErrorKind::WorkerHung;
                recorder.error(&role, &err);
                None
            }
        })
        .collect();
    Joined { reports, hung }
}

/// Run a restoration step unless a worker is still running.
///
/// Returns whether the store is known to be back at its baseline.
pub(crate) fn settle(
    recorder: &mut ResultRecorder,
    hung: bool,
    restore: impl FnOnce() -> Result<()>,
) -> bool {
    if hung {
        let err = HarnessError::RestoreMismatch {
            scenario: recorder.scenario_name().to_string(),
            detail: "restore skipped: a worker is still running".into(),
        };
        recorder.error("restore", &err);
        return false;
    }
    match restore() {
        Ok(()) => true,
        Err(e) => {
            recorder.error("restore", &e);
            false
        }
    }
}

/// Read one record's value inside a unit.
pub(crate) fn read_value(scope: &mut UnitScope, id: RecordId) -> Result<f64> {
    scope
        .execute(&Statement::SelectValue { id })?
        .scalar_f64()?
        .ok_or_else(|| HarnessError::InvalidScenario(format!("record {} not found", id)))
}

/// Relative difference of `after` from `before`; zero when both are zero.
pub(crate) fn relative_drift(before: f64, after: f64) -> f64 {
    if before == 0.0 {
        if after == 0.0 {
            0.0
        } else {
            f64::INFINITY
        }
    } else {
        ((after - before) / before).abs()
    }
}
