//! Guarded archive dry run
//!
//! The archiver counts rows older than the cutoff, deletes them, and checks
//! inside the same transaction that none remain. The unit always rolls back,
//! so the count taken afterwards must equal the one taken before.

use super::{absorb, settle};
use crate::orchestrator::Harness;
use crate::result::{Observed, ResultRecorder, ScenarioResult};
use crate::scenario::ScenarioSpec;
use crate::workers::Workers;
use chrono::NaiveDate;
use std::sync::Arc;
use txanomaly_concurrency::WorkUnit;
use txanomaly_core::{HarnessError, IsolationLevel, Result, Statement};

const ARCHIVER: &str = "archiver";

struct Archived {
    counted: u64,
    deleted: u64,
    remaining: u64,
}

pub(crate) fn run(
    harness: &Harness,
    spec: &ScenarioSpec,
    cutoff: NaiveDate,
) -> Result<ScenarioResult> {
    let name = spec.name();
    let restore = harness.restore_manager();
    let count = Statement::CountOlderThan { cutoff };
    let pre_count = restore.inspect(&count)?.count()?;

    let settings = *harness.settings();
    let mut workers = Workers::new();
    let client = Arc::clone(harness.client());
    workers.spawn(ARCHIVER, move || {
        WorkUnit::new(client, ARCHIVER, IsolationLevel::ReadCommitted).run_dry(|scope| {
            let counted = scope.execute(&Statement::CountOlderThan { cutoff })?.count()?;
            scope.mark("count");
            let deleted = scope
                .execute(&Statement::DeleteOlderThan { cutoff })?
                .rows_affected()?;
            scope.mark("delete");
            let remaining = scope.execute(&Statement::CountOlderThan { cutoff })?.count()?;
            scope.mark("verify");
            if remaining != 0 {
                return Err(HarnessError::GuardViolation(format!(
                    "{} rows older than {} remain after the delete",
                    remaining, cutoff
                )));
            }
            Ok(Archived {
                counted,
                deleted,
                remaining,
            })
        })
    })?;

    let mut recorder = ResultRecorder::new(&name, spec.expected_anomaly());
    recorder.isolation(ARCHIVER, IsolationLevel::ReadCommitted);
    let joined = absorb(&mut recorder, workers.join(settings.join_timeout()));
    recorder.first(ARCHIVER, Observed::Count(pre_count));
    if let Some(archived) = joined.value(0) {
        recorder.value(ARCHIVER, "counted", Observed::Count(archived.counted));
        recorder.value(ARCHIVER, "deleted", Observed::Count(archived.deleted));
        recorder.value(ARCHIVER, "remainingInTransaction", Observed::Count(archived.remaining));
    }

    let mut post_count = None;
    let restored = settle(&mut recorder, joined.hung, || {
        let actual = restore.inspect(&count)?.count()?;
        post_count = Some(actual);
        restore.verify_count(&name, &count, pre_count).map(|_| ())
    });
    let observed = match post_count {
        Some(actual) => {
            recorder.second(ARCHIVER, Observed::Count(actual));
            actual != pre_count
        }
        None => false,
    };
    Ok(recorder.finish(observed, restored))
}
