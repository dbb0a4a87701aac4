//! Phantom read
//!
//! ```text
//! reader (level under test)        inserter (read-committed)
//! ─────────────────────────        ─────────────────────────
//! BEGIN
//! count_1 = COUNT(predicate)
//! ══════════════ barrier ══════════════
//!                                  AVG(value) of the group
//!                                  INSERT sale matching the predicate
//! sleep(grace)                     COMMIT
//! count_2 = COUNT(predicate)
//! COMMIT
//! ```
//!
//! The inserted row carries a per-run marker in `mutation_ref`; cleanup
//! deletes by that marker rather than trusting any rollback.

use super::{absorb, settle};
use crate::orchestrator::Harness;
use crate::result::{Observed, ResultRecorder, ScenarioResult};
use crate::scenario::ScenarioSpec;
use crate::workers::Workers;
use chrono::NaiveDate;
use std::sync::Arc;
use tracing::debug;
use txanomaly_concurrency::{RendezvousBarrier, WorkUnit};
use txanomaly_core::statement::row_to_record;
use txanomaly_core::{HarnessError, IsolationLevel, NewRecord, RecordId, Result, Statement};
use uuid::Uuid;

const READER: &str = "reader";
const INSERTER: &str = "inserter";

enum Step {
    Counted { first: u64, second: u64 },
    Inserted { id: RecordId, group_average: Option<f64> },
}

pub(crate) fn run(
    harness: &Harness,
    spec: &ScenarioSpec,
    reader_isolation: IsolationLevel,
    group_code: &str,
    min_value: f64,
) -> Result<ScenarioResult> {
    let name = spec.name();
    let restore = harness.restore_manager();
    let marker = format!("PHANTOM-{}", Uuid::new_v4());
    let predicate = Statement::CountQualifying {
        group_code: group_code.to_string(),
        min_value,
    };
    let pre_count = restore.inspect(&predicate)?.count()?;
    let sale = sale_for(harness, group_code, min_value, &marker)?;
    debug!(scenario = %name, marker = %marker, pre_count, "phantom prepared");

    let settings = *harness.settings();
    let barrier = RendezvousBarrier::new(2, settings.barrier_timeout())?;
    let reader_party = barrier.party(0)?;
    let inserter_party = barrier.party(1)?;

    let mut workers = Workers::new();
    let client = Arc::clone(harness.client());
    let reader_predicate = predicate.clone();
    workers.spawn(READER, move || {
        WorkUnit::new(client, READER, reader_isolation).run(|scope| {
            let first = scope.execute(&reader_predicate)?.count()?;
            scope.mark("first_count");
            scope.rendezvous(&reader_party)?;
            scope.pause(settings.grace_delay(), "grace");
            let second = scope.execute(&reader_predicate)?.count()?;
            scope.mark("second_count");
            Ok(Step::Counted { first, second })
        })
    })?;
    let client = Arc::clone(harness.client());
    let group = group_code.to_string();
    workers.spawn(INSERTER, move || {
        WorkUnit::new(client, INSERTER, IsolationLevel::ReadCommitted).run(|scope| {
            scope.rendezvous(&inserter_party)?;
            let group_average = scope
                .execute(&Statement::AverageGroupValue { group_code: group })?
                .scalar_f64()?;
            scope.mark("average");
            let id = scope
                .execute(&Statement::InsertRecord(sale))?
                .scalar_i64()?
                .map(RecordId)
                .ok_or_else(|| HarnessError::InvalidState {
                    expected: "inserted id".into(),
                    actual: "no row returned".into(),
                })?;
            scope.mark("insert");
            Ok(Step::Inserted { id, group_average })
        })
    })?;

    let mut recorder = ResultRecorder::new(&name, spec.expected_anomaly());
    recorder.isolation(READER, reader_isolation);
    recorder.isolation(INSERTER, IsolationLevel::ReadCommitted);
    let joined = absorb(&mut recorder, workers.join(settings.join_timeout()));

    let mut observed = false;
    if let Some(Step::Counted { first, second }) = joined.value(0) {
        recorder.first(READER, Observed::Count(*first));
        recorder.second(READER, Observed::Count(*second));
        observed = first != second;
    }
    if let Some(Step::Inserted { id, group_average }) = joined.value(1) {
        recorder.value(INSERTER, "insertedId", Observed::Count(id.as_i64().max(0) as u64));
        if let Some(avg) = group_average {
            recorder.value(INSERTER, "groupAverage", Observed::Number(*avg));
        }
    }
    recorder.value(READER, "baselineCount", Observed::Count(pre_count));

    let restored = settle(&mut recorder, joined.hung, || {
        restore.remove_marked(&name, &marker)?;
        restore.verify_count(&name, &predicate, pre_count)?;
        Ok(())
    });
    Ok(recorder.finish(observed, restored))
}

/// The sale the inserter registers: a copy of the group's first row, moved
/// to the predicate boundary and tagged with the run marker.
fn sale_for(harness: &Harness, group_code: &str, min_value: f64, marker: &str) -> Result<NewRecord> {
    let restore = harness.restore_manager();
    let first_id = restore
        .inspect(&Statement::SelectGroupNames {
            group_code: group_code.to_string(),
        })?
        .scalar_i64()?
        .ok_or_else(|| HarnessError::InvalidScenario(format!("group {} has no rows", group_code)))?;
    let result = restore.inspect(&Statement::SelectRecord {
        id: RecordId(first_id),
    })?;
    let row = result.rows()?.first().ok_or_else(|| {
        HarnessError::InvalidScenario(format!("record {} vanished", first_id))
    })?;
    let template = row_to_record(row)?;
    let date = NaiveDate::from_ymd_opt(2024, 1, 1)
        .ok_or_else(|| HarnessError::Configuration("invalid sale date".into()))?;
    Ok(NewRecord {
        mutation_ref: marker.to_string(),
        date,
        value: min_value,
        group_code: group_code.to_string(),
        group_name: template.group_name,
        postal_code: template.postal_code,
        property_kind: "Maison".to_string(),
    })
}
