//! Non-repeatable read
//!
//! ```text
//! reader (level under test)        writer (read-committed)
//! ─────────────────────────        ───────────────────────
//! BEGIN
//! first = value(id)
//! ══════════════ barrier ══════════════
//!                                  v = value(id)
//!                                  UPDATE value = v + delta
//! sleep(grace)                     COMMIT
//! second = value(id)
//! COMMIT
//! ```
//!
//! The anomaly is `first != second`.

use super::{absorb, read_value, settle};
use crate::orchestrator::Harness;
use crate::result::{Observed, ResultRecorder, ScenarioResult};
use crate::scenario::{RecordTarget, ScenarioSpec};
use crate::workers::Workers;
use rand::Rng;
use std::sync::Arc;
use tracing::debug;
use txanomaly_concurrency::{RendezvousBarrier, WorkUnit};
use txanomaly_core::{HarnessError, IsolationLevel, RecordId, Result, Statement};

const READER: &str = "reader";
const WRITER: &str = "writer";

enum Step {
    Read { first: f64, second: f64 },
    Wrote { before: f64, after: f64 },
}

pub(crate) fn run(
    harness: &Harness,
    spec: &ScenarioSpec,
    reader_isolation: IsolationLevel,
    target: RecordTarget,
    delta: f64,
) -> Result<ScenarioResult> {
    let name = spec.name();
    let id = resolve_target(harness, target)?;
    let baseline = harness.restore_manager().capture_records(&name, &[id])?;
    if baseline.is_empty() {
        return Err(HarnessError::InvalidScenario(format!("record {} not found", id)));
    }
    debug!(scenario = %name, id = %id, "target selected");

    let settings = *harness.settings();
    let barrier = RendezvousBarrier::new(2, settings.barrier_timeout())?;
    let reader_party = barrier.party(0)?;
    let writer_party = barrier.party(1)?;

    let mut workers = Workers::new();
    let client = Arc::clone(harness.client());
    workers.spawn(READER, move || {
        WorkUnit::new(client, READER, reader_isolation).run(|scope| {
            let first = read_value(scope, id)?;
            scope.mark("first_read");
            scope.rendezvous(&reader_party)?;
            scope.pause(settings.grace_delay(), "grace");
            let second = read_value(scope, id)?;
            scope.mark("second_read");
            Ok(Step::Read { first, second })
        })
    })?;
    let client = Arc::clone(harness.client());
    workers.spawn(WRITER, move || {
        WorkUnit::new(client, WRITER, IsolationLevel::ReadCommitted).run(|scope| {
            scope.rendezvous(&writer_party)?;
            let before = read_value(scope, id)?;
            let after = before + delta;
            scope.execute(&Statement::UpdateValue { id, value: after })?;
            scope.mark("update");
            Ok(Step::Wrote { before, after })
        })
    })?;

    let mut recorder = ResultRecorder::new(&name, spec.expected_anomaly());
    recorder.isolation(READER, reader_isolation);
    recorder.isolation(WRITER, IsolationLevel::ReadCommitted);
    let joined = absorb(&mut recorder, workers.join(settings.join_timeout()));

    let mut observed = false;
    if let Some(Step::Read { first, second }) = joined.value(0) {
        recorder.first(READER, Observed::Number(*first));
        recorder.second(READER, Observed::Number(*second));
        observed = first != second;
    }
    if let Some(Step::Wrote { before, after }) = joined.value(1) {
        recorder.first(WRITER, Observed::Number(*before));
        recorder.second(WRITER, Observed::Number(*after));
    }
    recorder.value(READER, "recordId", Observed::Count(id.as_i64().max(0) as u64));

    let restored = settle(&mut recorder, joined.hung, || {
        harness.restore_manager().restore(&baseline).map(|_| ())
    });
    Ok(recorder.finish(observed, restored))
}

fn resolve_target(harness: &Harness, target: RecordTarget) -> Result<RecordId> {
    match target {
        RecordTarget::Id(id) => Ok(id),
        RecordTarget::Random => {
            let restore = harness.restore_manager();
            let total = restore.inspect(&Statement::CountAll)?.count()?;
            if total == 0 {
                return Err(HarnessError::InvalidScenario(
                    "no records to pick a target from".into(),
                ));
            }
            let offset = rand::thread_rng().gen_range(0..total);
            restore
                .inspect(&Statement::SelectIdAt { offset })?
                .scalar_i64()?
                .map(RecordId)
                .ok_or_else(|| {
                    HarnessError::InvalidScenario(format!("no record at offset {}", offset))
                })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::ScenarioVerdict;
    use txanomaly_core::{ErrorKind, HarnessSettings};
    use txanomaly_storage::{MemoryClient, MemoryStore, StoreClient};

    fn harness() -> (Arc<MemoryStore>, Harness) {
        let client = MemoryClient::seeded(50, 7);
        let store = Arc::clone(client.store());
        let client: Arc<dyn StoreClient> = Arc::new(client);
        (store, Harness::new(client, HarnessSettings::fast()).unwrap())
    }

    fn spec(level: IsolationLevel, id: i64) -> ScenarioSpec {
        ScenarioSpec::NonRepeatableRead {
            reader_isolation: level,
            target: RecordTarget::Id(RecordId(id)),
            delta: 10_000.0,
        }
    }

    #[test]
    fn test_read_committed_sees_the_update() {
        let (store, h) = harness();
        let before = store.committed(RecordId(5)).unwrap();
        let result = h.run(&spec(IsolationLevel::ReadCommitted, 5)).unwrap();

        assert!(result.observed_anomaly);
        assert_eq!(result.verdict, ScenarioVerdict::Matched);
        let reader = result.observation(READER).unwrap();
        assert_eq!(reader.first, Some(Observed::Number(before.value)));
        assert_eq!(reader.second, Some(Observed::Number(before.value + 10_000.0)));
        assert!(result.restored);
        assert_eq!(store.committed(RecordId(5)).unwrap(), before);
    }

    #[test]
    fn test_snapshot_levels_repeat_the_read() {
        for level in [IsolationLevel::RepeatableRead, IsolationLevel::Serializable] {
            let (store, h) = harness();
            let before = store.committed(RecordId(3)).unwrap();
            let result = h.run(&spec(level, 3)).unwrap();

            assert!(!result.observed_anomaly, "{}", level);
            assert_eq!(result.verdict, ScenarioVerdict::Matched);
            let reader = result.observation(READER).unwrap();
            assert_eq!(reader.first, reader.second);
            assert_eq!(store.committed(RecordId(3)).unwrap(), before);
        }
    }

    #[test]
    fn test_random_target_is_restored() {
        let (store, h) = harness();
        let before = store.committed_records();
        let result = h
            .run(&ScenarioSpec::non_repeatable_read(IsolationLevel::ReadCommitted))
            .unwrap();
        assert!(result.passed());
        assert_eq!(store.committed_records(), before);
    }

    #[test]
    fn test_missing_target_is_rejected() {
        let (_, h) = harness();
        let err = h.run(&spec(IsolationLevel::ReadCommitted, 9_999)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidScenario);
    }

    #[test]
    fn test_timings_cover_both_roles() {
        let (_, h) = harness();
        let result = h.run(&spec(IsolationLevel::ReadCommitted, 1)).unwrap();
        for key in ["reader.first_read", "reader.barrier", "reader.grace", "reader.second_read", "writer.update"] {
            assert!(result.timings_ms.contains_key(key), "missing {}", key);
        }
        assert!(result.timings_ms["reader.grace"] >= result.timings_ms["reader.barrier"]);
    }
}
