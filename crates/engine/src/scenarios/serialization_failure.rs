//! Serialization failure
//!
//! ```text
//! updater-a                         updater-b
//! ─────────                         ─────────
//! BEGIN; name = group name          BEGIN; name = group name
//! ══════════════ barrier ══════════════
//! UPDATE ... WHERE name = <name>    sleep(stagger)
//! COMMIT                            UPDATE ... WHERE name = <name>
//!                                   -> serialization conflict
//! ```
//!
//! Exactly one updater may commit. Both committing means the store did not
//! enforce the level that was asked for, which is reported as a
//! configuration error rather than accepted.

use super::{absorb, settle};
use crate::orchestrator::Harness;
use crate::result::{Observed, ResultRecorder, ScenarioResult};
use crate::scenario::ScenarioSpec;
use crate::workers::Workers;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use txanomaly_concurrency::{BarrierParty, RendezvousBarrier, UnitReport, WorkUnit};
use txanomaly_core::{ErrorKind, HarnessError, IsolationLevel, Result, Statement};
use txanomaly_storage::StoreClient;

const UPDATER_A: &str = "updater-a";
const UPDATER_B: &str = "updater-b";

/// Name each updater tries to write
fn new_name(original: &str, tag: &str) -> String {
    format!("{}_{}_{}", original, tag, rand::random::<u8>() % 100)
}

pub(crate) fn run(
    harness: &Harness,
    spec: &ScenarioSpec,
    isolation: IsolationLevel,
    group_code: &str,
) -> Result<ScenarioResult> {
    let name = spec.name();
    let restore = harness.restore_manager();
    let original = restore
        .inspect(&Statement::SelectGroupName {
            group_code: group_code.to_string(),
        })?
        .scalar_text()?
        .ok_or_else(|| HarnessError::InvalidScenario(format!("group {} has no rows", group_code)))?;
    let baseline = restore.capture_group(&name, group_code)?;
    info!(
        scenario = %name,
        group = group_code,
        original = %original,
        rows = baseline.len(),
        "race prepared"
    );

    let settings = *harness.settings();
    let barrier = RendezvousBarrier::new(2, settings.barrier_timeout())?;
    let names = [new_name(&original, "TX1"), new_name(&original, "TX2")];

    let roles = [
        (UPDATER_A, Duration::ZERO),
        (UPDATER_B, settings.commit_stagger()),
    ];
    let mut workers = Workers::new();
    for (index, (role, stagger)) in roles.into_iter().enumerate() {
        let party = barrier.party(index)?;
        let client = Arc::clone(harness.client());
        let group = group_code.to_string();
        let target = names[index].clone();
        workers.spawn(role, move || {
            rename(client, role, isolation, party, stagger, group, target)
        })?;
    }

    let mut recorder = ResultRecorder::new(&name, spec.expected_anomaly());
    recorder.isolation(UPDATER_A, isolation);
    recorder.isolation(UPDATER_B, isolation);
    let joined = absorb(&mut recorder, workers.join(settings.join_timeout()));

    let committed = [joined.committed(0), joined.committed(1)];
    for (index, role) in [UPDATER_A, UPDATER_B].into_iter().enumerate() {
        recorder.value(role, "success", Observed::Flag(committed[index]));
        recorder.value(role, "newName", Observed::Text(names[index].clone()));
        if !committed[index] {
            let conflict = joined.failure(index) == Some(ErrorKind::SerializationConflict);
            recorder.value(role, "conflict", Observed::Flag(conflict));
        }
        if let Some(rows) = joined.value(index) {
            recorder.value(role, "rowsUpdated", Observed::Count(*rows));
        }
    }
    let observed = committed[0] != committed[1];

    if committed[0] && committed[1] {
        let err = HarnessError::Configuration(format!(
            "both updaters committed at {}; the store did not detect the write conflict",
            isolation
        ));
        warn!(scenario = %name, "{}", err);
        recorder.error("harness", &err);
    } else if let Some(winner) = committed.iter().position(|c| *c) {
        // The loser's write must not be visible
        match group_names(harness, group_code) {
            Ok(visible) => {
                recorder.value("harness", "finalNames", Observed::Text(visible.join(",")));
                if visible.iter().any(|n| n == &names[1 - winner]) {
                    let err = HarnessError::Configuration(format!(
                        "rolled-back rename to '{}' is visible",
                        names[1 - winner]
                    ));
                    recorder.error("harness", &err);
                }
            }
            Err(e) => recorder.error("harness", &e),
        }
    }

    let restored = settle(&mut recorder, joined.hung, || {
        restore.restore(&baseline).map(|_| ())
    });
    Ok(recorder.finish(observed, restored))
}

fn rename(
    client: Arc<dyn StoreClient>,
    role: &'static str,
    isolation: IsolationLevel,
    party: BarrierParty,
    stagger: Duration,
    group_code: String,
    new_name: String,
) -> UnitReport<u64> {
    WorkUnit::new(client, role, isolation).run(|scope| {
        let old_name = scope
            .execute(&Statement::SelectGroupName {
                group_code: group_code.clone(),
            })?
            .scalar_text()?
            .ok_or_else(|| HarnessError::InvalidScenario(format!("group {} has no rows", group_code)))?;
        scope.mark("read");
        scope.rendezvous(&party)?;
        if !stagger.is_zero() {
            scope.pause(stagger, "stagger");
        }
        let rows = scope
            .execute(&Statement::RenameGroup {
                group_code,
                old_name,
                new_name,
            })?
            .rows_affected()?;
        scope.mark("update");
        Ok(rows)
    })
}

fn group_names(harness: &Harness, group_code: &str) -> Result<Vec<String>> {
    let result = harness.restore_manager().inspect(&Statement::SelectGroupNames {
        group_code: group_code.to_string(),
    })?;
    let mut names: Vec<String> = Vec::new();
    for row in result.rows()? {
        if let Some(name) = row.get(1)?.as_text()? {
            if !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        }
    }
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::ScenarioVerdict;
    use txanomaly_core::HarnessSettings;
    use txanomaly_storage::{MemoryClient, MemoryStore};

    fn harness() -> (Arc<MemoryStore>, Harness) {
        let client = MemoryClient::seeded(120, 2019);
        let store = Arc::clone(client.store());
        let client: Arc<dyn StoreClient> = Arc::new(client);
        (store, Harness::new(client, HarnessSettings::fast()).unwrap())
    }

    fn success(result: &ScenarioResult, role: &str) -> bool {
        result.observation(role).unwrap().values["success"] == Observed::Flag(true)
    }

    #[test]
    fn test_exactly_one_updater_commits() {
        for level in [IsolationLevel::RepeatableRead, IsolationLevel::Serializable] {
            let (store, h) = harness();
            let before = store.committed_records();
            let result = h.run(&ScenarioSpec::serialization_failure(level)).unwrap();

            assert_eq!(result.verdict, ScenarioVerdict::Matched, "{}", level);
            assert!(success(&result, UPDATER_A));
            assert!(!success(&result, UPDATER_B));
            assert_eq!(
                result.observation(UPDATER_B).unwrap().outcome,
                "Failed(SerializationConflict)"
            );
            assert!(result.has_error(ErrorKind::SerializationConflict));
            let loser = &result.observation(UPDATER_B).unwrap().values;
            assert_eq!(loser["conflict"], Observed::Flag(true));
            assert!(!result.observation(UPDATER_A).unwrap().values.contains_key("conflict"));
            assert!(result.restored);
            assert_eq!(store.committed_records(), before);
        }
    }

    #[test]
    fn test_loser_write_is_not_visible() {
        let (_, h) = harness();
        let result = h
            .run(&ScenarioSpec::serialization_failure(IsolationLevel::RepeatableRead))
            .unwrap();
        let a_name = match &result.observation(UPDATER_A).unwrap().values["newName"] {
            Observed::Text(name) => name.clone(),
            other => panic!("unexpected name: {:?}", other),
        };
        assert_eq!(
            result.observation("harness").unwrap().values["finalNames"],
            Observed::Text(a_name)
        );
    }

    #[test]
    fn test_read_committed_is_rejected_up_front() {
        let (store, h) = harness();
        let version = store.current_ts();
        let err = h
            .run(&ScenarioSpec::serialization_failure(IsolationLevel::ReadCommitted))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidScenario);
        assert_eq!(store.current_ts(), version);
    }
}
