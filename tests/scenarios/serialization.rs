//! Concurrent renames of the same group.

use crate::common::{memory_harness, snapshot};
use txanomaly::{ErrorKind, IsolationLevel, Observed, ScenarioSpec, ScenarioVerdict};
use txanomaly_core::Statement;

fn committed(result: &txanomaly::ScenarioResult, role: &str) -> bool {
    result.observation(role).unwrap().values["success"] == Observed::Flag(true)
}

#[test]
fn test_exactly_one_updater_commits() {
    for level in [IsolationLevel::RepeatableRead, IsolationLevel::Serializable] {
        let (store, harness) = memory_harness();
        let before = snapshot(&store);

        let result = harness.run(&ScenarioSpec::serialization_failure(level)).unwrap();

        let a = committed(&result, "updater-a");
        let b = committed(&result, "updater-b");
        assert!(a != b, "{}: a={} b={}", level, a, b);
        assert_eq!(result.verdict, ScenarioVerdict::Matched);
        assert_eq!(
            result.errors.iter().filter(|e| e.kind == ErrorKind::SerializationConflict).count(),
            1
        );
        assert_eq!(snapshot(&store), before);
    }
}

#[test]
fn test_failed_side_write_is_never_visible() {
    let (store, harness) = memory_harness();
    let result = harness
        .run(&ScenarioSpec::serialization_failure(IsolationLevel::RepeatableRead))
        .unwrap();
    let loser = if committed(&result, "updater-a") {
        "updater-b"
    } else {
        "updater-a"
    };
    let lost_name = match &result.observation(loser).unwrap().values["newName"] {
        Observed::Text(name) => name.clone(),
        other => panic!("unexpected name: {:?}", other),
    };
    assert_eq!(
        result.observation(loser).unwrap().values["conflict"],
        Observed::Flag(true)
    );
    let visible = match &result.observation("harness").unwrap().values["finalNames"] {
        Observed::Text(names) => names.clone(),
        other => panic!("unexpected names: {:?}", other),
    };
    assert!(!visible.split(',').any(|n| n == lost_name));
    // After restoration no renamed row is left behind
    assert!(store
        .committed_records()
        .iter()
        .all(|r| !r.group_name.contains("_TX")));
}

#[test]
fn test_read_committed_race_is_rejected() {
    let (store, harness) = memory_harness();
    let version = store.current_ts();
    let err = harness
        .run(&ScenarioSpec::serialization_failure(IsolationLevel::ReadCommitted))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidScenario);
    assert_eq!(store.current_ts(), version);

    // Through run_all the rejection becomes a harness failure, not an anomaly
    let report =
        harness.run_all(&[ScenarioSpec::serialization_failure(IsolationLevel::ReadCommitted)]);
    let result = &report.results()[0];
    assert_eq!(result.verdict, ScenarioVerdict::HarnessFailure);
    assert!(!result.observed_anomaly);
    assert!(!report.all_passed());
}

#[test]
fn test_group_name_is_back_after_the_race() {
    let (_, harness) = memory_harness();
    let group = Statement::SelectGroupName {
        group_code: "01344".into(),
    };
    let restore = harness.restore_manager();
    let before = restore.inspect(&group).unwrap().scalar_text().unwrap();
    harness
        .run(&ScenarioSpec::serialization_failure(IsolationLevel::Serializable))
        .unwrap();
    let after = restore.inspect(&group).unwrap().scalar_text().unwrap();
    assert_eq!(before, after);
}
