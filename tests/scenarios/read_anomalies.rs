//! Non-repeatable and phantom reads across isolation levels.

use crate::common::{memory_harness, snapshot};
use txanomaly::{IsolationLevel, Observed, RecordTarget, ScenarioSpec, ScenarioVerdict};
use txanomaly_core::RecordId;

fn reads(result: &txanomaly::ScenarioResult) -> (Observed, Observed) {
    let reader = result.observation("reader").expect("reader observation");
    (
        reader.first.clone().expect("first read"),
        reader.second.clone().expect("second read"),
    )
}

#[test]
fn test_non_repeatable_read_at_read_committed() {
    let (store, harness) = memory_harness();
    let spec = ScenarioSpec::NonRepeatableRead {
        reader_isolation: IsolationLevel::ReadCommitted,
        target: RecordTarget::Id(RecordId(7)),
        delta: 10_000.0,
    };
    let before = store.committed(RecordId(7)).expect("seeded row");

    let result = harness.run(&spec).unwrap();
    let (first, second) = reads(&result);

    assert_eq!(first, Observed::Number(before.value));
    assert_eq!(second, Observed::Number(before.value + 10_000.0));
    assert!(result.observed_anomaly);
    assert_eq!(result.verdict, ScenarioVerdict::Matched);
    assert_eq!(store.committed(RecordId(7)), Some(before));
}

#[test]
fn test_non_repeatable_read_hidden_by_snapshot_levels() {
    for level in [IsolationLevel::RepeatableRead, IsolationLevel::Serializable] {
        let (store, harness) = memory_harness();
        let before = snapshot(&store);

        let result = harness.run(&ScenarioSpec::non_repeatable_read(level)).unwrap();
        let (first, second) = reads(&result);

        assert_eq!(first, second, "{}", level);
        assert!(!result.observed_anomaly);
        assert!(result.passed());
        // The writer did commit before restoration
        let writer = result.observation("writer").unwrap();
        assert_eq!(writer.outcome, "Committed");
        assert_eq!(snapshot(&store), before);
    }
}

#[test]
fn test_phantom_read_at_read_committed() {
    let (store, harness) = memory_harness();
    let before = snapshot(&store);

    let result = harness
        .run(&ScenarioSpec::phantom_read(IsolationLevel::ReadCommitted))
        .unwrap();
    match reads(&result) {
        (Observed::Count(first), Observed::Count(second)) => assert_eq!(second, first + 1),
        other => panic!("unexpected counts: {:?}", other),
    }
    assert_eq!(result.verdict, ScenarioVerdict::Matched);
    assert_eq!(snapshot(&store), before);
}

#[test]
fn test_phantom_read_hidden_by_snapshot_levels() {
    for level in [IsolationLevel::RepeatableRead, IsolationLevel::Serializable] {
        let (store, harness) = memory_harness();
        let rows = store.len();

        let result = harness.run(&ScenarioSpec::phantom_read(level)).unwrap();
        let (first, second) = reads(&result);

        assert_eq!(first, second, "{}", level);
        assert!(result.passed());
        assert_eq!(store.len(), rows);
    }
}

#[test]
fn test_isolation_levels_are_reported_per_role() {
    let (_, harness) = memory_harness();
    let result = harness
        .run(&ScenarioSpec::phantom_read(IsolationLevel::RepeatableRead))
        .unwrap();
    assert_eq!(
        result.isolation_levels.get("reader"),
        Some(&IsolationLevel::RepeatableRead)
    );
    assert_eq!(
        result.isolation_levels.get("inserter"),
        Some(&IsolationLevel::ReadCommitted)
    );
}
