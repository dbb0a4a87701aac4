//! Whole-suite runs through the facade.

use crate::common::{memory_harness, snapshot};
use txanomaly::{default_suite, HarnessBuilder, IsolationLevel, ScenarioSpec, ScenarioVerdict};

#[test]
fn test_anomaly_scenarios_back_to_back_leave_no_trace() {
    let (store, harness) = memory_harness();
    let before = snapshot(&store);
    let specs = [
        ScenarioSpec::non_repeatable_read(IsolationLevel::ReadCommitted),
        ScenarioSpec::phantom_read(IsolationLevel::ReadCommitted),
        ScenarioSpec::serialization_failure(IsolationLevel::RepeatableRead),
    ];

    let report = harness.run_all(&specs);

    assert!(report.all_passed(), "{}", report.render_table());
    assert_eq!(report.count(ScenarioVerdict::Matched), 3);
    assert!(report.results().iter().all(|r| r.observed_anomaly));
    // Direct re-query of every row, not just the ones the restorer captured
    assert_eq!(snapshot(&store), before);
}

#[test]
fn test_default_suite_passes_on_the_memory_store() {
    let (store, harness) = memory_harness();
    let before = snapshot(&store);
    let suite = default_suite(None);

    let report = harness.run_all(&suite);

    assert_eq!(report.results().len(), suite.len());
    assert!(report.skipped().is_empty());
    assert!(report.all_passed(), "{}", report.render_table());
    assert_eq!(snapshot(&store), before);
}

#[test]
fn test_pinned_suite_expectations_follow_the_level() {
    let (_, harness) = memory_harness();
    let report = harness.run_all(&default_suite(Some(IsolationLevel::Serializable)));
    assert!(report.all_passed(), "{}", report.render_table());
    // Under serializable only the update race shows an anomaly
    for result in report.results() {
        let race = result.scenario_name.starts_with("serialization-failure");
        assert_eq!(result.observed_anomaly, race, "{}", result.scenario_name);
    }
}

#[test]
fn test_report_json_shape() {
    let harness = HarnessBuilder::new().memory(200).fast().build().unwrap();
    let report = harness.run_all(&[ScenarioSpec::phantom_read(IsolationLevel::ReadCommitted)]);
    let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();

    let result = &json["results"][0];
    assert_eq!(result["scenarioName"], "phantom-read@read-committed");
    assert_eq!(result["observedAnomaly"], true);
    assert_eq!(result["expectedAnomaly"], true);
    assert_eq!(result["restored"], true);
    assert_eq!(result["verdict"], "matched");
    assert_eq!(result["isolationLevels"]["reader"], "read-committed");
    assert!(result["timingsMs"].as_object().unwrap().contains_key("reader.second_count"));
}
