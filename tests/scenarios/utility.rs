//! Bulk adjustment round trip and guarded archive dry runs.

use crate::common::{memory_harness, snapshot};
use chrono::NaiveDate;
use txanomaly::{default_archive_cutoffs, Observed, ScenarioSpec, ScenarioVerdict};

fn number(value: &Option<Observed>) -> f64 {
    value.as_ref().and_then(Observed::as_f64).expect("numeric observation")
}

#[test]
fn test_bulk_adjustment_round_trip_keeps_the_mean() {
    let (store, harness) = memory_harness();
    let before = snapshot(&store);

    let result = harness.run(&ScenarioSpec::bulk_adjustment()).unwrap();

    let adjuster = result.observation("adjuster").unwrap();
    let reverter = result.observation("reverter").unwrap();
    let initial = number(&adjuster.first);
    let restored = number(&reverter.second);
    assert!((restored - initial).abs() / initial <= txanomaly_engine::ROUND_TRIP_TOLERANCE);
    assert!(!result.observed_anomaly);
    assert_eq!(result.verdict, ScenarioVerdict::Matched);
    assert_eq!(snapshot(&store), before);
}

#[test]
fn test_bulk_adjustment_factors() {
    for percentage in [0.5, 5.0, 25.0, -50.0] {
        let (store, harness) = memory_harness();
        let before = snapshot(&store);
        let spec = ScenarioSpec::BulkAdjustment {
            postal_code: "51200.0".into(),
            percentage,
        };
        let result = harness.run(&spec).unwrap();
        assert!(result.passed(), "{}%: {:?}", percentage, result.errors);
        assert_eq!(snapshot(&store), before);
    }
}

#[test]
fn test_bulk_adjustment_rejects_a_zero_factor() {
    let (_, harness) = memory_harness();
    let spec = ScenarioSpec::BulkAdjustment {
        postal_code: "51200.0".into(),
        percentage: -100.0,
    };
    assert!(harness.run(&spec).is_err());
}

#[test]
fn test_guarded_archive_counts_survive_the_dry_run() {
    let mut cutoffs = default_archive_cutoffs();
    // Matches no row at all
    cutoffs.push(NaiveDate::from_ymd_opt(1990, 1, 1).unwrap());
    // Matches every row
    cutoffs.push(NaiveDate::from_ymd_opt(2100, 1, 1).unwrap());

    let (store, harness) = memory_harness();
    let before = snapshot(&store);
    for cutoff in cutoffs {
        let result = harness.run(&ScenarioSpec::guarded_archive(cutoff)).unwrap();
        let archiver = result.observation("archiver").unwrap();
        assert_eq!(archiver.first, archiver.second, "{}", cutoff);
        assert_eq!(archiver.outcome, "RolledBack");
        assert_eq!(result.verdict, ScenarioVerdict::Matched);
    }
    assert_eq!(snapshot(&store), before);
}
