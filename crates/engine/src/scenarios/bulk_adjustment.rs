//! Bulk adjustment round trip
//!
//! One unit scales every positive value of a postal code by `f`, a second
//! scales them back by `1/f`. Each unit checks inside its own transaction
//! that no value of the postal code is non-positive afterwards and rolls
//! back with `GuardViolation` if one is. The round trip must bring the mean
//! back within 0.1 %; the exact values are then rewritten from the baseline.

use super::{absorb, relative_drift, settle};
use crate::orchestrator::Harness;
use crate::result::{Observed, ResultRecorder, ScenarioResult};
use crate::scenario::ScenarioSpec;
use crate::workers::Workers;
use std::sync::Arc;
use tracing::{debug, info};
use txanomaly_concurrency::{UnitReport, WorkUnit};
use txanomaly_core::{HarnessError, IsolationLevel, Result, Statement};
use txanomaly_storage::StoreClient;

/// Largest relative change of the mean a round trip may leave behind
pub const ROUND_TRIP_TOLERANCE: f64 = 0.001;

const ADJUSTER: &str = "adjuster";
const REVERTER: &str = "reverter";

pub(crate) fn run(
    harness: &Harness,
    spec: &ScenarioSpec,
    postal_code: &str,
    factor: f64,
) -> Result<ScenarioResult> {
    let name = spec.name();
    let restore = harness.restore_manager();
    let baseline = restore.capture_postal(&name, postal_code)?;
    if baseline.is_empty() {
        return Err(HarnessError::InvalidScenario(format!(
            "no records with postal code {}",
            postal_code
        )));
    }
    let mean = Statement::AveragePostalValue {
        postal_code: postal_code.to_string(),
    };
    let measure = || -> Result<f64> { Ok(restore.inspect(&mean)?.scalar_f64()?.unwrap_or(0.0)) };
    let initial = measure()?;
    info!(
        scenario = %name,
        rows = baseline.len(),
        factor,
        initial_mean = initial,
        "adjustment prepared"
    );

    let settings = *harness.settings();
    let mut recorder = ResultRecorder::new(&name, spec.expected_anomaly());
    recorder.isolation(ADJUSTER, IsolationLevel::ReadCommitted);
    recorder.first(ADJUSTER, Observed::Number(initial));

    let mut hung = false;
    let mut means = vec![initial];
    for (role, step) in [(ADJUSTER, factor), (REVERTER, 1.0 / factor)] {
        let mut workers = Workers::new();
        let client = Arc::clone(harness.client());
        let postal = postal_code.to_string();
        workers.spawn(role, move || scale(client, role, postal, step))?;
        let joined = absorb(&mut recorder, workers.join(settings.join_timeout()));
        hung |= joined.hung;
        if let Some(rows) = joined.value(0) {
            recorder.value(role, "rowsAffected", Observed::Count(*rows));
        }
        if !joined.committed(0) {
            break;
        }
        match measure() {
            Ok(value) => {
                recorder.second(role, Observed::Number(value));
                means.push(value);
            }
            Err(e) => {
                recorder.error(role, &e);
                break;
            }
        }
    }
    if let Some(adjusted) = means.get(1) {
        recorder.first(REVERTER, Observed::Number(*adjusted));
    }

    let mut observed = false;
    if let [initial, _, restored_mean] = means[..] {
        let drift = relative_drift(initial, restored_mean);
        debug!(scenario = %name, drift, "round trip measured");
        recorder.value(REVERTER, "meanDrift", Observed::Number(drift));
        observed = drift > ROUND_TRIP_TOLERANCE;
    }

    let restored = settle(&mut recorder, hung, || {
        restore.restore(&baseline).map(|_| ())
    });
    Ok(recorder.finish(observed, restored))
}

/// Scale every positive value of `postal_code` by `factor` in one
/// transaction, refusing to commit a non-positive value.
fn scale(
    client: Arc<dyn StoreClient>,
    role: &'static str,
    postal_code: String,
    factor: f64,
) -> UnitReport<u64> {
    WorkUnit::new(client, role, IsolationLevel::ReadCommitted).run(|scope| {
        let rows = scope
            .execute(&Statement::ScaleValues {
                postal_code: postal_code.clone(),
                factor,
            })?
            .rows_affected()?;
        scope.mark("scale");
        if rows > 0 {
            let range = scope.execute(&Statement::ValueRange { postal_code })?;
            let min = match range.rows()?.first() {
                Some(row) => row.get(0)?.as_f64()?,
                None => None,
            };
            scope.mark("guard");
            if let Some(min) = min {
                if min <= 0.0 {
                    return Err(HarnessError::GuardViolation(format!(
                        "minimum value {} is not positive after scaling by {}",
                        min, factor
                    )));
                }
            }
        }
        Ok(rows)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::ScenarioVerdict;
    use chrono::NaiveDate;
    use txanomaly_core::{ErrorKind, HarnessSettings, NewRecord};
    use txanomaly_storage::{MemoryClient, MemoryStore};

    fn harness() -> (Arc<MemoryStore>, Harness) {
        let client = MemoryClient::seeded(150, 2019);
        let store = Arc::clone(client.store());
        let client: Arc<dyn StoreClient> = Arc::new(client);
        (store, Harness::new(client, HarnessSettings::fast()).unwrap())
    }

    fn number(observed: &Option<Observed>) -> f64 {
        observed.as_ref().and_then(Observed::as_f64).unwrap()
    }

    #[test]
    fn test_round_trip_restores_the_mean() {
        let (store, h) = harness();
        let before = store.committed_records();
        let result = h.run(&ScenarioSpec::bulk_adjustment()).unwrap();

        assert_eq!(result.verdict, ScenarioVerdict::Matched);
        assert!(!result.observed_anomaly);
        let adjuster = result.observation(ADJUSTER).unwrap();
        let reverter = result.observation(REVERTER).unwrap();
        let initial = number(&adjuster.first);
        let adjusted = number(&adjuster.second);
        let restored = number(&reverter.second);
        assert!((adjusted / initial - 1.05).abs() < 1e-9);
        assert!(relative_drift(initial, restored) <= ROUND_TRIP_TOLERANCE);
        assert!(result.restored);
        assert_eq!(store.committed_records(), before);
    }

    #[test]
    fn test_negative_percentage_round_trip() {
        let (_, h) = harness();
        let spec = ScenarioSpec::BulkAdjustment {
            postal_code: "51200.0".into(),
            percentage: -40.0,
        };
        assert!(h.run(&spec).unwrap().passed());
    }

    #[test]
    fn test_guard_rejects_non_positive_values() {
        let (store, h) = harness();
        h.restore_manager()
            .inspect(&Statement::InsertRecord(NewRecord {
                mutation_ref: "zero".into(),
                date: NaiveDate::from_ymd_opt(2019, 6, 1).unwrap(),
                value: 0.0,
                group_code: "51230".into(),
                group_name: "Epernay".into(),
                postal_code: "51200.0".into(),
                property_kind: "Maison".into(),
            }))
            .unwrap();
        let before = store.committed_records();

        let result = h.run(&ScenarioSpec::bulk_adjustment()).unwrap();
        assert_eq!(result.verdict, ScenarioVerdict::HarnessFailure);
        assert!(result.has_error(ErrorKind::GuardViolation));
        // The reverter never ran and nothing was committed
        assert!(result.observation(REVERTER).is_none());
        assert!(result.restored);
        assert_eq!(store.committed_records(), before);
    }

    #[test]
    fn test_unknown_postal_code_is_rejected() {
        let (_, h) = harness();
        let spec = ScenarioSpec::BulkAdjustment {
            postal_code: "99999.0".into(),
            percentage: 5.0,
        };
        assert_eq!(h.run(&spec).unwrap_err().kind(), ErrorKind::InvalidScenario);
    }
}
