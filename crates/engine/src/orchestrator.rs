//! Scenario orchestration
//!
//! The [`Harness`] validates a spec, hands it to the scenario's runner and
//! turns whatever comes back into a [`ScenarioResult`]. A failure before any
//! work unit started becomes a rejected result; everything after that is
//! folded into the result by the runner itself.
//!
//! `run_all` stops at the first result that leaves the store in an unknown
//! state (restore mismatch or hung worker).

use crate::baseline::RestoreManager;
use crate::report::RunReport;
use crate::result::ScenarioResult;
use crate::scenario::ScenarioSpec;
use crate::scenarios;
use std::fmt;
use std::sync::Arc;
use tracing::{error, info, warn};
use txanomaly_core::{HarnessSettings, Result};
use txanomaly_storage::StoreClient;

/// Runs scenarios against one store
pub struct Harness {
    client: Arc<dyn StoreClient>,
    settings: HarnessSettings,
    restore: RestoreManager,
}

impl Harness {
    /// Harness over `client` with the given timing settings
    pub fn new(client: Arc<dyn StoreClient>, settings: HarnessSettings) -> Result<Self> {
        settings.validate()?;
        let restore = RestoreManager::new(Arc::clone(&client));
        Ok(Harness {
            client,
            settings,
            restore,
        })
    }

    /// Store client every work unit connects through
    pub fn client(&self) -> &Arc<dyn StoreClient> {
        &self.client
    }

    /// Timing settings
    pub fn settings(&self) -> &HarnessSettings {
        &self.settings
    }

    /// Baseline/restore manager
    pub fn restore_manager(&self) -> &RestoreManager {
        &self.restore
    }

    /// Run one scenario.
    ///
    /// Returns `Err` only when the scenario could not start: invalid
    /// parameters, an unreachable store, or missing target rows. In that case
    /// nothing was written.
    pub fn run(&self, spec: &ScenarioSpec) -> Result<ScenarioResult> {
        spec.validate()?;
        info!(scenario = %spec, store = %self.client.describe(), "scenario started");
        let result = match spec {
            ScenarioSpec::NonRepeatableRead {
                reader_isolation,
                target,
                delta,
            } => scenarios::non_repeatable_read::run(self, spec, *reader_isolation, *target, *delta),
            ScenarioSpec::PhantomRead {
                reader_isolation,
                group_code,
                min_value,
            } => scenarios::phantom_read::run(self, spec, *reader_isolation, group_code, *min_value),
            ScenarioSpec::SerializationFailure {
                isolation,
                group_code,
            } => scenarios::serialization_failure::run(self, spec, *isolation, group_code),
            ScenarioSpec::BulkAdjustment { postal_code, .. } => {
                let factor = spec.adjustment_factor()?;
                scenarios::bulk_adjustment::run(self, spec, postal_code, factor)
            }
            ScenarioSpec::GuardedArchive { cutoff } => {
                scenarios::guarded_archive::run(self, spec, *cutoff)
            }
        }?;

        if result.restored {
            info!(
                scenario = %result.scenario_name,
                observed = result.observed_anomaly,
                expected = result.expected_anomaly,
                verdict = %result.verdict,
                "scenario finished"
            );
        } else {
            error!(scenario = %result.scenario_name, "scenario left the store unrestored");
        }
        Ok(result)
    }

    /// Run every spec in order, stopping after a fatal result.
    pub fn run_all(&self, specs: &[ScenarioSpec]) -> RunReport {
        let mut report = RunReport::new(self.client.describe());
        for (i, spec) in specs.iter().enumerate() {
            let result = match self.run(spec) {
                Ok(result) => result,
                Err(e) => {
                    warn!(scenario = %spec, error = %e, "scenario could not start");
                    ScenarioResult::rejected(spec.name(), spec.expected_anomaly(), &e)
                }
            };
            let fatal = result.is_fatal();
            report.push(result);
            if fatal {
                let skipped: Vec<String> = specs[i + 1..].iter().map(|s| s.name()).collect();
                error!(
                    scenario = %spec,
                    skipped = skipped.len(),
                    "stopping run: store state could not be verified"
                );
                report.skip(skipped);
                break;
            }
        }
        report
    }
}

impl fmt::Debug for Harness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Harness")
            .field("store", &self.client.describe())
            .field("settings", &self.settings)
            .finish()
    }
}
