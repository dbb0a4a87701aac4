//! Scenario results
//!
//! A [`ScenarioResult`] is produced once per scenario run and never changes
//! afterwards. Its JSON form is the reporting surface:
//!
//! ```json
//! {
//!   "scenarioName": "non-repeatable-read@read-committed",
//!   "isolationLevels": { "reader": "read-committed", "writer": "read-committed" },
//!   "observations": { "reader": { "outcome": "Committed", "first": 1200.0, "second": 11200.0 } },
//!   "observedAnomaly": true,
//!   "expectedAnomaly": true,
//!   "timingsMs": { "reader.barrier": 3, "writer.update": 4 },
//!   "errors": [],
//!   "restored": true,
//!   "verdict": "matched"
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use txanomaly_concurrency::UnitReport;
use txanomaly_core::{ErrorKind, HarnessError, IsolationLevel};

/// One observed value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Observed {
    /// A row count
    Count(u64),
    /// A numeric value or aggregate
    Number(f64),
    /// A text value
    Text(String),
    /// A yes/no outcome
    Flag(bool),
}

impl Observed {
    /// Numeric view of counts and numbers
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Observed::Count(n) => Some(*n as f64),
            Observed::Number(x) => Some(*x),
            _ => None,
        }
    }
}

impl fmt::Display for Observed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Observed::Count(n) => write!(f, "{}", n),
            Observed::Number(x) => write!(f, "{:.2}", x),
            Observed::Text(s) => write!(f, "'{}'", s),
            Observed::Flag(b) => write!(f, "{}", b),
        }
    }
}

/// What one role saw
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleObservation {
    /// Terminal state of the role's work unit
    pub outcome: String,
    /// First observation (before the other side acted)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first: Option<Observed>,
    /// Second observation (after the other side acted)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub second: Option<Observed>,
    /// Anything else worth reporting
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub values: BTreeMap<String, Observed>,
}

/// An error met during a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorRecord {
    /// Role that hit the error, or `harness`
    pub role: String,
    /// Classification
    pub kind: ErrorKind,
    /// Rendered error
    pub message: String,
}

impl ErrorRecord {
    /// Record `error` against `role`
    pub fn new(role: impl Into<String>, error: &HarnessError) -> Self {
        ErrorRecord {
            role: role.into(),
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

/// How a run compares to expectations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ScenarioVerdict {
    /// The anomaly predicate matched its expected value
    Matched,
    /// The anomaly predicate ran but disagreed with its expected value
    Mismatched,
    /// The harness itself failed; the predicate says nothing
    HarnessFailure,
}

impl ScenarioVerdict {
    /// Label used in the human report
    pub fn as_str(&self) -> &'static str {
        match self {
            ScenarioVerdict::Matched => "MATCHED",
            ScenarioVerdict::Mismatched => "MISMATCHED",
            ScenarioVerdict::HarnessFailure => "HARNESS FAILURE",
        }
    }
}

impl fmt::Display for ScenarioVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one scenario run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioResult {
    /// Scenario name, including its distinguishing parameter
    pub scenario_name: String,
    /// Isolation level per role
    pub isolation_levels: BTreeMap<String, IsolationLevel>,
    /// Observations per role
    pub observations: BTreeMap<String, RoleObservation>,
    /// Whether the anomaly predicate held
    pub observed_anomaly: bool,
    /// Whether a correct store shows the anomaly
    pub expected_anomaly: bool,
    /// Phase offsets keyed `role.phase`, in milliseconds from each unit's start
    pub timings_ms: BTreeMap<String, u64>,
    /// Errors met during the run
    pub errors: Vec<ErrorRecord>,
    /// Whether the store was verified back at its baseline
    pub restored: bool,
    /// Overall verdict
    pub verdict: ScenarioVerdict,
}

impl ScenarioResult {
    /// Result for a scenario that failed before any work unit ran.
    ///
    /// Nothing was written, so the store counts as restored.
    pub fn rejected(scenario_name: impl Into<String>, expected_anomaly: bool, error: &HarnessError) -> Self {
        ScenarioResult {
            scenario_name: scenario_name.into(),
            isolation_levels: BTreeMap::new(),
            observations: BTreeMap::new(),
            observed_anomaly: false,
            expected_anomaly,
            timings_ms: BTreeMap::new(),
            errors: vec![ErrorRecord::new("harness", error)],
            restored: true,
            verdict: ScenarioVerdict::HarnessFailure,
        }
    }

    /// Whether the run matched and the store was restored
    pub fn passed(&self) -> bool {
        self.verdict == ScenarioVerdict::Matched && self.restored
    }

    /// Whether later scenarios must not run after this one
    pub fn is_fatal(&self) -> bool {
        !self.restored
            || self.errors.iter().any(|e| {
                matches!(
                    e.kind,
                    ErrorKind::RestoreMismatch | ErrorKind::WorkerHung
                )
            })
    }

    /// Observation of `role`, if it reported one
    pub fn observation(&self, role: &str) -> Option<&RoleObservation> {
        self.observations.get(role)
    }

    /// Whether any recorded error has `kind`
    pub fn has_error(&self, kind: ErrorKind) -> bool {
        self.errors.iter().any(|e| e.kind == kind)
    }
}

// ============================================================================
// Recorder
// ============================================================================

/// Accumulates a result while a scenario runs
#[derive(Debug)]
pub(crate) struct ResultRecorder {
    scenario_name: String,
    expected_anomaly: bool,
    isolation_levels: BTreeMap<String, IsolationLevel>,
    observations: BTreeMap<String, RoleObservation>,
    timings_ms: BTreeMap<String, u64>,
    errors: Vec<ErrorRecord>,
}

impl ResultRecorder {
    pub(crate) fn new(scenario_name: impl Into<String>, expected_anomaly: bool) -> Self {
        ResultRecorder {
            scenario_name: scenario_name.into(),
            expected_anomaly,
            isolation_levels: BTreeMap::new(),
            observations: BTreeMap::new(),
            timings_ms: BTreeMap::new(),
            errors: Vec::new(),
        }
    }

    pub(crate) fn scenario_name(&self) -> &str {
        &self.scenario_name
    }

    /// Take in a finished unit: isolation, outcome, timings and its error.
    pub(crate) fn absorb<T>(&mut self, report: &UnitReport<T>) {
        self.isolation_levels
            .insert(report.role.clone(), report.isolation);
        self.observations
            .entry(report.role.clone())
            .or_default()
            .outcome = report.outcome.to_string();
        for timing in &report.timings {
            self.timings_ms
                .insert(format!("{}.{}", report.role, timing.phase), timing.at_ms);
        }
        if let Err(e) = &report.result {
            self.errors.push(ErrorRecord::new(report.role.clone(), e));
        }
    }

    /// Note a role's isolation level without a unit report (e.g. a hung worker).
    pub(crate) fn isolation(&mut self, role: &str, level: IsolationLevel) {
        self.isolation_levels.insert(role.to_string(), level);
    }

    pub(crate) fn first(&mut self, role: &str, value: Observed) {
        self.role(role).first = Some(value);
    }

    pub(crate) fn second(&mut self, role: &str, value: Observed) {
        self.role(role).second = Some(value);
    }

    pub(crate) fn value(&mut self, role: &str, key: &str, value: Observed) {
        self.role(role).values.insert(key.to_string(), value);
    }

    pub(crate) fn error(&mut self, role: &str, error: &HarnessError) {
        self.errors.push(ErrorRecord::new(role, error));
    }

    fn role(&mut self, role: &str) -> &mut RoleObservation {
        self.observations.entry(role.to_string()).or_default()
    }

    /// Freeze the result.
    ///
    /// Any error other than a serialization conflict, or a failed restore,
    /// makes the run a harness failure regardless of the predicate.
    pub(crate) fn finish(self, observed_anomaly: bool, restored: bool) -> ScenarioResult {
        let harness_failed = !restored
            || self
                .errors
                .iter()
                .any(|e| e.kind != ErrorKind::SerializationConflict);
        let verdict = if harness_failed {
            ScenarioVerdict::HarnessFailure
        } else if observed_anomaly == self.expected_anomaly {
            ScenarioVerdict::Matched
        } else {
            ScenarioVerdict::Mismatched
        };
        ScenarioResult {
            scenario_name: self.scenario_name,
            isolation_levels: self.isolation_levels,
            observations: self.observations,
            observed_anomaly,
            expected_anomaly: self.expected_anomaly,
            timings_ms: self.timings_ms,
            errors: self.errors,
            restored,
            verdict,
        }
    }
}
