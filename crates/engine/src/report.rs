//! Run reports
//!
//! A [`RunReport`] collects the results of one `run_all` call and renders
//! them either as a fixed-width table for people or as JSON for tools.

use crate::result::{ScenarioResult, ScenarioVerdict};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use txanomaly_core::{HarnessError, Result};

/// Results of a sequence of scenarios
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    /// Store the scenarios ran against
    pub store: String,
    /// Results in run order
    pub results: Vec<ScenarioResult>,
    /// Scenarios not run because an earlier one was fatal
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<String>,
}

impl RunReport {
    /// Empty report for `store`
    pub fn new(store: impl Into<String>) -> Self {
        RunReport {
            store: store.into(),
            results: Vec::new(),
            skipped: Vec::new(),
        }
    }

    /// Append a result
    pub fn push(&mut self, result: ScenarioResult) {
        self.results.push(result);
    }

    /// Record scenarios that were not run
    pub fn skip(&mut self, names: impl IntoIterator<Item = String>) {
        self.skipped.extend(names);
    }

    /// Results in run order
    pub fn results(&self) -> &[ScenarioResult] {
        &self.results
    }

    /// Names of scenarios that were not run
    pub fn skipped(&self) -> &[String] {
        &self.skipped
    }

    /// Whether every scenario ran, matched and was restored
    pub fn all_passed(&self) -> bool {
        self.skipped.is_empty() && self.results.iter().all(ScenarioResult::passed)
    }

    /// Count of results with `verdict`
    pub fn count(&self, verdict: ScenarioVerdict) -> usize {
        self.results.iter().filter(|r| r.verdict == verdict).count()
    }

    /// Pretty-printed JSON
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| HarnessError::Configuration(format!("cannot encode report: {}", e)))
    }

    /// Human-readable table, one line per scenario plus details.
    pub fn render_table(&self) -> String {
        let width = self
            .results
            .iter()
            .map(|r| r.scenario_name.len())
            .chain(std::iter::once("SCENARIO".len()))
            .max()
            .unwrap_or(0);

        let mut out = String::new();
        let _ = writeln!(out, "store: {}", self.store);
        let _ = writeln!(
            out,
            "{:<width$}  {:<8}  {:<8}  {:<8}  VERDICT",
            "SCENARIO",
            "OBSERVED",
            "EXPECTED",
            "RESTORED",
            width = width
        );
        for result in &self.results {
            let _ = writeln!(
                out,
                "{:<width$}  {:<8}  {:<8}  {:<8}  {}",
                result.scenario_name,
                yes_no(result.observed_anomaly),
                yes_no(result.expected_anomaly),
                yes_no(result.restored),
                result.verdict,
                width = width
            );
            for (role, obs) in &result.observations {
                let mut line = format!("    {} [{}]", role, obs.outcome);
                if let Some(first) = &obs.first {
                    let _ = write!(line, " first={}", first);
                }
                if let Some(second) = &obs.second {
                    let _ = write!(line, " second={}", second);
                }
                for (key, value) in &obs.values {
                    let _ = write!(line, " {}={}", key, value);
                }
                let _ = writeln!(out, "{}", line);
            }
            for err in &result.errors {
                let _ = writeln!(out, "    ! {} {}: {}", err.role, err.kind, err.message);
            }
        }
        for name in &self.skipped {
            let _ = writeln!(out, "{:<width$}  skipped", name, width = width);
        }
        let _ = writeln!(
            out,
            "{} matched, {} mismatched, {} harness failures, {} skipped",
            self.count(ScenarioVerdict::Matched),
            self.count(ScenarioVerdict::Mismatched),
            self.count(ScenarioVerdict::HarnessFailure),
            self.skipped.len()
        );
        out
    }
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "yes"
    } else {
        "no"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(name: &str, verdict: ScenarioVerdict, restored: bool) -> ScenarioResult {
        ScenarioResult {
            scenario_name: name.to_string(),
            isolation_levels: Default::default(),
            observations: Default::default(),
            observed_anomaly: true,
            expected_anomaly: true,
            timings_ms: Default::default(),
            errors: Vec::new(),
            restored,
            verdict,
        }
    }

    #[test]
    fn test_all_passed() {
        let mut report = RunReport::new("memory");
        report.push(result("a", ScenarioVerdict::Matched, true));
        assert!(report.all_passed());

        report.push(result("b", ScenarioVerdict::Mismatched, true));
        assert!(!report.all_passed());

        let mut report = RunReport::new("memory");
        report.push(result("a", ScenarioVerdict::Matched, true));
        report.skip(vec!["b".to_string()]);
        assert!(!report.all_passed());
    }

    #[test]
    fn test_table_lists_every_scenario() {
        let mut report = RunReport::new("memory (10 seeded rows)");
        report.push(result("phantom-read@read-committed", ScenarioVerdict::Matched, true));
        report.push(result("guarded-archive@2018-01-01", ScenarioVerdict::HarnessFailure, false));
        report.skip(vec!["bulk-adjustment@51200.0".to_string()]);

        let table = report.render_table();
        assert!(table.contains("phantom-read@read-committed"));
        assert!(table.contains("HARNESS FAILURE"));
        assert!(table
            .lines()
            .any(|l| l.starts_with("bulk-adjustment@51200.0") && l.ends_with("skipped")));
        assert!(table.contains("1 matched, 0 mismatched, 1 harness failures, 1 skipped"));
    }

    #[test]
    fn test_json_round_trip() {
        let mut report = RunReport::new("memory");
        report.push(result("a", ScenarioVerdict::Matched, true));
        let json = report.to_json().unwrap();
        assert!(json.contains("\"scenarioName\": \"a\""));
        let back: RunReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back, report);
    }
}
