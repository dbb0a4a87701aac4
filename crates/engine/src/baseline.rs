//! Baseline capture and restoration
//!
//! The [`RestoreManager`] owns no long-lived session. Each call opens a fresh
//! autocommit session at read-committed, so restoration never depends on the
//! state of a session a scenario used. Restoration is verified by re-reading
//! every captured record and comparing it field by field with the baseline;
//! a reported row count alone is never trusted.

use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info};
use txanomaly_core::statement::row_to_record;
use txanomaly_core::{DomainRecord, ExecResult, HarnessError, IsolationLevel, RecordId, Result, Statement};
use txanomaly_storage::{Session, StoreClient};

/// Records captured before a scenario ran
#[derive(Debug, Clone, PartialEq)]
pub struct Baseline {
    scenario: String,
    records: Vec<DomainRecord>,
}

impl Baseline {
    /// Scenario the baseline belongs to
    pub fn scenario(&self) -> &str {
        &self.scenario
    }

    /// Captured records, sorted by id
    pub fn records(&self) -> &[DomainRecord] {
        &self.records
    }

    /// Captured ids, sorted
    pub fn ids(&self) -> Vec<RecordId> {
        self.records.iter().map(|r| r.id).collect()
    }

    /// Number of captured records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether nothing was captured
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Captures baselines and puts them back
pub struct RestoreManager {
    client: Arc<dyn StoreClient>,
}

impl RestoreManager {
    /// Manager opening its sessions from `client`
    pub fn new(client: Arc<dyn StoreClient>) -> Self {
        RestoreManager { client }
    }

    fn session(&self) -> Result<Box<dyn Session>> {
        let mut session = self.client.connect()?;
        session.set_isolation(IsolationLevel::ReadCommitted)?;
        session.set_autocommit(true)?;
        Ok(session)
    }

    /// Run one statement on a fresh autocommit session.
    ///
    /// Scenarios use this for setup reads outside any work unit.
    pub fn inspect(&self, statement: &Statement) -> Result<ExecResult> {
        let mut session = self.session()?;
        debug!(statement = statement.name(), "inspect");
        let result = session.execute(statement);
        release(session);
        Ok(result?)
    }

    /// Capture the records with the given ids. Missing ids are skipped.
    pub fn capture_records(&self, scenario: &str, ids: &[RecordId]) -> Result<Baseline> {
        let mut session = self.session()?;
        let captured = read_records(session.as_mut(), ids);
        release(session);
        let mut records: Vec<DomainRecord> = captured?.into_iter().flatten().collect();
        records.sort_by_key(|r| r.id);
        info!(scenario, records = records.len(), "baseline captured");
        Ok(Baseline {
            scenario: scenario.to_string(),
            records,
        })
    }

    /// Capture every record of a group.
    pub fn capture_group(&self, scenario: &str, group_code: &str) -> Result<Baseline> {
        let rows = self.inspect(&Statement::SelectGroupNames {
            group_code: group_code.to_string(),
        })?;
        let ids = leading_ids(&rows)?;
        self.capture_records(scenario, &ids)
    }

    /// Capture every record of a postal code.
    pub fn capture_postal(&self, scenario: &str, postal_code: &str) -> Result<Baseline> {
        let rows = self.inspect(&Statement::SelectPostalValues {
            postal_code: postal_code.to_string(),
        })?;
        let ids = leading_ids(&rows)?;
        self.capture_records(scenario, &ids)
    }

    /// Put every captured record back to its baseline value and name, then
    /// verify.
    ///
    /// Returns the number of records that had to be rewritten. A record that
    /// no longer exists cannot be restored and yields `RestoreMismatch`.
    pub fn restore(&self, baseline: &Baseline) -> Result<usize> {
        let mut session = self.session()?;
        let repaired = rewrite(session.as_mut(), baseline);
        release(session);
        let repaired = repaired?;
        if repaired > 0 {
            info!(scenario = %baseline.scenario, repaired, "baseline rewritten");
        }
        self.verify(baseline)?;
        Ok(repaired)
    }

    /// Re-read every captured record and compare it with the baseline.
    pub fn verify(&self, baseline: &Baseline) -> Result<()> {
        let mut session = self.session()?;
        let current = read_records(session.as_mut(), &baseline.ids());
        release(session);

        let mut differences = Vec::new();
        for (expected, actual) in baseline.records.iter().zip(current?) {
            match actual {
                None => differences.push(format!("record {} is missing", expected.id)),
                Some(actual) if actual != *expected => differences.push(format!(
                    "record {} is {{value: {}, name: '{}'}}, baseline {{value: {}, name: '{}'}}",
                    expected.id, actual.value, actual.group_name, expected.value, expected.group_name
                )),
                Some(_) => {}
            }
        }
        if differences.is_empty() {
            debug!(scenario = %baseline.scenario, records = baseline.len(), "baseline verified");
            return Ok(());
        }
        let detail = summarize(&differences);
        error!(scenario = %baseline.scenario, detail = %detail, "restore mismatch");
        Err(HarnessError::RestoreMismatch {
            scenario: baseline.scenario.clone(),
            detail,
        })
    }

    /// Delete every row tagged with `marker` and check none remain.
    pub fn remove_marked(&self, scenario: &str, marker: &str) -> Result<u64> {
        let mut session = self.session()?;
        let outcome = (|| -> Result<(u64, u64)> {
            let deleted = session
                .execute(&Statement::DeleteMarked {
                    marker: marker.to_string(),
                })?
                .rows_affected()?;
            let remaining = session
                .execute(&Statement::CountMarked {
                    marker: marker.to_string(),
                })?
                .count()?;
            Ok((deleted, remaining))
        })();
        release(session);
        let (deleted, remaining) = outcome?;
        debug!(scenario, marker, deleted, "marked rows removed");
        if remaining != 0 {
            let detail = format!("{} rows tagged {} remain after cleanup", remaining, marker);
            error!(scenario, detail = %detail, "restore mismatch");
            return Err(HarnessError::RestoreMismatch {
                scenario: scenario.to_string(),
                detail,
            });
        }
        Ok(deleted)
    }

    /// Compare a count taken now with the one taken before the scenario.
    pub fn verify_count(&self, scenario: &str, statement: &Statement, expected: u64) -> Result<u64> {
        let actual = self.inspect(statement)?.count()?;
        if actual != expected {
            let detail = format!(
                "{} returned {} rows, baseline {}",
                statement.name(),
                actual,
                expected
            );
            error!(scenario, detail = %detail, "restore mismatch");
            return Err(HarnessError::RestoreMismatch {
                scenario: scenario.to_string(),
                detail,
            });
        }
        Ok(actual)
    }
}

impl fmt::Debug for RestoreManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestoreManager")
            .field("store", &self.client.describe())
            .finish()
    }
}

fn release(mut session: Box<dyn Session>) {
    if let Err(e) = session.close() {
        debug!(error = %e, "closing restore session failed");
    }
}

fn read_records(session: &mut dyn Session, ids: &[RecordId]) -> Result<Vec<Option<DomainRecord>>> {
    let mut records = Vec::with_capacity(ids.len());
    for id in ids {
        let result = session.execute(&Statement::SelectRecord { id: *id })?;
        let record = match result.rows()?.first() {
            Some(row) => Some(row_to_record(row)?),
            None => None,
        };
        records.push(record);
    }
    Ok(records)
}

fn rewrite(session: &mut dyn Session, baseline: &Baseline) -> Result<usize> {
    let ids = baseline.ids();
    let current = read_records(session, &ids)?;
    let mut repaired = 0;
    for (expected, actual) in baseline.records.iter().zip(current) {
        let Some(actual) = actual else {
            return Err(HarnessError::RestoreMismatch {
                scenario: baseline.scenario.clone(),
                detail: format!("record {} was deleted and cannot be restored", expected.id),
            });
        };
        if actual == *expected {
            continue;
        }
        if actual.value != expected.value {
            session.execute(&Statement::UpdateValue {
                id: expected.id,
                value: expected.value,
            })?;
        }
        if actual.group_name != expected.group_name {
            session.execute(&Statement::SetRecordName {
                id: expected.id,
                name: expected.group_name.clone(),
            })?;
        }
        repaired += 1;
    }
    Ok(repaired)
}

/// Ids from the first column of each row
fn leading_ids(result: &ExecResult) -> Result<Vec<RecordId>> {
    let mut ids = Vec::new();
    for row in result.rows()? {
        if let Some(id) = row.get(0)?.as_i64()? {
            ids.push(RecordId(id));
        }
    }
    Ok(ids)
}

fn summarize(differences: &[String]) -> String {
    const SHOWN: usize = 3;
    let mut detail = differences
        .iter()
        .take(SHOWN)
        .cloned()
        .collect::<Vec<_>>()
        .join("; ");
    if differences.len() > SHOWN {
        detail.push_str(&format!(" (+{} more)", differences.len() - SHOWN));
    }
    detail
}
