//! Domain records
//!
//! A [`DomainRecord`] is one row of the shared table the scenarios fight over
//! (`mutations_foncieres` in the PostgreSQL adapter). The harness must leave
//! every record it touches identical before and after a scenario.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a stored record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId(pub i64);

impl RecordId {
    /// Raw integer value
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for RecordId {
    fn from(id: i64) -> Self {
        RecordId(id)
    }
}

/// A row under test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainRecord {
    /// Store-assigned identifier
    pub id: RecordId,
    /// External reference; inserted rows carry the scenario marker here
    pub mutation_ref: String,
    /// Date of the mutation
    pub date: NaiveDate,
    /// Numeric value (sale price)
    pub value: f64,
    /// Grouping key (commune code)
    pub group_code: String,
    /// Categorical attribute owned by the group (commune name)
    pub group_name: String,
    /// Postal code
    pub postal_code: String,
    /// Property kind
    pub property_kind: String,
}

impl DomainRecord {
    /// Whether this record satisfies the phantom-read predicate
    /// `group_code = ? AND value >= ?`.
    pub fn qualifies(&self, group_code: &str, min_value: f64) -> bool {
        self.group_code == group_code && self.value >= min_value
    }

    /// Whether this record is older than `cutoff`.
    pub fn is_older_than(&self, cutoff: NaiveDate) -> bool {
        self.date < cutoff
    }
}

/// A record to insert; the store assigns the id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRecord {
    /// External reference (scenario marker for harness inserts)
    pub mutation_ref: String,
    /// Date of the mutation
    pub date: NaiveDate,
    /// Numeric value
    pub value: f64,
    /// Grouping key
    pub group_code: String,
    /// Group name
    pub group_name: String,
    /// Postal code
    pub postal_code: String,
    /// Property kind
    pub property_kind: String,
}

impl NewRecord {
    /// Materialize with a store-assigned id.
    pub fn into_record(self, id: RecordId) -> DomainRecord {
        DomainRecord {
            id,
            mutation_ref: self.mutation_ref,
            date: self.date,
            value: self.value,
            group_code: self.group_code,
            group_name: self.group_name,
            postal_code: self.postal_code,
            property_kind: self.property_kind,
        }
    }
}
