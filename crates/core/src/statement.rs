//! Statement catalogue and result rows
//!
//! The harness never builds SQL strings. It issues a closed set of typed
//! statements whose parameters live inside each variant; every backend
//! translates them (the PostgreSQL adapter into parametrized SQL, the memory
//! store into direct row operations).
//!
//! Results come back as [`ExecResult`]: either an affected-row count or a list
//! of [`Row`]s of [`Datum`]s. Typed accessors turn a result of the wrong shape
//! into a [`StoreError`] instead of panicking.

use crate::error::{StoreError, StoreResult};
use crate::record::{DomainRecord, NewRecord, RecordId};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single column value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Datum {
    /// SQL NULL (empty aggregate, missing row)
    Null,
    /// 64-bit integer (ids, counts)
    Int(i64),
    /// 64-bit float (values, averages)
    Float(f64),
    /// Text
    Text(String),
    /// Calendar date
    Date(NaiveDate),
}

impl Datum {
    /// Integer view; `Null` maps to `None`.
    pub fn as_i64(&self) -> StoreResult<Option<i64>> {
        match self {
            Datum::Null => Ok(None),
            Datum::Int(v) => Ok(Some(*v)),
            other => Err(StoreError::generic(format!("expected integer, got {}", other))),
        }
    }

    /// Float view; integers widen, `Null` maps to `None`.
    pub fn as_f64(&self) -> StoreResult<Option<f64>> {
        match self {
            Datum::Null => Ok(None),
            Datum::Float(v) => Ok(Some(*v)),
            Datum::Int(v) => Ok(Some(*v as f64)),
            other => Err(StoreError::generic(format!("expected number, got {}", other))),
        }
    }

    /// Text view; `Null` maps to `None`.
    pub fn as_text(&self) -> StoreResult<Option<&str>> {
        match self {
            Datum::Null => Ok(None),
            Datum::Text(s) => Ok(Some(s.as_str())),
            other => Err(StoreError::generic(format!("expected text, got {}", other))),
        }
    }
}

impl fmt::Display for Datum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Datum::Null => write!(f, "NULL"),
            Datum::Int(v) => write!(f, "{}", v),
            Datum::Float(v) => write!(f, "{}", v),
            Datum::Text(s) => write!(f, "'{}'", s),
            Datum::Date(d) => write!(f, "{}", d),
        }
    }
}

/// One result row
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Row(pub Vec<Datum>);

impl Row {
    /// Column at `index`, or a generic store error if the row is too short.
    pub fn get(&self, index: usize) -> StoreResult<&Datum> {
        self.0
            .get(index)
            .ok_or_else(|| StoreError::generic(format!("row has no column {}", index)))
    }

    /// Number of columns
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the row has no columns
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Result of executing one statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExecResult {
    /// Number of rows inserted, updated or deleted
    RowsAffected(u64),
    /// Rows produced by a query
    Rows(Vec<Row>),
}

impl ExecResult {
    /// Affected-row count of a write statement.
    pub fn rows_affected(&self) -> StoreResult<u64> {
        match self {
            ExecResult::RowsAffected(n) => Ok(*n),
            ExecResult::Rows(_) => Err(StoreError::generic("expected row count, got rows")),
        }
    }

    /// All rows of a query.
    pub fn rows(&self) -> StoreResult<&[Row]> {
        match self {
            ExecResult::Rows(rows) => Ok(rows),
            ExecResult::RowsAffected(_) => Err(StoreError::generic("expected rows, got row count")),
        }
    }

    /// First column of the first row; `Null` when the query returned no rows.
    pub fn scalar(&self) -> StoreResult<Datum> {
        let rows = self.rows()?;
        match rows.first() {
            Some(row) => Ok(row.get(0)?.clone()),
            None => Ok(Datum::Null),
        }
    }

    /// Scalar as integer.
    pub fn scalar_i64(&self) -> StoreResult<Option<i64>> {
        self.scalar()?.as_i64()
    }

    /// Scalar as float.
    pub fn scalar_f64(&self) -> StoreResult<Option<f64>> {
        self.scalar()?.as_f64()
    }

    /// Scalar as owned text.
    pub fn scalar_text(&self) -> StoreResult<Option<String>> {
        Ok(self.scalar()?.as_text()?.map(str::to_string))
    }

    /// Scalar count; a missing row counts as zero.
    pub fn count(&self) -> StoreResult<u64> {
        let n = self.scalar_i64()?.unwrap_or(0);
        u64::try_from(n).map_err(|_| StoreError::generic(format!("negative count {}", n)))
    }
}

/// The statements the harness issues
///
/// Each variant documents the SQL it stands for; the PostgreSQL adapter runs
/// exactly that text against `mutations_foncieres`.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// `SELECT valeur_fonciere FROM t WHERE id = $1`
    SelectValue {
        /// Target record
        id: RecordId,
    },
    /// `SELECT * FROM t WHERE id = $1`
    SelectRecord {
        /// Target record
        id: RecordId,
    },
    /// `SELECT COUNT(*) FROM t`
    CountAll,
    /// `SELECT id FROM t ORDER BY id OFFSET $1 LIMIT 1`
    SelectIdAt {
        /// Zero-based offset
        offset: u64,
    },
    /// `SELECT nom_commune FROM t WHERE code_commune = $1 ORDER BY id LIMIT 1`
    SelectGroupName {
        /// Grouping key
        group_code: String,
    },
    /// `SELECT id, nom_commune FROM t WHERE code_commune = $1 ORDER BY id`
    SelectGroupNames {
        /// Grouping key
        group_code: String,
    },
    /// `SELECT AVG(valeur_fonciere) FROM t WHERE code_commune = $1`
    AverageGroupValue {
        /// Grouping key
        group_code: String,
    },
    /// `SELECT COUNT(*) FROM t WHERE code_commune = $1 AND valeur_fonciere >= $2`
    CountQualifying {
        /// Grouping key
        group_code: String,
        /// Inclusive lower bound on the value
        min_value: f64,
    },
    /// `INSERT INTO t (...) VALUES (...) RETURNING id`
    InsertRecord(NewRecord),
    /// `UPDATE t SET valeur_fonciere = $1 WHERE id = $2`
    UpdateValue {
        /// Target record
        id: RecordId,
        /// New value
        value: f64,
    },
    /// `UPDATE t SET nom_commune = $1 WHERE code_commune = $2 AND nom_commune = $3`
    RenameGroup {
        /// Grouping key
        group_code: String,
        /// Name the row must currently carry
        old_name: String,
        /// Replacement name
        new_name: String,
    },
    /// `UPDATE t SET nom_commune = $1 WHERE id = $2`
    SetRecordName {
        /// Target record
        id: RecordId,
        /// Name to write
        name: String,
    },
    /// `UPDATE t SET valeur_fonciere = valeur_fonciere * $1 WHERE code_postal = $2 AND valeur_fonciere > 0`
    ScaleValues {
        /// Postal code filter
        postal_code: String,
        /// Multiplicative factor
        factor: f64,
    },
    /// `SELECT MIN(valeur_fonciere), MAX(valeur_fonciere) FROM t WHERE code_postal = $1`
    ValueRange {
        /// Postal code filter
        postal_code: String,
    },
    /// `SELECT COALESCE(AVG(valeur_fonciere), 0) FROM t WHERE code_postal = $1`
    AveragePostalValue {
        /// Postal code filter
        postal_code: String,
    },
    /// `SELECT id, valeur_fonciere FROM t WHERE code_postal = $1 ORDER BY id`
    SelectPostalValues {
        /// Postal code filter
        postal_code: String,
    },
    /// `SELECT COUNT(*) FROM t WHERE date_mutation < $1`
    CountOlderThan {
        /// Exclusive upper bound on the date
        cutoff: NaiveDate,
    },
    /// `DELETE FROM t WHERE date_mutation < $1`
    DeleteOlderThan {
        /// Exclusive upper bound on the date
        cutoff: NaiveDate,
    },
    /// `SELECT COUNT(*) FROM t WHERE id_mutation = $1`
    CountMarked {
        /// Scenario marker
        marker: String,
    },
    /// `DELETE FROM t WHERE id_mutation = $1`
    DeleteMarked {
        /// Scenario marker
        marker: String,
    },
}

impl Statement {
    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Statement::SelectValue { .. } => "select_value",
            Statement::SelectRecord { .. } => "select_record",
            Statement::CountAll => "count_all",
            Statement::SelectIdAt { .. } => "select_id_at",
            Statement::SelectGroupName { .. } => "select_group_name",
            Statement::SelectGroupNames { .. } => "select_group_names",
            Statement::AverageGroupValue { .. } => "average_group_value",
            Statement::CountQualifying { .. } => "count_qualifying",
            Statement::InsertRecord(_) => "insert_record",
            Statement::UpdateValue { .. } => "update_value",
            Statement::RenameGroup { .. } => "rename_group",
            Statement::SetRecordName { .. } => "set_record_name",
            Statement::ScaleValues { .. } => "scale_values",
            Statement::ValueRange { .. } => "value_range",
            Statement::AveragePostalValue { .. } => "average_postal_value",
            Statement::SelectPostalValues { .. } => "select_postal_values",
            Statement::CountOlderThan { .. } => "count_older_than",
            Statement::DeleteOlderThan { .. } => "delete_older_than",
            Statement::CountMarked { .. } => "count_marked",
            Statement::DeleteMarked { .. } => "delete_marked",
        }
    }

    /// Whether the statement mutates rows.
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            Statement::InsertRecord(_)
                | Statement::UpdateValue { .. }
                | Statement::RenameGroup { .. }
                | Statement::SetRecordName { .. }
                | Statement::ScaleValues { .. }
                | Statement::DeleteOlderThan { .. }
                | Statement::DeleteMarked { .. }
        )
    }
}

/// Row layout used by [`Statement::SelectRecord`]:
/// `id, id_mutation, date_mutation, valeur_fonciere, code_commune, nom_commune, code_postal, type_local`.
pub fn record_to_row(record: &DomainRecord) -> Row {
    Row(vec![
        Datum::Int(record.id.as_i64()),
        Datum::Text(record.mutation_ref.clone()),
        Datum::Date(record.date),
        Datum::Float(record.value),
        Datum::Text(record.group_code.clone()),
        Datum::Text(record.group_name.clone()),
        Datum::Text(record.postal_code.clone()),
        Datum::Text(record.property_kind.clone()),
    ])
}

/// Inverse of [`record_to_row`].
pub fn row_to_record(row: &Row) -> StoreResult<DomainRecord> {
    let text = |i: usize| -> StoreResult<String> {
        row.get(i)?
            .as_text()?
            .map(str::to_string)
            .ok_or_else(|| StoreError::generic(format!("column {} is NULL", i)))
    };
    let id = row
        .get(0)?
        .as_i64()?
        .ok_or_else(|| StoreError::generic("record id is NULL"))?;
    let date = match row.get(2)? {
        Datum::Date(d) => *d,
        other => return Err(StoreError::generic(format!("expected date, got {}", other))),
    };
    let value = row
        .get(3)?
        .as_f64()?
        .ok_or_else(|| StoreError::generic("record value is NULL"))?;
    Ok(DomainRecord {
        id: RecordId(id),
        mutation_ref: text(1)?,
        date,
        value,
        group_code: text(4)?,
        group_name: text(5)?,
        postal_code: text(6)?,
        property_kind: text(7)?,
    })
}
