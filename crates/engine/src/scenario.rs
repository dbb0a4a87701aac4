//! Scenario parameters
//!
//! Each scenario is one variant of [`ScenarioSpec`] carrying exactly the
//! parameters it needs. Specs are plain data: they can be built in code,
//! deserialized from JSON or TOML, and validated before anything touches the
//! store.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use txanomaly_core::{HarnessError, IsolationLevel, RecordId, Result};

/// Group probed by the phantom-read scenario when none is given
pub const DEFAULT_PHANTOM_GROUP: &str = "01053";
/// Lower bound of the phantom-read predicate
pub const DEFAULT_PHANTOM_MIN_VALUE: f64 = 9_999_999.0;
/// Group renamed by the serialization-failure scenario
pub const DEFAULT_SERIALIZATION_GROUP: &str = "01344";
/// Amount the non-repeatable-read writer adds to the target value
pub const DEFAULT_NRR_DELTA: f64 = 10_000.0;
/// Postal code adjusted by the bulk-adjustment scenario
pub const DEFAULT_ADJUSTMENT_POSTAL: &str = "51200.0";
/// Percentage applied by the bulk-adjustment scenario
pub const DEFAULT_ADJUSTMENT_PERCENT: f64 = 5.0;

/// Archive cutoffs exercised by the default suite
pub fn default_archive_cutoffs() -> Vec<NaiveDate> {
    [(2017, 1, 10), (2018, 1, 1)]
        .into_iter()
        .filter_map(|(y, m, d)| NaiveDate::from_ymd_opt(y, m, d))
        .collect()
}

// ============================================================================
// Scenario kinds
// ============================================================================

/// Scenario family, without parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScenarioKind {
    /// Same row read twice in one transaction
    NonRepeatableRead,
    /// Same predicate counted twice in one transaction
    PhantomRead,
    /// Two conditional updates racing on one group
    SerializationFailure,
    /// Scale values of a postal code and scale them back
    BulkAdjustment,
    /// Delete old rows inside a transaction that always rolls back
    GuardedArchive,
}

impl ScenarioKind {
    /// Every scenario family, in the order the default suite runs them
    pub const ALL: [ScenarioKind; 5] = [
        ScenarioKind::NonRepeatableRead,
        ScenarioKind::PhantomRead,
        ScenarioKind::SerializationFailure,
        ScenarioKind::BulkAdjustment,
        ScenarioKind::GuardedArchive,
    ];

    /// Kebab-case name used on the command line and in reports
    pub fn as_str(&self) -> &'static str {
        match self {
            ScenarioKind::NonRepeatableRead => "non-repeatable-read",
            ScenarioKind::PhantomRead => "phantom-read",
            ScenarioKind::SerializationFailure => "serialization-failure",
            ScenarioKind::BulkAdjustment => "bulk-adjustment",
            ScenarioKind::GuardedArchive => "guarded-archive",
        }
    }

    /// Specs for this family with default parameters.
    ///
    /// `isolation` pins the level of the role under test. Without it the read
    /// anomalies run at read-committed and repeatable-read, and the
    /// serialization race at repeatable-read. A read-committed pin does not
    /// apply to the serialization race, which needs a transaction snapshot.
    pub fn default_specs(&self, isolation: Option<IsolationLevel>) -> Vec<ScenarioSpec> {
        let read_levels = match isolation {
            Some(level) => vec![level],
            None => vec![IsolationLevel::ReadCommitted, IsolationLevel::RepeatableRead],
        };
        match self {
            ScenarioKind::NonRepeatableRead => read_levels
                .into_iter()
                .map(ScenarioSpec::non_repeatable_read)
                .collect(),
            ScenarioKind::PhantomRead => read_levels
                .into_iter()
                .map(ScenarioSpec::phantom_read)
                .collect(),
            ScenarioKind::SerializationFailure => {
                let level = isolation
                    .filter(|l| l.uses_transaction_snapshot())
                    .unwrap_or(IsolationLevel::RepeatableRead);
                vec![ScenarioSpec::serialization_failure(level)]
            }
            ScenarioKind::BulkAdjustment => vec![ScenarioSpec::bulk_adjustment()],
            ScenarioKind::GuardedArchive => default_archive_cutoffs()
                .into_iter()
                .map(ScenarioSpec::guarded_archive)
                .collect(),
        }
    }
}

impl fmt::Display for ScenarioKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScenarioKind {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self> {
        ScenarioKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s.trim().to_ascii_lowercase())
            .ok_or_else(|| {
                HarnessError::Configuration(format!(
                    "unknown scenario '{}' (expected one of: {})",
                    s,
                    ScenarioKind::ALL.map(|k| k.as_str()).join(", ")
                ))
            })
    }
}

/// Default suite: every family with default parameters.
pub fn default_suite(isolation: Option<IsolationLevel>) -> Vec<ScenarioSpec> {
    ScenarioKind::ALL
        .iter()
        .flat_map(|kind| kind.default_specs(isolation))
        .collect()
}

// ============================================================================
// Specs
// ============================================================================

/// Row targeted by the non-repeatable-read scenario
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecordTarget {
    /// A row picked at random from the whole table
    Random,
    /// A specific row
    Id(RecordId),
}

/// A scenario with its parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "scenario", rename_all = "kebab-case")]
pub enum ScenarioSpec {
    /// Reader reads a value twice around a writer's committed update
    #[serde(rename_all = "camelCase")]
    NonRepeatableRead {
        /// Isolation level of the reader
        reader_isolation: IsolationLevel,
        /// Row to read and update
        target: RecordTarget,
        /// Amount the writer adds to the value
        delta: f64,
    },
    /// Reader counts a predicate twice around an inserter's committed row
    #[serde(rename_all = "camelCase")]
    PhantomRead {
        /// Isolation level of the reader
        reader_isolation: IsolationLevel,
        /// Group the predicate filters on
        group_code: String,
        /// Inclusive lower bound of the predicate
        min_value: f64,
    },
    /// Two updaters rename the same group from the name they both read
    #[serde(rename_all = "camelCase")]
    SerializationFailure {
        /// Isolation level of both updaters
        isolation: IsolationLevel,
        /// Group to rename
        group_code: String,
    },
    /// Scale every positive value of a postal code, then scale it back
    #[serde(rename_all = "camelCase")]
    BulkAdjustment {
        /// Postal code filter
        postal_code: String,
        /// Change in percent; `5.0` scales by 1.05
        percentage: f64,
    },
    /// Archive rows older than a cutoff inside a transaction that rolls back
    #[serde(rename_all = "camelCase")]
    GuardedArchive {
        /// Exclusive upper bound on the row date
        cutoff: NaiveDate,
    },
}

impl ScenarioSpec {
    /// Non-repeatable read on a random row with the default delta
    pub fn non_repeatable_read(reader_isolation: IsolationLevel) -> Self {
        ScenarioSpec::NonRepeatableRead {
            reader_isolation,
            target: RecordTarget::Random,
            delta: DEFAULT_NRR_DELTA,
        }
    }

    /// Phantom read on the default group and threshold
    pub fn phantom_read(reader_isolation: IsolationLevel) -> Self {
        ScenarioSpec::PhantomRead {
            reader_isolation,
            group_code: DEFAULT_PHANTOM_GROUP.to_string(),
            min_value: DEFAULT_PHANTOM_MIN_VALUE,
        }
    }

    /// Serialization race on the default group
    pub fn serialization_failure(isolation: IsolationLevel) -> Self {
        ScenarioSpec::SerializationFailure {
            isolation,
            group_code: DEFAULT_SERIALIZATION_GROUP.to_string(),
        }
    }

    /// Bulk adjustment of the default postal code by the default percentage
    pub fn bulk_adjustment() -> Self {
        ScenarioSpec::BulkAdjustment {
            postal_code: DEFAULT_ADJUSTMENT_POSTAL.to_string(),
            percentage: DEFAULT_ADJUSTMENT_PERCENT,
        }
    }

    /// Guarded archive dry run at `cutoff`
    pub fn guarded_archive(cutoff: NaiveDate) -> Self {
        ScenarioSpec::GuardedArchive { cutoff }
    }

    /// Scenario family
    pub fn kind(&self) -> ScenarioKind {
        match self {
            ScenarioSpec::NonRepeatableRead { .. } => ScenarioKind::NonRepeatableRead,
            ScenarioSpec::PhantomRead { .. } => ScenarioKind::PhantomRead,
            ScenarioSpec::SerializationFailure { .. } => ScenarioKind::SerializationFailure,
            ScenarioSpec::BulkAdjustment { .. } => ScenarioKind::BulkAdjustment,
            ScenarioSpec::GuardedArchive { .. } => ScenarioKind::GuardedArchive,
        }
    }

    /// Name used in results: the family plus the distinguishing parameter.
    pub fn name(&self) -> String {
        match self {
            ScenarioSpec::NonRepeatableRead {
                reader_isolation, ..
            }
            | ScenarioSpec::PhantomRead {
                reader_isolation, ..
            } => format!("{}@{}", self.kind(), reader_isolation),
            ScenarioSpec::SerializationFailure { isolation, .. } => {
                format!("{}@{}", self.kind(), isolation)
            }
            ScenarioSpec::BulkAdjustment { postal_code, .. } => {
                format!("{}@{}", self.kind(), postal_code)
            }
            ScenarioSpec::GuardedArchive { cutoff } => format!("{}@{}", self.kind(), cutoff),
        }
    }

    /// Whether a correct store shows the scenario's anomaly.
    ///
    /// Utility scenarios count a broken invariant as their anomaly, so they
    /// never expect one.
    pub fn expected_anomaly(&self) -> bool {
        match self {
            ScenarioSpec::NonRepeatableRead {
                reader_isolation, ..
            }
            | ScenarioSpec::PhantomRead {
                reader_isolation, ..
            } => reader_isolation.permits_read_anomalies(),
            ScenarioSpec::SerializationFailure { .. } => true,
            ScenarioSpec::BulkAdjustment { .. } | ScenarioSpec::GuardedArchive { .. } => false,
        }
    }

    /// Reject parameters that cannot produce a meaningful run.
    pub fn validate(&self) -> Result<()> {
        match self {
            ScenarioSpec::NonRepeatableRead { delta, .. } => {
                if !delta.is_finite() || *delta == 0.0 {
                    return Err(HarnessError::InvalidScenario(format!(
                        "writer delta must be finite and non-zero, got {}",
                        delta
                    )));
                }
            }
            ScenarioSpec::PhantomRead {
                group_code,
                min_value,
                ..
            } => {
                if group_code.is_empty() {
                    return Err(HarnessError::InvalidScenario("empty group code".into()));
                }
                if !min_value.is_finite() {
                    return Err(HarnessError::InvalidScenario(format!(
                        "predicate minimum must be finite, got {}",
                        min_value
                    )));
                }
            }
            ScenarioSpec::SerializationFailure {
                isolation,
                group_code,
            } => {
                if !isolation.uses_transaction_snapshot() {
                    return Err(HarnessError::InvalidScenario(format!(
                        "serialization failure needs repeatable-read or serializable, got {}",
                        isolation
                    )));
                }
                if group_code.is_empty() {
                    return Err(HarnessError::InvalidScenario("empty group code".into()));
                }
            }
            ScenarioSpec::BulkAdjustment { .. } => {
                self.adjustment_factor()?;
            }
            ScenarioSpec::GuardedArchive { .. } => {}
        }
        Ok(())
    }

    /// Multiplicative factor of a bulk adjustment.
    ///
    /// Fails with `InvalidScenario` for other scenarios and for a factor that
    /// is not finite and positive.
    pub fn adjustment_factor(&self) -> Result<f64> {
        let ScenarioSpec::BulkAdjustment { percentage, .. } = self else {
            return Err(HarnessError::InvalidScenario(format!(
                "{} has no adjustment factor",
                self.kind()
            )));
        };
        let factor = 1.0 + percentage / 100.0;
        if !factor.is_finite() || factor <= 0.0 {
            return Err(HarnessError::InvalidScenario(format!(
                "adjustment of {}% gives factor {}; it must be finite and positive",
                percentage, factor
            )));
        }
        Ok(factor)
    }
}

impl fmt::Display for ScenarioSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}
