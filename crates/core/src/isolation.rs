//! Transaction isolation levels
//!
//! The harness probes exactly three levels. Each level fixes a visibility rule
//! that the scenarios check from the outside:
//!
//! | Level | Read snapshot | Non-repeatable read | Phantom read |
//! |-------|---------------|---------------------|--------------|
//! | ReadCommitted | per statement | possible | possible |
//! | RepeatableRead | per transaction | prevented | prevented |
//! | Serializable | per transaction | prevented | prevented |

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Isolation level requested by a session before its first statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IsolationLevel {
    /// Every statement sees data committed before the statement started.
    ReadCommitted,
    /// Every statement sees data committed before the transaction's first statement.
    RepeatableRead,
    /// Repeatable read plus commit-time validation of the read set.
    Serializable,
}

impl IsolationLevel {
    /// All levels, weakest first.
    pub const ALL: [IsolationLevel; 3] = [
        IsolationLevel::ReadCommitted,
        IsolationLevel::RepeatableRead,
        IsolationLevel::Serializable,
    ];

    /// Kebab-case name used in configuration files and reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            IsolationLevel::ReadCommitted => "read-committed",
            IsolationLevel::RepeatableRead => "repeatable-read",
            IsolationLevel::Serializable => "serializable",
        }
    }

    /// SQL spelling, as accepted by `BEGIN ISOLATION LEVEL ...`.
    pub fn sql_name(&self) -> &'static str {
        match self {
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        }
    }

    /// Whether reads within one transaction share a single snapshot.
    pub fn uses_transaction_snapshot(&self) -> bool {
        !matches!(self, IsolationLevel::ReadCommitted)
    }

    /// Whether a read-committed reader is expected to observe
    /// non-repeatable reads and phantoms at this level.
    pub fn permits_read_anomalies(&self) -> bool {
        matches!(self, IsolationLevel::ReadCommitted)
    }
}

impl Default for IsolationLevel {
    fn default() -> Self {
        IsolationLevel::ReadCommitted
    }
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IsolationLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace(['_', ' '], "-");
        match normalized.as_str() {
            "read-committed" | "rc" => Ok(IsolationLevel::ReadCommitted),
            "repeatable-read" | "rr" => Ok(IsolationLevel::RepeatableRead),
            "serializable" | "ser" => Ok(IsolationLevel::Serializable),
            _ => Err(format!("unknown isolation level: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_accepts_sql_and_short_spellings() {
        assert_eq!(
            "READ COMMITTED".parse::<IsolationLevel>().unwrap(),
            IsolationLevel::ReadCommitted
        );
        assert_eq!(
            "repeatable_read".parse::<IsolationLevel>().unwrap(),
            IsolationLevel::RepeatableRead
        );
        assert_eq!("ser".parse::<IsolationLevel>().unwrap(), IsolationLevel::Serializable);
        assert!("snapshot".parse::<IsolationLevel>().is_err());
    }

    #[test]
    fn test_display_round_trips_through_parse() {
        for level in IsolationLevel::ALL {
            assert_eq!(level.to_string().parse::<IsolationLevel>().unwrap(), level);
        }
    }

    #[test]
    fn test_only_read_committed_permits_read_anomalies() {
        assert!(IsolationLevel::ReadCommitted.permits_read_anomalies());
        assert!(!IsolationLevel::RepeatableRead.permits_read_anomalies());
        assert!(!IsolationLevel::Serializable.permits_read_anomalies());
    }

    #[test]
    fn test_serde_uses_kebab_case() {
        let json = serde_json::to_string(&IsolationLevel::RepeatableRead).unwrap();
        assert_eq!(json, "\"repeatable-read\"");
    }
}
