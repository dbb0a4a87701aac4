//! Harness configuration
//!
//! Configuration is immutable once built and passed explicitly: the store
//! factory receives a [`StoreConfig`], the orchestrator receives
//! [`HarnessSettings`]. Nothing reads process-wide state.
//!
//! A TOML file can supply both sections; every field has a default.
//!
//! ```toml
//! [store]
//! backend = "postgres"
//! host = "localhost"
//! port = 5433
//! dbname = "real_estate_db"
//!
//! [harness]
//! grace_delay_ms = 1000
//! commit_stagger_ms = 300
//! ```

use crate::error::{HarnessError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

// ============================================================================
// Store configuration
// ============================================================================

/// Which Store Client implementation to open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// In-process multi-version reference store, seeded with synthetic rows
    Memory,
    /// PostgreSQL through the `postgres` feature
    Postgres,
}

impl Default for Backend {
    fn default() -> Self {
        Backend::Memory
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Memory => write!(f, "memory"),
            Backend::Postgres => write!(f, "postgres"),
        }
    }
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "mem" => Ok(Backend::Memory),
            "postgres" | "postgresql" | "pg" => Ok(Backend::Postgres),
            _ => Err(format!("unknown backend: {}", s)),
        }
    }
}

/// Connection parameters handed to the Store Client factory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Backend to open (default: memory)
    #[serde(default)]
    pub backend: Backend,

    /// Database host (default: "localhost")
    #[serde(default = "default_host")]
    pub host: String,

    /// Database port (default: 5433)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Database name (default: "real_estate_db")
    #[serde(default = "default_dbname")]
    pub dbname: String,

    /// User name (default: "user")
    #[serde(default = "default_user")]
    pub user: String,

    /// Password (default: "password")
    #[serde(default = "default_password")]
    pub password: String,

    /// Rows to generate when the memory backend starts (default: 2000)
    #[serde(default = "default_seed_rows")]
    pub seed_rows: usize,

    /// RNG seed for the generated rows (default: 2019)
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    5433
}

fn default_dbname() -> String {
    "real_estate_db".to_string()
}

fn default_user() -> String {
    "user".to_string()
}

fn default_password() -> String {
    "password".to_string()
}

fn default_seed_rows() -> usize {
    2000
}

fn default_seed() -> u64 {
    2019
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            backend: Backend::default(),
            host: default_host(),
            port: default_port(),
            dbname: default_dbname(),
            user: default_user(),
            password: default_password(),
            seed_rows: default_seed_rows(),
            seed: default_seed(),
        }
    }
}

impl StoreConfig {
    /// Memory backend with the given number of generated rows.
    pub fn memory(seed_rows: usize) -> Self {
        StoreConfig {
            backend: Backend::Memory,
            seed_rows,
            ..Default::default()
        }
    }

    /// `host:port/dbname`, for logs. Never includes credentials.
    pub fn display_target(&self) -> String {
        match self.backend {
            Backend::Memory => format!("memory ({} seeded rows)", self.seed_rows),
            Backend::Postgres => format!("{}:{}/{}", self.host, self.port, self.dbname),
        }
    }
}

// ============================================================================
// Harness timing
// ============================================================================

/// Timing parameters of the orchestrator
///
/// Stored as milliseconds so the TOML file stays plain integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarnessSettings {
    /// Deadline for every barrier wait (default: 10 000)
    #[serde(default = "default_barrier_timeout_ms")]
    pub barrier_timeout_ms: u64,

    /// Delay between barrier release and a reader's second read, so the
    /// concurrent commit is externally visible (default: 1000)
    #[serde(default = "default_grace_delay_ms")]
    pub grace_delay_ms: u64,

    /// Delay before the second updater's write in the serialization scenario
    /// (default: 300)
    #[serde(default = "default_commit_stagger_ms")]
    pub commit_stagger_ms: u64,

    /// Deadline for every worker to reach a terminal state (default: 30 000)
    #[serde(default = "default_join_timeout_ms")]
    pub join_timeout_ms: u64,
}

fn default_barrier_timeout_ms() -> u64 {
    10_000
}

fn default_grace_delay_ms() -> u64 {
    1_000
}

fn default_commit_stagger_ms() -> u64 {
    300
}

fn default_join_timeout_ms() -> u64 {
    30_000
}

impl Default for HarnessSettings {
    fn default() -> Self {
        HarnessSettings {
            barrier_timeout_ms: default_barrier_timeout_ms(),
            grace_delay_ms: default_grace_delay_ms(),
            commit_stagger_ms: default_commit_stagger_ms(),
            join_timeout_ms: default_join_timeout_ms(),
        }
    }
}

impl HarnessSettings {
    /// Short delays for tests against the in-process store
    pub fn fast() -> Self {
        HarnessSettings {
            barrier_timeout_ms: 2_000,
            grace_delay_ms: 50,
            commit_stagger_ms: 50,
            join_timeout_ms: 5_000,
        }
    }

    /// Barrier deadline
    pub fn barrier_timeout(&self) -> Duration {
        Duration::from_millis(self.barrier_timeout_ms)
    }

    /// Grace delay before dependent reads
    pub fn grace_delay(&self) -> Duration {
        Duration::from_millis(self.grace_delay_ms)
    }

    /// Stagger before the second commit attempt
    pub fn commit_stagger(&self) -> Duration {
        Duration::from_millis(self.commit_stagger_ms)
    }

    /// Join deadline
    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }

    /// Reject settings that cannot produce a meaningful interleaving.
    pub fn validate(&self) -> Result<()> {
        if self.barrier_timeout_ms == 0 {
            return Err(HarnessError::Configuration(
                "barrier_timeout_ms must be positive".into(),
            ));
        }
        if self.join_timeout_ms <= self.barrier_timeout_ms {
            return Err(HarnessError::Configuration(format!(
                "join_timeout_ms ({}) must exceed barrier_timeout_ms ({})",
                self.join_timeout_ms, self.barrier_timeout_ms
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Combined file format
// ============================================================================

/// Contents of a configuration file
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// Store section
    #[serde(default)]
    pub store: StoreConfig,
    /// Timing section
    #[serde(default)]
    pub harness: HarnessSettings,
}

impl HarnessConfig {
    /// Parse TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: HarnessConfig = toml::from_str(text)?;
        config.harness.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            HarnessError::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&text)
    }
}
