//! Convenient imports for txanomaly.
//!
//! ```ignore
//! use txanomaly::prelude::*;
//!
//! let harness = HarnessBuilder::new().build()?;
//! let report = harness.run_all(&default_suite(None));
//! ```

// Entry point
pub use crate::builder::HarnessBuilder;

// Error handling
pub use txanomaly_core::{ErrorKind, HarnessError, Result};

// Configuration
pub use txanomaly_core::{Backend, HarnessConfig, HarnessSettings, IsolationLevel, StoreConfig};

// Scenarios and their outcomes
pub use txanomaly_engine::{
    default_suite, Harness, Observed, RunReport, ScenarioKind, ScenarioResult, ScenarioSpec,
    ScenarioVerdict,
};
