//! Scenario engine for txanomaly
//!
//! This crate turns the building blocks of `txanomaly-concurrency` into
//! complete scenarios:
//! - [`ScenarioSpec`]: typed parameters for each scenario
//! - [`Harness`]: runs scenarios on worker threads and joins them with a deadline
//! - [`RestoreManager`]: captures a baseline and puts it back afterwards
//! - [`ScenarioResult`] / [`RunReport`]: structured outcomes and their rendering
//!
//! # Flow
//!
//! ```text
//! Harness::run(spec)
//!   ├─ validate spec
//!   ├─ RestoreManager::capture_*     (autocommit session)
//!   ├─ spawn one thread per role     (WorkUnit + shared barrier)
//!   ├─ join over a channel           (join_timeout)
//!   ├─ RestoreManager::restore/verify
//!   └─ ScenarioResult
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod baseline;
pub mod orchestrator;
pub mod report;
pub mod result;
pub mod scenario;
mod scenarios;
mod workers;

pub use baseline::{Baseline, RestoreManager};
pub use orchestrator::Harness;
pub use report::RunReport;
pub use result::{ErrorRecord, Observed, RoleObservation, ScenarioResult, ScenarioVerdict};
pub use scenario::{default_archive_cutoffs, default_suite, RecordTarget, ScenarioKind, ScenarioSpec};
pub use scenarios::bulk_adjustment::ROUND_TRIP_TOLERANCE;
