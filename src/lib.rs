//! # txanomaly
//!
//! A harness that reproduces transaction-isolation anomalies against a
//! transactional store and checks that the store behaves the way its
//! isolation level promises.
//!
//! Each scenario runs two or more units of work on their own threads,
//! interleaves them at a barrier, records what each unit saw, and then puts
//! the shared rows back exactly as they were.
//!
//! ## Quick Start
//!
//! ```ignore
//! use txanomaly::prelude::*;
//!
//! // Seeded in-memory store with short timings
//! let harness = HarnessBuilder::new().memory(500).fast().build()?;
//!
//! // Every scenario at every level it is defined for
//! let report = harness.run_all(&default_suite(None));
//! println!("{}", report.render_table());
//! assert!(report.all_passed());
//! ```
//!
//! ## Scenarios
//!
//! - [`ScenarioKind::NonRepeatableRead`]: a reader re-reads a row a writer committed in between
//! - [`ScenarioKind::PhantomRead`]: a reader re-counts a predicate after a matching insert
//! - [`ScenarioKind::SerializationFailure`]: two updaters race on the same rows
//! - [`ScenarioKind::BulkAdjustment`]: a guarded scale-and-revert round trip
//! - [`ScenarioKind::GuardedArchive`]: a guarded delete that always rolls back
//!
//! ## Backends
//!
//! The in-memory store ships with the crate. PostgreSQL needs the
//! `postgres` feature.

#![warn(missing_docs)]

mod builder;

pub mod prelude;

pub use builder::{connect, HarnessBuilder};

pub use txanomaly_core::{
    Backend, ErrorKind, HarnessConfig, HarnessError, HarnessSettings, IsolationLevel, Result,
    StoreConfig,
};
pub use txanomaly_engine::{
    default_archive_cutoffs, default_suite, Harness, Observed, RecordTarget, RunReport,
    ScenarioKind, ScenarioResult, ScenarioSpec, ScenarioVerdict,
};
pub use txanomaly_storage::StoreClient;
