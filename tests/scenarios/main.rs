//! Scenario Integration Tests
//!
//! Runs every scenario through the public facade against the in-memory
//! reference store and checks the observable properties:
//!
//! 1. Read anomalies appear at read-committed and vanish under a snapshot
//! 2. Exactly one of two racing updaters commits
//! 3. The utility scenarios leave their invariants intact
//! 4. Every run puts the shared rows back as they were
//! 5. Harness failures stay distinct from anomaly observations
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test --test scenarios
//! cargo test --test scenarios read_anomalies::
//! ```

#[path = "../common/mod.rs"]
mod common;

mod end_to_end;
mod failures;
mod read_anomalies;
mod serialization;
mod utility;
