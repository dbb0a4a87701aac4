//! Store layer for txanomaly
//!
//! This crate provides the store client interface and its implementations:
//! - StoreClient / Session: the only way the harness reaches a store
//! - MemoryStore: multi-version in-process reference store
//! - VersionTable: DashMap-sharded version chains with a global clock
//! - Commit-time write-set and read-set validation
//! - Deterministic dataset seeding
//! - PostgresClient (feature `postgres`)

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod memory;
pub mod seed;
pub mod session;
pub mod validation;
pub mod versions;

#[cfg(feature = "postgres")]
pub mod pg;

pub use memory::{MemoryClient, MemorySession, MemoryStore};
pub use session::{Session, StoreClient};
pub use validation::{validate_read_set, validate_write_set, ConflictType, ValidationResult};
pub use versions::{RowVersion, VersionTable};

#[cfg(feature = "postgres")]
pub use pg::{PostgresClient, PostgresSession};
