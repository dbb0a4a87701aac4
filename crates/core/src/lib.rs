//! Core types for txanomaly
//!
//! This crate defines the vocabulary shared by every other crate:
//! - [`IsolationLevel`]: the three isolation levels a session can request
//! - [`DomainRecord`]: the shared row under test
//! - [`Statement`] / [`ExecResult`]: the typed statement catalogue and its results
//! - [`StoreError`] / [`HarnessError`]: the error taxonomy with machine-checkable kinds
//! - [`HarnessConfig`]: immutable store and timing configuration

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod isolation;
pub mod record;
pub mod statement;

pub use config::{Backend, HarnessConfig, HarnessSettings, StoreConfig};
pub use error::{ErrorKind, HarnessError, Result, StoreError, StoreErrorKind, StoreResult};
pub use isolation::IsolationLevel;
pub use record::{DomainRecord, NewRecord, RecordId};
pub use statement::{Datum, ExecResult, Row, Statement};
