//! Concurrency layer for txanomaly
//!
//! This crate provides the pieces every scenario is assembled from:
//! - RendezvousBarrier: single-use N-party rendezvous with deadlines
//! - TransactionContext: one session, one transaction, explicit lifecycle
//! - WorkUnit: closure-scoped transaction (commit on Ok, rollback on Err)

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod barrier;
pub mod context;
pub mod work_unit;

pub use barrier::{BarrierParty, BarrierWaitResult, RendezvousBarrier};
pub use context::{ContextState, TransactionContext};
pub use work_unit::{PhaseTiming, UnitOutcome, UnitReport, UnitScope, WorkUnit};
