//! Single-use rendezvous barrier
//!
//! A [`RendezvousBarrier`] releases its parties only once all of them have
//! arrived. Each party is a [`BarrierParty`] handle, so an arrival is recorded
//! at most once per party: waiting again before release keeps blocking and
//! never counts twice.
//!
//! ## Failure modes
//!
//! - A wait that reaches the deadline breaks the barrier. Every party already
//!   waiting and every party that arrives later gets `BarrierTimeout`.
//! - A party handle dropped before arriving breaks the barrier too, so a
//!   worker that fails early never leaves its peers waiting for the full
//!   timeout.
//! - Waiting after the barrier released returns `BarrierReused`. Allocate a
//!   fresh barrier per rendezvous point.
//!
//! ```text
//! Gathering ──(arrived == parties)──> Released
//!     │
//!     └──(deadline | party dropped)──> Broken
//! ```

use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use txanomaly_core::{HarnessError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Gathering,
    Released,
    Broken,
}

#[derive(Debug)]
struct BarrierState {
    phase: Phase,
    arrived: Vec<bool>,
    arrived_count: usize,
}

/// N-party rendezvous point
#[derive(Debug)]
pub struct RendezvousBarrier {
    parties: usize,
    timeout: Duration,
    state: Mutex<BarrierState>,
    released: Condvar,
}

/// Outcome of a successful wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BarrierWaitResult {
    /// True for exactly one party: the last to arrive
    pub is_leader: bool,
    /// Time spent blocked
    pub waited: Duration,
}

impl RendezvousBarrier {
    /// Barrier for `parties` parties whose waits give up after `timeout`.
    ///
    /// `parties` must be at least 1.
    pub fn new(parties: usize, timeout: Duration) -> Result<Arc<Self>> {
        if parties == 0 {
            return Err(HarnessError::InvalidScenario(
                "a barrier needs at least one party".into(),
            ));
        }
        Ok(Arc::new(RendezvousBarrier {
            parties,
            timeout,
            state: Mutex::new(BarrierState {
                phase: Phase::Gathering,
                arrived: vec![false; parties],
                arrived_count: 0,
            }),
            released: Condvar::new(),
        }))
    }

    /// Handle for party `index` (0-based).
    pub fn party(self: &Arc<Self>, index: usize) -> Result<BarrierParty> {
        if index >= self.parties {
            return Err(HarnessError::InvalidScenario(format!(
                "party {} out of range for a {}-party barrier",
                index, self.parties
            )));
        }
        Ok(BarrierParty {
            barrier: Arc::clone(self),
            index,
        })
    }

    /// Handles for every party, in index order.
    pub fn all_parties(self: &Arc<Self>) -> Vec<BarrierParty> {
        (0..self.parties)
            .map(|index| BarrierParty {
                barrier: Arc::clone(self),
                index,
            })
            .collect()
    }

    /// Number of parties required for release
    pub fn parties(&self) -> usize {
        self.parties
    }

    /// Parties that have arrived so far
    pub fn arrived(&self) -> usize {
        self.state.lock().arrived_count
    }

    /// Whether the rendezvous happened
    pub fn is_released(&self) -> bool {
        self.state.lock().phase == Phase::Released
    }

    /// Whether the rendezvous can no longer happen
    pub fn is_broken(&self) -> bool {
        self.state.lock().phase == Phase::Broken
    }

    fn timeout_error(&self, state: &BarrierState, started: Instant) -> HarnessError {
        HarnessError::BarrierTimeout {
            waited_ms: started.elapsed().as_millis() as u64,
            arrived: state.arrived_count,
            parties: self.parties,
        }
    }

    fn wait_as(&self, index: usize) -> Result<BarrierWaitResult> {
        let started = Instant::now();
        let deadline = started + self.timeout;
        let mut state = self.state.lock();

        match state.phase {
            Phase::Released => return Err(HarnessError::BarrierReused),
            Phase::Broken => return Err(self.timeout_error(&state, started)),
            Phase::Gathering => {}
        }

        if !state.arrived[index] {
            state.arrived[index] = true;
            state.arrived_count += 1;
        }

        if state.arrived_count == self.parties {
            state.phase = Phase::Released;
            self.released.notify_all();
            debug!(party = index, parties = self.parties, "barrier released");
            return Ok(BarrierWaitResult {
                is_leader: true,
                waited: started.elapsed(),
            });
        }

        loop {
            let timed_out = self.released.wait_until(&mut state, deadline).timed_out();
            match state.phase {
                Phase::Released => {
                    return Ok(BarrierWaitResult {
                        is_leader: false,
                        waited: started.elapsed(),
                    })
                }
                Phase::Broken => return Err(self.timeout_error(&state, started)),
                Phase::Gathering if timed_out => {
                    state.phase = Phase::Broken;
                    self.released.notify_all();
                    warn!(
                        party = index,
                        arrived = state.arrived_count,
                        parties = self.parties,
                        "barrier timed out"
                    );
                    return Err(self.timeout_error(&state, started));
                }
                // Spurious wakeup
                Phase::Gathering => {}
            }
        }
    }

    fn abandon(&self, index: usize) {
        let mut state = self.state.lock();
        if state.phase == Phase::Gathering && !state.arrived[index] {
            state.phase = Phase::Broken;
            self.released.notify_all();
            debug!(party = index, "barrier party abandoned");
        }
    }
}

/// One party's handle on a barrier
///
/// Dropping a handle that never arrived breaks the barrier.
#[derive(Debug)]
pub struct BarrierParty {
    barrier: Arc<RendezvousBarrier>,
    index: usize,
}

impl BarrierParty {
    /// Arrive and block until every party has arrived, the barrier breaks, or
    /// the barrier's timeout elapses.
    pub fn wait(&self) -> Result<BarrierWaitResult> {
        self.barrier.wait_as(self.index)
    }

    /// Party index
    pub fn index(&self) -> usize {
        self.index
    }

    /// Barrier this handle belongs to
    pub fn barrier(&self) -> &Arc<RendezvousBarrier> {
        &self.barrier
    }
}

impl Drop for BarrierParty {
    fn drop(&mut self) {
        self.barrier.abandon(self.index);
    }
}
