//! Worker threads for work units
//!
//! Every role runs on its own named OS thread. Finished workers send their
//! report over a channel; the orchestrator waits on that channel up to a
//! single deadline, so a worker that never finishes is reported instead of
//! blocking the run.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use txanomaly_concurrency::UnitReport;
use txanomaly_core::{HarnessError, Result};

/// How one worker ended
#[derive(Debug)]
pub(crate) enum WorkerExit<T> {
    /// The unit ran to a terminal state
    Finished(UnitReport<T>),
    /// The worker thread panicked or did not finish in time
    Lost(HarnessError),
}

type Message<T> = (String, thread::Result<UnitReport<T>>);

/// Set of worker threads sharing one result channel
pub(crate) struct Workers<T> {
    tx: Sender<Message<T>>,
    rx: Receiver<Message<T>>,
    roles: Vec<String>,
    handles: Vec<(String, thread::JoinHandle<()>)>,
}

impl<T: Send + 'static> Workers<T> {
    pub(crate) fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Workers {
            tx,
            rx,
            roles: Vec::new(),
            handles: Vec::new(),
        }
    }

    /// Start `job` on a thread named after `role`.
    pub(crate) fn spawn<F>(&mut self, role: &str, job: F) -> Result<()>
    where
        F: FnOnce() -> UnitReport<T> + Send + 'static,
    {
        let tx = self.tx.clone();
        let name = role.to_string();
        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                let outcome = panic::catch_unwind(AssertUnwindSafe(job));
                // The receiver is gone only if the orchestrator gave up on us
                let _ = tx.send((name, outcome));
            })
            .map_err(|e| {
                HarnessError::Configuration(format!("cannot spawn worker {}: {}", role, e))
            })?;
        debug!(role, "worker spawned");
        self.roles.push(role.to_string());
        self.handles.push((role.to_string(), handle));
        Ok(())
    }

    /// Wait for every worker until `timeout` elapses.
    ///
    /// Exits come back in spawn order. Workers still running at the deadline
    /// are detached and reported as `WorkerHung`.
    pub(crate) fn join(self, timeout: Duration) -> Vec<(String, WorkerExit<T>)> {
        let Workers {
            tx,
            rx,
            roles,
            handles,
        } = self;
        drop(tx);

        let deadline = Instant::now() + timeout;
        let mut exits: Vec<(String, WorkerExit<T>)> = Vec::with_capacity(roles.len());
        while exits.len() < roles.len() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match rx.recv_timeout(remaining) {
                Ok((role, Ok(report))) => exits.push((role, WorkerExit::Finished(report))),
                Ok((role, Err(payload))) => {
                    let message = panic_message(payload.as_ref());
                    warn!(role = %role, message = %message, "worker panicked");
                    let err = HarnessError::WorkerPanicked {
                        role: role.clone(),
                        message,
                    };
                    exits.push((role, WorkerExit::Lost(err)));
                }
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        let hung: Vec<String> = roles
            .iter()
            .filter(|role| !exits.iter().any(|(r, _)| r == *role))
            .cloned()
            .collect();
        for role in &hung {
            warn!(role = %role, timeout_ms = timeout.as_millis() as u64, "worker hung");
            let err = HarnessError::WorkerHung {
                role: role.clone(),
                timeout_ms: timeout.as_millis() as u64,
            };
            exits.push((role.clone(), WorkerExit::Lost(err)));
        }

        // Hung threads are left detached
        for (role, handle) in handles {
            if !hung.contains(&role) && handle.join().is_err() {
                debug!(role = %role, "worker thread ended with a panic after reporting");
            }
        }

        exits.sort_by_key(|(role, _)| roles.iter().position(|r| r == role));
        exits
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
