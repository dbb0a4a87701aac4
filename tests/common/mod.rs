//! Shared helpers for the integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use txanomaly::{Harness, HarnessBuilder, HarnessSettings};
use txanomaly_core::DomainRecord;
use txanomaly_storage::{MemoryClient, MemoryStore, StoreClient};

/// Seed used by every helper so failures reproduce
pub const SEED: u64 = 2019;

/// Rows generated for a default test store
pub const ROWS: usize = 300;

/// Seeded memory store plus a harness with test timings.
pub fn memory_harness() -> (Arc<MemoryStore>, Harness) {
    memory_harness_with(ROWS, HarnessSettings::fast())
}

/// Seeded memory store plus a harness with the given size and timings.
pub fn memory_harness_with(rows: usize, settings: HarnessSettings) -> (Arc<MemoryStore>, Harness) {
    let client = MemoryClient::seeded(rows, SEED);
    let store = Arc::clone(client.store());
    let harness = HarnessBuilder::new()
        .settings(settings)
        .client(Arc::new(client))
        .build()
        .expect("memory harness");
    (store, harness)
}

/// Harness over an arbitrary client, with test timings.
pub fn harness_over(client: Arc<dyn StoreClient>) -> Harness {
    HarnessBuilder::new()
        .fast()
        .client(client)
        .build()
        .expect("harness")
}

/// Snapshot of every committed row, for before/after comparisons.
pub fn snapshot(store: &MemoryStore) -> Vec<DomainRecord> {
    store.committed_records()
}
