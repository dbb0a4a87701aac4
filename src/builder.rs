//! Harness construction
//!
//! [`HarnessBuilder`] turns a [`HarnessConfig`] (or a few builder calls) into
//! a ready [`Harness`]: it picks the store backend, seeds the in-memory store
//! when that is the backend, and validates the timing settings.

use std::path::Path;
use std::sync::Arc;
use tracing::info;
use txanomaly_core::{Backend, HarnessConfig, HarnessError, HarnessSettings, Result, StoreConfig};
use txanomaly_engine::Harness;
use txanomaly_storage::{MemoryClient, StoreClient};

/// Builder for a [`Harness`].
///
/// # Example
///
/// ```ignore
/// // In-memory store, test timings
/// let harness = HarnessBuilder::new().memory(500).fast().build()?;
///
/// // PostgreSQL, from a config file
/// let harness = HarnessBuilder::load("txanomaly.toml")?.build()?;
/// ```
pub struct HarnessBuilder {
    config: HarnessConfig,
    client: Option<Arc<dyn StoreClient>>,
}

impl HarnessBuilder {
    /// Builder with default configuration (seeded memory store, default timings).
    pub fn new() -> Self {
        Self::from_config(HarnessConfig::default())
    }

    /// Builder starting from an existing configuration.
    pub fn from_config(config: HarnessConfig) -> Self {
        HarnessBuilder {
            config,
            client: None,
        }
    }

    /// Builder starting from a TOML configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::from_config(HarnessConfig::load(path)?))
    }

    /// Use an in-memory store seeded with `rows` records.
    pub fn memory(mut self, rows: usize) -> Self {
        self.config.store.backend = Backend::Memory;
        self.config.store.seed_rows = rows;
        self
    }

    /// Seed for the in-memory dataset.
    pub fn seed(mut self, seed: u64) -> Self {
        self.config.store.seed = seed;
        self
    }

    /// Use the given store settings.
    pub fn store(mut self, store: StoreConfig) -> Self {
        self.config.store = store;
        self
    }

    /// Use the given timing settings.
    pub fn settings(mut self, settings: HarnessSettings) -> Self {
        self.config.harness = settings;
        self
    }

    /// Short delays and timeouts, for tests.
    pub fn fast(self) -> Self {
        self.settings(HarnessSettings::fast())
    }

    /// Run against an already-built client instead of the configured backend.
    pub fn client(mut self, client: Arc<dyn StoreClient>) -> Self {
        self.client = Some(client);
        self
    }

    /// Configuration the harness will be built from.
    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Build the harness.
    pub fn build(self) -> Result<Harness> {
        let client = match self.client {
            Some(client) => client,
            None => connect(&self.config.store)?,
        };
        info!(store = %client.describe(), "harness ready");
        Harness::new(client, self.config.harness)
    }
}

impl Default for HarnessBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Client for the configured backend.
///
/// The PostgreSQL backend is only available when built with the `postgres`
/// feature.
pub fn connect(store: &StoreConfig) -> Result<Arc<dyn StoreClient>> {
    match store.backend {
        Backend::Memory => Ok(Arc::new(MemoryClient::seeded(store.seed_rows, store.seed))),
        #[cfg(feature = "postgres")]
        Backend::Postgres => Ok(Arc::new(txanomaly_storage::PostgresClient::new(
            store.clone(),
        ))),
        #[cfg(not(feature = "postgres"))]
        Backend::Postgres => Err(HarnessError::Configuration(
            "this build has no postgres support; rebuild with --features postgres".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use txanomaly_core::ErrorKind;

    #[test]
    fn test_memory_builder() {
        let harness = HarnessBuilder::new().memory(25).seed(3).fast().build().unwrap();
        assert_eq!(*harness.settings(), HarnessSettings::fast());
        assert!(harness.client().describe().contains("25"));
    }

    #[test]
    fn test_invalid_settings_fail_the_build() {
        let settings = HarnessSettings {
            join_timeout_ms: 1,
            ..HarnessSettings::default()
        };
        let err = HarnessBuilder::new().settings(settings).build().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[cfg(not(feature = "postgres"))]
    #[test]
    fn test_postgres_needs_the_feature() {
        let mut store = StoreConfig::default();
        store.backend = Backend::Postgres;
        let err = HarnessBuilder::new().store(store).build().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }
}
