//! The cluster configuration manager seam
//!
//! The manager owns the authoritative copy of the configuration and
//! replicates it across the cluster; how it does so is outside this crate.
//! The coordinator only ever reads snapshots and submits atomic
//! read-modify-write transformers.

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::ConfigurationResult;
use crate::state::ClusterConfiguration;

/// Atomic update applied to the authoritative configuration. Returning an
/// error rejects the update and leaves the stored configuration untouched.
pub type ConfigurationUpdater =
    Box<dyn FnOnce(ClusterConfiguration) -> ConfigurationResult<ClusterConfiguration> + Send>;

/// Owns and durably replicates the authoritative cluster configuration
#[async_trait]
pub trait ClusterConfigurationManager: Send + Sync {
    /// The last known configuration
    async fn get_cluster_configuration(&self) -> ConfigurationResult<ClusterConfiguration>;

    /// Atomically read-modify-write the authoritative configuration.
    ///
    /// The updater runs against the latest stored value; its precondition
    /// checks must be repeated inside it, because the configuration may have
    /// changed since the caller last read it.
    async fn update_cluster_configuration(
        &self,
        updater: ConfigurationUpdater,
    ) -> ConfigurationResult<ClusterConfiguration>;
}

/// Manager keeping the configuration in process memory.
///
/// The natural backend for tests and single-process embeddings; a real
/// deployment replaces this with a replicated implementation.
pub struct InMemoryConfigurationManager {
    configuration: Mutex<ClusterConfiguration>,
}

impl InMemoryConfigurationManager {
    /// Create a manager holding the given initial configuration
    pub fn new(initial: ClusterConfiguration) -> Self {
        Self {
            configuration: Mutex::new(initial),
        }
    }
}

#[async_trait]
impl ClusterConfigurationManager for InMemoryConfigurationManager {
    async fn get_cluster_configuration(&self) -> ConfigurationResult<ClusterConfiguration> {
        Ok(self.configuration.lock().clone())
    }

    async fn update_cluster_configuration(
        &self,
        updater: ConfigurationUpdater,
    ) -> ConfigurationResult<ClusterConfiguration> {
        let mut stored = self.configuration.lock();
        let updated = updater(stored.clone())?;
        *stored = updated.clone();
        Ok(updated)
    }
}
