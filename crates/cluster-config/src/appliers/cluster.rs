//! Appliers for cluster-wide operations

use std::sync::Arc;

use async_trait::async_trait;

use crate::appliers::{ConfigurationChangeApplier, ConfigurationTransformer};
use crate::error::{ConfigurationError, ConfigurationResult};
use crate::executors::ClusterChangeExecutor;
use crate::state::ClusterConfiguration;

/// Purges historical storage once no partitions remain
pub(super) struct DeleteHistoryApplier {
    executor: Arc<dyn ClusterChangeExecutor>,
}

impl DeleteHistoryApplier {
    pub(super) fn new(executor: Arc<dyn ClusterChangeExecutor>) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl ConfigurationChangeApplier for DeleteHistoryApplier {
    fn init(
        &mut self,
        current: &ClusterConfiguration,
    ) -> ConfigurationResult<ConfigurationTransformer> {
        let hosting = current
            .members()
            .iter()
            .find(|(_, member)| !member.partitions.is_empty());
        if let Some((member_id, member)) = hosting {
            return Err(ConfigurationError::InvalidRequest(format!(
                "history can only be deleted once no partitions remain, member \
                 {member_id} still hosts {}",
                member.partitions.len()
            )));
        }
        Ok(Box::new(|configuration| configuration))
    }

    async fn apply(&mut self) -> ConfigurationResult<ConfigurationTransformer> {
        self.executor.delete_history().await?;
        Ok(Box::new(|configuration| configuration))
    }
}

/// Bumps the cluster incarnation number
pub(super) struct UpdateIncarnationNumberApplier {
    // Captured by init so that a retried apply cannot double-increment
    next_incarnation: Option<u64>,
}

impl UpdateIncarnationNumberApplier {
    pub(super) fn new() -> Self {
        Self {
            next_incarnation: None,
        }
    }
}

#[async_trait]
impl ConfigurationChangeApplier for UpdateIncarnationNumberApplier {
    fn init(
        &mut self,
        current: &ClusterConfiguration,
    ) -> ConfigurationResult<ConfigurationTransformer> {
        self.next_incarnation = Some(current.incarnation_number() + 1);
        Ok(Box::new(|configuration| configuration))
    }

    async fn apply(&mut self) -> ConfigurationResult<ConfigurationTransformer> {
        let next = self.next_incarnation.ok_or_else(|| {
            ConfigurationError::Internal("apply called before init".to_string())
        })?;
        Ok(Box::new(move |configuration| {
            configuration.with_incarnation_number(next)
        }))
    }
}
