//! Appliers for partition scale-up and routing state updates

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;

use crate::appliers::{ConfigurationChangeApplier, ConfigurationTransformer};
use crate::error::{ConfigurationError, ConfigurationResult};
use crate::executors::PartitionScalingChangeExecutor;
use crate::state::{ClusterConfiguration, RequestHandling, RoutingState};
use crate::types::PartitionId;

fn routing_of(
    current: &ClusterConfiguration,
) -> ConfigurationResult<&RoutingState> {
    current.routing_state().ok_or_else(|| {
        ConfigurationError::InvalidRequest(
            "routing state is not initialized".to_string(),
        )
    })
}

/// Begins a partition scale-up by marking the new partitions inactive
pub(super) struct StartPartitionScaleUpApplier {
    desired_partition_count: u32,
    executor: Arc<dyn PartitionScalingChangeExecutor>,
}

impl StartPartitionScaleUpApplier {
    pub(super) fn new(
        desired_partition_count: u32,
        executor: Arc<dyn PartitionScalingChangeExecutor>,
    ) -> Self {
        Self {
            desired_partition_count,
            executor,
        }
    }
}

#[async_trait]
impl ConfigurationChangeApplier for StartPartitionScaleUpApplier {
    fn init(
        &mut self,
        current: &ClusterConfiguration,
    ) -> ConfigurationResult<ConfigurationTransformer> {
        let desired = self.desired_partition_count;
        match &routing_of(current)?.request_handling {
            RequestHandling::AllPartitions { partition_count } => {
                if desired <= *partition_count {
                    return Err(ConfigurationError::InvalidRequest(format!(
                        "cannot scale up to {desired} partitions, the cluster \
                         already has {partition_count}"
                    )));
                }
                Ok(Box::new(|configuration| configuration))
            }
            RequestHandling::ActivePartitions {
                base_partition_count,
                additional_active_partitions,
                inactive_partitions,
            } => {
                // Idempotent retry: accept a scale-up towards the same target
                // that a previous attempt of this operation already started
                let expected_new: BTreeSet<PartitionId> = (base_partition_count + 1..=desired)
                    .map(PartitionId::new)
                    .collect();
                let new_partitions: BTreeSet<PartitionId> = additional_active_partitions
                    .union(inactive_partitions)
                    .copied()
                    .collect();
                if *base_partition_count < desired && new_partitions == expected_new {
                    Ok(Box::new(|configuration| configuration))
                } else {
                    Err(ConfigurationError::InvalidRequest(format!(
                        "cannot scale up to {desired} partitions, another \
                         scale-up is already in progress"
                    )))
                }
            }
        }
    }

    async fn apply(&mut self) -> ConfigurationResult<ConfigurationTransformer> {
        self.executor
            .initiate_scale_up(self.desired_partition_count)
            .await?;
        let desired = self.desired_partition_count;
        Ok(Box::new(move |configuration| {
            configuration.update_routing_state(|routing| routing.begin_scale_up(desired))
        }))
    }
}

/// Waits for data redistribution and activates the redistributed partitions
pub(super) struct AwaitRedistributionCompletionApplier {
    desired_partition_count: u32,
    partitions_to_redistribute: BTreeSet<PartitionId>,
    executor: Arc<dyn PartitionScalingChangeExecutor>,
}

impl AwaitRedistributionCompletionApplier {
    pub(super) fn new(
        desired_partition_count: u32,
        partitions_to_redistribute: BTreeSet<PartitionId>,
        executor: Arc<dyn PartitionScalingChangeExecutor>,
    ) -> Self {
        Self {
            desired_partition_count,
            partitions_to_redistribute,
            executor,
        }
    }
}

#[async_trait]
impl ConfigurationChangeApplier for AwaitRedistributionCompletionApplier {
    fn init(
        &mut self,
        current: &ClusterConfiguration,
    ) -> ConfigurationResult<ConfigurationTransformer> {
        match &routing_of(current)?.request_handling {
            RequestHandling::ActivePartitions { .. } => {
                Ok(Box::new(|configuration| configuration))
            }
            RequestHandling::AllPartitions { partition_count }
                if *partition_count == self.desired_partition_count =>
            {
                // A previous attempt of this operation already completed the
                // redistribution
                Ok(Box::new(|configuration| configuration))
            }
            RequestHandling::AllPartitions { partition_count } => {
                Err(ConfigurationError::InvalidRequest(format!(
                    "no scale-up towards {} partitions is in progress, all {} \
                     partitions are active",
                    self.desired_partition_count, partition_count
                )))
            }
        }
    }

    async fn apply(&mut self) -> ConfigurationResult<ConfigurationTransformer> {
        self.executor
            .await_redistribution_completion(
                self.desired_partition_count,
                &self.partitions_to_redistribute,
            )
            .await?;
        let desired = self.desired_partition_count;
        let partitions = self.partitions_to_redistribute.clone();
        Ok(Box::new(move |configuration| {
            configuration
                .update_routing_state(|routing| routing.activate_partitions(desired, &partitions))
        }))
    }
}

/// Waits for correlated messages to be relocated to the new partitions
pub(super) struct AwaitRelocationCompletionApplier {
    desired_partition_count: u32,
    partitions_to_relocate: BTreeSet<PartitionId>,
    executor: Arc<dyn PartitionScalingChangeExecutor>,
}

impl AwaitRelocationCompletionApplier {
    pub(super) fn new(
        desired_partition_count: u32,
        partitions_to_relocate: BTreeSet<PartitionId>,
        executor: Arc<dyn PartitionScalingChangeExecutor>,
    ) -> Self {
        Self {
            desired_partition_count,
            partitions_to_relocate,
            executor,
        }
    }
}

#[async_trait]
impl ConfigurationChangeApplier for AwaitRelocationCompletionApplier {
    fn init(
        &mut self,
        current: &ClusterConfiguration,
    ) -> ConfigurationResult<ConfigurationTransformer> {
        routing_of(current)?;
        Ok(Box::new(|configuration| configuration))
    }

    async fn apply(&mut self) -> ConfigurationResult<ConfigurationTransformer> {
        self.executor
            .await_relocation_completion(
                self.desired_partition_count,
                &self.partitions_to_relocate,
            )
            .await?;
        let desired = self.desired_partition_count;
        Ok(Box::new(move |configuration| {
            configuration.update_routing_state(|routing| routing.complete_relocation(desired))
        }))
    }
}

/// Overwrites the routing state, or re-derives it from the configuration
pub(super) struct UpdateRoutingStateApplier {
    routing_state: Option<RoutingState>,
}

impl UpdateRoutingStateApplier {
    pub(super) fn new(routing_state: Option<RoutingState>) -> Self {
        Self { routing_state }
    }
}

#[async_trait]
impl ConfigurationChangeApplier for UpdateRoutingStateApplier {
    fn init(
        &mut self,
        current: &ClusterConfiguration,
    ) -> ConfigurationResult<ConfigurationTransformer> {
        if current.is_uninitialized() {
            return Err(ConfigurationError::InvalidRequest(
                "cannot update the routing state of an uninitialized cluster".to_string(),
            ));
        }
        Ok(Box::new(|configuration| configuration))
    }

    async fn apply(&mut self) -> ConfigurationResult<ConfigurationTransformer> {
        let explicit = self.routing_state.clone();
        Ok(Box::new(move |configuration| match explicit {
            Some(routing) => configuration.with_routing_state(routing),
            // Deriving from the configuration keeps this operation pure, so
            // simulation and real application converge on the same state
            None => {
                let derived = RoutingState::initialize_from(&configuration);
                configuration.with_routing_state(derived)
            }
        }))
    }
}
