//! Executor collaborator interfaces
//!
//! The operation appliers delegate all real infrastructure side effects to
//! these narrow async traits. Every method must be safe to call more than
//! once for the same logical operation: the driver retries failed operations,
//! so executors see at-least-once semantics.
//!
//! The `Noop*` implementations succeed immediately without doing anything;
//! the coordinator runs its validation simulation against them.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;

use crate::error::{ConfigurationError, ConfigurationResult};
use crate::state::{DynamicPartitionConfig, RoutingState};
use crate::types::{ExporterId, MemberId, PartitionId};

/// Performs partition-level side effects on the local member
#[async_trait]
pub trait PartitionChangeExecutor: Send + Sync {
    /// Start replicating the partition with the given replica set
    async fn join(
        &self,
        partition_id: PartitionId,
        members_with_priority: BTreeMap<MemberId, u32>,
        config: DynamicPartitionConfig,
    ) -> ConfigurationResult<()>;

    /// Stop replicating the partition on this member
    async fn leave(&self, partition_id: PartitionId) -> ConfigurationResult<()>;

    /// Create a brand-new partition
    async fn bootstrap(
        &self,
        partition_id: PartitionId,
        priority: u32,
        config: DynamicPartitionConfig,
    ) -> ConfigurationResult<()>;

    /// Update the election priority of the local replica
    async fn reconfigure_priority(
        &self,
        partition_id: PartitionId,
        priority: u32,
    ) -> ConfigurationResult<()>;

    /// Replace the replication group unconditionally
    async fn force_reconfigure(
        &self,
        partition_id: PartitionId,
        members: Vec<MemberId>,
    ) -> ConfigurationResult<()>;

    /// Enable an exporter with the given metadata version
    async fn enable_exporter(
        &self,
        partition_id: PartitionId,
        exporter_id: &ExporterId,
        metadata_version: u64,
        initialize_from: Option<&ExporterId>,
    ) -> ConfigurationResult<()>;

    /// Disable an exporter
    async fn disable_exporter(
        &self,
        partition_id: PartitionId,
        exporter_id: &ExporterId,
    ) -> ConfigurationResult<()>;

    /// Delete an exporter and its metadata
    async fn delete_exporter(
        &self,
        partition_id: PartitionId,
        exporter_id: &ExporterId,
    ) -> ConfigurationResult<()>;
}

/// Reflects membership changes in routing and broker info
#[async_trait]
pub trait ClusterMembershipChangeExecutor: Send + Sync {
    /// Register a broker that joined the cluster
    async fn add_broker(&self, member_id: &MemberId) -> ConfigurationResult<()>;

    /// Deregister a broker that left the cluster
    async fn remove_broker(&self, member_id: &MemberId) -> ConfigurationResult<()>;
}

/// Drives and queries data redistribution during a partition scale-up
#[async_trait]
pub trait PartitionScalingChangeExecutor: Send + Sync {
    /// Kick off a scale-up towards the desired partition count
    async fn initiate_scale_up(&self, desired_partition_count: u32) -> ConfigurationResult<()>;

    /// Resolve once data redistribution to the given partitions finished
    async fn await_redistribution_completion(
        &self,
        desired_partition_count: u32,
        partitions: &BTreeSet<PartitionId>,
    ) -> ConfigurationResult<()>;

    /// Resolve once correlated messages were relocated to the given partitions
    async fn await_relocation_completion(
        &self,
        desired_partition_count: u32,
        partitions: &BTreeSet<PartitionId>,
    ) -> ConfigurationResult<()>;

    /// The routing state as seen by the redistribution machinery
    async fn routing_state(&self) -> ConfigurationResult<RoutingState>;
}

/// Cluster-wide side effects
#[async_trait]
pub trait ClusterChangeExecutor: Send + Sync {
    /// Purge historical storage; only called once no partitions remain
    async fn delete_history(&self) -> ConfigurationResult<()>;
}

/// Partition executor that does nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPartitionChangeExecutor;

#[async_trait]
impl PartitionChangeExecutor for NoopPartitionChangeExecutor {
    async fn join(
        &self,
        _partition_id: PartitionId,
        _members_with_priority: BTreeMap<MemberId, u32>,
        _config: DynamicPartitionConfig,
    ) -> ConfigurationResult<()> {
        Ok(())
    }

    async fn leave(&self, _partition_id: PartitionId) -> ConfigurationResult<()> {
        Ok(())
    }

    async fn bootstrap(
        &self,
        _partition_id: PartitionId,
        _priority: u32,
        _config: DynamicPartitionConfig,
    ) -> ConfigurationResult<()> {
        Ok(())
    }

    async fn reconfigure_priority(
        &self,
        _partition_id: PartitionId,
        _priority: u32,
    ) -> ConfigurationResult<()> {
        Ok(())
    }

    async fn force_reconfigure(
        &self,
        _partition_id: PartitionId,
        _members: Vec<MemberId>,
    ) -> ConfigurationResult<()> {
        Ok(())
    }

    async fn enable_exporter(
        &self,
        _partition_id: PartitionId,
        _exporter_id: &ExporterId,
        _metadata_version: u64,
        _initialize_from: Option<&ExporterId>,
    ) -> ConfigurationResult<()> {
        Ok(())
    }

    async fn disable_exporter(
        &self,
        _partition_id: PartitionId,
        _exporter_id: &ExporterId,
    ) -> ConfigurationResult<()> {
        Ok(())
    }

    async fn delete_exporter(
        &self,
        _partition_id: PartitionId,
        _exporter_id: &ExporterId,
    ) -> ConfigurationResult<()> {
        Ok(())
    }
}

/// Membership executor that does nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopClusterMembershipChangeExecutor;

#[async_trait]
impl ClusterMembershipChangeExecutor for NoopClusterMembershipChangeExecutor {
    async fn add_broker(&self, _member_id: &MemberId) -> ConfigurationResult<()> {
        Ok(())
    }

    async fn remove_broker(&self, _member_id: &MemberId) -> ConfigurationResult<()> {
        Ok(())
    }
}

/// Scaling executor that does nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPartitionScalingChangeExecutor;

#[async_trait]
impl PartitionScalingChangeExecutor for NoopPartitionScalingChangeExecutor {
    async fn initiate_scale_up(&self, _desired_partition_count: u32) -> ConfigurationResult<()> {
        Ok(())
    }

    async fn await_redistribution_completion(
        &self,
        _desired_partition_count: u32,
        _partitions: &BTreeSet<PartitionId>,
    ) -> ConfigurationResult<()> {
        Ok(())
    }

    async fn await_relocation_completion(
        &self,
        _desired_partition_count: u32,
        _partitions: &BTreeSet<PartitionId>,
    ) -> ConfigurationResult<()> {
        Ok(())
    }

    async fn routing_state(&self) -> ConfigurationResult<RoutingState> {
        Err(ConfigurationError::Internal(
            "no-op executor cannot provide a routing state".to_string(),
        ))
    }
}

/// Cluster executor that does nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopClusterChangeExecutor;

#[async_trait]
impl ClusterChangeExecutor for NoopClusterChangeExecutor {
    async fn delete_history(&self) -> ConfigurationResult<()> {
        Ok(())
    }
}
