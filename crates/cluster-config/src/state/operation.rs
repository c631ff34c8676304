//! The catalog of configuration change operations

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::state::{DynamicPartitionConfig, RoutingState};
use crate::types::{ExporterId, MemberId, PartitionId};

/// A single step of a cluster configuration change.
///
/// The catalog is closed: every variant maps to exactly one operation applier
/// in [`crate::appliers::OperationApplierFactory`], and the dispatch match is
/// exhaustive so that adding a variant without an applier fails to compile.
/// Every operation carries the member that applies it; for cluster-scoped
/// operations that is the member coordinating the change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClusterConfigurationChangeOperation {
    /// Add a member to the cluster
    MemberJoin {
        /// The joining member
        member_id: MemberId,
    },
    /// Remove a member from the cluster gracefully
    MemberLeave {
        /// The leaving member
        member_id: MemberId,
    },
    /// Force-remove another member, e.g. one that is permanently gone
    MemberRemove {
        /// The member applying the removal
        member_id: MemberId,
        /// The member being removed
        member_to_remove: MemberId,
    },
    /// Add a replica of an existing partition to a member
    PartitionJoin {
        /// The member gaining the replica
        member_id: MemberId,
        /// The partition to replicate
        partition_id: PartitionId,
        /// Election priority of the new replica
        priority: u32,
    },
    /// Remove a partition replica from a member
    PartitionLeave {
        /// The member losing the replica
        member_id: MemberId,
        /// The partition to stop replicating
        partition_id: PartitionId,
        /// Minimum replica count that must remain after leaving
        minimum_allowed_replicas: u32,
    },
    /// Create a brand-new partition on a member
    PartitionBootstrap {
        /// The member creating the partition
        member_id: MemberId,
        /// The new partition
        partition_id: PartitionId,
        /// Election priority of the first replica
        priority: u32,
        /// Initial dynamic config; empty when not given
        config: Option<DynamicPartitionConfig>,
    },
    /// Change the election priority of a replica
    PartitionReconfigurePriority {
        /// The member hosting the replica
        member_id: MemberId,
        /// The partition to reconfigure
        partition_id: PartitionId,
        /// The new election priority
        priority: u32,
    },
    /// Replace the replication group of a partition unconditionally
    PartitionForceReconfigure {
        /// The member applying the reconfiguration; must be part of the new
        /// replica set
        member_id: MemberId,
        /// The partition to reconfigure
        partition_id: PartitionId,
        /// The new replica set
        members: Vec<MemberId>,
    },
    /// Enable an exporter on a partition
    PartitionEnableExporter {
        /// The member hosting the partition
        member_id: MemberId,
        /// The partition to reconfigure
        partition_id: PartitionId,
        /// The exporter to enable
        exporter_id: ExporterId,
        /// Exporter whose state the enabled exporter starts from, if any
        initialize_from: Option<ExporterId>,
    },
    /// Disable an exporter on a partition
    PartitionDisableExporter {
        /// The member hosting the partition
        member_id: MemberId,
        /// The partition to reconfigure
        partition_id: PartitionId,
        /// The exporter to disable
        exporter_id: ExporterId,
    },
    /// Delete an exporter whose configuration no longer exists
    PartitionDeleteExporter {
        /// The member hosting the partition
        member_id: MemberId,
        /// The partition to reconfigure
        partition_id: PartitionId,
        /// The exporter to delete
        exporter_id: ExporterId,
    },
    /// Purge historical storage; only legal once no partitions remain
    DeleteHistory {
        /// The member applying the purge
        member_id: MemberId,
    },
    /// Bump the cluster incarnation number
    UpdateIncarnationNumber {
        /// The member applying the update
        member_id: MemberId,
    },
    /// Begin scaling the partition count up
    StartPartitionScaleUp {
        /// The member coordinating the scale-up
        member_id: MemberId,
        /// Partition count after the scale-up
        desired_partition_count: u32,
    },
    /// Wait until data redistribution to the given partitions finished and
    /// activate them for request handling
    AwaitRedistributionCompletion {
        /// The member coordinating the scale-up
        member_id: MemberId,
        /// Partition count after the scale-up
        desired_partition_count: u32,
        /// Partitions whose redistribution is awaited
        partitions_to_redistribute: BTreeSet<PartitionId>,
    },
    /// Wait until correlated messages were relocated to the given partitions
    AwaitRelocationCompletion {
        /// The member coordinating the scale-up
        member_id: MemberId,
        /// Partition count after the scale-up
        desired_partition_count: u32,
        /// Partitions whose relocation is awaited
        partitions_to_relocate: BTreeSet<PartitionId>,
    },
    /// Overwrite the routing state, or re-derive it from the configuration
    /// when no explicit state is given
    UpdateRoutingState {
        /// The member applying the update
        member_id: MemberId,
        /// The routing state to install verbatim, if any
        routing_state: Option<RoutingState>,
    },
}

impl ClusterConfigurationChangeOperation {
    /// The member that applies this operation
    pub fn member_id(&self) -> &MemberId {
        use ClusterConfigurationChangeOperation::*;
        match self {
            MemberJoin { member_id }
            | MemberLeave { member_id }
            | MemberRemove { member_id, .. }
            | PartitionJoin { member_id, .. }
            | PartitionLeave { member_id, .. }
            | PartitionBootstrap { member_id, .. }
            | PartitionReconfigurePriority { member_id, .. }
            | PartitionForceReconfigure { member_id, .. }
            | PartitionEnableExporter { member_id, .. }
            | PartitionDisableExporter { member_id, .. }
            | PartitionDeleteExporter { member_id, .. }
            | DeleteHistory { member_id }
            | UpdateIncarnationNumber { member_id }
            | StartPartitionScaleUp { member_id, .. }
            | AwaitRedistributionCompletion { member_id, .. }
            | AwaitRelocationCompletion { member_id, .. }
            | UpdateRoutingState { member_id, .. } => member_id,
        }
    }
}
