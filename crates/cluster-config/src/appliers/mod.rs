//! Two-phase operation appliers
//!
//! Every catalog operation is realized as an applier with two phases:
//!
//! * [`ConfigurationChangeApplier::init`] is synchronous and pure. Validates
//!   preconditions against the current configuration and returns a
//!   transformer that marks the operation as started, e.g. by flipping a
//!   member or partition into a transitional state. Idempotent: when the
//!   transitional state already reflects this operation (a crash occurred
//!   after a previous `init` was folded in), it yields a transformer
//!   reproducing that state instead of an error.
//! * [`ConfigurationChangeApplier::apply`] is asynchronous. Performs the real
//!   side effect through an executor collaborator and returns a transformer
//!   that marks the operation as completed. On failure no transformer is
//!   produced and the driver may retry the whole operation.
//!
//! One applier value exists per operation instance; state that must flow from
//! `init` to `apply` (captured metadata versions, copied partition configs,
//! replica sets) lives in the applier itself and is never shared.

mod cluster;
mod exporter;
mod member;
mod partition;
mod scaling;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{ConfigurationError, ConfigurationResult};
use crate::executors::{
    ClusterChangeExecutor, ClusterMembershipChangeExecutor, NoopClusterChangeExecutor,
    NoopClusterMembershipChangeExecutor, NoopPartitionChangeExecutor,
    NoopPartitionScalingChangeExecutor, PartitionChangeExecutor, PartitionScalingChangeExecutor,
};
use crate::state::{ClusterConfiguration, ClusterConfigurationChangeOperation, MemberState};
use crate::types::MemberId;

use self::cluster::{DeleteHistoryApplier, UpdateIncarnationNumberApplier};
use self::exporter::{
    PartitionDeleteExporterApplier, PartitionDisableExporterApplier,
    PartitionEnableExporterApplier,
};
use self::member::{MemberJoinApplier, MemberLeaveApplier, MemberRemoveApplier};
use self::partition::{
    PartitionBootstrapApplier, PartitionForceReconfigureApplier, PartitionJoinApplier,
    PartitionLeaveApplier, PartitionReconfigurePriorityApplier,
};
use self::scaling::{
    AwaitRedistributionCompletionApplier, AwaitRelocationCompletionApplier,
    StartPartitionScaleUpApplier, UpdateRoutingStateApplier,
};

/// A pure transformation of the whole cluster configuration
pub type ConfigurationTransformer =
    Box<dyn FnOnce(ClusterConfiguration) -> ClusterConfiguration + Send>;

/// A pure transformation of a single member's state
pub type MemberStateTransformer = Box<dyn FnOnce(MemberState) -> MemberState + Send>;

/// Two-phase handler for one configuration change operation
#[async_trait]
pub trait ConfigurationChangeApplier: Send {
    /// Validate the operation against the current configuration and return
    /// the transformer that marks it as started
    fn init(
        &mut self,
        current: &ClusterConfiguration,
    ) -> ConfigurationResult<ConfigurationTransformer>;

    /// Perform the side effect and return the transformer that marks the
    /// operation as completed
    async fn apply(&mut self) -> ConfigurationResult<ConfigurationTransformer>;
}

/// Specialization for operations whose transformers only ever touch one
/// member's state. The generic applier contract is derived by lifting the
/// member transformer into the members map at [`Self::member_id`].
#[async_trait]
pub trait MemberOperationApplier: Send {
    /// The member whose state this operation changes
    fn member_id(&self) -> &MemberId;

    /// Validate and return the transformer marking the operation as started
    fn init_member_state(
        &mut self,
        current: &ClusterConfiguration,
    ) -> ConfigurationResult<MemberStateTransformer>;

    /// Perform the side effect and return the completion transformer
    async fn apply_operation(&mut self) -> ConfigurationResult<MemberStateTransformer>;
}

/// Lifts a [`MemberOperationApplier`] into the generic applier contract
struct MemberScoped<A>(A);

#[async_trait]
impl<A: MemberOperationApplier> ConfigurationChangeApplier for MemberScoped<A> {
    fn init(
        &mut self,
        current: &ClusterConfiguration,
    ) -> ConfigurationResult<ConfigurationTransformer> {
        if !current.has_member(self.0.member_id()) {
            return Err(ConfigurationError::InvalidRequest(format!(
                "member {} is not part of the cluster",
                self.0.member_id()
            )));
        }
        let member_id = self.0.member_id().clone();
        let transformer = self.0.init_member_state(current)?;
        Ok(Box::new(move |configuration| {
            configuration.update_member(&member_id, transformer)
        }))
    }

    async fn apply(&mut self) -> ConfigurationResult<ConfigurationTransformer> {
        let member_id = self.0.member_id().clone();
        let transformer = self.0.apply_operation().await?;
        Ok(Box::new(move |configuration| {
            configuration.update_member(&member_id, transformer)
        }))
    }
}

/// Resolves each catalog operation to its applier, wiring in the executor
/// collaborators. Performs no I/O itself.
pub struct OperationApplierFactory {
    partition_change: Arc<dyn PartitionChangeExecutor>,
    membership_change: Arc<dyn ClusterMembershipChangeExecutor>,
    partition_scaling: Arc<dyn PartitionScalingChangeExecutor>,
    cluster_change: Arc<dyn ClusterChangeExecutor>,
}

impl OperationApplierFactory {
    /// Create a factory dispatching to the given executors
    pub fn new(
        partition_change: Arc<dyn PartitionChangeExecutor>,
        membership_change: Arc<dyn ClusterMembershipChangeExecutor>,
        partition_scaling: Arc<dyn PartitionScalingChangeExecutor>,
        cluster_change: Arc<dyn ClusterChangeExecutor>,
    ) -> Self {
        Self {
            partition_change,
            membership_change,
            partition_scaling,
            cluster_change,
        }
    }

    /// A factory whose appliers have no side effects; simulation runs
    /// against this
    pub fn noop() -> Self {
        Self::new(
            Arc::new(NoopPartitionChangeExecutor),
            Arc::new(NoopClusterMembershipChangeExecutor),
            Arc::new(NoopPartitionScalingChangeExecutor),
            Arc::new(NoopClusterChangeExecutor),
        )
    }

    /// The applier handling the given operation
    pub fn applier_for(
        &self,
        operation: &ClusterConfigurationChangeOperation,
    ) -> Box<dyn ConfigurationChangeApplier> {
        use ClusterConfigurationChangeOperation::*;
        match operation.clone() {
            MemberJoin { member_id } => Box::new(MemberJoinApplier::new(
                member_id,
                self.membership_change.clone(),
            )),
            MemberLeave { member_id } => Box::new(MemberScoped(MemberLeaveApplier::new(
                member_id,
                self.membership_change.clone(),
            ))),
            MemberRemove {
                member_id,
                member_to_remove,
            } => Box::new(MemberRemoveApplier::new(
                member_id,
                member_to_remove,
                self.membership_change.clone(),
            )),
            PartitionJoin {
                member_id,
                partition_id,
                priority,
            } => Box::new(MemberScoped(PartitionJoinApplier::new(
                member_id,
                partition_id,
                priority,
                self.partition_change.clone(),
            ))),
            PartitionLeave {
                member_id,
                partition_id,
                minimum_allowed_replicas,
            } => Box::new(MemberScoped(PartitionLeaveApplier::new(
                member_id,
                partition_id,
                minimum_allowed_replicas,
                self.partition_change.clone(),
            ))),
            PartitionBootstrap {
                member_id,
                partition_id,
                priority,
                config,
            } => Box::new(MemberScoped(PartitionBootstrapApplier::new(
                member_id,
                partition_id,
                priority,
                config,
                self.partition_change.clone(),
            ))),
            PartitionReconfigurePriority {
                member_id,
                partition_id,
                priority,
            } => Box::new(MemberScoped(PartitionReconfigurePriorityApplier::new(
                member_id,
                partition_id,
                priority,
                self.partition_change.clone(),
            ))),
            PartitionForceReconfigure {
                member_id,
                partition_id,
                members,
            } => Box::new(PartitionForceReconfigureApplier::new(
                member_id,
                partition_id,
                members,
                self.partition_change.clone(),
            )),
            PartitionEnableExporter {
                member_id,
                partition_id,
                exporter_id,
                initialize_from,
            } => Box::new(MemberScoped(PartitionEnableExporterApplier::new(
                member_id,
                partition_id,
                exporter_id,
                initialize_from,
                self.partition_change.clone(),
            ))),
            PartitionDisableExporter {
                member_id,
                partition_id,
                exporter_id,
            } => Box::new(MemberScoped(PartitionDisableExporterApplier::new(
                member_id,
                partition_id,
                exporter_id,
                self.partition_change.clone(),
            ))),
            PartitionDeleteExporter {
                member_id,
                partition_id,
                exporter_id,
            } => Box::new(MemberScoped(PartitionDeleteExporterApplier::new(
                member_id,
                partition_id,
                exporter_id,
                self.partition_change.clone(),
            ))),
            DeleteHistory { member_id: _ } => {
                Box::new(DeleteHistoryApplier::new(self.cluster_change.clone()))
            }
            UpdateIncarnationNumber { member_id: _ } => {
                Box::new(UpdateIncarnationNumberApplier::new())
            }
            StartPartitionScaleUp {
                member_id: _,
                desired_partition_count,
            } => Box::new(StartPartitionScaleUpApplier::new(
                desired_partition_count,
                self.partition_scaling.clone(),
            )),
            AwaitRedistributionCompletion {
                member_id: _,
                desired_partition_count,
                partitions_to_redistribute,
            } => Box::new(AwaitRedistributionCompletionApplier::new(
                desired_partition_count,
                partitions_to_redistribute,
                self.partition_scaling.clone(),
            )),
            AwaitRelocationCompletion {
                member_id: _,
                desired_partition_count,
                partitions_to_relocate,
            } => Box::new(AwaitRelocationCompletionApplier::new(
                desired_partition_count,
                partitions_to_relocate,
                self.partition_scaling.clone(),
            )),
            UpdateRoutingState {
                member_id: _,
                routing_state,
            } => Box::new(UpdateRoutingStateApplier::new(routing_state)),
        }
    }
}
