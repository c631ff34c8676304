//! The root cluster configuration

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigurationError, ConfigurationResult};
use crate::state::{
    ChangeStatus, ClusterChangePlan, ClusterConfigurationChangeOperation, CompletedChange,
    MemberState, RoutingState,
};
use crate::types::{ChangeId, MemberId, PartitionId};

/// The shared, versioned configuration of the whole cluster.
///
/// Immutable value type with copy-on-write semantics: the authoritative copy
/// is owned by the [`crate::manager::ClusterConfigurationManager`] and
/// replaced wholesale on every update; all other components operate on
/// snapshots. At most one [`ClusterChangePlan`] is pending at any time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterConfiguration {
    version: u64,
    members: BTreeMap<MemberId, MemberState>,
    last_change: Option<CompletedChange>,
    pending_changes: Option<ClusterChangePlan>,
    routing_state: Option<RoutingState>,
    incarnation_number: u64,
    cluster_id: Option<String>,
}

impl ClusterConfiguration {
    /// The configuration of a cluster that was never initialized
    pub fn uninitialized() -> Self {
        Self {
            version: 0,
            members: BTreeMap::new(),
            last_change: None,
            pending_changes: None,
            routing_state: None,
            incarnation_number: 0,
            cluster_id: None,
        }
    }

    /// A freshly initialized, empty configuration
    pub fn init(cluster_id: impl Into<String>) -> Self {
        Self {
            version: 1,
            members: BTreeMap::new(),
            last_change: None,
            pending_changes: None,
            routing_state: None,
            incarnation_number: 1,
            cluster_id: Some(cluster_id.into()),
        }
    }

    /// Whether this configuration was never initialized
    pub fn is_uninitialized(&self) -> bool {
        self.version == 0
    }

    /// Version of the configuration, incremented on every update
    pub fn version(&self) -> u64 {
        self.version
    }

    /// All members and their states
    pub fn members(&self) -> &BTreeMap<MemberId, MemberState> {
        &self.members
    }

    /// The most recently finished change, if any
    pub fn last_change(&self) -> Option<&CompletedChange> {
        self.last_change.as_ref()
    }

    /// The currently pending change plan, if any
    pub fn pending_changes(&self) -> Option<&ClusterChangePlan> {
        self.pending_changes.as_ref()
    }

    /// The current routing state, if it was initialized
    pub fn routing_state(&self) -> Option<&RoutingState> {
        self.routing_state.as_ref()
    }

    /// The cluster incarnation number
    pub fn incarnation_number(&self) -> u64 {
        self.incarnation_number
    }

    /// The cluster identifier, if the configuration was initialized with one
    pub fn cluster_id(&self) -> Option<&str> {
        self.cluster_id.as_deref()
    }

    /// Whether the given member is part of the configuration
    pub fn has_member(&self, member_id: &MemberId) -> bool {
        self.members.contains_key(member_id)
    }

    /// State of the given member, if present
    pub fn member(&self, member_id: &MemberId) -> Option<&MemberState> {
        self.members.get(member_id)
    }

    /// The member acting as change coordinator: the one with the lowest ID
    pub fn coordinator(&self) -> Option<&MemberId> {
        self.members.keys().next()
    }

    /// Add a member with the given state
    pub fn add_member(mut self, member_id: MemberId, state: MemberState) -> Self {
        self.members.insert(member_id, state);
        self.bump()
    }

    /// Update one member's state through a pure transformer. Unknown members
    /// are left untouched.
    pub fn update_member(
        mut self,
        member_id: &MemberId,
        f: impl FnOnce(MemberState) -> MemberState,
    ) -> Self {
        if let Some(state) = self.members.remove(member_id) {
            self.members.insert(member_id.clone(), f(state));
        }
        self.bump()
    }

    /// Remove a member entirely
    pub fn remove_member(mut self, member_id: &MemberId) -> Self {
        self.members.remove(member_id);
        self.bump()
    }

    /// Replace the routing state
    pub fn with_routing_state(mut self, routing_state: RoutingState) -> Self {
        self.routing_state = Some(routing_state);
        self.bump()
    }

    /// Update the routing state through a pure transformer. Does nothing when
    /// routing was never initialized.
    pub fn update_routing_state(
        mut self,
        f: impl FnOnce(RoutingState) -> RoutingState,
    ) -> Self {
        if let Some(routing_state) = self.routing_state.take() {
            self.routing_state = Some(f(routing_state));
        }
        self.bump()
    }

    /// Replace the incarnation number
    pub fn with_incarnation_number(mut self, incarnation_number: u64) -> Self {
        self.incarnation_number = incarnation_number;
        self.bump()
    }

    /// Whether a change plan is currently pending
    pub fn has_pending_changes(&self) -> bool {
        self.pending_changes.is_some()
    }

    /// The operation that must be applied next, if a plan is pending
    pub fn next_pending_operation(&self) -> Option<&ClusterConfigurationChangeOperation> {
        self.pending_changes.as_ref().and_then(ClusterChangePlan::next_pending)
    }

    /// Number of partitions in the cluster. Partition IDs are contiguous
    /// starting at 1, so the count is the highest hosted ID.
    pub fn partition_count(&self) -> u32 {
        self.members
            .values()
            .flat_map(|member| member.partitions.keys())
            .map(PartitionId::value)
            .max()
            .unwrap_or(0)
    }

    /// The members hosting the given partition, with their replica priority
    pub fn members_hosting(&self, partition_id: PartitionId) -> BTreeMap<MemberId, u32> {
        self.members
            .iter()
            .filter_map(|(member_id, member)| {
                member
                    .partition(partition_id)
                    .map(|partition| (member_id.clone(), partition.priority))
            })
            .collect()
    }

    /// Start a new change plan for the given operations.
    ///
    /// Fails when another plan is still pending or when the operation list is
    /// empty. The new plan's ID continues where the last finished change left
    /// off.
    pub fn start_configuration_change(
        mut self,
        operations: Vec<ClusterConfigurationChangeOperation>,
    ) -> ConfigurationResult<Self> {
        if let Some(pending) = &self.pending_changes {
            return Err(ConfigurationError::ConcurrentModification(format!(
                "change {} is still in progress",
                pending.id
            )));
        }
        if operations.is_empty() {
            return Err(ConfigurationError::InvalidRequest(
                "requested change contains no operations".to_string(),
            ));
        }
        let id = self
            .last_change
            .as_ref()
            .map(|change| change.id.next())
            .unwrap_or_else(|| ChangeId::new(1));
        self.pending_changes = Some(ClusterChangePlan::init(id, operations));
        Ok(self.bump())
    }

    /// Move the head pending operation to the completed list. When the last
    /// operation completes, the plan collapses into a completed change.
    pub fn advance_configuration_change(mut self) -> Self {
        let Some(plan) = self.pending_changes.take() else {
            return self;
        };
        let plan = plan.advance();
        if plan.has_pending() {
            self.pending_changes = Some(plan);
        } else {
            self.last_change = Some(plan.complete(ChangeStatus::Completed));
        }
        self.bump()
    }

    /// Discard all pending operations of the current plan, keeping the
    /// effects of already completed ones, and record the change as cancelled.
    pub fn cancel_pending_changes(mut self) -> Self {
        let Some(plan) = self.pending_changes.take() else {
            return self;
        };
        self.last_change = Some(plan.complete(ChangeStatus::Cancelled));
        self.bump()
    }

    fn bump(mut self) -> Self {
        self.version += 1;
        self
    }
}
