//! Member and partition state

use std::collections::BTreeMap;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::state::DynamicPartitionConfig;
use crate::types::PartitionId;

/// State of a single cluster member.
///
/// Immutable value type: every mutation helper consumes the state and returns
/// a new one with an incremented version and a fresh `last_updated` timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberState {
    /// Version of this member state, incremented on every change
    pub version: u64,
    /// When this member state last changed
    pub last_updated: SystemTime,
    /// Lifecycle state of the member
    pub state: MemberStatus,
    /// Partitions hosted by this member
    pub partitions: BTreeMap<PartitionId, PartitionState>,
}

impl MemberState {
    /// A member that is not yet part of the cluster
    pub fn uninitialized() -> Self {
        Self {
            version: 0,
            last_updated: SystemTime::UNIX_EPOCH,
            state: MemberStatus::Uninitialized,
            partitions: BTreeMap::new(),
        }
    }

    /// A member that has started joining the cluster
    pub fn joining() -> Self {
        Self {
            version: 1,
            last_updated: SystemTime::now(),
            state: MemberStatus::Joining,
            partitions: BTreeMap::new(),
        }
    }

    /// An active member hosting the given partitions
    pub fn active(partitions: BTreeMap<PartitionId, PartitionState>) -> Self {
        Self {
            version: 1,
            last_updated: SystemTime::now(),
            state: MemberStatus::Active,
            partitions,
        }
    }

    /// Transition to active
    pub fn to_active(self) -> Self {
        self.with_state(MemberStatus::Active)
    }

    /// Transition to leaving
    pub fn to_leaving(self) -> Self {
        self.with_state(MemberStatus::Leaving)
    }

    /// Transition to left
    pub fn to_left(self) -> Self {
        self.with_state(MemberStatus::Left)
    }

    /// Whether this member hosts the given partition
    pub fn has_partition(&self, partition_id: PartitionId) -> bool {
        self.partitions.contains_key(&partition_id)
    }

    /// State of a hosted partition, if present
    pub fn partition(&self, partition_id: PartitionId) -> Option<&PartitionState> {
        self.partitions.get(&partition_id)
    }

    /// Add a partition to this member
    pub fn add_partition(mut self, partition_id: PartitionId, state: PartitionState) -> Self {
        self.partitions.insert(partition_id, state);
        self.touch()
    }

    /// Update a hosted partition through a pure transformer; unknown
    /// partitions are left untouched
    pub fn update_partition(
        mut self,
        partition_id: PartitionId,
        f: impl FnOnce(PartitionState) -> PartitionState,
    ) -> Self {
        if let Some(state) = self.partitions.remove(&partition_id) {
            self.partitions.insert(partition_id, f(state));
        }
        self.touch()
    }

    /// Remove a partition from this member
    pub fn remove_partition(mut self, partition_id: PartitionId) -> Self {
        self.partitions.remove(&partition_id);
        self.touch()
    }

    fn with_state(mut self, state: MemberStatus) -> Self {
        self.state = state;
        self.touch()
    }

    fn touch(mut self) -> Self {
        self.version += 1;
        self.last_updated = SystemTime::now();
        self
    }
}

/// Lifecycle states of a member. Transitions only move forward: a joining
/// member becomes active, a leaving member becomes left. There are no
/// backward transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemberStatus {
    /// Not yet part of the cluster
    Uninitialized,
    /// In the process of joining
    Joining,
    /// Fully joined and serving
    Active,
    /// In the process of leaving
    Leaving,
    /// No longer part of the cluster
    Left,
}

/// State of one partition replica on one member
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionState {
    /// Lifecycle state of the replica
    pub state: PartitionStatus,
    /// Election priority of this replica; higher priorities are preferred
    /// when electing a leader
    pub priority: u32,
    /// Dynamic configuration shared by all replicas of the partition
    pub config: DynamicPartitionConfig,
}

impl PartitionState {
    /// A brand-new partition being created on this member
    pub fn bootstrapping(priority: u32, config: DynamicPartitionConfig) -> Self {
        Self {
            state: PartitionStatus::Bootstrapping,
            priority,
            config,
        }
    }

    /// A replica joining an existing partition
    pub fn joining(priority: u32, config: DynamicPartitionConfig) -> Self {
        Self {
            state: PartitionStatus::Joining,
            priority,
            config,
        }
    }

    /// An active replica
    pub fn active(priority: u32, config: DynamicPartitionConfig) -> Self {
        Self {
            state: PartitionStatus::Active,
            priority,
            config,
        }
    }

    /// Transition to active
    pub fn to_active(self) -> Self {
        Self {
            state: PartitionStatus::Active,
            ..self
        }
    }

    /// Transition to leaving
    pub fn to_leaving(self) -> Self {
        Self {
            state: PartitionStatus::Leaving,
            ..self
        }
    }

    /// Replace the election priority
    pub fn with_priority(self, priority: u32) -> Self {
        Self { priority, ..self }
    }

    /// Replace the dynamic config through a pure transformer
    pub fn update_config(
        self,
        f: impl FnOnce(DynamicPartitionConfig) -> DynamicPartitionConfig,
    ) -> Self {
        Self {
            config: f(self.config),
            ..self
        }
    }
}

/// Lifecycle states of a partition replica
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartitionStatus {
    /// The partition is being created for the first time
    Bootstrapping,
    /// The replica is joining an existing partition
    Joining,
    /// The replica is serving
    Active,
    /// The replica is leaving the partition
    Leaving,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions_bump_version() {
        let member = MemberState::joining();
        let version = member.version;

        let member = member.to_active();

        assert_eq!(member.state, MemberStatus::Active);
        assert_eq!(member.version, version + 1);
    }

    #[test]
    fn partition_updates_bump_version() {
        let member = MemberState::active(BTreeMap::new()).add_partition(
            PartitionId::new(1),
            PartitionState::joining(2, DynamicPartitionConfig::default()),
        );
        let version = member.version;

        let member = member.update_partition(PartitionId::new(1), PartitionState::to_active);

        assert_eq!(member.version, version + 1);
        assert_eq!(
            member.partition(PartitionId::new(1)).unwrap().state,
            PartitionStatus::Active
        );
    }
}
