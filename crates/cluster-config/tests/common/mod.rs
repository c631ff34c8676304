//! Shared fixtures for coordinator and execution tests

// Not every test binary uses every fixture
#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use armada_cluster_config::appliers::OperationApplierFactory;
use armada_cluster_config::error::ConfigurationResult;
use armada_cluster_config::executors::{
    ClusterChangeExecutor, ClusterMembershipChangeExecutor, PartitionChangeExecutor,
    PartitionScalingChangeExecutor,
};
use armada_cluster_config::state::{
    ClusterConfiguration, DynamicPartitionConfig, MemberState, PartitionState, RoutingState,
};
use armada_cluster_config::types::{ExporterId, MemberId, PartitionId};

pub fn member(id: &str) -> MemberId {
    MemberId::from(id)
}

pub fn partition(id: u32) -> PartitionId {
    PartitionId::new(id)
}

/// A cluster of active members; `partitions` assigns partition IDs to member
/// indexes, e.g. `&[(1, &["0", "1"])]` puts partition 1 on members 0 and 1.
pub fn cluster(members: &[&str], partitions: &[(u32, &[&str])]) -> ClusterConfiguration {
    let mut configuration = ClusterConfiguration::init("test-cluster");
    for id in members {
        let hosted: BTreeMap<_, _> = partitions
            .iter()
            .filter(|(_, hosts)| hosts.contains(id))
            .map(|(partition_id, _)| {
                (
                    partition(*partition_id),
                    PartitionState::active(1, DynamicPartitionConfig::default()),
                )
            })
            .collect();
        configuration = configuration.add_member(member(id), MemberState::active(hosted));
    }
    let routing = RoutingState::initialize_from(&configuration);
    configuration.with_routing_state(routing)
}

/// Executors recording every call in order, for asserting what a driven
/// change actually did
#[derive(Clone, Default)]
pub struct RecordingExecutors {
    calls: Arc<Mutex<Vec<String>>>,
}

impl RecordingExecutors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn factory(&self) -> OperationApplierFactory {
        OperationApplierFactory::new(
            Arc::new(self.clone()),
            Arc::new(self.clone()),
            Arc::new(self.clone()),
            Arc::new(self.clone()),
        )
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().push(call.into());
    }
}

#[async_trait]
impl PartitionChangeExecutor for RecordingExecutors {
    async fn join(
        &self,
        partition_id: PartitionId,
        _members_with_priority: BTreeMap<MemberId, u32>,
        _config: DynamicPartitionConfig,
    ) -> ConfigurationResult<()> {
        self.record(format!("join({partition_id})"));
        Ok(())
    }

    async fn leave(&self, partition_id: PartitionId) -> ConfigurationResult<()> {
        self.record(format!("leave({partition_id})"));
        Ok(())
    }

    async fn bootstrap(
        &self,
        partition_id: PartitionId,
        _priority: u32,
        _config: DynamicPartitionConfig,
    ) -> ConfigurationResult<()> {
        self.record(format!("bootstrap({partition_id})"));
        Ok(())
    }

    async fn reconfigure_priority(
        &self,
        partition_id: PartitionId,
        priority: u32,
    ) -> ConfigurationResult<()> {
        self.record(format!("reconfigure_priority({partition_id}, {priority})"));
        Ok(())
    }

    async fn force_reconfigure(
        &self,
        partition_id: PartitionId,
        _members: Vec<MemberId>,
    ) -> ConfigurationResult<()> {
        self.record(format!("force_reconfigure({partition_id})"));
        Ok(())
    }

    async fn enable_exporter(
        &self,
        partition_id: PartitionId,
        exporter_id: &ExporterId,
        metadata_version: u64,
        _initialize_from: Option<&ExporterId>,
    ) -> ConfigurationResult<()> {
        self.record(format!(
            "enable_exporter({partition_id}, {exporter_id}, {metadata_version})"
        ));
        Ok(())
    }

    async fn disable_exporter(
        &self,
        partition_id: PartitionId,
        exporter_id: &ExporterId,
    ) -> ConfigurationResult<()> {
        self.record(format!("disable_exporter({partition_id}, {exporter_id})"));
        Ok(())
    }

    async fn delete_exporter(
        &self,
        partition_id: PartitionId,
        exporter_id: &ExporterId,
    ) -> ConfigurationResult<()> {
        self.record(format!("delete_exporter({partition_id}, {exporter_id})"));
        Ok(())
    }
}

#[async_trait]
impl ClusterMembershipChangeExecutor for RecordingExecutors {
    async fn add_broker(&self, member_id: &MemberId) -> ConfigurationResult<()> {
        self.record(format!("add_broker({member_id})"));
        Ok(())
    }

    async fn remove_broker(&self, member_id: &MemberId) -> ConfigurationResult<()> {
        self.record(format!("remove_broker({member_id})"));
        Ok(())
    }
}

#[async_trait]
impl PartitionScalingChangeExecutor for RecordingExecutors {
    async fn initiate_scale_up(&self, desired_partition_count: u32) -> ConfigurationResult<()> {
        self.record(format!("initiate_scale_up({desired_partition_count})"));
        Ok(())
    }

    async fn await_redistribution_completion(
        &self,
        desired_partition_count: u32,
        _partitions: &BTreeSet<PartitionId>,
    ) -> ConfigurationResult<()> {
        self.record(format!(
            "await_redistribution_completion({desired_partition_count})"
        ));
        Ok(())
    }

    async fn await_relocation_completion(
        &self,
        desired_partition_count: u32,
        _partitions: &BTreeSet<PartitionId>,
    ) -> ConfigurationResult<()> {
        self.record(format!(
            "await_relocation_completion({desired_partition_count})"
        ));
        Ok(())
    }

    async fn routing_state(&self) -> ConfigurationResult<RoutingState> {
        self.record("routing_state()".to_string());
        Err(armada_cluster_config::error::ConfigurationError::Internal(
            "recording executor has no routing state".to_string(),
        ))
    }
}

#[async_trait]
impl ClusterChangeExecutor for RecordingExecutors {
    async fn delete_history(&self) -> ConfigurationResult<()> {
        self.record("delete_history()".to_string());
        Ok(())
    }
}
