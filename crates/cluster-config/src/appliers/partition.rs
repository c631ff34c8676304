//! Appliers for partition replica membership and priority changes

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::appliers::{
    ConfigurationChangeApplier, ConfigurationTransformer, MemberOperationApplier,
    MemberStateTransformer,
};
use crate::error::{ConfigurationError, ConfigurationResult};
use crate::executors::PartitionChangeExecutor;
use crate::state::{
    ClusterConfiguration, DynamicPartitionConfig, MemberStatus, PartitionState, PartitionStatus,
};
use crate::types::{MemberId, PartitionId};

/// Adds a replica of an existing partition to a member
pub(super) struct PartitionJoinApplier {
    member_id: MemberId,
    partition_id: PartitionId,
    priority: u32,
    executor: Arc<dyn PartitionChangeExecutor>,
    // captured by init for apply
    members_with_priority: Option<BTreeMap<MemberId, u32>>,
    partition_config: Option<DynamicPartitionConfig>,
}

impl PartitionJoinApplier {
    pub(super) fn new(
        member_id: MemberId,
        partition_id: PartitionId,
        priority: u32,
        executor: Arc<dyn PartitionChangeExecutor>,
    ) -> Self {
        Self {
            member_id,
            partition_id,
            priority,
            executor,
            members_with_priority: None,
            partition_config: None,
        }
    }
}

#[async_trait]
impl MemberOperationApplier for PartitionJoinApplier {
    fn member_id(&self) -> &MemberId {
        &self.member_id
    }

    fn init_member_state(
        &mut self,
        current: &ClusterConfiguration,
    ) -> ConfigurationResult<MemberStateTransformer> {
        let member = current.member(&self.member_id).ok_or_else(|| {
            ConfigurationError::InvalidRequest(format!(
                "member {} is not part of the cluster",
                self.member_id
            ))
        })?;
        if member.state != MemberStatus::Active {
            return Err(ConfigurationError::InvalidRequest(format!(
                "member {} must be active to join {}, is {:?}",
                self.member_id, self.partition_id, member.state
            )));
        }

        // The new replica starts from the config of any member that already
        // hosts the partition; the config does not change concurrently with
        // membership changes, so any host will do.
        let config = current
            .members()
            .iter()
            .filter(|(member_id, _)| **member_id != self.member_id)
            .find_map(|(_, state)| state.partition(self.partition_id))
            .map(|partition| partition.config.clone())
            .ok_or_else(|| {
                ConfigurationError::InvalidRequest(format!(
                    "{} is not hosted by any other member",
                    self.partition_id
                ))
            })?;

        let mut members_with_priority = current.members_hosting(self.partition_id);
        members_with_priority.insert(self.member_id.clone(), self.priority);
        self.members_with_priority = Some(members_with_priority);
        self.partition_config = Some(config.clone());

        match member.partition(self.partition_id).map(|p| p.state) {
            None => {
                let partition_id = self.partition_id;
                let priority = self.priority;
                Ok(Box::new(move |member| {
                    member.add_partition(partition_id, PartitionState::joining(priority, config))
                }))
            }
            // A previous attempt of this operation already started the join
            Some(PartitionStatus::Joining) => Ok(Box::new(|member| member)),
            Some(state) => Err(ConfigurationError::InvalidRequest(format!(
                "member {} already hosts {} in state {state:?}",
                self.member_id, self.partition_id
            ))),
        }
    }

    async fn apply_operation(&mut self) -> ConfigurationResult<MemberStateTransformer> {
        let members_with_priority = self.members_with_priority.clone().ok_or_else(|| {
            ConfigurationError::Internal("apply called before init".to_string())
        })?;
        let config = self.partition_config.clone().ok_or_else(|| {
            ConfigurationError::Internal("apply called before init".to_string())
        })?;
        self.executor
            .join(self.partition_id, members_with_priority, config)
            .await?;
        let partition_id = self.partition_id;
        Ok(Box::new(move |member| {
            member.update_partition(partition_id, PartitionState::to_active)
        }))
    }
}

/// Removes a partition replica from a member
pub(super) struct PartitionLeaveApplier {
    member_id: MemberId,
    partition_id: PartitionId,
    minimum_allowed_replicas: u32,
    executor: Arc<dyn PartitionChangeExecutor>,
}

impl PartitionLeaveApplier {
    pub(super) fn new(
        member_id: MemberId,
        partition_id: PartitionId,
        minimum_allowed_replicas: u32,
        executor: Arc<dyn PartitionChangeExecutor>,
    ) -> Self {
        Self {
            member_id,
            partition_id,
            minimum_allowed_replicas,
            executor,
        }
    }
}

#[async_trait]
impl MemberOperationApplier for PartitionLeaveApplier {
    fn member_id(&self) -> &MemberId {
        &self.member_id
    }

    fn init_member_state(
        &mut self,
        current: &ClusterConfiguration,
    ) -> ConfigurationResult<MemberStateTransformer> {
        let member = current.member(&self.member_id).ok_or_else(|| {
            ConfigurationError::InvalidRequest(format!(
                "member {} is not part of the cluster",
                self.member_id
            ))
        })?;
        let partition = member.partition(self.partition_id).ok_or_else(|| {
            ConfigurationError::InvalidRequest(format!(
                "member {} does not host {}",
                self.member_id, self.partition_id
            ))
        })?;
        if partition.state == PartitionStatus::Leaving {
            // A previous attempt of this operation already started the leave
            return Ok(Box::new(|member| member));
        }

        let replicas = current.members_hosting(self.partition_id).len() as u32;
        if replicas <= self.minimum_allowed_replicas {
            return Err(ConfigurationError::InvalidRequest(format!(
                "member {} cannot leave {}: it has {replicas} replicas, the minimum is {}",
                self.member_id, self.partition_id, self.minimum_allowed_replicas
            )));
        }

        let partition_id = self.partition_id;
        Ok(Box::new(move |member| {
            member.update_partition(partition_id, PartitionState::to_leaving)
        }))
    }

    async fn apply_operation(&mut self) -> ConfigurationResult<MemberStateTransformer> {
        self.executor.leave(self.partition_id).await?;
        let partition_id = self.partition_id;
        Ok(Box::new(move |member| member.remove_partition(partition_id)))
    }
}

/// Creates a brand-new partition on a member
pub(super) struct PartitionBootstrapApplier {
    member_id: MemberId,
    partition_id: PartitionId,
    priority: u32,
    config: Option<DynamicPartitionConfig>,
    executor: Arc<dyn PartitionChangeExecutor>,
}

impl PartitionBootstrapApplier {
    pub(super) fn new(
        member_id: MemberId,
        partition_id: PartitionId,
        priority: u32,
        config: Option<DynamicPartitionConfig>,
        executor: Arc<dyn PartitionChangeExecutor>,
    ) -> Self {
        Self {
            member_id,
            partition_id,
            priority,
            config,
            executor,
        }
    }

    fn resolved_config(&self) -> DynamicPartitionConfig {
        self.config.clone().unwrap_or_default()
    }
}

#[async_trait]
impl MemberOperationApplier for PartitionBootstrapApplier {
    fn member_id(&self) -> &MemberId {
        &self.member_id
    }

    fn init_member_state(
        &mut self,
        current: &ClusterConfiguration,
    ) -> ConfigurationResult<MemberStateTransformer> {
        let member = current.member(&self.member_id).ok_or_else(|| {
            ConfigurationError::InvalidRequest(format!(
                "member {} is not part of the cluster",
                self.member_id
            ))
        })?;
        if member.state != MemberStatus::Active {
            return Err(ConfigurationError::InvalidRequest(format!(
                "member {} must be active to bootstrap {}, is {:?}",
                self.member_id, self.partition_id, member.state
            )));
        }
        if let Some(partition) = member.partition(self.partition_id) {
            return if partition.state == PartitionStatus::Bootstrapping {
                // A previous attempt of this operation already started
                Ok(Box::new(|member| member))
            } else {
                Err(ConfigurationError::InvalidRequest(format!(
                    "member {} already hosts {} in state {:?}",
                    self.member_id, self.partition_id, partition.state
                )))
            };
        }
        let other_hosts = current
            .members_hosting(self.partition_id)
            .into_iter()
            .filter(|(member_id, _)| *member_id != self.member_id)
            .count();
        if other_hosts > 0 {
            return Err(ConfigurationError::InvalidRequest(format!(
                "{} already exists and cannot be bootstrapped again",
                self.partition_id
            )));
        }

        let partition_id = self.partition_id;
        let priority = self.priority;
        let config = self.resolved_config();
        Ok(Box::new(move |member| {
            member.add_partition(partition_id, PartitionState::bootstrapping(priority, config))
        }))
    }

    async fn apply_operation(&mut self) -> ConfigurationResult<MemberStateTransformer> {
        self.executor
            .bootstrap(self.partition_id, self.priority, self.resolved_config())
            .await?;
        let partition_id = self.partition_id;
        Ok(Box::new(move |member| {
            member.update_partition(partition_id, PartitionState::to_active)
        }))
    }
}

/// Changes the election priority of a replica
pub(super) struct PartitionReconfigurePriorityApplier {
    member_id: MemberId,
    partition_id: PartitionId,
    priority: u32,
    executor: Arc<dyn PartitionChangeExecutor>,
}

impl PartitionReconfigurePriorityApplier {
    pub(super) fn new(
        member_id: MemberId,
        partition_id: PartitionId,
        priority: u32,
        executor: Arc<dyn PartitionChangeExecutor>,
    ) -> Self {
        Self {
            member_id,
            partition_id,
            priority,
            executor,
        }
    }
}

#[async_trait]
impl MemberOperationApplier for PartitionReconfigurePriorityApplier {
    fn member_id(&self) -> &MemberId {
        &self.member_id
    }

    fn init_member_state(
        &mut self,
        current: &ClusterConfiguration,
    ) -> ConfigurationResult<MemberStateTransformer> {
        let hosts_partition = current
            .member(&self.member_id)
            .is_some_and(|member| member.has_partition(self.partition_id));
        if !hosts_partition {
            return Err(ConfigurationError::InvalidRequest(format!(
                "member {} does not host {}",
                self.member_id, self.partition_id
            )));
        }
        // No transitional state: the priority flips atomically on completion
        Ok(Box::new(|member| member))
    }

    async fn apply_operation(&mut self) -> ConfigurationResult<MemberStateTransformer> {
        self.executor
            .reconfigure_priority(self.partition_id, self.priority)
            .await?;
        let partition_id = self.partition_id;
        let priority = self.priority;
        Ok(Box::new(move |member| {
            member.update_partition(partition_id, |partition| partition.with_priority(priority))
        }))
    }
}

/// Replaces the replication group of a partition unconditionally.
///
/// Used to recover a partition that lost too many replicas for regular
/// reconfiguration to make progress.
pub(super) struct PartitionForceReconfigureApplier {
    member_id: MemberId,
    partition_id: PartitionId,
    members: Vec<MemberId>,
    executor: Arc<dyn PartitionChangeExecutor>,
}

impl PartitionForceReconfigureApplier {
    pub(super) fn new(
        member_id: MemberId,
        partition_id: PartitionId,
        members: Vec<MemberId>,
        executor: Arc<dyn PartitionChangeExecutor>,
    ) -> Self {
        Self {
            member_id,
            partition_id,
            members,
            executor,
        }
    }
}

#[async_trait]
impl ConfigurationChangeApplier for PartitionForceReconfigureApplier {
    fn init(
        &mut self,
        current: &ClusterConfiguration,
    ) -> ConfigurationResult<ConfigurationTransformer> {
        if !self.members.contains(&self.member_id) {
            return Err(ConfigurationError::InvalidRequest(format!(
                "member {} applying the force reconfiguration of {} must be part \
                 of the new replica set",
                self.member_id, self.partition_id
            )));
        }
        for member_id in &self.members {
            let member = current.member(member_id).ok_or_else(|| {
                ConfigurationError::InvalidRequest(format!(
                    "member {member_id} is not part of the cluster"
                ))
            })?;
            if member.state != MemberStatus::Active {
                return Err(ConfigurationError::InvalidRequest(format!(
                    "member {member_id} must be active for the force reconfiguration \
                     of {}, is {:?}",
                    self.partition_id, member.state
                )));
            }
            if !member.has_partition(self.partition_id) {
                return Err(ConfigurationError::InvalidRequest(format!(
                    "member {member_id} does not host {}",
                    self.partition_id
                )));
            }
        }
        Ok(Box::new(|configuration| configuration))
    }

    async fn apply(&mut self) -> ConfigurationResult<ConfigurationTransformer> {
        self.executor
            .force_reconfigure(self.partition_id, self.members.clone())
            .await?;
        let partition_id = self.partition_id;
        let members = self.members.clone();
        // Best effort: the removals below fold in one step and are not
        // individually retried if the process dies while the configuration
        // update is in flight.
        Ok(Box::new(move |configuration| {
            let mut configuration = configuration;
            for (host, _) in configuration.members_hosting(partition_id) {
                if !members.contains(&host) {
                    configuration = configuration
                        .update_member(&host, move |member| member.remove_partition(partition_id));
                }
            }
            configuration
        }))
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use std::collections::BTreeMap;

    use super::*;
    use crate::executors::NoopPartitionChangeExecutor;
    use crate::state::{ExporterState, ExportersConfig, MemberState};
    use crate::types::ExporterId;

    fn executor() -> Arc<dyn PartitionChangeExecutor> {
        Arc::new(NoopPartitionChangeExecutor)
    }

    fn member(id: &str) -> MemberId {
        MemberId::from(id)
    }

    fn partition(id: u32) -> PartitionId {
        PartitionId::new(id)
    }

    fn marker_config() -> DynamicPartitionConfig {
        DynamicPartitionConfig {
            exporting: ExportersConfig::default()
                .with_exporter(ExporterId::from("marker"), ExporterState::enabled(1, None)),
        }
    }

    /// A cluster where members `hosts` each hold an active replica of
    /// partition 1 carrying a marker config
    fn cluster_hosting_partition(hosts: &[&str], spare: &[&str]) -> ClusterConfiguration {
        let mut configuration = ClusterConfiguration::init("test");
        for id in hosts {
            let partitions = BTreeMap::from([(
                partition(1),
                PartitionState::active(3, marker_config()),
            )]);
            configuration = configuration.add_member(member(id), MemberState::active(partitions));
        }
        for id in spare {
            configuration =
                configuration.add_member(member(id), MemberState::active(BTreeMap::new()));
        }
        configuration
    }

    #[tokio::test]
    async fn join_copies_config_from_existing_host() {
        let configuration = cluster_hosting_partition(&["0"], &["1"]);
        let mut applier = PartitionJoinApplier::new(member("1"), partition(1), 2, executor());

        let state = applier.init_member_state(&configuration).unwrap()(
            configuration.member(&member("1")).unwrap().clone(),
        );

        let joined = state.partition(partition(1)).unwrap();
        assert_eq!(joined.state, PartitionStatus::Joining);
        assert_eq!(joined.priority, 2);
        assert_eq!(joined.config, marker_config());
    }

    #[tokio::test]
    async fn join_captures_full_replica_set() {
        let configuration = cluster_hosting_partition(&["0", "1"], &["2"]);
        let mut applier = PartitionJoinApplier::new(member("2"), partition(1), 7, executor());

        applier.init_member_state(&configuration).unwrap();

        assert_eq!(
            applier.members_with_priority.as_ref().unwrap(),
            &BTreeMap::from([(member("0"), 3), (member("1"), 3), (member("2"), 7)])
        );
    }

    #[tokio::test]
    async fn join_rejects_unknown_partition() {
        let configuration = cluster_hosting_partition(&[], &["0"]);
        let mut applier = PartitionJoinApplier::new(member("0"), partition(1), 1, executor());

        assert_matches!(
            applier.init_member_state(&configuration),
            Err(ConfigurationError::InvalidRequest(_))
        );
    }

    #[tokio::test]
    async fn leave_rejects_at_minimum_replica_count() {
        let configuration = cluster_hosting_partition(&["0", "1"], &[]);
        let mut applier = PartitionLeaveApplier::new(member("0"), partition(1), 2, executor());

        assert_matches!(
            applier.init_member_state(&configuration),
            Err(ConfigurationError::InvalidRequest(_))
        );
    }

    #[tokio::test]
    async fn leave_succeeds_above_minimum_and_removes_partition() {
        let configuration = cluster_hosting_partition(&["0", "1", "2"], &[]);
        let mut applier = PartitionLeaveApplier::new(member("0"), partition(1), 2, executor());

        let state = applier.init_member_state(&configuration).unwrap()(
            configuration.member(&member("0")).unwrap().clone(),
        );
        assert_eq!(
            state.partition(partition(1)).unwrap().state,
            PartitionStatus::Leaving
        );

        let state = applier.apply_operation().await.unwrap()(state);
        assert!(!state.has_partition(partition(1)));
    }

    #[tokio::test]
    async fn bootstrap_rejects_existing_partition() {
        let configuration = cluster_hosting_partition(&["0"], &["1"]);
        let mut applier =
            PartitionBootstrapApplier::new(member("1"), partition(1), 1, None, executor());

        assert_matches!(
            applier.init_member_state(&configuration),
            Err(ConfigurationError::InvalidRequest(_))
        );
    }

    #[tokio::test]
    async fn bootstrap_creates_and_activates_partition() {
        let configuration = cluster_hosting_partition(&[], &["0"]);
        let mut applier =
            PartitionBootstrapApplier::new(member("0"), partition(1), 4, None, executor());

        let state = applier.init_member_state(&configuration).unwrap()(
            configuration.member(&member("0")).unwrap().clone(),
        );
        assert_eq!(
            state.partition(partition(1)).unwrap().state,
            PartitionStatus::Bootstrapping
        );

        let state = applier.apply_operation().await.unwrap()(state);
        let bootstrapped = state.partition(partition(1)).unwrap();
        assert_eq!(bootstrapped.state, PartitionStatus::Active);
        assert_eq!(bootstrapped.priority, 4);
    }

    #[tokio::test]
    async fn force_reconfigure_requires_initiator_in_new_set() {
        let configuration = cluster_hosting_partition(&["0", "1"], &[]);
        let mut applier = PartitionForceReconfigureApplier::new(
            member("0"),
            partition(1),
            vec![member("1")],
            executor(),
        );

        assert_matches!(
            applier.init(&configuration),
            Err(ConfigurationError::InvalidRequest(_))
        );
    }

    #[tokio::test]
    async fn force_reconfigure_removes_partition_from_non_members() {
        let configuration = cluster_hosting_partition(&["0", "1", "2"], &[]);
        let mut applier = PartitionForceReconfigureApplier::new(
            member("0"),
            partition(1),
            vec![member("0"), member("1")],
            executor(),
        );

        let configuration = applier.init(&configuration).unwrap()(configuration);
        let configuration = applier.apply().await.unwrap()(configuration);

        assert!(configuration.member(&member("0")).unwrap().has_partition(partition(1)));
        assert!(configuration.member(&member("1")).unwrap().has_partition(partition(1)));
        assert!(!configuration.member(&member("2")).unwrap().has_partition(partition(1)));
    }
}
