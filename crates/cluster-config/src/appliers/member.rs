//! Appliers for member join, leave, and forced removal

use std::sync::Arc;

use async_trait::async_trait;

use crate::appliers::{
    ConfigurationChangeApplier, ConfigurationTransformer, MemberOperationApplier,
    MemberStateTransformer,
};
use crate::error::{ConfigurationError, ConfigurationResult};
use crate::executors::ClusterMembershipChangeExecutor;
use crate::state::{ClusterConfiguration, MemberState, MemberStatus};
use crate::types::MemberId;

/// Adds a new member to the cluster
pub(super) struct MemberJoinApplier {
    member_id: MemberId,
    executor: Arc<dyn ClusterMembershipChangeExecutor>,
}

impl MemberJoinApplier {
    pub(super) fn new(
        member_id: MemberId,
        executor: Arc<dyn ClusterMembershipChangeExecutor>,
    ) -> Self {
        Self {
            member_id,
            executor,
        }
    }
}

#[async_trait]
impl ConfigurationChangeApplier for MemberJoinApplier {
    fn init(
        &mut self,
        current: &ClusterConfiguration,
    ) -> ConfigurationResult<ConfigurationTransformer> {
        let member_id = self.member_id.clone();
        match current.member(&member_id).map(|member| member.state) {
            None => Ok(Box::new(move |configuration| {
                configuration.add_member(member_id, MemberState::joining())
            })),
            // A previous attempt of this operation already started the join
            Some(MemberStatus::Joining) => Ok(Box::new(|configuration| configuration)),
            Some(state) => Err(ConfigurationError::InvalidRequest(format!(
                "member {member_id} is already part of the cluster in state {state:?}"
            ))),
        }
    }

    async fn apply(&mut self) -> ConfigurationResult<ConfigurationTransformer> {
        self.executor.add_broker(&self.member_id).await?;
        let member_id = self.member_id.clone();
        Ok(Box::new(move |configuration| {
            configuration.update_member(&member_id, MemberState::to_active)
        }))
    }
}

/// Removes the member from the cluster gracefully
pub(super) struct MemberLeaveApplier {
    member_id: MemberId,
    executor: Arc<dyn ClusterMembershipChangeExecutor>,
}

impl MemberLeaveApplier {
    pub(super) fn new(
        member_id: MemberId,
        executor: Arc<dyn ClusterMembershipChangeExecutor>,
    ) -> Self {
        Self {
            member_id,
            executor,
        }
    }
}

#[async_trait]
impl MemberOperationApplier for MemberLeaveApplier {
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
        match member.state {
            MemberStatus::Active => Ok(Box::new(MemberState::to_leaving)),
            MemberStatus::Leaving => Ok(Box::new(|member| member)),
            state => Err(ConfigurationError::InvalidRequest(format!(
                "member {} cannot leave the cluster from state {state:?}",
                self.member_id
            ))),
        }
    }

    async fn apply_operation(&mut self) -> ConfigurationResult<MemberStateTransformer> {
        self.executor.remove_broker(&self.member_id).await?;
        Ok(Box::new(MemberState::to_left))
    }
}

/// Force-removes another member, e.g. one that is permanently unreachable
pub(super) struct MemberRemoveApplier {
    member_id: MemberId,
    member_to_remove: MemberId,
    executor: Arc<dyn ClusterMembershipChangeExecutor>,
}

impl MemberRemoveApplier {
    pub(super) fn new(
        member_id: MemberId,
        member_to_remove: MemberId,
        executor: Arc<dyn ClusterMembershipChangeExecutor>,
    ) -> Self {
        Self {
            member_id,
            member_to_remove,
            executor,
        }
    }
}

#[async_trait]
impl ConfigurationChangeApplier for MemberRemoveApplier {
    fn init(
        &mut self,
        current: &ClusterConfiguration,
    ) -> ConfigurationResult<ConfigurationTransformer> {
        if self.member_id == self.member_to_remove {
            return Err(ConfigurationError::InvalidRequest(format!(
                "member {} cannot force-remove itself",
                self.member_id
            )));
        }
        if !current.has_member(&self.member_to_remove) {
            // Already removed, e.g. by a previous attempt of this operation
            return Ok(Box::new(|configuration| configuration));
        }
        let member_to_remove = self.member_to_remove.clone();
        Ok(Box::new(move |configuration| {
            configuration.update_member(&member_to_remove, MemberState::to_leaving)
        }))
    }

    async fn apply(&mut self) -> ConfigurationResult<ConfigurationTransformer> {
        self.executor.remove_broker(&self.member_to_remove).await?;
        let member_to_remove = self.member_to_remove.clone();
        Ok(Box::new(move |configuration| {
            configuration.remove_member(&member_to_remove)
        }))
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::executors::NoopClusterMembershipChangeExecutor;

    fn executor() -> Arc<dyn ClusterMembershipChangeExecutor> {
        Arc::new(NoopClusterMembershipChangeExecutor)
    }

    fn member(id: &str) -> MemberId {
        MemberId::from(id)
    }

    #[tokio::test]
    async fn join_adds_member_and_activates_it() {
        let configuration = ClusterConfiguration::init("test");
        let mut applier = MemberJoinApplier::new(member("0"), executor());

        let configuration = applier.init(&configuration).unwrap()(configuration);
        assert_eq!(
            configuration.member(&member("0")).unwrap().state,
            MemberStatus::Joining
        );

        let configuration = applier.apply().await.unwrap()(configuration);
        assert_eq!(
            configuration.member(&member("0")).unwrap().state,
            MemberStatus::Active
        );
    }

    #[tokio::test]
    async fn join_init_is_idempotent_for_joining_member() {
        let configuration =
            ClusterConfiguration::init("test").add_member(member("0"), MemberState::joining());
        let mut applier = MemberJoinApplier::new(member("0"), executor());

        let before = configuration.clone();
        let after = applier.init(&configuration).unwrap()(configuration);

        assert_eq!(after.members(), before.members());
    }

    #[tokio::test]
    async fn join_rejects_active_member() {
        let configuration = ClusterConfiguration::init("test")
            .add_member(member("0"), MemberState::active(Default::default()));
        let mut applier = MemberJoinApplier::new(member("0"), executor());

        assert_matches!(
            applier.init(&configuration),
            Err(ConfigurationError::InvalidRequest(_))
        );
    }

    #[tokio::test]
    async fn leave_rejects_joining_member() {
        let configuration =
            ClusterConfiguration::init("test").add_member(member("0"), MemberState::joining());
        let mut applier = MemberLeaveApplier::new(member("0"), executor());

        assert_matches!(
            applier.init_member_state(&configuration),
            Err(ConfigurationError::InvalidRequest(_))
        );
    }

    #[tokio::test]
    async fn remove_drops_target_member() {
        let configuration = ClusterConfiguration::init("test")
            .add_member(member("0"), MemberState::active(Default::default()))
            .add_member(member("1"), MemberState::active(Default::default()));
        let mut applier = MemberRemoveApplier::new(member("0"), member("1"), executor());

        let configuration = applier.init(&configuration).unwrap()(configuration);
        assert_eq!(
            configuration.member(&member("1")).unwrap().state,
            MemberStatus::Leaving
        );

        let configuration = applier.apply().await.unwrap()(configuration);
        assert!(!configuration.has_member(&member("1")));
    }

    #[tokio::test]
    async fn remove_rejects_self_removal() {
        let configuration = ClusterConfiguration::init("test")
            .add_member(member("0"), MemberState::active(Default::default()));
        let mut applier = MemberRemoveApplier::new(member("0"), member("0"), executor());

        assert_matches!(
            applier.init(&configuration),
            Err(ConfigurationError::InvalidRequest(_))
        );
    }
}
