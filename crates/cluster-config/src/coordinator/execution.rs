//! Stepwise execution of change plans
//!
//! [`apply_next_operation`] is the single step shared by the coordinator's
//! validation simulation and by whatever external driver performs the real
//! application: resolve the applier for the head pending operation, fold the
//! `init` transformer, fold the `apply` transformer, advance the plan.
//! Because both sides share this function and the applier factory, a
//! validated operation sequence is guaranteed to be executable.

use tracing::debug;

use crate::appliers::OperationApplierFactory;
use crate::error::{ConfigurationError, ConfigurationResult};
use crate::state::{ClusterConfiguration, ClusterConfigurationChangeOperation};

/// Apply the head pending operation of the configuration's change plan and
/// advance the plan.
///
/// Fails when no operation is pending, when the operation's validation
/// rejects the current configuration, or when its side effect fails. On
/// failure the input configuration is discarded by the caller; nothing is
/// persisted here.
pub async fn apply_next_operation(
    configuration: ClusterConfiguration,
    factory: &OperationApplierFactory,
) -> ConfigurationResult<ClusterConfiguration> {
    let Some(operation) = configuration.next_pending_operation().cloned() else {
        return Err(ConfigurationError::Internal(
            "no operation is pending".to_string(),
        ));
    };
    debug!(?operation, "applying configuration change operation");

    let mut applier = factory.applier_for(&operation);
    let started = applier.init(&configuration)?;
    let configuration = started(configuration);
    let completed = applier.apply().await?;
    let configuration = completed(configuration);
    Ok(configuration.advance_configuration_change())
}

/// Validate the given operations by running them to completion against
/// side-effect-free appliers.
///
/// Returns the predicted final configuration, including the completed change
/// record. The input configuration must not have pending changes.
pub async fn simulate_operations(
    configuration: ClusterConfiguration,
    operations: Vec<ClusterConfigurationChangeOperation>,
) -> ConfigurationResult<ClusterConfiguration> {
    let factory = OperationApplierFactory::noop();
    let mut configuration = configuration.start_configuration_change(operations)?;
    while configuration.has_pending_changes() {
        configuration = apply_next_operation(configuration, &factory).await?;
    }
    Ok(configuration)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::state::{ChangeStatus, MemberState, MemberStatus};
    use crate::types::MemberId;

    fn member(id: &str) -> MemberId {
        MemberId::from(id)
    }

    #[tokio::test]
    async fn simulation_runs_operations_in_order() {
        let configuration = ClusterConfiguration::init("test")
            .add_member(member("0"), MemberState::active(BTreeMap::new()));
        let operations = vec![
            ClusterConfigurationChangeOperation::MemberJoin {
                member_id: member("1"),
            },
            ClusterConfigurationChangeOperation::MemberLeave {
                member_id: member("1"),
            },
        ];

        let result = simulate_operations(configuration, operations)
            .await
            .unwrap();

        // The leave of member 1 validates only after its join completed, so
        // reaching the final state proves in-order execution
        assert_eq!(
            result.member(&member("1")).unwrap().state,
            MemberStatus::Left
        );
        assert_eq!(result.last_change().unwrap().status, ChangeStatus::Completed);
        assert!(!result.has_pending_changes());
    }

    #[tokio::test]
    async fn failed_validation_aborts_the_simulation() {
        let configuration = ClusterConfiguration::init("test")
            .add_member(member("0"), MemberState::active(BTreeMap::new()));
        let operations = vec![ClusterConfigurationChangeOperation::MemberLeave {
            member_id: member("missing"),
        }];

        let result = simulate_operations(configuration, operations).await;

        assert!(result.is_err());
    }
}
