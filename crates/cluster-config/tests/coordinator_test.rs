//! End-to-end tests of the change coordinator over the in-memory manager

mod common;

use std::sync::Arc;

use assert_matches::assert_matches;

use armada_cluster_config::coordinator::Forced;
use armada_cluster_config::state::{
    ChangeStatus, ClusterConfiguration, ClusterConfigurationChangeOperation, MemberStatus,
};
use armada_cluster_config::{
    ChangeCoordinator, ConfigurationError, ConfigurationResult, CoordinatorConfig,
    InMemoryConfigurationManager, MemberId,
};

use common::{cluster, member};

fn coordinator_for(
    configuration: ClusterConfiguration,
    local_member: &str,
) -> (ChangeCoordinator, Arc<InMemoryConfigurationManager>) {
    let manager = Arc::new(InMemoryConfigurationManager::new(configuration));
    let coordinator = ChangeCoordinator::new(
        manager.clone(),
        member(local_member),
        CoordinatorConfig::default(),
    );
    (coordinator, manager)
}

fn join_request(
    id: &str,
) -> impl Fn(&ClusterConfiguration) -> ConfigurationResult<Vec<ClusterConfigurationChangeOperation>>
+ Send
+ use<> {
    let member_id = member(id);
    move |_: &ClusterConfiguration| {
        Ok(vec![ClusterConfigurationChangeOperation::MemberJoin {
            member_id: member_id.clone(),
        }])
    }
}

#[tokio::test]
async fn apply_operations_persists_an_active_plan() {
    let (coordinator, _) = coordinator_for(cluster(&["0", "1"], &[]), "0");

    let result = coordinator.apply_operations(join_request("2")).await.unwrap();

    assert_eq!(result.planned_changes.len(), 1);
    assert_eq!(
        result
            .expected_configuration
            .member(&member("2"))
            .unwrap()
            .state,
        MemberStatus::Active
    );

    let persisted = coordinator.get_configuration().await.unwrap();
    let plan = persisted.pending_changes().unwrap();
    assert_eq!(plan.id, result.change_id);
    assert_eq!(plan.status, ChangeStatus::Active);
    assert_eq!(plan.pending_operations, result.planned_changes);
    // Persisting the plan does not apply anything yet
    assert!(!persisted.has_member(&member("2")));

    coordinator.shutdown().await;
}

#[tokio::test]
async fn rejects_requests_on_non_coordinating_members() {
    let (coordinator, _) = coordinator_for(cluster(&["0", "1"], &[]), "1");

    let result = coordinator.apply_operations(join_request("2")).await;

    assert_matches!(result, Err(ConfigurationError::OperationNotAllowed(_)));

    // A forced request bypasses the coordinator check
    let forced = coordinator
        .apply_operations(Forced(join_request("2")))
        .await;
    assert!(forced.is_ok());

    coordinator.shutdown().await;
}

#[tokio::test]
async fn rejects_a_second_change_while_one_is_pending() {
    let (coordinator, _) = coordinator_for(cluster(&["0", "1"], &[]), "0");

    coordinator.apply_operations(join_request("2")).await.unwrap();
    let second = coordinator.apply_operations(join_request("3")).await;

    assert_matches!(second, Err(ConfigurationError::ConcurrentModification(_)));

    coordinator.shutdown().await;
}

#[tokio::test]
async fn rejects_requests_whose_simulation_fails() {
    let (coordinator, _) = coordinator_for(cluster(&["0", "1"], &[]), "0");

    // Member 1 is active; joining it again is invalid
    let result = coordinator.apply_operations(join_request("1")).await;

    assert_matches!(result, Err(ConfigurationError::InvalidRequest(_)));
    // Nothing was persisted
    let persisted = coordinator.get_configuration().await.unwrap();
    assert!(!persisted.has_pending_changes());

    coordinator.shutdown().await;
}

#[tokio::test]
async fn rejects_failing_request_functions() {
    let (coordinator, _) = coordinator_for(cluster(&["0"], &[]), "0");

    let failing = |_: &ClusterConfiguration| -> ConfigurationResult<
        Vec<ClusterConfigurationChangeOperation>,
    > {
        Err(ConfigurationError::Internal(
            "request computation failed".to_string(),
        ))
    };
    let result = coordinator.apply_operations(failing).await;

    assert_matches!(result, Err(ConfigurationError::InvalidRequest(_)));

    coordinator.shutdown().await;
}

#[tokio::test]
async fn simulation_never_changes_the_configuration() {
    let (coordinator, _) = coordinator_for(cluster(&["0", "1"], &[]), "0");
    let before = coordinator.get_configuration().await.unwrap();

    let result = coordinator
        .simulate_operations(join_request("2"))
        .await
        .unwrap();

    assert!(
        result
            .expected_configuration
            .has_member(&member("2"))
    );
    assert_eq!(coordinator.get_configuration().await.unwrap(), before);

    coordinator.shutdown().await;
}

#[tokio::test]
async fn cancelling_discards_pending_operations() {
    let (coordinator, _) = coordinator_for(cluster(&["0", "1"], &[]), "0");
    let members_before = coordinator.get_configuration().await.unwrap().members().clone();

    let request = |_: &ClusterConfiguration| -> ConfigurationResult<
        Vec<ClusterConfigurationChangeOperation>,
    > {
        Ok(vec![
            ClusterConfigurationChangeOperation::MemberJoin {
                member_id: member("2"),
            },
            ClusterConfigurationChangeOperation::MemberJoin {
                member_id: member("3"),
            },
        ])
    };
    let result = coordinator.apply_operations(request).await.unwrap();

    let cancelled = coordinator.cancel_change(result.change_id).await.unwrap();

    // No operation was applied before the cancellation, so member state is
    // unchanged from before the plan started
    assert_eq!(cancelled.members(), &members_before);
    assert!(!cancelled.has_pending_changes());
    let last = cancelled.last_change().unwrap();
    assert_eq!(last.id, result.change_id);
    assert_eq!(last.status, ChangeStatus::Cancelled);

    coordinator.shutdown().await;
}

#[tokio::test]
async fn cancelling_requires_a_matching_pending_change() {
    let (coordinator, _) = coordinator_for(cluster(&["0", "1"], &[]), "0");

    // Nothing pending at all
    let result = coordinator
        .cancel_change(armada_cluster_config::ChangeId::new(1))
        .await;
    assert_matches!(result, Err(ConfigurationError::InvalidRequest(_)));

    // Pending, but with a different ID
    let started = coordinator.apply_operations(join_request("2")).await.unwrap();
    let result = coordinator.cancel_change(started.change_id.next()).await;
    assert_matches!(result, Err(ConfigurationError::InvalidRequest(_)));

    coordinator.shutdown().await;
}

#[tokio::test]
async fn rejects_requests_on_an_uninitialized_cluster() {
    let (coordinator, _) = coordinator_for(ClusterConfiguration::uninitialized(), "0");

    let result = coordinator
        .apply_operations(Forced(join_request("0")))
        .await;

    assert_matches!(result, Err(ConfigurationError::InvalidRequest(_)));

    coordinator.shutdown().await;
}

#[tokio::test]
async fn rejects_empty_requests() {
    let (coordinator, _) = coordinator_for(cluster(&["0"], &[]), "0");

    let empty = |_: &ClusterConfiguration| -> ConfigurationResult<
        Vec<ClusterConfigurationChangeOperation>,
    > { Ok(vec![]) };
    let result = coordinator.apply_operations(empty).await;

    assert_matches!(result, Err(ConfigurationError::InvalidRequest(_)));

    coordinator.shutdown().await;
}

#[tokio::test]
async fn change_ids_increase_across_changes() {
    let (coordinator, _) = coordinator_for(cluster(&["0", "1"], &[]), "0");

    let first = coordinator.apply_operations(join_request("2")).await.unwrap();
    coordinator.cancel_change(first.change_id).await.unwrap();
    let second = coordinator.apply_operations(join_request("2")).await.unwrap();

    assert!(second.change_id > first.change_id);

    coordinator.shutdown().await;
}

#[tokio::test]
async fn configurations_are_serializable() {
    let (coordinator, _) = coordinator_for(cluster(&["0", "1"], &[(1, &["0", "1"])]), "0");
    coordinator.apply_operations(join_request("2")).await.unwrap();

    let configuration = coordinator.get_configuration().await.unwrap();
    let encoded = serde_json::to_string(&configuration).unwrap();
    let decoded: ClusterConfiguration = serde_json::from_str(&encoded).unwrap();

    assert_eq!(decoded, configuration);

    coordinator.shutdown().await;
}

#[tokio::test]
async fn uses_member_id_ordering_for_the_coordinator_check() {
    // Lowest member ID wins: "0" coordinates, "1" does not
    let configuration = cluster(&["1", "0"], &[]);
    let manager = Arc::new(InMemoryConfigurationManager::new(configuration));

    let as_zero = ChangeCoordinator::new(
        manager.clone(),
        MemberId::from("0"),
        CoordinatorConfig::default(),
    );
    let result = as_zero.simulate_operations(join_request("2")).await;
    assert!(result.is_ok());
    as_zero.shutdown().await;

    let as_one = ChangeCoordinator::new(
        manager.clone(),
        MemberId::from("1"),
        CoordinatorConfig::default(),
    );
    let result = as_one.simulate_operations(join_request("2")).await;
    assert_matches!(result, Err(ConfigurationError::OperationNotAllowed(_)));
    as_one.shutdown().await;
}
