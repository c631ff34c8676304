//! The change coordinator
//!
//! Turns declarative change requests into validated, ordered operation
//! sequences and persists them as a change plan. All mutating calls funnel
//! through a single task, so no two requests validate and persist
//! concurrently; configuration reads stay concurrent and always observe a
//! fully-formed snapshot.

pub mod execution;
mod request;

pub use self::request::{ConfigurationChangeRequest, ConfigurationChangeResult, Forced};

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::CoordinatorConfig;
use crate::error::{ConfigurationError, ConfigurationResult};
use crate::manager::ClusterConfigurationManager;
use crate::state::ClusterConfiguration;
use crate::types::{ChangeId, MemberId};

enum CoordinatorCommand {
    ApplyOperations {
        request: Box<dyn ConfigurationChangeRequest>,
        dry_run: bool,
        reply: oneshot::Sender<ConfigurationResult<ConfigurationChangeResult>>,
    },
    CancelChange {
        change_id: ChangeId,
        reply: oneshot::Sender<ConfigurationResult<ClusterConfiguration>>,
    },
    Shutdown,
}

/// Coordinates cluster configuration changes on behalf of the local member
pub struct ChangeCoordinator {
    manager: Arc<dyn ClusterConfigurationManager>,
    command_tx: mpsc::Sender<CoordinatorCommand>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ChangeCoordinator {
    /// Create a coordinator acting as the given local member and spawn its
    /// task
    pub fn new(
        manager: Arc<dyn ClusterConfigurationManager>,
        local_member_id: MemberId,
        config: CoordinatorConfig,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::channel(config.command_channel_capacity);
        let task = CoordinatorTask {
            manager: manager.clone(),
            local_member_id,
        };
        let handle = tokio::spawn(task.run(command_rx));
        Self {
            manager,
            command_tx,
            task: Mutex::new(Some(handle)),
        }
    }

    /// The last known cluster configuration.
    ///
    /// Reads bypass the coordinator task and may happen concurrently with
    /// changes; they always observe a fully-formed snapshot.
    pub async fn get_configuration(&self) -> ConfigurationResult<ClusterConfiguration> {
        self.manager.get_cluster_configuration().await
    }

    /// Validate the request by simulation and, on success, persist the
    /// resulting operations as a new active change plan
    pub async fn apply_operations(
        &self,
        request: impl ConfigurationChangeRequest + 'static,
    ) -> ConfigurationResult<ConfigurationChangeResult> {
        self.submit_request(Box::new(request), false).await
    }

    /// Validate the request by simulation without persisting anything
    pub async fn simulate_operations(
        &self,
        request: impl ConfigurationChangeRequest + 'static,
    ) -> ConfigurationResult<ConfigurationChangeResult> {
        self.submit_request(Box::new(request), true).await
    }

    /// Cancel the pending change with the given ID, discarding its not yet
    /// applied operations. Effects of already completed operations are kept.
    pub async fn cancel_change(
        &self,
        change_id: ChangeId,
    ) -> ConfigurationResult<ClusterConfiguration> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(CoordinatorCommand::CancelChange {
            change_id,
            reply: reply_tx,
        })
        .await?;
        Self::receive(reply_rx).await
    }

    /// Stop the coordinator task. Pending commands are still answered.
    pub async fn shutdown(&self) {
        let _ = self.command_tx.send(CoordinatorCommand::Shutdown).await;
        let handle = self.task.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    async fn submit_request(
        &self,
        request: Box<dyn ConfigurationChangeRequest>,
        dry_run: bool,
    ) -> ConfigurationResult<ConfigurationChangeResult> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(CoordinatorCommand::ApplyOperations {
            request,
            dry_run,
            reply: reply_tx,
        })
        .await?;
        Self::receive(reply_rx).await
    }

    async fn send(&self, command: CoordinatorCommand) -> ConfigurationResult<()> {
        self.command_tx.send(command).await.map_err(|_| {
            ConfigurationError::Internal("the change coordinator is not running".to_string())
        })
    }

    async fn receive<T>(reply_rx: oneshot::Receiver<ConfigurationResult<T>>) -> ConfigurationResult<T> {
        reply_rx.await.map_err(|_| {
            ConfigurationError::Internal("the change coordinator dropped the request".to_string())
        })?
    }
}

struct CoordinatorTask {
    manager: Arc<dyn ClusterConfigurationManager>,
    local_member_id: MemberId,
}

impl CoordinatorTask {
    async fn run(self, mut command_rx: mpsc::Receiver<CoordinatorCommand>) {
        while let Some(command) = command_rx.recv().await {
            match command {
                CoordinatorCommand::ApplyOperations {
                    request,
                    dry_run,
                    reply,
                } => {
                    let result = self.handle_request(request, dry_run).await;
                    if let Err(error) = &result {
                        warn!(%error, dry_run, "rejected configuration change request");
                    }
                    let _ = reply.send(result);
                }
                CoordinatorCommand::CancelChange { change_id, reply } => {
                    let _ = reply.send(self.handle_cancel(change_id).await);
                }
                CoordinatorCommand::Shutdown => break,
            }
        }
        debug!("change coordinator stopped");
    }

    async fn handle_request(
        &self,
        request: Box<dyn ConfigurationChangeRequest>,
        dry_run: bool,
    ) -> ConfigurationResult<ConfigurationChangeResult> {
        let current = self.manager.get_cluster_configuration().await?;
        if current.is_uninitialized() {
            return Err(ConfigurationError::InvalidRequest(
                "the cluster configuration is not initialized".to_string(),
            ));
        }
        if !request.is_forced() {
            match current.coordinator() {
                Some(coordinator) if *coordinator == self.local_member_id => {}
                Some(coordinator) => {
                    return Err(ConfigurationError::OperationNotAllowed(format!(
                        "member {} cannot start configuration changes, the \
                         coordinator is {coordinator}",
                        self.local_member_id
                    )));
                }
                None => {
                    return Err(ConfigurationError::OperationNotAllowed(
                        "the cluster has no members".to_string(),
                    ));
                }
            }
        }
        if let Some(pending) = current.pending_changes() {
            return Err(ConfigurationError::ConcurrentModification(format!(
                "change {} is still in progress",
                pending.id
            )));
        }

        let operations = request
            .operations(&current)
            .map_err(ConfigurationError::into_invalid_request)?;
        let expected = execution::simulate_operations(current.clone(), operations.clone())
            .await
            .map_err(ConfigurationError::into_invalid_request)?;
        let change_id = expected
            .last_change()
            .map(|change| change.id)
            .ok_or_else(|| {
                ConfigurationError::Internal(
                    "simulation did not produce a completed change".to_string(),
                )
            })?;

        if dry_run {
            debug!(%change_id, operations = operations.len(), "simulated configuration change");
            return Ok(ConfigurationChangeResult {
                change_id,
                current_configuration: current,
                expected_configuration: expected,
                planned_changes: operations,
            });
        }

        let validated = current.clone();
        let to_apply = operations.clone();
        let updated = self
            .manager
            .update_cluster_configuration(Box::new(move |latest| {
                if latest != validated {
                    return Err(ConfigurationError::ConcurrentModification(
                        "the configuration changed while the request was being \
                         validated"
                            .to_string(),
                    ));
                }
                latest.start_configuration_change(to_apply)
            }))
            .await?;
        let change_id = updated
            .pending_changes()
            .map(|plan| plan.id)
            .ok_or_else(|| {
                ConfigurationError::Internal(
                    "the started change is no longer pending".to_string(),
                )
            })?;
        info!(%change_id, operations = operations.len(), "started configuration change");

        Ok(ConfigurationChangeResult {
            change_id,
            current_configuration: current,
            expected_configuration: expected,
            planned_changes: operations,
        })
    }

    async fn handle_cancel(
        &self,
        change_id: ChangeId,
    ) -> ConfigurationResult<ClusterConfiguration> {
        let current = self.manager.get_cluster_configuration().await?;
        if current.is_uninitialized() {
            return Err(ConfigurationError::InvalidRequest(
                "the cluster configuration is not initialized".to_string(),
            ));
        }
        validate_cancellable(&current, change_id)?;

        let updated = self
            .manager
            .update_cluster_configuration(Box::new(move |latest| {
                // The pending change may have advanced or completed since the
                // validation above; check again against the latest state
                validate_cancellable(&latest, change_id)?;
                Ok(latest.cancel_pending_changes())
            }))
            .await?;
        info!(%change_id, "cancelled configuration change");
        Ok(updated)
    }
}

fn validate_cancellable(
    configuration: &ClusterConfiguration,
    change_id: ChangeId,
) -> ConfigurationResult<()> {
    match configuration.pending_changes() {
        None => Err(ConfigurationError::InvalidRequest(
            "no configuration change is in progress".to_string(),
        )),
        Some(plan) if plan.id != change_id => Err(ConfigurationError::InvalidRequest(format!(
            "change {change_id} is not pending, the current change is {}",
            plan.id
        ))),
        Some(_) => Ok(()),
    }
}
