//! Appliers for the per-partition exporter lifecycle

use std::sync::Arc;

use async_trait::async_trait;

use crate::appliers::{MemberOperationApplier, MemberStateTransformer};
use crate::error::{ConfigurationError, ConfigurationResult};
use crate::executors::PartitionChangeExecutor;
use crate::state::{ClusterConfiguration, ExporterState, ExporterStatus, PartitionState};
use crate::types::{ExporterId, MemberId, PartitionId};

fn partition_of<'a>(
    current: &'a ClusterConfiguration,
    member_id: &MemberId,
    partition_id: PartitionId,
) -> ConfigurationResult<&'a PartitionState> {
    current
        .member(member_id)
        .and_then(|member| member.partition(partition_id))
        .ok_or_else(|| {
            ConfigurationError::InvalidRequest(format!(
                "member {member_id} does not host {partition_id}"
            ))
        })
}

/// Enables an exporter on a partition
pub(super) struct PartitionEnableExporterApplier {
    member_id: MemberId,
    partition_id: PartitionId,
    exporter_id: ExporterId,
    initialize_from: Option<ExporterId>,
    executor: Arc<dyn PartitionChangeExecutor>,
    // Captured by init so that the written version is stable even when apply
    // is retried after a crash
    metadata_version_to_update: Option<u64>,
}

impl PartitionEnableExporterApplier {
    pub(super) fn new(
        member_id: MemberId,
        partition_id: PartitionId,
        exporter_id: ExporterId,
        initialize_from: Option<ExporterId>,
        executor: Arc<dyn PartitionChangeExecutor>,
    ) -> Self {
        Self {
            member_id,
            partition_id,
            exporter_id,
            initialize_from,
            executor,
            metadata_version_to_update: None,
        }
    }
}

#[async_trait]
impl MemberOperationApplier for PartitionEnableExporterApplier {
    fn member_id(&self) -> &MemberId {
        &self.member_id
    }

    fn init_member_state(
        &mut self,
        current: &ClusterConfiguration,
    ) -> ConfigurationResult<MemberStateTransformer> {
        let partition = partition_of(current, &self.member_id, self.partition_id)?;
        if let Some(source) = &self.initialize_from {
            if partition.config.exporting.exporter(source).is_none() {
                return Err(ConfigurationError::InvalidRequest(format!(
                    "exporter {source} to initialize {} from is not configured on {}",
                    self.exporter_id, self.partition_id
                )));
            }
        }
        // Re-enabling bumps the version of the existing record; a brand-new
        // exporter starts at 1
        let metadata_version = partition
            .config
            .exporting
            .exporter(&self.exporter_id)
            .map(|exporter| exporter.metadata_version + 1)
            .unwrap_or(1);
        self.metadata_version_to_update = Some(metadata_version);
        Ok(Box::new(|member| member))
    }

    async fn apply_operation(&mut self) -> ConfigurationResult<MemberStateTransformer> {
        let metadata_version = self.metadata_version_to_update.ok_or_else(|| {
            ConfigurationError::Internal("apply called before init".to_string())
        })?;
        self.executor
            .enable_exporter(
                self.partition_id,
                &self.exporter_id,
                metadata_version,
                self.initialize_from.as_ref(),
            )
            .await?;
        let partition_id = self.partition_id;
        let exporter_id = self.exporter_id.clone();
        let initialize_from = self.initialize_from.clone();
        Ok(Box::new(move |member| {
            member.update_partition(partition_id, |partition| {
                partition.update_config(|config| {
                    config.update_exporting(|exporting| {
                        exporting.with_exporter(
                            exporter_id,
                            ExporterState::enabled(metadata_version, initialize_from),
                        )
                    })
                })
            })
        }))
    }
}

/// Disables an exporter on a partition, keeping its metadata
pub(super) struct PartitionDisableExporterApplier {
    member_id: MemberId,
    partition_id: PartitionId,
    exporter_id: ExporterId,
    executor: Arc<dyn PartitionChangeExecutor>,
}

impl PartitionDisableExporterApplier {
    pub(super) fn new(
        member_id: MemberId,
        partition_id: PartitionId,
        exporter_id: ExporterId,
        executor: Arc<dyn PartitionChangeExecutor>,
    ) -> Self {
        Self {
            member_id,
            partition_id,
            exporter_id,
            executor,
        }
    }
}

#[async_trait]
impl MemberOperationApplier for PartitionDisableExporterApplier {
    fn member_id(&self) -> &MemberId {
        &self.member_id
    }

    fn init_member_state(
        &mut self,
        current: &ClusterConfiguration,
    ) -> ConfigurationResult<MemberStateTransformer> {
        let partition = partition_of(current, &self.member_id, self.partition_id)?;
        if partition.config.exporting.exporter(&self.exporter_id).is_none() {
            return Err(ConfigurationError::InvalidRequest(format!(
                "exporter {} is not configured on {}",
                self.exporter_id, self.partition_id
            )));
        }
        Ok(Box::new(|member| member))
    }

    async fn apply_operation(&mut self) -> ConfigurationResult<MemberStateTransformer> {
        self.executor
            .disable_exporter(self.partition_id, &self.exporter_id)
            .await?;
        let partition_id = self.partition_id;
        let exporter_id = self.exporter_id.clone();
        Ok(Box::new(move |member| {
            member.update_partition(partition_id, |partition| {
                partition.update_config(|config| {
                    config.update_exporting(|exporting| {
                        exporting.update_exporter(&exporter_id, ExporterState::disable)
                    })
                })
            })
        }))
    }
}

/// Deletes an exporter whose static configuration no longer exists
pub(super) struct PartitionDeleteExporterApplier {
    member_id: MemberId,
    partition_id: PartitionId,
    exporter_id: ExporterId,
    executor: Arc<dyn PartitionChangeExecutor>,
}

impl PartitionDeleteExporterApplier {
    pub(super) fn new(
        member_id: MemberId,
        partition_id: PartitionId,
        exporter_id: ExporterId,
        executor: Arc<dyn PartitionChangeExecutor>,
    ) -> Self {
        Self {
            member_id,
            partition_id,
            exporter_id,
            executor,
        }
    }
}

#[async_trait]
impl MemberOperationApplier for PartitionDeleteExporterApplier {
    fn member_id(&self) -> &MemberId {
        &self.member_id
    }

    fn init_member_state(
        &mut self,
        current: &ClusterConfiguration,
    ) -> ConfigurationResult<MemberStateTransformer> {
        let partition = partition_of(current, &self.member_id, self.partition_id)?;
        match partition.config.exporting.exporter(&self.exporter_id) {
            // Already deleted, e.g. by a previous attempt of this operation
            None => Ok(Box::new(|member| member)),
            Some(exporter) if exporter.state == ExporterStatus::ConfigNotFound => {
                Ok(Box::new(|member| member))
            }
            Some(exporter) => Err(ConfigurationError::InvalidRequest(format!(
                "exporter {} on {} can only be deleted once its configuration \
                 was removed, is {:?}",
                self.exporter_id, self.partition_id, exporter.state
            ))),
        }
    }

    async fn apply_operation(&mut self) -> ConfigurationResult<MemberStateTransformer> {
        self.executor
            .delete_exporter(self.partition_id, &self.exporter_id)
            .await?;
        let partition_id = self.partition_id;
        let exporter_id = self.exporter_id.clone();
        Ok(Box::new(move |member| {
            member.update_partition(partition_id, |partition| {
                partition.update_config(|config| {
                    config.update_exporting(|exporting| exporting.without_exporter(&exporter_id))
                })
            })
        }))
    }
}
