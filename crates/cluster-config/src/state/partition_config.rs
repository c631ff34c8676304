//! Per-partition dynamic configuration

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::ExporterId;

/// Configuration of a single partition that can change at runtime.
///
/// Unlike the replica set and priorities tracked on the member states, this
/// configuration is identical on every replica of the partition and is copied
/// verbatim when a new replica joins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DynamicPartitionConfig {
    /// Exporter lifecycle state of this partition
    pub exporting: ExportersConfig,
}

impl DynamicPartitionConfig {
    /// Replace the exporting config through a pure transformer
    pub fn update_exporting(
        self,
        f: impl FnOnce(ExportersConfig) -> ExportersConfig,
    ) -> Self {
        Self {
            exporting: f(self.exporting),
        }
    }
}

/// State of all exporters configured on a partition
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportersConfig {
    /// Exporter states keyed by exporter ID
    pub exporters: BTreeMap<ExporterId, ExporterState>,
}

impl ExportersConfig {
    /// Get the state of an exporter, if it is known
    pub fn exporter(&self, id: &ExporterId) -> Option<&ExporterState> {
        self.exporters.get(id)
    }

    /// Insert or replace an exporter record
    pub fn with_exporter(mut self, id: ExporterId, state: ExporterState) -> Self {
        self.exporters.insert(id, state);
        self
    }

    /// Update an existing exporter record; unknown IDs are left untouched
    pub fn update_exporter(
        mut self,
        id: &ExporterId,
        f: impl FnOnce(ExporterState) -> ExporterState,
    ) -> Self {
        if let Some(state) = self.exporters.remove(id) {
            self.exporters.insert(id.clone(), f(state));
        }
        self
    }

    /// Remove an exporter record
    pub fn without_exporter(mut self, id: &ExporterId) -> Self {
        self.exporters.remove(id);
        self
    }
}

/// Lifecycle state of a single exporter on a partition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExporterState {
    /// Current lifecycle state
    pub state: ExporterStatus,
    /// Version of the exporter metadata. Strictly increases every time the
    /// exporter transitions from disabled to enabled so that the exporter
    /// runtime can detect it must reload state, even across crashes and
    /// retries of the same logical operation.
    pub metadata_version: u64,
    /// Exporter whose state this exporter was initialized from, if any
    pub initialized_from: Option<ExporterId>,
}

impl ExporterState {
    /// A freshly enabled exporter
    pub fn enabled(metadata_version: u64, initialized_from: Option<ExporterId>) -> Self {
        Self {
            state: ExporterStatus::Enabled,
            metadata_version,
            initialized_from,
        }
    }

    /// Disable the exporter, keeping its metadata version
    pub fn disable(self) -> Self {
        Self {
            state: ExporterStatus::Disabled,
            ..self
        }
    }
}

/// Lifecycle states of an exporter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExporterStatus {
    /// The exporter is exporting
    Enabled,
    /// The exporter is configured but paused
    Disabled,
    /// The exporter was removed from the static configuration; the record is
    /// kept until the exporter is explicitly deleted
    ConfigNotFound,
}
