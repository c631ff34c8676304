//! Change plans and their history

use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::state::ClusterConfigurationChangeOperation;
use crate::types::ChangeId;

/// Status of a configuration change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeStatus {
    /// The change is in progress
    Active,
    /// All operations completed
    Completed,
    /// The change was cancelled; already completed operations kept their
    /// effects, pending operations were discarded
    Cancelled,
}

/// An in-progress batch of configuration change operations.
///
/// Operations execute strictly in list order: the head of
/// `pending_operations` is the only operation that may be applied next.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterChangePlan {
    /// Identifier of this change, monotonically increasing per cluster
    pub id: ChangeId,
    /// Version of the plan, incremented every time an operation completes
    pub version: u32,
    /// Current status; an embedded plan is always active
    pub status: ChangeStatus,
    /// When the change was started
    pub started_at: SystemTime,
    /// Operations that already completed, oldest first
    pub completed_operations: Vec<CompletedOperation>,
    /// Operations still to be applied, next first
    pub pending_operations: Vec<ClusterConfigurationChangeOperation>,
}

impl ClusterChangePlan {
    /// Start a new plan for the given operations
    pub fn init(id: ChangeId, operations: Vec<ClusterConfigurationChangeOperation>) -> Self {
        Self {
            id,
            version: 1,
            status: ChangeStatus::Active,
            started_at: SystemTime::now(),
            completed_operations: Vec::new(),
            pending_operations: operations,
        }
    }

    /// The operation that must be applied next, if any
    pub fn next_pending(&self) -> Option<&ClusterConfigurationChangeOperation> {
        self.pending_operations.first()
    }

    /// Whether any operation is still pending
    pub fn has_pending(&self) -> bool {
        !self.pending_operations.is_empty()
    }

    /// Move the head pending operation to the completed list
    pub fn advance(mut self) -> Self {
        if self.pending_operations.is_empty() {
            return self;
        }
        let operation = self.pending_operations.remove(0);
        self.completed_operations.push(CompletedOperation {
            operation,
            completed_at: SystemTime::now(),
        });
        self.version += 1;
        self
    }

    /// Fold this plan into its completed form with the given status
    pub fn complete(&self, status: ChangeStatus) -> CompletedChange {
        CompletedChange {
            id: self.id,
            status,
            started_at: self.started_at,
            completed_at: SystemTime::now(),
        }
    }
}

/// One operation of a plan that already completed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedOperation {
    /// The operation that was applied
    pub operation: ClusterConfigurationChangeOperation,
    /// When the operation completed
    pub completed_at: SystemTime,
}

/// Record of the most recently finished configuration change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedChange {
    /// Identifier the change had while it was pending
    pub id: ChangeId,
    /// How the change ended
    pub status: ChangeStatus,
    /// When the change was started
    pub started_at: SystemTime,
    /// When the change completed or was cancelled
    pub completed_at: SystemTime,
}
