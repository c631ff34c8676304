//! Declarative reconfiguration of a replicated, partitioned cluster
//!
//! This crate manages changes to a shared, versioned cluster configuration:
//! adding and removing members, moving partition replicas, changing
//! replication priorities, driving the per-partition exporter lifecycle,
//! deleting history, and scaling the partition count up. Each change is
//! expressed as an ordered plan of operations that is validated by
//! simulation before anything is persisted and that tolerates crashes and
//! retries at any point without corrupting state or re-running completed
//! work.
//!
//! The crate deliberately stops at narrow trait seams: durable replication
//! of the configuration is behind [`manager::ClusterConfigurationManager`],
//! and all real infrastructure side effects are behind the executor traits
//! in [`executors`].

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Two-phase operation appliers and their factory
pub mod appliers;

/// Configuration types
pub mod config;

/// The change coordinator
pub mod coordinator;

/// Error types
pub mod error;

/// Executor collaborator interfaces
pub mod executors;

/// The configuration manager seam
pub mod manager;

/// The configuration data model
pub mod state;

/// Identifier types
pub mod types;

pub use {
    appliers::OperationApplierFactory,
    config::CoordinatorConfig,
    coordinator::{ChangeCoordinator, ConfigurationChangeRequest, ConfigurationChangeResult},
    error::{ConfigurationError, ConfigurationResult},
    manager::{ClusterConfigurationManager, InMemoryConfigurationManager},
    state::{ClusterConfiguration, ClusterConfigurationChangeOperation},
    types::{ChangeId, ExporterId, MemberId, PartitionId},
};
