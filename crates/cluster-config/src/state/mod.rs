//! The cluster configuration data model
//!
//! Immutable value types describing cluster membership, partition
//! distribution, routing, and in-progress change plans. Every mutation goes
//! through pure transformer functions returning fresh values; nothing in this
//! module performs I/O.

mod change;
mod cluster;
mod member;
mod operation;
mod partition_config;
mod routing;

pub use self::change::{ChangeStatus, ClusterChangePlan, CompletedChange, CompletedOperation};
pub use self::cluster::ClusterConfiguration;
pub use self::member::{MemberState, MemberStatus, PartitionState, PartitionStatus};
pub use self::operation::ClusterConfigurationChangeOperation;
pub use self::partition_config::{
    DynamicPartitionConfig, ExporterState, ExporterStatus, ExportersConfig,
};
pub use self::routing::{MessageCorrelation, RequestHandling, RoutingState};
