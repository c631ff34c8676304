//! Request routing state

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::state::ClusterConfiguration;
use crate::types::PartitionId;

/// Describes which partitions currently accept client requests and how
/// messages are correlated to partitions.
///
/// The cluster starts with all partitions handling requests. During a
/// partition scale-up, the newly created partitions are tracked as inactive
/// until data redistribution completes, at which point routing collapses back
/// to the all-partitions form with the new count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingState {
    /// Version of the routing state, incremented on every change
    pub version: u64,
    /// Which partitions handle client requests
    pub request_handling: RequestHandling,
    /// How messages are correlated to partitions
    pub message_correlation: MessageCorrelation,
}

impl RoutingState {
    /// Derive a routing state from the partitions present in the given
    /// configuration. Takes over from an existing routing state by bumping
    /// its version, or starts at version 1.
    pub fn initialize_from(configuration: &ClusterConfiguration) -> Self {
        let partition_count = configuration.partition_count();
        let version = configuration
            .routing_state()
            .map(|existing| existing.version + 1)
            .unwrap_or(1);
        Self {
            version,
            request_handling: RequestHandling::AllPartitions { partition_count },
            message_correlation: MessageCorrelation::HashMod { partition_count },
        }
    }

    /// Start a scale-up towards `desired_partition_count`: all partition
    /// numbers above the current count become inactive. Folding onto a state
    /// that already started the scale-up leaves it unchanged so that retried
    /// operations converge.
    pub fn begin_scale_up(self, desired_partition_count: u32) -> Self {
        match self.request_handling {
            RequestHandling::AllPartitions { partition_count }
                if desired_partition_count > partition_count =>
            {
                Self {
                    version: self.version + 1,
                    request_handling: RequestHandling::ActivePartitions {
                        base_partition_count: partition_count,
                        additional_active_partitions: BTreeSet::new(),
                        inactive_partitions: (partition_count + 1..=desired_partition_count)
                            .map(PartitionId::new)
                            .collect(),
                    },
                    message_correlation: self.message_correlation,
                }
            }
            _ => self,
        }
    }

    /// Activate the given partitions after their data was redistributed. Once
    /// no inactive partitions remain, routing collapses back to all
    /// partitions with the desired count.
    pub fn activate_partitions(
        self,
        desired_partition_count: u32,
        partitions: &BTreeSet<PartitionId>,
    ) -> Self {
        match self.request_handling {
            RequestHandling::ActivePartitions {
                base_partition_count,
                mut additional_active_partitions,
                mut inactive_partitions,
            } => {
                for partition in partitions {
                    if inactive_partitions.remove(partition) {
                        additional_active_partitions.insert(*partition);
                    }
                }
                let request_handling = if inactive_partitions.is_empty() {
                    RequestHandling::AllPartitions {
                        partition_count: desired_partition_count,
                    }
                } else {
                    RequestHandling::ActivePartitions {
                        base_partition_count,
                        additional_active_partitions,
                        inactive_partitions,
                    }
                };
                Self {
                    version: self.version + 1,
                    request_handling,
                    message_correlation: self.message_correlation,
                }
            }
            RequestHandling::AllPartitions { .. } => self,
        }
    }

    /// Record that message relocation for a scale-up completed: correlation
    /// moves to the desired partition count.
    pub fn complete_relocation(self, desired_partition_count: u32) -> Self {
        match self.message_correlation {
            MessageCorrelation::HashMod { partition_count }
                if partition_count == desired_partition_count =>
            {
                self
            }
            MessageCorrelation::HashMod { .. } => Self {
                version: self.version + 1,
                message_correlation: MessageCorrelation::HashMod {
                    partition_count: desired_partition_count,
                },
                ..self
            },
        }
    }
}

/// Which partitions handle client requests
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestHandling {
    /// All partitions up to the given count handle requests
    AllPartitions {
        /// Number of partitions in the cluster
        partition_count: u32,
    },
    /// Only a subset of partitions handles requests; used while a scale-up
    /// is redistributing data to newly created partitions
    ActivePartitions {
        /// Partition count before the scale-up; partitions up to this number
        /// are always active
        base_partition_count: u32,
        /// Newly created partitions that already accept requests
        additional_active_partitions: BTreeSet<PartitionId>,
        /// Newly created partitions still waiting for redistribution
        inactive_partitions: BTreeSet<PartitionId>,
    },
}

/// How messages are correlated to partitions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageCorrelation {
    /// Correlation key hashed modulo the partition count
    HashMod {
        /// Partition count used as the hash modulus
        partition_count: u32,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_partitions(count: u32) -> RoutingState {
        RoutingState {
            version: 1,
            request_handling: RequestHandling::AllPartitions {
                partition_count: count,
            },
            message_correlation: MessageCorrelation::HashMod {
                partition_count: count,
            },
        }
    }

    #[test]
    fn scale_up_marks_new_partitions_inactive() {
        let routing = all_partitions(3).begin_scale_up(6);

        assert_eq!(
            routing.request_handling,
            RequestHandling::ActivePartitions {
                base_partition_count: 3,
                additional_active_partitions: BTreeSet::new(),
                inactive_partitions: [4, 5, 6].map(PartitionId::new).into(),
            }
        );
    }

    #[test]
    fn scale_up_is_idempotent() {
        let routing = all_partitions(3).begin_scale_up(6);

        assert_eq!(routing.clone().begin_scale_up(6), routing);
    }

    #[test]
    fn activating_all_partitions_collapses_routing() {
        let routing = all_partitions(3)
            .begin_scale_up(6)
            .activate_partitions(6, &[4, 5, 6].map(PartitionId::new).into());

        assert_eq!(
            routing.request_handling,
            RequestHandling::AllPartitions { partition_count: 6 }
        );
    }

    #[test]
    fn partial_activation_keeps_remaining_inactive() {
        let routing = all_partitions(3)
            .begin_scale_up(6)
            .activate_partitions(6, &[4].map(PartitionId::new).into());

        assert_eq!(
            routing.request_handling,
            RequestHandling::ActivePartitions {
                base_partition_count: 3,
                additional_active_partitions: [4].map(PartitionId::new).into(),
                inactive_partitions: [5, 6].map(PartitionId::new).into(),
            }
        );
    }

    #[test]
    fn relocation_updates_message_correlation_once() {
        let routing = all_partitions(3).complete_relocation(6);
        let version = routing.version;

        assert_eq!(
            routing.message_correlation,
            MessageCorrelation::HashMod { partition_count: 6 }
        );
        assert_eq!(routing.complete_relocation(6).version, version);
    }
}
