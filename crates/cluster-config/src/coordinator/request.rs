//! Change requests and their results

use crate::error::ConfigurationResult;
use crate::state::{ClusterConfiguration, ClusterConfigurationChangeOperation};
use crate::types::ChangeId;

/// A declarative configuration change request.
///
/// The caller does not submit operations directly; it submits a pure function
/// computing them from the configuration the coordinator currently sees, e.g.
/// "the operations needed to add member X". Closures implement this trait
/// directly.
pub trait ConfigurationChangeRequest: Send {
    /// Compute the operations to apply against the given configuration
    fn operations(
        &self,
        current: &ClusterConfiguration,
    ) -> ConfigurationResult<Vec<ClusterConfigurationChangeOperation>>;

    /// Whether the request may be applied by a member that is not the
    /// coordinator
    fn is_forced(&self) -> bool {
        false
    }
}

impl<F> ConfigurationChangeRequest for F
where
    F: Fn(
            &ClusterConfiguration,
        ) -> ConfigurationResult<Vec<ClusterConfigurationChangeOperation>>
        + Send,
{
    fn operations(
        &self,
        current: &ClusterConfiguration,
    ) -> ConfigurationResult<Vec<ClusterConfigurationChangeOperation>> {
        self(current)
    }
}

/// Marks a request as forced, bypassing the coordinator check
pub struct Forced<R>(
    /// The wrapped request
    pub R,
);

impl<R: ConfigurationChangeRequest> ConfigurationChangeRequest for Forced<R> {
    fn operations(
        &self,
        current: &ClusterConfiguration,
    ) -> ConfigurationResult<Vec<ClusterConfigurationChangeOperation>> {
        self.0.operations(current)
    }

    fn is_forced(&self) -> bool {
        true
    }
}

/// Outcome of a validated change request
#[derive(Debug, Clone)]
pub struct ConfigurationChangeResult {
    /// Identifier of the started (or, for a dry run, hypothetical) change
    pub change_id: ChangeId,
    /// The configuration the operations were validated against
    pub current_configuration: ClusterConfiguration,
    /// The predicted configuration once all operations completed
    pub expected_configuration: ClusterConfiguration,
    /// The operations that will be applied, in order
    pub planned_changes: Vec<ClusterConfigurationChangeOperation>,
}
