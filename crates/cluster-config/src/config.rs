//! Configuration types

/// Configuration of the change coordinator
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Capacity of the command channel feeding the coordinator task; senders
    /// wait when the channel is full
    pub command_channel_capacity: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            command_channel_capacity: 128,
        }
    }
}
