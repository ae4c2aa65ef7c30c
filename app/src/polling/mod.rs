mod coordinator;

pub use coordinator::{PollingClient, PollingConfig, PollingCoordinator, StatusSnapshot};
