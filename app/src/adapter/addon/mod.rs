#![allow(async_fn_in_trait)]

mod client;
mod model;

#[cfg(test)]
pub(crate) mod fake;

pub use client::AddonClient;
pub use model::{AddonSummary, CommandOutcome};

use std::collections::HashMap;

use chrono::Utc;
use derive_more::derive::{Display, Error};

use crate::core::{DeviceInfo, PowerCommand, PowerStatus, SensorCatalog, SensorId, SensorReading};

/// Failure taxonomy of the addon boundary.
///
/// `Unreachable` is transient transport trouble and the only variant ever
/// retried. `Addon` means ipmitool ran and failed, which is deterministic
/// for the same input. `Malformed` is a contract violation by the addon.
#[derive(Debug, Clone, Error, Display)]
pub enum AddonClientError {
    #[display("addon unreachable: {_0}")]
    Unreachable(#[error(not(source))] String),

    #[display("addon reported failure: {_0}")]
    Addon(#[error(not(source))] String),

    #[display("malformed addon response: {_0}")]
    Malformed(#[error(not(source))] String),
}

impl AddonClientError {
    pub fn is_unreachable(&self) -> bool {
        matches!(self, AddonClientError::Unreachable(_))
    }
}

/// The four operations the remote addon offers. The wire format serves the
/// catalog, all values and the power state from one summary endpoint, so the
/// read operations each issue a single summary request and project from it.
pub trait AddonApi {
    async fn fetch_summary(&self) -> Result<AddonSummary, AddonClientError>;

    async fn execute_command(&self, command: PowerCommand) -> Result<(), AddonClientError>;

    async fn list_sensors(&self) -> Result<(SensorCatalog, DeviceInfo), AddonClientError> {
        let summary = self.fetch_summary().await?;
        Ok((summary.catalog(), summary.device_info()))
    }

    async fn read_sensors(&self, ids: &[SensorId]) -> Result<HashMap<SensorId, SensorReading>, AddonClientError> {
        let summary = self.fetch_summary().await?;
        Ok(summary.readings(ids, Utc::now()))
    }

    async fn power_status(&self) -> Result<PowerStatus, AddonClientError> {
        let summary = self.fetch_summary().await?;
        Ok(summary.power_status())
    }
}
