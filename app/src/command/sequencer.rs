use std::sync::Arc;
use std::time::Duration;

use derive_more::derive::{Display, Error};
use tokio::sync::Mutex;

use crate::adapter::addon::{AddonApi, AddonClientError};
use crate::core::PowerCommand;
use crate::core::resilience::linear_delay;

#[derive(Debug, Clone, Error, Display)]
pub enum CommandError {
    /// Caller-misuse guard: submissions must not queue behind each other.
    #[display("another power command is already in flight")]
    CommandInProgress,

    #[display("{_0}")]
    Addon(AddonClientError),
}

impl From<AddonClientError> for CommandError {
    fn from(error: AddonClientError) -> Self {
        CommandError::Addon(error)
    }
}

/// Serializes power commands per server: at most one in flight at any time.
///
/// Only `AddonUnreachable` is retried here. A structured addon failure means
/// ipmitool ran and failed, which is deterministic for the same input, so
/// retrying would only mask hardware or credential problems.
pub struct CommandSequencer<A> {
    alias: String,
    client: Arc<A>,
    in_flight: Mutex<()>,
    retries: u32,
    retry_delay: Duration,
}

impl<A: AddonApi> CommandSequencer<A> {
    pub fn new(alias: &str, client: Arc<A>, retries: u32, retry_delay: Duration) -> Self {
        Self {
            alias: alias.to_owned(),
            client,
            in_flight: Mutex::new(()),
            retries,
            retry_delay,
        }
    }

    pub async fn submit(&self, command: PowerCommand) -> Result<(), CommandError> {
        let Ok(_guard) = self.in_flight.try_lock() else {
            return Err(CommandError::CommandInProgress);
        };

        let mut attempt = 0u32;
        loop {
            match self.client.execute_command(command).await {
                Ok(()) => {
                    tracing::info!("Power command {} on {} executed", command, self.alias);
                    return Ok(());
                }
                Err(AddonClientError::Unreachable(reason)) if attempt < self.retries => {
                    attempt += 1;
                    tracing::warn!(
                        "Power command {} on {} did not reach the addon (attempt {}/{}): {}",
                        command,
                        self.alias,
                        attempt,
                        self.retries,
                        reason
                    );
                    tokio::time::sleep(linear_delay(self.retry_delay, attempt)).await;
                }
                Err(e) => {
                    tracing::error!("Power command {} on {} failed: {}", command, self.alias, e);
                    return Err(e.into());
                }
            }
        }
    }
}
