mod registry;

pub use registry::ServerRegistryEntry;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use futures::future::join_all;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::adapter::addon::AddonClient;
use crate::command::CommandSequencer;
use crate::core::{DeviceInfo, PowerCommand};
use crate::entity::{PowerAction, SensorEntity, SwitchEntity};
use crate::polling::{PollingClient, PollingConfig, PollingCoordinator};
use crate::switch::{PowerSwitch, SwitchConfig};

pub const DEFAULT_PORT: u16 = 623;
pub const DEFAULT_USERNAME: &str = "ADMIN";
pub const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_secs(10);

const COMMAND_RETRIES: u32 = 2;
const COMMAND_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Connection parameters of one configured server. Immutable; a
/// reconfiguration replaces the whole config.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub alias: String,
    pub addon_url: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub poll_interval: Duration,
    pub request_timeout: Duration,
    pub connect_retries: u32,
    pub switch: SwitchConfig,
}

/// Owns everything belonging to one server: addon client, registry, polling
/// task, command sequencer and the power switch.
pub struct ServerRunner {
    config: ServerConfig,
    registry: Arc<ServerRegistryEntry<AddonClient>>,
    polling: PollingClient,
    sequencer: Arc<CommandSequencer<AddonClient>>,
    switch: Arc<PowerSwitch<AddonClient>>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl ServerRunner {
    pub fn new(config: ServerConfig) -> anyhow::Result<Self> {
        let client = Arc::new(AddonClient::new(&config)?);
        let registry = Arc::new(ServerRegistryEntry::new(&config.alias, client.clone()));
        let cancel = CancellationToken::new();

        let coordinator = PollingCoordinator::new(
            &config.alias,
            PollingConfig::new(config.poll_interval),
            client.clone(),
            registry.clone(),
            cancel.child_token(),
        );
        let polling = coordinator.client();

        let sequencer = Arc::new(CommandSequencer::new(
            &config.alias,
            client,
            COMMAND_RETRIES,
            COMMAND_RETRY_DELAY,
        ));

        let switch = Arc::new(PowerSwitch::new(
            &config.alias,
            config.switch.clone(),
            sequencer.clone(),
            polling.subscribe_status(),
        ));

        let tasks = vec![
            tokio::spawn(coordinator.run()),
            tokio::spawn(switch.clone().run(cancel.child_token())),
        ];

        Ok(Self {
            config,
            registry,
            polling,
            sequencer,
            switch,
            cancel,
            tasks,
        })
    }

    /// Setup-time reachability check: the first discovery must succeed.
    pub async fn connect(&self) -> anyhow::Result<()> {
        self.registry
            .discover()
            .await
            .with_context(|| format!("Addon for server {} not reachable during setup", self.config.alias))
    }

    pub fn alias(&self) -> &str {
        &self.config.alias
    }

    pub fn device_info(&self) -> DeviceInfo {
        self.registry.current().device.clone()
    }

    pub fn unique_id(&self) -> String {
        self.device_info().unique_id(&self.config.alias)
    }

    pub fn sensor_entities(&self) -> Vec<SensorEntity> {
        let inventory = self.registry.current();
        let unique_id = inventory.device.unique_id(&self.config.alias);

        inventory
            .catalog
            .iter()
            .map(|descriptor| SensorEntity::new(descriptor.clone(), &unique_id, self.polling.subscribe_readings()))
            .collect()
    }

    pub fn action_entities(&self) -> Vec<PowerAction<AddonClient>> {
        let unique_id = self.unique_id();

        PowerCommand::variants()
            .into_iter()
            .map(|command| PowerAction::new(command, &unique_id, self.sequencer.clone()))
            .collect()
    }

    pub fn switch_entity(&self) -> SwitchEntity<AddonClient> {
        SwitchEntity::new(self.switch.clone(), &self.unique_id())
    }

    /// Stops the polling and reconciliation tasks. In-flight network calls
    /// complete and their results are discarded.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        join_all(self.tasks).await;
    }
}
