use std::sync::Arc;

use derive_more::derive::{Display, Error, From};
use tokio::sync::watch;

use crate::adapter::addon::{AddonApi, AddonClientError};
use crate::core::{DeviceInfo, SensorCatalog};

/// Sensor catalog plus BMC identity, replaced wholesale by discovery.
#[derive(Debug, Clone, Default)]
pub struct ServerInventory {
    pub catalog: SensorCatalog,
    pub device: DeviceInfo,
}

#[derive(Debug, Error, Display, From)]
#[display("sensor discovery failed: {_0}")]
pub struct DiscoveryFailed(AddonClientError);

impl DiscoveryFailed {
    pub fn cause(&self) -> &AddonClientError {
        &self.0
    }
}

/// Per-server runtime entry owning the connection target and the last
/// successfully discovered inventory.
pub struct ServerRegistryEntry<A> {
    alias: String,
    client: Arc<A>,
    inventory_tx: watch::Sender<Arc<ServerInventory>>,
}

impl<A: AddonApi> ServerRegistryEntry<A> {
    pub fn new(alias: &str, client: Arc<A>) -> Self {
        let (inventory_tx, _) = watch::channel(Arc::new(ServerInventory::default()));

        Self {
            alias: alias.to_owned(),
            client,
            inventory_tx,
        }
    }

    /// Refreshes the sensor catalog. The new inventory replaces the old one
    /// atomically; on failure the previous catalog stays untouched.
    pub async fn discover(&self) -> Result<(), DiscoveryFailed> {
        let (catalog, device) = self.client.list_sensors().await?;

        tracing::info!("Discovered {} sensors on {}", catalog.len(), self.alias);
        self.inventory_tx.send_replace(Arc::new(ServerInventory { catalog, device }));

        Ok(())
    }

    pub fn current(&self) -> Arc<ServerInventory> {
        self.inventory_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<ServerInventory>> {
        self.inventory_tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::addon::fake::{FakeAddon, summary};

    #[tokio::test]
    async fn discovery_replaces_catalog_atomically() {
        let addon = Arc::new(FakeAddon::new());
        let registry = ServerRegistryEntry::new("rack1", addon.clone());

        addon.push_summary(Ok(summary(true, &[("CPU1 Temp", "43.000"), ("FAN1", "3600")])));
        registry.discover().await.expect("discovery should succeed");

        assert_eq!(registry.current().catalog.len(), 2);
        assert_eq!(registry.current().device.manufacturer.as_deref(), Some("Supermicro"));
    }

    #[tokio::test]
    async fn failed_discovery_keeps_previous_catalog() {
        let addon = Arc::new(FakeAddon::new());
        let registry = ServerRegistryEntry::new("rack1", addon.clone());

        addon.push_summary(Ok(summary(true, &[("CPU1 Temp", "43.000")])));
        registry.discover().await.expect("initial discovery should succeed");

        addon.push_summary(Err(AddonClientError::Unreachable("connection refused".to_owned())));
        let err = registry.discover().await.expect_err("discovery should fail");

        assert!(err.cause().is_unreachable());
        assert_eq!(registry.current().catalog.len(), 1);
    }
}
