use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::adapter::addon::AddonApi;
use crate::core::resilience::ExponentialBackoff;
use crate::core::{PowerStatus, ReadingsSnapshot, SensorReading};
use crate::server::ServerRegistryEntry;

#[derive(Debug, Clone)]
pub struct PollingConfig {
    pub interval: Duration,
    /// Consecutive fully-failed cycles before the server counts as degraded.
    pub degraded_after: u32,
    pub max_backoff: Duration,
    /// Catalog re-discovery happens every this many cycles.
    pub catalog_refresh_cycles: u64,
}

impl PollingConfig {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            degraded_after: 3,
            max_backoff: Duration::from_secs(300),
            catalog_refresh_cycles: 60,
        }
    }
}

/// Power state from the most recent completed polling cycle. The cycle
/// counter lets consumers tell fresh results from repeats of the same value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub status: PowerStatus,
    pub cycle: u64,
}

impl Default for StatusSnapshot {
    fn default() -> Self {
        Self {
            status: PowerStatus::Unknown,
            cycle: 0,
        }
    }
}

/// Read-side handle to the coordinator's published snapshots.
#[derive(Clone)]
pub struct PollingClient {
    readings_rx: watch::Receiver<Arc<ReadingsSnapshot>>,
    status_rx: watch::Receiver<StatusSnapshot>,
}

impl PollingClient {
    /// Latest point-in-time consistent snapshot; all values stem from the
    /// same cycle.
    pub fn current_readings(&self) -> Arc<ReadingsSnapshot> {
        self.readings_rx.borrow().clone()
    }

    pub fn last_power_status(&self) -> PowerStatus {
        self.status_rx.borrow().status
    }

    pub fn subscribe_readings(&self) -> watch::Receiver<Arc<ReadingsSnapshot>> {
        self.readings_rx.clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<StatusSnapshot> {
        self.status_rx.clone()
    }
}

/// Per-server polling task. Refreshes are awaited inline and missed interval
/// ticks are skipped, so at most one refresh is ever outstanding.
pub struct PollingCoordinator<A> {
    alias: String,
    config: PollingConfig,
    client: Arc<A>,
    registry: Arc<ServerRegistryEntry<A>>,
    readings_tx: watch::Sender<Arc<ReadingsSnapshot>>,
    status_tx: watch::Sender<StatusSnapshot>,
    cancel: CancellationToken,
}

impl<A: AddonApi> PollingCoordinator<A> {
    pub fn new(
        alias: &str,
        config: PollingConfig,
        client: Arc<A>,
        registry: Arc<ServerRegistryEntry<A>>,
        cancel: CancellationToken,
    ) -> Self {
        let (readings_tx, _) = watch::channel(Arc::new(ReadingsSnapshot::default()));
        let (status_tx, _) = watch::channel(StatusSnapshot::default());

        Self {
            alias: alias.to_owned(),
            config,
            client,
            registry,
            readings_tx,
            status_tx,
            cancel,
        }
    }

    pub fn client(&self) -> PollingClient {
        PollingClient {
            readings_rx: self.readings_tx.subscribe(),
            status_rx: self.status_tx.subscribe(),
        }
    }

    pub async fn run(self) {
        let mut timer = tokio::time::interval(self.config.interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut backoff = ExponentialBackoff::new(self.config.interval, self.config.max_backoff);
        let mut failed_cycles = 0u32;
        let mut cycle = 0u64;

        loop {
            let degraded = failed_cycles >= self.config.degraded_after;
            let wait = async {
                if degraded {
                    tokio::time::sleep(backoff.next_delay()).await;
                } else {
                    timer.tick().await;
                }
            };

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = wait => {}
            }

            cycle += 1;

            if self.registry.current().catalog.is_empty() || cycle % self.config.catalog_refresh_cycles == 0 {
                if let Err(e) = self.registry.discover().await {
                    tracing::warn!("Discovery on {} failed, keeping previous catalog: {}", self.alias, e);
                }
            }

            let all_failed = self.refresh(cycle).await;

            if all_failed {
                failed_cycles = failed_cycles.saturating_add(1);
                if failed_cycles == self.config.degraded_after {
                    tracing::warn!(
                        "{} degraded after {} fully-failed polling cycles, widening backoff",
                        self.alias,
                        failed_cycles
                    );
                } else if failed_cycles > self.config.degraded_after {
                    backoff.bump();
                }
            } else {
                if failed_cycles >= self.config.degraded_after {
                    tracing::info!("{} recovered, restoring normal polling cadence", self.alias);
                }
                failed_cycles = 0;
                backoff.reset();
            }
        }

        tracing::info!("Polling for {} stopped", self.alias);
    }

    /// One refresh cycle. Returns true when the cycle failed entirely:
    /// every sensor read came back invalid, or nothing is discovered yet
    /// and the status query failed too.
    async fn refresh(&self, cycle: u64) -> bool {
        let status = match self.client.power_status().await {
            Ok(status) => status,
            Err(e) => {
                tracing::warn!("Power status query for {} failed: {}", self.alias, e);
                PowerStatus::Unknown
            }
        };
        self.status_tx.send_replace(StatusSnapshot { status, cycle });

        let inventory = self.registry.current();
        let ids = inventory.catalog.ids();
        if ids.is_empty() {
            // an addon that is dead from startup must still degrade instead
            // of being hammered at full cadence forever
            return status == PowerStatus::Unknown;
        }

        let taken_at = Utc::now();
        let readings = match self.client.read_sensors(&ids).await {
            Ok(readings) => readings,
            Err(e) => {
                tracing::warn!("Sensor read cycle for {} failed: {}", self.alias, e);
                ids.iter()
                    .map(|id| (id.clone(), SensorReading::invalid(id.clone(), taken_at)))
                    .collect()
            }
        };

        let all_failed = readings.values().all(|r| !r.is_valid());
        self.readings_tx.send_replace(Arc::new(ReadingsSnapshot { cycle, readings }));

        all_failed
    }
}
