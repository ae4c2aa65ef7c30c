use std::sync::Arc;

use tokio::sync::watch;

use crate::core::{ReadingsSnapshot, SensorDescriptor, SensorKind};

/// Hub-facing sensor entity, fed from the latest published snapshot.
#[derive(Clone)]
pub struct SensorEntity {
    descriptor: SensorDescriptor,
    unique_id: String,
    readings_rx: watch::Receiver<Arc<ReadingsSnapshot>>,
}

impl SensorEntity {
    pub(crate) fn new(
        descriptor: SensorDescriptor,
        server_unique_id: &str,
        readings_rx: watch::Receiver<Arc<ReadingsSnapshot>>,
    ) -> Self {
        let unique_id = format!("{}_{}", server_unique_id, descriptor.id).replace(' ', "_");

        Self {
            descriptor,
            unique_id,
            readings_rx,
        }
    }

    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn kind(&self) -> SensorKind {
        self.descriptor.kind
    }

    pub fn unit(&self) -> &'static str {
        self.descriptor.unit()
    }

    /// Latest value; `None` while the sensor is unavailable. An invalid
    /// reading never surfaces as a stale last-good value.
    pub fn value(&self) -> Option<f64> {
        self.readings_rx
            .borrow()
            .get(&self.descriptor.id)
            .and_then(|reading| reading.value)
    }

    pub fn is_available(&self) -> bool {
        self.value().is_some()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<ReadingsSnapshot>> {
        self.readings_rx.clone()
    }
}
