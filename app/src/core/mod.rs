pub mod resilience;

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stable sensor key as reported by the addon, e.g. `CPU1 Temp`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, derive_more::Display)]
pub struct SensorId(String);

impl SensorId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SensorId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display)]
#[serde(rename_all = "snake_case")]
pub enum SensorKind {
    Temperature,
    Fan,
    Voltage,
    Power,
}

impl SensorKind {
    pub fn unit(&self) -> &'static str {
        match self {
            SensorKind::Temperature => "°C",
            SensorKind::Fan => "RPM",
            SensorKind::Voltage => "V",
            SensorKind::Power => "W",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorDescriptor {
    pub id: SensorId,
    pub kind: SensorKind,
    pub name: String,
}

impl SensorDescriptor {
    pub fn unit(&self) -> &'static str {
        self.kind.unit()
    }
}

/// Set of sensors a server offers. Replaced wholesale on discovery,
/// never mutated in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SensorCatalog {
    sensors: Vec<SensorDescriptor>,
}

impl SensorCatalog {
    pub fn new(mut sensors: Vec<SensorDescriptor>) -> Self {
        sensors.sort_by(|a, b| a.id.cmp(&b.id));
        Self { sensors }
    }

    pub fn iter(&self) -> impl Iterator<Item = &SensorDescriptor> {
        self.sensors.iter()
    }

    pub fn ids(&self) -> Vec<SensorId> {
        self.sensors.iter().map(|s| s.id.clone()).collect()
    }

    pub fn get(&self, id: &SensorId) -> Option<&SensorDescriptor> {
        self.sensors.iter().find(|s| &s.id == id)
    }

    pub fn len(&self) -> usize {
        self.sensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sensors.is_empty()
    }
}

/// One sampled value. `value: None` means the read failed or was
/// unparseable; an invalid reading is never coerced to a number.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorReading {
    pub id: SensorId,
    pub value: Option<f64>,
    pub taken_at: DateTime<Utc>,
}

impl SensorReading {
    pub fn valid(id: SensorId, value: f64, taken_at: DateTime<Utc>) -> Self {
        Self {
            id,
            value: Some(value),
            taken_at,
        }
    }

    pub fn invalid(id: SensorId, taken_at: DateTime<Utc>) -> Self {
        Self {
            id,
            value: None,
            taken_at,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.value.is_some()
    }
}

/// Point-in-time consistent result of one polling cycle.
#[derive(Debug, Clone, Default)]
pub struct ReadingsSnapshot {
    pub cycle: u64,
    pub readings: HashMap<SensorId, SensorReading>,
}

impl ReadingsSnapshot {
    pub fn get(&self, id: &SensorId) -> Option<&SensorReading> {
        self.readings.get(id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display)]
#[serde(rename_all = "snake_case")]
pub enum PowerCommand {
    PowerOn,
    PowerOff,
    PowerCycle,
    PowerReset,
    SoftShutdown,
}

impl PowerCommand {
    pub fn variants() -> [PowerCommand; 5] {
        [
            PowerCommand::PowerOn,
            PowerCommand::PowerOff,
            PowerCommand::PowerCycle,
            PowerCommand::PowerReset,
            PowerCommand::SoftShutdown,
        ]
    }
}

/// `Unknown` is a failed or ambiguous status query and must never be
/// interpreted as `Off`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum PowerStatus {
    On,
    Off,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum SwitchState {
    Off,
    TurningOn,
    On,
    TurningOff,
    Unknown,
}

/// BMC identity from the addon's summary payload, used to label the
/// device on the hub side.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceInfo {
    pub manufacturer: Option<String>,
    pub product: Option<String>,
    pub firmware: Option<String>,
}

impl DeviceInfo {
    /// Best unique id for a server: manufacturer or product name plus the
    /// alias, falling back to the alias alone.
    pub fn unique_id(&self, alias: &str) -> String {
        let mut parts: Vec<&str> = Vec::new();

        if let Some(manufacturer) = self.manufacturer.as_deref() {
            parts.push(manufacturer);
        } else if let Some(product) = self.product.as_deref() {
            parts.push(product);
        }
        parts.push(alias);

        parts.join("_").replace(' ', "_")
    }
}
