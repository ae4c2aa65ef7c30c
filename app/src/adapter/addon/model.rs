use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::core::{
    DeviceInfo, PowerCommand, PowerStatus, SensorCatalog, SensorDescriptor, SensorId, SensorKind, SensorReading,
};

/// Summary payload of the addon's root endpoint. One response carries the
/// sensor catalog, all current values and the chassis power state.
#[derive(Debug, Clone, Deserialize)]
pub struct AddonSummary {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub device: DeviceFields,
    #[serde(default)]
    pub power_on: bool,
    #[serde(default)]
    pub sensors: SensorGroups,
    #[serde(default)]
    pub states: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeviceFields {
    #[serde(default)]
    pub manufacturer_name: Option<String>,
    #[serde(default)]
    pub product_manufacturer: Option<String>,
    #[serde(default)]
    pub product_name: Option<String>,
    #[serde(default)]
    pub product_part_number: Option<String>,
    #[serde(default)]
    pub firmware_revision: Option<String>,
}

/// Sensor ids grouped by kind, each mapping id to display name.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SensorGroups {
    #[serde(default)]
    pub temperature: HashMap<String, String>,
    #[serde(default)]
    pub fan: HashMap<String, String>,
    #[serde(default)]
    pub voltage: HashMap<String, String>,
    #[serde(default)]
    pub power: HashMap<String, String>,
}

/// Envelope returned by the command endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct CommandOutcome {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}

impl AddonSummary {
    pub fn catalog(&self) -> SensorCatalog {
        let groups = [
            (SensorKind::Temperature, &self.sensors.temperature),
            (SensorKind::Fan, &self.sensors.fan),
            (SensorKind::Voltage, &self.sensors.voltage),
            (SensorKind::Power, &self.sensors.power),
        ];

        let sensors = groups
            .into_iter()
            .flat_map(|(kind, group)| {
                group.iter().map(move |(id, name)| SensorDescriptor {
                    id: SensorId::new(id.clone()),
                    kind,
                    name: name.clone(),
                })
            })
            .collect();

        SensorCatalog::new(sensors)
    }

    pub fn device_info(&self) -> DeviceInfo {
        let fields = &self.device;

        DeviceInfo {
            manufacturer: fields
                .manufacturer_name
                .clone()
                .or_else(|| fields.product_manufacturer.clone()),
            product: fields.product_name.clone().or_else(|| fields.product_part_number.clone()),
            firmware: fields.firmware_revision.clone(),
        }
    }

    pub fn power_status(&self) -> PowerStatus {
        if self.power_on { PowerStatus::On } else { PowerStatus::Off }
    }

    /// One reading per requested id. Ids without a parseable value yield an
    /// explicitly invalid reading, never a missing entry.
    pub fn readings(&self, ids: &[SensorId], taken_at: DateTime<Utc>) -> HashMap<SensorId, SensorReading> {
        ids.iter()
            .map(|id| {
                let reading = match self.states.get(id.as_str()).and_then(parse_value) {
                    Some(value) => SensorReading::valid(id.clone(), value, taken_at),
                    None => SensorReading::invalid(id.clone(), taken_at),
                };
                (id.clone(), reading)
            })
            .collect()
    }
}

/// The addon reports values as strings like "43.000"; newer versions emit
/// plain numbers for some boards.
fn parse_value(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

pub fn command_path(command: PowerCommand) -> &'static str {
    match command {
        PowerCommand::PowerOn => "power_on",
        PowerCommand::PowerOff => "power_off",
        PowerCommand::PowerCycle => "power_cycle",
        PowerCommand::PowerReset => "power_reset",
        PowerCommand::SoftShutdown => "soft_shutdown",
    }
}
