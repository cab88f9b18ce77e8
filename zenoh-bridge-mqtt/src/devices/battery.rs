//! Virtual battery monitor.

use virtdev_common::{BusValue, StoreSection};

use super::{Decode, DeviceCore, non_negative};
use crate::effect::{Effect, WriteRejected};
use crate::registry::DeviceEntry;

const CAPACITY: &str = "/Capacity";

/// Measurement topics: store key, property path.
const MEASUREMENTS: [(&str, &str); 9] = [
    ("CurrentStateTopic", "/Dc/0/Current"),
    ("PowerStateTopic", "/Dc/0/Power"),
    ("TemperatureStateTopic", "/Dc/0/Temperature"),
    ("VoltageStateTopic", "/Dc/0/Voltage"),
    ("MaxChargeCurrentStateTopic", "/Info/MaxChargeCurrent"),
    ("MaxChargeVoltageStateTopic", "/Info/MaxChargeVoltage"),
    ("MaxDischargeCurrentStateTopic", "/Info/MaxDischargeCurrent"),
    ("SocStateTopic", "/Soc"),
    ("SohStateTopic", "/Soh"),
];

/// Alarm names; topic key `<name>AlarmTopic`, path `/Alarms/<name>`.
const ALARMS: [&str; 13] = [
    "CellImbalance",
    "HighCellVoltage",
    "HighChargeCurrent",
    "HighCurrent",
    "HighDischargeCurrent",
    "HighTemperature",
    "HighVoltage",
    "InternalFailure",
    "LowCellVoltage",
    "LowSoc",
    "LowTemperature",
    "LowVoltage",
    "StateOfHealth",
];

#[derive(Debug, Clone)]
pub struct Battery {
    pub(super) core: DeviceCore,
}

impl Battery {
    pub fn build(entry: &DeviceEntry, section: &StoreSection) -> Self {
        let mut core = DeviceCore::new(entry);
        core.tree_mut()
            .add("/ErrorCode", 0)
            .add("/NrOfDistributors", 0)
            .add("/Soc", 0.0)
            .add("/Soh", 100.0)
            .add_writable(CAPACITY, section.parse_or("CapacityAh", 0.0))
            .add("/Dc/0/Current", 0.0)
            .add("/Dc/0/Power", 0.0)
            .add("/Dc/0/Voltage", 0.0)
            .add("/Dc/0/Temperature", 25.0)
            .add("/Info/ChargeRequest", 0)
            .add("/Info/MaxChargeCurrent", BusValue::Null)
            .add("/Info/MaxChargeVoltage", BusValue::Null)
            .add("/Info/MaxDischargeCurrent", BusValue::Null)
            .add("/Info/BatteryLowVoltage", BusValue::Null)
            .add("/System/MinCellVoltage", BusValue::Null);

        for (key, path) in MEASUREMENTS {
            core.bind(path, section.get(key), Decode::Float);
        }
        for alarm in ALARMS {
            let path = format!("/Alarms/{}", alarm);
            core.tree_mut().add(path.as_str(), 0);
            core.bind(&path, section.get(&format!("{}AlarmTopic", alarm)), Decode::Integer);
        }

        Self { core }
    }

    pub(super) fn on_write(
        &mut self,
        path: &str,
        value: &BusValue,
    ) -> Result<Vec<Effect>, WriteRejected> {
        if path != CAPACITY {
            return Err(self.core.reject(path));
        }
        let capacity = non_negative(value).ok_or_else(|| WriteRejected::invalid(path, value))?;

        let mut effects = Vec::new();
        if self.core.update(path, BusValue::Float(capacity), &mut effects) {
            effects.push(self.core.persist("CapacityAh", capacity.to_string()));
        }
        Ok(effects)
    }
}
