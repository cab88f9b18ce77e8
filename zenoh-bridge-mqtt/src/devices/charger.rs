//! Virtual solar charger (MPPT).

use virtdev_common::{BusValue, StoreSection};

use super::{Decode, DeviceCore};
use crate::codec::{CHARGER_STATES, LOAD_STATES};
use crate::registry::DeviceEntry;

#[derive(Debug, Clone)]
pub struct SolarCharger {
    pub(super) core: DeviceCore,
}

impl SolarCharger {
    pub fn build(entry: &DeviceEntry, section: &StoreSection) -> Self {
        let mut core = DeviceCore::new(entry);
        core.tree_mut()
            .add("/Dc/0/Current", 0.0)
            .add("/Dc/0/Voltage", 0.0)
            .add("/Pv/V", 0.0)
            .add("/Yield/Power", 0.0)
            .add("/Yield/User", 0.0)
            .add("/Yield/System", 0.0)
            .add("/Link/ChargeVoltage", BusValue::Null)
            .add("/Link/ChargeCurrent", BusValue::Null)
            .add("/Load/State", BusValue::Null)
            .add("/State", 0);

        let bindings = [
            ("BatteryCurrentStateTopic", "/Dc/0/Current", Decode::Float),
            ("BatteryVoltageStateTopic", "/Dc/0/Voltage", Decode::Float),
            ("PvVoltageStateTopic", "/Pv/V", Decode::Float),
            ("PvPowerStateTopic", "/Yield/Power", Decode::Float),
            ("TotalYield", "/Yield/User", Decode::Float),
            ("SystemYield", "/Yield/System", Decode::Float),
            ("MaxChargeVoltageStateTopic", "/Link/ChargeVoltage", Decode::Float),
            ("MaxChargeCurrentStateTopic", "/Link/ChargeCurrent", Decode::Float),
            ("LoadStateTopic", "/Load/State", Decode::Enum(&LOAD_STATES)),
            ("ChargerStateTopic", "/State", Decode::Enum(&CHARGER_STATES)),
        ];
        for (key, path, decode) in bindings {
            core.bind(path, section.get(key), decode);
        }

        Self { core }
    }
}
