//! Temperature sensor with optional humidity and battery voltage.

use virtdev_common::{BusValue, StoreSection};

use super::{Decode, DeviceCore, enum_code};
use crate::codec::TEMPERATURE_TYPES;
use crate::effect::{Effect, WriteRejected};
use crate::registry::DeviceEntry;

const TEMPERATURE_TYPE: &str = "/TemperatureType";

#[derive(Debug, Clone)]
pub struct TemperatureSensor {
    pub(super) core: DeviceCore,
}

impl TemperatureSensor {
    pub fn build(entry: &DeviceEntry, section: &StoreSection) -> Self {
        let mut core = DeviceCore::new(entry);
        core.tree_mut()
            .add("/Status", 0)
            .add("/Temperature", BusValue::Null)
            .add("/Humidity", BusValue::Null)
            .add("/BatteryVoltage", BusValue::Null)
            .add_writable(
                TEMPERATURE_TYPE,
                TEMPERATURE_TYPES.code_or_default(&section.get_or("Type", "generic")),
            );

        for (key, path) in [
            ("TemperatureStateTopic", "/Temperature"),
            ("HumidityStateTopic", "/Humidity"),
            ("BatteryStateTopic", "/BatteryVoltage"),
        ] {
            core.bind(path, section.get(key), Decode::Float);
        }

        Self { core }
    }

    pub(super) fn on_write(
        &mut self,
        path: &str,
        value: &BusValue,
    ) -> Result<Vec<Effect>, WriteRejected> {
        if path != TEMPERATURE_TYPE {
            return Err(self.core.reject(path));
        }
        let (code, name) = enum_code(&TEMPERATURE_TYPES, value)
            .ok_or_else(|| WriteRejected::invalid(path, value))?;

        let mut effects = Vec::new();
        if self.core.update(path, BusValue::Int(code), &mut effects) {
            effects.push(self.core.persist("Type", name));
        }
        Ok(effects)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::Device;
    use crate::registry::entry_for;
    use virtdev_common::ConfigStore;

    const STORE: &str = "\
[Temp_Sensor_2]
serial = 8
deviceinstance = 41
type = freezer
temperaturestatetopic = ruuvi/freezer
batterystatetopic = ruuvi/freezer/battery
";

    fn build() -> Device {
        let store = ConfigStore::parse(STORE).unwrap();
        let entry = entry_for(&store, "temp_sensor", "2").unwrap();
        Device::build(&entry, &store).unwrap()
    }

    #[test]
    fn test_numeric_inbound() {
        let mut device = build();
        assert_eq!(device.tree().get(TEMPERATURE_TYPE), Some(&BusValue::Int(6)));

        let effects = device.on_inbound("ruuvi/freezer", br#"{"value": -18.5}"#);
        assert_eq!(effects, [Effect::notify("/Temperature", BusValue::Float(-18.5))]);

        assert!(device.on_inbound("ruuvi/freezer", b"-18.5").is_empty());
        assert!(device.on_inbound("ruuvi/freezer", b"cold").is_empty());

        let effects = device.on_inbound("ruuvi/freezer/battery", b"2.9");
        assert_eq!(effects, [Effect::notify("/BatteryVoltage", BusValue::Float(2.9))]);
    }

    #[test]
    fn test_type_write_persists_name() {
        let mut device = build();
        let effects = device.on_write(TEMPERATURE_TYPE, &BusValue::from("fridge")).unwrap();
        assert_eq!(
            effects,
            [
                Effect::notify(TEMPERATURE_TYPE, BusValue::Int(1)),
                Effect::persist("Temp_Sensor_2", "Type", "fridge"),
            ]
        );
        assert!(device.on_write(TEMPERATURE_TYPE, &BusValue::Int(7)).is_err());
    }
}
