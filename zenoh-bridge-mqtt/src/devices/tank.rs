//! Tank sensor.
//!
//! The level is either derived from a raw sender reading calibrated by
//! `RawValueEmpty`/`RawValueFull`, or reported directly in percent. The raw
//! topic wins when both are configured. `/Remaining` always follows the
//! level and the capacity.

use virtdev_common::{BusValue, StoreSection};

use super::{Decode, DeviceCore, enum_code, non_negative};
use crate::codec::{FLUID_TYPES, level_to_remaining, raw_to_level, round2};
use crate::effect::{Effect, WriteRejected};
use crate::registry::DeviceEntry;

const CAPACITY: &str = "/Capacity";
const FLUID_TYPE: &str = "/FluidType";
const LEVEL: &str = "/Level";
const REMAINING: &str = "/Remaining";
const RAW_VALUE: &str = "/RawValue";
const RAW_EMPTY: &str = "/RawValueEmpty";
const RAW_FULL: &str = "/RawValueFull";

/// Which input drives `/Level`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelSource {
    Raw,
    Direct,
    Unbound,
}

#[derive(Debug, Clone)]
pub struct TankSensor {
    pub(super) core: DeviceCore,
    source: LevelSource,
}

impl TankSensor {
    pub fn build(entry: &DeviceEntry, section: &StoreSection) -> Self {
        let mut core = DeviceCore::new(entry);
        core.tree_mut()
            .add("/Status", 0)
            .add_writable(CAPACITY, section.parse_or("Capacity", 0.2))
            .add_writable(
                FLUID_TYPE,
                FLUID_TYPES.code_or_default(&section.get_or("FluidType", "fresh water")),
            )
            .add(LEVEL, 0.0)
            .add(REMAINING, 0.0)
            .add(RAW_VALUE, 0.0)
            .add_writable(RAW_EMPTY, section.parse_or("RawValueEmpty", 0.0))
            .add_writable(RAW_FULL, section.parse_or("RawValueFull", 0.0))
            .add("/RawUnit", section.get_or("RawUnit", ""))
            .add("/Shape", 0)
            .add("/Temperature", BusValue::Null)
            .add("/BatteryVoltage", BusValue::Null);
        for alarm in ["High", "Low"] {
            for field in ["Active", "Delay", "Enable", "Restore", "State"] {
                core.tree_mut().add(format!("/Alarms/{}/{}", alarm, field), 0);
            }
        }

        let source = if core.bind(RAW_VALUE, section.get("RawValueStateTopic"), Decode::Float) {
            if section.get("LevelStateTopic").is_some_and(crate::registry::is_valid_topic) {
                tracing::info!(
                    section = %entry.section,
                    "Raw value and level topics both configured, using the raw value"
                );
            }
            LevelSource::Raw
        } else if core.bind(LEVEL, section.get("LevelStateTopic"), Decode::Float) {
            LevelSource::Direct
        } else {
            LevelSource::Unbound
        };

        core.bind("/Temperature", section.get("TemperatureStateTopic"), Decode::Float);
        core.bind("/BatteryVoltage", section.get("BatteryStateTopic"), Decode::Float);

        let mut tank = Self { core, source };
        // Registration publishes the whole tree, so the initial derivation
        // needs no notifications.
        tank.derive(&mut Vec::new());
        tank
    }

    pub fn source(&self) -> LevelSource {
        self.source
    }

    pub(super) fn on_inbound(&mut self, topic: &str, payload: &str) -> Vec<Effect> {
        let Some(path) = self.core.binding(topic).map(|b| b.path.clone()) else {
            return Vec::new();
        };
        match path.as_str() {
            RAW_VALUE => self.apply_reading(topic, payload, |tank, raw, effects| {
                tank.core.update(RAW_VALUE, BusValue::Float(raw), effects);
                tank.derive(effects);
            }),
            LEVEL => self.apply_reading(topic, payload, |tank, level, effects| {
                if !(0.0..=100.0).contains(&level) {
                    tracing::warn!(
                        section = %tank.core.entry().section,
                        level,
                        "Level outside 0..100 ignored"
                    );
                    return;
                }
                tank.core.update(LEVEL, BusValue::Float(round2(level)), effects);
                tank.derive(effects);
            }),
            _ => self.core.apply_number(topic, payload),
        }
    }

    fn apply_reading(
        &mut self,
        topic: &str,
        payload: &str,
        apply: impl FnOnce(&mut Self, f64, &mut Vec<Effect>),
    ) -> Vec<Effect> {
        let mut effects = Vec::new();
        match Decode::Float.number(payload).and_then(|v| v.as_f64()) {
            Some(reading) => apply(self, reading, &mut effects),
            None => self.core.warn_undecodable(topic, payload),
        }
        effects
    }

    pub(super) fn on_write(
        &mut self,
        path: &str,
        value: &BusValue,
    ) -> Result<Vec<Effect>, WriteRejected> {
        let mut effects = Vec::new();
        match path {
            CAPACITY => {
                let capacity = non_negative(value).ok_or_else(|| WriteRejected::invalid(path, value))?;
                if self.core.update(path, BusValue::Float(capacity), &mut effects) {
                    effects.push(self.core.persist("Capacity", capacity.to_string()));
                    self.derive(&mut effects);
                }
            }
            FLUID_TYPE => {
                let (code, name) = enum_code(&FLUID_TYPES, value)
                    .ok_or_else(|| WriteRejected::invalid(path, value))?;
                if self.core.update(path, BusValue::Int(code), &mut effects) {
                    effects.push(self.core.persist("FluidType", name));
                    self.derive(&mut effects);
                }
            }
            RAW_EMPTY | RAW_FULL => {
                let bound = value
                    .as_f64()
                    .filter(|v| v.is_finite())
                    .ok_or_else(|| WriteRejected::invalid(path, value))?;
                if self.core.update(path, BusValue::Float(bound), &mut effects) {
                    let key = path.trim_start_matches('/');
                    effects.push(self.core.persist(key, bound.to_string()));
                    if self.source == LevelSource::Raw {
                        self.derive(&mut effects);
                    }
                }
            }
            _ => return Err(self.core.reject(path)),
        }
        Ok(effects)
    }

    /// Recompute the level (when raw driven) and the remaining volume.
    fn derive(&mut self, effects: &mut Vec<Effect>) {
        let tree = self.core.tree();
        if self.source == LevelSource::Raw {
            let level = round2(raw_to_level(
                tree.get_f64(RAW_VALUE),
                tree.get_f64(RAW_EMPTY),
                tree.get_f64(RAW_FULL),
            ));
            self.core.update(LEVEL, BusValue::Float(level), effects);
        }

        let tree = self.core.tree();
        let remaining = round2(level_to_remaining(tree.get_f64(LEVEL), tree.get_f64(CAPACITY)));
        self.core.update(REMAINING, BusValue::Float(remaining), effects);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::Device;
    use crate::registry::entry_for;
    use virtdev_common::ConfigStore;

    fn build(extra: &str) -> Device {
        let store = ConfigStore::parse(&format!(
            "[Tank_Sensor_1]\nserial = 9\ndeviceinstance = 20\n{}",
            extra
        ))
        .unwrap();
        let entry = entry_for(&store, "tank_sensor", "1").unwrap();
        Device::build(&entry, &store).unwrap()
    }

    fn source(device: &Device) -> LevelSource {
        match device {
            Device::Tank(tank) => tank.source(),
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_raw_topic_wins_over_level_topic() {
        let device = build("rawvaluestatetopic = tank/raw\nlevelstatetopic = tank/level\n");
        assert_eq!(source(&device), LevelSource::Raw);
        assert_eq!(device.inbound_topics(), ["tank/raw"]);

        let device = build("rawvaluestatetopic = path/to/mqtt/raw\nlevelstatetopic = tank/level\n");
        assert_eq!(source(&device), LevelSource::Direct);

        let device = build("");
        assert_eq!(source(&device), LevelSource::Unbound);
    }

    #[test]
    fn test_initial_derivation() {
        let device = build("levelstatetopic = tank/level\ncapacity = 0.4\n");
        assert_eq!(device.tree().get(REMAINING), Some(&BusValue::Float(0.0)));
        assert_eq!(device.tree().get(FLUID_TYPE), Some(&BusValue::Int(1)));
    }

    #[test]
    fn test_direct_level() {
        let mut device = build("levelstatetopic = tank/level\ncapacity = 0.4\n");

        let effects = device.on_inbound("tank/level", b"{\"value\": 37.456}");
        assert_eq!(
            effects,
            [
                Effect::notify(LEVEL, BusValue::Float(37.46)),
                Effect::notify(REMAINING, BusValue::Float(0.15)),
            ]
        );

        assert!(device.on_inbound("tank/level", b"120").is_empty());
        assert_eq!(device.tree().get(LEVEL), Some(&BusValue::Float(37.46)));
    }

    #[test]
    fn test_level_is_read_only() {
        let mut device = build("rawvaluestatetopic = tank/raw\n");
        assert_eq!(
            device.on_write(LEVEL, &BusValue::Float(50.0)),
            Err(WriteRejected::ReadOnly(LEVEL.to_string()))
        );
    }

    #[test]
    fn test_raw_bound_write_recomputes_only_when_raw_driven() {
        let mut device = build("rawvaluestatetopic = tank/raw\nrawvaluefull = 100\ncapacity = 1\n");
        device.on_inbound("tank/raw", b"50");
        assert_eq!(device.tree().get(LEVEL), Some(&BusValue::Float(50.0)));

        let effects = device.on_write(RAW_FULL, &BusValue::Int(200)).unwrap();
        assert_eq!(
            effects,
            [
                Effect::notify(RAW_FULL, BusValue::Float(200.0)),
                Effect::persist("Tank_Sensor_1", "RawValueFull", "200"),
                Effect::notify(LEVEL, BusValue::Float(25.0)),
                Effect::notify(REMAINING, BusValue::Float(0.25)),
            ]
        );

        let mut direct = build("levelstatetopic = tank/level\n");
        let effects = direct.on_write(RAW_FULL, &BusValue::Int(200)).unwrap();
        assert_eq!(effects.len(), 2);
    }

    #[test]
    fn test_capacity_write_recomputes_remaining() {
        let mut device = build("levelstatetopic = tank/level\ncapacity = 0.4\n");
        device.on_inbound("tank/level", b"50");
        assert_eq!(device.tree().get(REMAINING), Some(&BusValue::Float(0.2)));

        let effects = device.on_write(CAPACITY, &BusValue::Float(1.0)).unwrap();
        assert_eq!(
            effects,
            [
                Effect::notify(CAPACITY, BusValue::Float(1.0)),
                Effect::persist("Tank_Sensor_1", "Capacity", "1"),
                Effect::notify(REMAINING, BusValue::Float(0.5)),
            ]
        );

        // Remaining is unchanged by the fluid type.
        let effects = device.on_write(FLUID_TYPE, &BusValue::Int(7)).unwrap();
        assert_eq!(
            effects,
            [
                Effect::notify(FLUID_TYPE, BusValue::Int(7)),
                Effect::persist("Tank_Sensor_1", "FluidType", "diesel"),
            ]
        );
        assert_eq!(device.tree().get(REMAINING), Some(&BusValue::Float(0.5)));
    }

    #[test]
    fn test_fluid_type_write() {
        let mut device = build("");
        let effects = device.on_write(FLUID_TYPE, &BusValue::Int(7)).unwrap();
        assert_eq!(effects[1], Effect::persist("Tank_Sensor_1", "FluidType", "diesel"));
        assert!(device.on_write(FLUID_TYPE, &BusValue::Int(12)).is_err());
    }
}
