//! Device synchronizers.
//!
//! One synchronizer per device instance keeps the property tree in step with
//! the broker. Synchronizers are sans-IO: inbound messages and bus writes go
//! in, [`Effect`]s come out.

mod battery;
mod charger;
mod digital_input;
mod switch;
mod tank;
mod temperature;

use std::collections::HashMap;

pub use battery::Battery;
pub use charger::SolarCharger;
pub use digital_input::DigitalInput;
pub use switch::SwitchBank;
pub use tank::TankSensor;
pub use temperature::TemperatureSensor;

use virtdev_common::{BusValue, ConfigStore, StoreSection};

use crate::codec::{EnumTable, decode_number};
use crate::effect::{Effect, WriteRejected};
use crate::registry::{DeviceConfigError, DeviceEntry, DeviceKind, is_valid_topic};
use crate::tree::PropertyTree;

pub const CUSTOM_NAME: &str = "/CustomName";

const PROCESS_NAME: &str = "zenoh-bridge-mqtt";

/// How an inbound payload becomes a property value.
#[derive(Debug, Clone, Copy)]
pub enum Decode {
    /// ON/OFF templates of the device.
    OnOff,
    Float,
    Integer,
    /// Integer, also accepting the names of a table.
    Enum(&'static EnumTable),
}

impl Decode {
    fn number(self, payload: &str) -> Option<BusValue> {
        match self {
            Decode::OnOff => None,
            Decode::Float => decode_number(payload, None).map(|(v, _)| BusValue::Float(v)),
            Decode::Integer => decode_number(payload, None).map(|(v, _)| BusValue::Int(v.round() as i64)),
            Decode::Enum(table) => {
                decode_number(payload, Some(table)).map(|(v, _)| BusValue::Int(v.round() as i64))
            }
        }
    }
}

/// Inbound topic bound to a property.
#[derive(Debug, Clone)]
pub struct Binding {
    pub path: String,
    pub decode: Decode,
}

/// State shared by every kind: identity, property tree and topic bindings.
#[derive(Debug, Clone)]
pub struct DeviceCore {
    entry: DeviceEntry,
    tree: PropertyTree,
    bindings: HashMap<String, Binding>,
}

impl DeviceCore {
    /// Core with the identity properties registered.
    pub fn new(entry: &DeviceEntry) -> Self {
        let mut tree = PropertyTree::new();
        tree.add("/Mgmt/ProcessName", PROCESS_NAME)
            .add("/Mgmt/ProcessVersion", env!("CARGO_PKG_VERSION"))
            .add("/Mgmt/Connection", "Virtual")
            .add("/DeviceInstance", entry.device_instance)
            .add("/ProductId", entry.kind.product_id())
            .add("/ProductName", entry.kind.product_name())
            .add_writable(CUSTOM_NAME, entry.custom_name.as_str())
            .add("/Serial", entry.serial.as_str())
            .add("/Connected", 1);

        Self {
            entry: entry.clone(),
            tree,
            bindings: HashMap::new(),
        }
    }

    pub fn entry(&self) -> &DeviceEntry {
        &self.entry
    }

    pub fn tree(&self) -> &PropertyTree {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut PropertyTree {
        &mut self.tree
    }

    /// Bind a configured topic to `path`. Invalid topics are skipped.
    ///
    /// Returns whether the binding was made.
    pub fn bind(&mut self, path: &str, topic: Option<&str>, decode: Decode) -> bool {
        let Some(topic) = topic.filter(|t| is_valid_topic(t)).map(str::trim) else {
            return false;
        };
        if let Some(existing) = self.bindings.get(topic) {
            tracing::warn!(
                section = %self.entry.section,
                topic = %topic,
                bound = %existing.path,
                ignored = %path,
                "Topic already bound, keeping the first property"
            );
            return false;
        }
        self.bindings.insert(
            topic.to_string(),
            Binding {
                path: path.to_string(),
                decode,
            },
        );
        true
    }

    pub fn binding(&self, topic: &str) -> Option<&Binding> {
        self.bindings.get(topic)
    }

    /// Topics to subscribe, sorted.
    pub fn inbound_topics(&self) -> Vec<String> {
        let mut topics: Vec<_> = self.bindings.keys().cloned().collect();
        topics.sort();
        topics
    }

    /// Set a property, queueing a notification when it changed.
    pub fn update(&mut self, path: &str, value: BusValue, effects: &mut Vec<Effect>) -> bool {
        if self.tree.set(path, value.clone()) {
            effects.push(Effect::notify(path, value));
            true
        } else {
            false
        }
    }

    /// Persist `key` in the device's own section.
    pub fn persist(&self, key: &str, value: impl Into<String>) -> Effect {
        Effect::persist(&self.entry.section, key, value)
    }

    /// Decode a numeric binding and apply it.
    pub fn apply_number(&mut self, topic: &str, payload: &str) -> Vec<Effect> {
        let mut effects = Vec::new();
        let Some(Binding { path, decode }) = self.bindings.get(topic).cloned() else {
            return effects;
        };
        match decode.number(payload) {
            Some(value) => {
                self.update(&path, value, &mut effects);
            }
            None => self.warn_undecodable(topic, payload),
        }
        effects
    }

    pub fn warn_undecodable(&self, topic: &str, payload: &str) {
        tracing::warn!(
            section = %self.entry.section,
            topic = %topic,
            payload = %payload,
            "Payload not recognised, message dropped"
        );
    }

    pub fn write_custom_name(&mut self, value: &BusValue) -> Result<Vec<Effect>, WriteRejected> {
        let name = value.to_string();
        let mut effects = Vec::new();
        if self.update(CUSTOM_NAME, BusValue::Text(name.clone()), &mut effects) {
            effects.push(self.persist("CustomName", name));
        }
        Ok(effects)
    }

    /// Rejection for a write the device does not accept.
    pub fn reject(&self, path: &str) -> WriteRejected {
        if self.tree.contains(path) {
            WriteRejected::ReadOnly(path.to_string())
        } else {
            WriteRejected::UnknownPath(path.to_string())
        }
    }
}

/// A configured device of any kind.
#[derive(Debug, Clone)]
pub enum Device {
    Switch(SwitchBank),
    DigitalInput(DigitalInput),
    Temperature(TemperatureSensor),
    Tank(TankSensor),
    Battery(Battery),
    Charger(SolarCharger),
}

impl Device {
    /// Build the synchronizer for `entry` from its store sections.
    pub fn build(entry: &DeviceEntry, store: &ConfigStore) -> Result<Self, DeviceConfigError> {
        let section = device_section(store, entry)?;
        Ok(match entry.kind {
            DeviceKind::Switch => Device::Switch(SwitchBank::build(entry, section, store)),
            DeviceKind::DigitalInput => Device::DigitalInput(DigitalInput::build(entry, section)),
            DeviceKind::Temperature => {
                Device::Temperature(TemperatureSensor::build(entry, section))
            }
            DeviceKind::Tank => Device::Tank(TankSensor::build(entry, section)),
            DeviceKind::Battery => Device::Battery(Battery::build(entry, section)),
            DeviceKind::Charger => Device::Charger(SolarCharger::build(entry, section)),
        })
    }

    pub fn core(&self) -> &DeviceCore {
        match self {
            Device::Switch(d) => &d.core,
            Device::DigitalInput(d) => &d.core,
            Device::Temperature(d) => &d.core,
            Device::Tank(d) => &d.core,
            Device::Battery(d) => &d.core,
            Device::Charger(d) => &d.core,
        }
    }

    fn core_mut(&mut self) -> &mut DeviceCore {
        match self {
            Device::Switch(d) => &mut d.core,
            Device::DigitalInput(d) => &mut d.core,
            Device::Temperature(d) => &mut d.core,
            Device::Tank(d) => &mut d.core,
            Device::Battery(d) => &mut d.core,
            Device::Charger(d) => &mut d.core,
        }
    }

    pub fn entry(&self) -> &DeviceEntry {
        self.core().entry()
    }

    pub fn tree(&self) -> &PropertyTree {
        self.core().tree()
    }

    pub fn service_name(&self) -> String {
        self.entry().service_name()
    }

    pub fn inbound_topics(&self) -> Vec<String> {
        self.core().inbound_topics()
    }

    /// Handle a message from the broker.
    pub fn on_inbound(&mut self, topic: &str, payload: &[u8]) -> Vec<Effect> {
        if self.core().binding(topic).is_none() {
            tracing::debug!(
                section = %self.entry().section,
                topic = %topic,
                "Message on unbound topic ignored"
            );
            return Vec::new();
        }

        let payload = String::from_utf8_lossy(payload);
        let payload = payload.trim();
        match self {
            Device::Switch(d) => d.on_inbound(topic, payload),
            Device::DigitalInput(d) => d.on_inbound(topic, payload),
            Device::Tank(d) => d.on_inbound(topic, payload),
            Device::Temperature(d) => d.core.apply_number(topic, payload),
            Device::Battery(d) => d.core.apply_number(topic, payload),
            Device::Charger(d) => d.core.apply_number(topic, payload),
        }
    }

    /// Handle a write request from the bus.
    pub fn on_write(&mut self, path: &str, value: &BusValue) -> Result<Vec<Effect>, WriteRejected> {
        if !self.tree().is_writable(path) {
            return Err(self.core().reject(path));
        }
        if path == CUSTOM_NAME {
            return self.core_mut().write_custom_name(value);
        }
        match self {
            Device::Switch(d) => d.on_write(path, value),
            Device::DigitalInput(d) => d.on_write(path, value),
            Device::Temperature(d) => d.on_write(path, value),
            Device::Tank(d) => d.on_write(path, value),
            Device::Battery(d) => d.on_write(path, value),
            Device::Charger(d) => Err(d.core.reject(path)),
        }
    }
}

fn device_section<'a>(
    store: &'a ConfigStore,
    entry: &DeviceEntry,
) -> Result<&'a StoreSection, DeviceConfigError> {
    store
        .section(&entry.section)
        .ok_or_else(|| DeviceConfigError::MissingSection(entry.section.clone()))
}

/// Enumeration code carried by a write: a number known to `table`, or one
/// of its names.
fn enum_code(table: &EnumTable, value: &BusValue) -> Option<(i64, &'static str)> {
    let code = match value {
        BusValue::Text(name) => table.code(name),
        other => other.as_i64(),
    }?;
    table.name(code).map(|name| (code, name))
}

/// 0 or 1.
fn flag(value: &BusValue) -> Option<i64> {
    value.as_i64().filter(|v| matches!(v, 0 | 1))
}

/// Finite, non-negative number.
fn non_negative(value: &BusValue) -> Option<f64> {
    value.as_f64().filter(|v| v.is_finite() && *v >= 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const STORE: &str = "\
[Temp_Sensor_1]
serial = 7
deviceinstance = 40
customname = Engine room
type = Fridge
temperaturestatetopic = sensors/engine/temp
humiditystatetopic = path/to/mqtt/humidity
";

    fn build() -> Device {
        let store = ConfigStore::parse(STORE).unwrap();
        let entry = crate::registry::entry_for(&store, "temp_sensor", "1").unwrap();
        Device::build(&entry, &store).unwrap()
    }

    #[test]
    fn test_identity_properties() {
        let device = build();
        let tree = device.tree();
        assert_eq!(tree.get("/ProductId"), Some(&BusValue::Int(49248)));
        assert_eq!(tree.get("/DeviceInstance"), Some(&BusValue::Int(40)));
        assert_eq!(tree.get("/Serial"), Some(&BusValue::from("7")));
        assert_eq!(tree.get("/Mgmt/Connection"), Some(&BusValue::from("Virtual")));
        assert_eq!(tree.get("/Connected"), Some(&BusValue::Int(1)));
        assert_eq!(device.service_name(), "com.victronenergy.temperature.virtual_7");
    }

    #[test]
    fn test_placeholder_topics_are_not_bound() {
        let device = build();
        assert_eq!(device.inbound_topics(), ["sensors/engine/temp"]);
    }

    #[test]
    fn test_custom_name_write_persists() {
        let mut device = build();
        let effects = device.on_write(CUSTOM_NAME, &BusValue::from("Galley")).unwrap();
        assert_eq!(
            effects,
            [
                Effect::notify(CUSTOM_NAME, BusValue::from("Galley")),
                Effect::persist("Temp_Sensor_1", "CustomName", "Galley"),
            ]
        );

        let effects = device.on_write(CUSTOM_NAME, &BusValue::from("Galley")).unwrap();
        assert!(effects.is_empty());
    }

    #[test]
    fn test_writes_to_unknown_or_read_only_paths() {
        let mut device = build();
        assert_eq!(
            device.on_write("/Temperature", &BusValue::Float(3.0)),
            Err(WriteRejected::ReadOnly("/Temperature".to_string()))
        );
        assert_eq!(
            device.on_write("/Nope", &BusValue::Int(1)),
            Err(WriteRejected::UnknownPath("/Nope".to_string()))
        );
    }

    #[test]
    fn test_unbound_topic_is_ignored() {
        let mut device = build();
        assert!(device.on_inbound("other/topic", b"12").is_empty());
    }

    #[test]
    fn test_enum_code() {
        use crate::codec::FLUID_TYPES;
        assert_eq!(enum_code(&FLUID_TYPES, &BusValue::Int(5)), Some((5, "black water")));
        assert_eq!(enum_code(&FLUID_TYPES, &BusValue::from("Diesel")), Some((7, "diesel")));
        assert_eq!(enum_code(&FLUID_TYPES, &BusValue::Int(99)), None);
    }
}
