//! End-to-end tests of device synchronization without a broker or bus.
//!
//! Effects are applied to a store by hand, the way the instance task hands
//! them to the store writer.

use virtdev_common::{BusValue, ConfigStore};
use zenoh_bridge_mqtt::devices::Device;
use zenoh_bridge_mqtt::effect::{Effect, WriteRejected};
use zenoh_bridge_mqtt::registry::{DeviceKind, discover, entry_for};

const STORE: &str = r#"
[Global]
number_of_tanks = 1
number_of_switches = 1

[Tank_Sensor_1]
serial = 77
deviceinstance = 20
customname = Fresh water
rawvaluestatetopic = tank/raw
rawvalueempty = 0
rawvaluefull = 50
capacity = 0.2

[Relay_Module_1]
serial = 5
deviceinstance = 110
numberofswitches = 1

[switch_1_1]
mqttstatetopic = shelly/relay/0
mqttcommandtopic = shelly/relay/0/command

[Input_1]
deviceinstance = 30
"#;

fn store() -> ConfigStore {
    ConfigStore::parse(STORE).unwrap()
}

fn build(store: &ConfigStore, kind: &str, section: &str) -> Device {
    let entry = entry_for(store, kind, section).unwrap();
    Device::build(&entry, store).unwrap()
}

fn apply_persists(store: &mut ConfigStore, effects: &[Effect]) {
    for effect in effects {
        if let Effect::Persist {
            section,
            key,
            value,
        } = effect
        {
            store.set(section, key, value.as_str());
        }
    }
}

#[test]
fn test_tank_raw_reading_updates_level_and_remaining() {
    let store = store();
    let mut tank = build(&store, "tank_sensor", "Tank_Sensor_1");
    assert_eq!(tank.service_name(), "com.victronenergy.tank.virtual_77");

    let effects = tank.on_inbound("tank/raw", b"25");
    assert_eq!(
        effects,
        [
            Effect::notify("/RawValue", BusValue::Float(25.0)),
            Effect::notify("/Level", BusValue::Float(50.0)),
            Effect::notify("/Remaining", BusValue::Float(0.1)),
        ]
    );

    // Same reading again changes nothing.
    assert!(tank.on_inbound("tank/raw", b"25").is_empty());

    // Derived values stay read-only.
    assert!(matches!(
        tank.on_write("/Level", &BusValue::Float(80.0)),
        Err(WriteRejected::ReadOnly(_))
    ));
    assert_eq!(tank.tree().get("/Level"), Some(&BusValue::Float(50.0)));
}

#[test]
fn test_persisted_settings_survive_rebuild() {
    let mut store = store();
    let mut tank = build(&store, "tank_sensor", "1");

    let effects = tank.on_write("/Capacity", &BusValue::Float(0.4)).unwrap();
    apply_persists(&mut store, &effects);
    let effects = tank.on_write("/CustomName", &BusValue::from("Drinking water")).unwrap();
    apply_persists(&mut store, &effects);

    let rebuilt = build(&store, "tank_sensor", "1");
    assert_eq!(rebuilt.tree().get("/Capacity"), Some(&BusValue::Float(0.4)));
    assert_eq!(
        rebuilt.tree().get("/CustomName"),
        Some(&BusValue::from("Drinking water"))
    );
}

#[test]
fn test_switch_command_then_confirmation() {
    let store = store();
    let mut switch = build(&store, "switch", "1");
    let state = "/SwitchableOutput/output_1/State";

    let effects = switch.on_write(state, &BusValue::Int(1)).unwrap();
    assert!(effects.contains(&Effect::notify(state, BusValue::Int(1))));
    assert!(effects.contains(&Effect::Publish {
        topic: "shelly/relay/0/command".to_string(),
        payload: "1".to_string(),
    }));

    // The broker echoing the new state is not a change.
    assert!(switch.on_inbound("shelly/relay/0", b"1").is_empty());

    let effects = switch.on_inbound("shelly/relay/0", b"0");
    assert_eq!(effects, [Effect::notify(state, BusValue::Int(0))]);
}

#[test]
fn test_launcher_discovery_reports_broken_sections() {
    let store = store();
    let results = discover(&store);
    assert_eq!(results.len(), 3);

    let kinds: Vec<DeviceKind> = results
        .iter()
        .filter_map(|r| r.as_ref().ok())
        .map(|entry| entry.kind)
        .collect();
    assert_eq!(kinds.len(), 2);
    assert!(kinds.contains(&DeviceKind::Tank));
    assert!(kinds.contains(&DeviceKind::Switch));

    // Input_1 has no serial.
    assert_eq!(results.iter().filter(|r| r.is_err()).count(), 1);
}
