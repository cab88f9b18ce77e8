//! Switch bank: N relay outputs, each with its own state and command topic.

use std::collections::HashMap;

use virtdev_common::{BusValue, ConfigStore, StoreSection};

use super::{Decode, DeviceCore, flag};
use crate::codec::{CommandTemplates, StateCodec};
use crate::effect::{Effect, WriteRejected};
use crate::registry::{DeviceEntry, is_valid_topic};

const OUTPUT_PREFIX: &str = "/SwitchableOutput/output_";

/// Store section of output `output` of switch module `module`.
pub fn output_section(module: u32, output: u32) -> String {
    format!("switch_{}_{}", module, output)
}

#[derive(Debug, Clone)]
pub struct SwitchBank {
    pub(super) core: DeviceCore,
    codec: StateCodec,
    commands: CommandTemplates,
    /// Command topic per bound output.
    command_topics: HashMap<u32, String>,
}

impl SwitchBank {
    pub fn build(entry: &DeviceEntry, section: &StoreSection, store: &ConfigStore) -> Self {
        let outputs: u32 = section.parse_or("NumberOfSwitches", 1);
        let codec = StateCodec::new(
            &section.get_or("mqtt_on_state_payload", "1"),
            &section.get_or("mqtt_off_state_payload", "0"),
        );
        let commands = CommandTemplates::new(
            section.get_or("mqtt_on_command_payload", "1"),
            section.get_or("mqtt_off_command_payload", "0"),
        );

        let mut core = DeviceCore::new(entry);
        core.tree_mut()
            .add("/State", 256)
            .add("/FirmwareVersion", 0)
            .add("/HardwareVersion", 0);

        let mut command_topics = HashMap::new();
        for j in 1..=outputs {
            let output = store.section(&output_section(entry.device_index, j));
            let get = |key: &str| output.and_then(|s| s.get(key));
            let base = format!("{}{}", OUTPUT_PREFIX, j);
            let state_path = format!("{}/State", base);

            let state_topic = get("MqttStateTopic").filter(|t| is_valid_topic(t));
            let command_topic = get("MqttCommandTopic").filter(|t| is_valid_topic(t));
            let bound = match (state_topic, command_topic) {
                (Some(state), Some(command)) => {
                    core.bind(&state_path, Some(state), Decode::OnOff);
                    command_topics.insert(j, command.trim().to_string());
                    true
                }
                _ => {
                    tracing::warn!(
                        section = %entry.section,
                        output = j,
                        "Output lacks a valid state/command topic pair, not bound"
                    );
                    false
                }
            };

            let tree = core.tree_mut();
            tree.add(format!("{}/Name", base), format!("Switch {}", j))
                .add(format!("{}/Status", base), 0);
            if bound {
                tree.add_writable(state_path, 0);
            } else {
                tree.add(state_path, 0);
            }
            tree.add_writable(
                format!("{}/Settings/CustomName", base),
                get("CustomName").unwrap_or_default(),
            )
            .add_writable(
                format!("{}/Settings/Group", base),
                get("Group").unwrap_or_default(),
            )
            .add(format!("{}/Settings/Type", base), 1)
            .add(format!("{}/Settings/ValidTypes", base), 7);
        }

        Self {
            core,
            codec,
            commands,
            command_topics,
        }
    }

    pub(super) fn on_inbound(&mut self, topic: &str, payload: &str) -> Vec<Effect> {
        let mut effects = Vec::new();
        let Some(path) = self.core.binding(topic).map(|b| b.path.clone()) else {
            return effects;
        };

        match self.codec.decode(payload) {
            Some((state, strategy)) => {
                tracing::trace!(topic = %topic, ?strategy, state, "Switch state decoded");
                self.core.update(&path, BusValue::Int(state.into()), &mut effects);
            }
            None => self.core.warn_undecodable(topic, payload),
        }
        effects
    }

    pub(super) fn on_write(
        &mut self,
        path: &str,
        value: &BusValue,
    ) -> Result<Vec<Effect>, WriteRejected> {
        let Some((output, leaf)) = parse_output_path(path) else {
            return Err(self.core.reject(path));
        };
        match leaf {
            "State" => self.write_state(output, path, value),
            "Settings/CustomName" => Ok(self.write_setting(output, path, "CustomName", value)),
            "Settings/Group" => Ok(self.write_setting(output, path, "Group", value)),
            _ => Err(self.core.reject(path)),
        }
    }

    fn write_state(
        &mut self,
        output: u32,
        path: &str,
        value: &BusValue,
    ) -> Result<Vec<Effect>, WriteRejected> {
        let state = flag(value).ok_or_else(|| WriteRejected::invalid(path, value))?;
        let topic = self
            .command_topics
            .get(&output)
            .cloned()
            .ok_or_else(|| self.core.reject(path))?;

        let mut effects = Vec::new();
        self.core.update(path, BusValue::Int(state), &mut effects);
        effects.push(Effect::Publish {
            topic,
            payload: self.commands.encode(state == 1).to_string(),
        });
        Ok(effects)
    }

    fn write_setting(&mut self, output: u32, path: &str, key: &str, value: &BusValue) -> Vec<Effect> {
        let text = value.to_string();
        let mut effects = Vec::new();
        if self.core.update(path, BusValue::Text(text.clone()), &mut effects) {
            let section = output_section(self.core.entry().device_index, output);
            effects.push(Effect::persist(section, key, text));
        }
        effects
    }
}

/// Split `/SwitchableOutput/output_<j>/<leaf>` into `(j, leaf)`.
fn parse_output_path(path: &str) -> Option<(u32, &str)> {
    let rest = path.strip_prefix(OUTPUT_PREFIX)?;
    let (index, leaf) = rest.split_once('/')?;
    Some((index.parse().ok()?, leaf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::Device;
    use crate::registry::entry_for;

    const STORE: &str = r#"
[Relay_Module_2]
serial = 1234
deviceinstance = 120
numberofswitches = 3
mqtt_on_state_payload = {"output": true}
mqtt_off_state_payload = {"output": false}
mqtt_on_command_payload = on
mqtt_off_command_payload = off

[switch_2_1]
customname = Anchor light
group = Deck
mqttstatetopic = shelly/relay/0/status
mqttcommandtopic = shelly/relay/0/command

[switch_2_2]
mqttstatetopic = shelly/relay/1/status
mqttcommandtopic = path/to/mqtt/command

[switch_2_3]
mqttstatetopic = shelly/relay/2/status
mqttcommandtopic = shelly/relay/2/command
"#;

    fn build() -> Device {
        let store = ConfigStore::parse(STORE).unwrap();
        let entry = entry_for(&store, "switch", "2").unwrap();
        Device::build(&entry, &store).unwrap()
    }

    const OUT1: &str = "/SwitchableOutput/output_1/State";

    #[test]
    fn test_outputs_and_bindings() {
        let device = build();
        let tree = device.tree();

        assert_eq!(tree.get("/State"), Some(&BusValue::Int(256)));
        assert_eq!(
            tree.get("/SwitchableOutput/output_1/Settings/CustomName"),
            Some(&BusValue::from("Anchor light"))
        );
        assert_eq!(
            tree.get("/SwitchableOutput/output_3/Name"),
            Some(&BusValue::from("Switch 3"))
        );
        // output 2 has a placeholder command topic
        assert_eq!(
            device.inbound_topics(),
            ["shelly/relay/0/status", "shelly/relay/2/status"]
        );
        assert!(!tree.is_writable("/SwitchableOutput/output_2/State"));
    }

    #[test]
    fn test_inbound_state_is_deduplicated() {
        let mut device = build();

        let effects = device.on_inbound("shelly/relay/0/status", br#"{"output": true, "power": 4}"#);
        assert_eq!(effects, [Effect::notify(OUT1, BusValue::Int(1))]);

        let effects = device.on_inbound("shelly/relay/0/status", br#"{"output": true, "power": 5}"#);
        assert!(effects.is_empty());

        let effects = device.on_inbound("shelly/relay/0/status", b"garbage");
        assert!(effects.is_empty());
        assert_eq!(device.tree().get(OUT1), Some(&BusValue::Int(1)));
    }

    #[test]
    fn test_state_write_publishes_command() {
        let mut device = build();

        let effects = device.on_write(OUT1, &BusValue::Int(1)).unwrap();
        assert_eq!(
            effects,
            [
                Effect::notify(OUT1, BusValue::Int(1)),
                Effect::Publish {
                    topic: "shelly/relay/0/command".to_string(),
                    payload: "on".to_string(),
                },
            ]
        );

        let effects = device.on_write(OUT1, &BusValue::Int(0)).unwrap();
        assert_eq!(
            effects[1],
            Effect::Publish {
                topic: "shelly/relay/0/command".to_string(),
                payload: "off".to_string(),
            }
        );
    }

    #[test]
    fn test_invalid_state_write_is_rejected() {
        let mut device = build();
        assert!(matches!(
            device.on_write(OUT1, &BusValue::Int(2)),
            Err(WriteRejected::InvalidValue { .. })
        ));
        assert!(matches!(
            device.on_write("/SwitchableOutput/output_2/State", &BusValue::Int(1)),
            Err(WriteRejected::ReadOnly(_))
        ));
        assert!(matches!(
            device.on_write("/SwitchableOutput/output_1/Settings/Type", &BusValue::Int(0)),
            Err(WriteRejected::ReadOnly(_))
        ));
    }

    #[test]
    fn test_output_settings_persist_to_output_section() {
        let mut device = build();
        let effects = device
            .on_write(
                "/SwitchableOutput/output_3/Settings/Group",
                &BusValue::from("Cabin"),
            )
            .unwrap();
        assert_eq!(effects[1], Effect::persist("switch_2_3", "Group", "Cabin"));
    }

    #[test]
    fn test_parse_output_path() {
        assert_eq!(
            parse_output_path("/SwitchableOutput/output_12/Settings/Group"),
            Some((12, "Settings/Group"))
        );
        assert_eq!(parse_output_path("/State"), None);
    }
}
