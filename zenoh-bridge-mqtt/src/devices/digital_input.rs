//! Digital input: one ON/OFF topic mapped to a typed display state and alarm.

use virtdev_common::{BusValue, StoreSection};

use super::{Decode, DeviceCore, enum_code, flag};
use crate::codec::{
    DIGITAL_INPUT_TYPES, StateCodec, input_alarm, input_display_code, input_logical_state,
};
use crate::effect::{Effect, WriteRejected};
use crate::registry::DeviceEntry;

const INPUT_STATE: &str = "/InputState";
const STATE: &str = "/State";
const ALARM: &str = "/Alarm";
const TYPE: &str = "/Type";
const COUNT: &str = "/Count";
const INVERT_TRANSLATION: &str = "/Settings/InvertTranslation";
const INVERT_ALARM: &str = "/Settings/InvertAlarm";
const ALARM_SETTING: &str = "/Settings/AlarmSetting";

#[derive(Debug, Clone)]
pub struct DigitalInput {
    pub(super) core: DeviceCore,
    codec: StateCodec,
    /// Last raw state received; `None` until the first message.
    raw: Option<u8>,
}

impl DigitalInput {
    pub fn build(entry: &DeviceEntry, section: &StoreSection) -> Self {
        let codec = StateCodec::new(
            section
                .get_any(&["mqtt_on_state_payload", "MqttOnStatePayload"])
                .unwrap_or("ON"),
            section
                .get_any(&["mqtt_off_state_payload", "MqttOffStatePayload"])
                .unwrap_or("OFF"),
        );
        let input_type = DIGITAL_INPUT_TYPES.code_or_default(&section.get_or("Type", "generic"));

        let mut core = DeviceCore::new(entry);
        core.tree_mut()
            .add_writable(COUNT, section.parse_or("Count", 0i64))
            .add(STATE, 0)
            .add_writable(TYPE, input_type)
            .add_writable(INVERT_TRANSLATION, section.parse_or("InvertTranslation", 0i64))
            .add_writable(INVERT_ALARM, section.parse_or("InvertAlarm", 0i64))
            .add_writable(ALARM_SETTING, section.parse_or("AlarmSetting", 0i64))
            .add(INPUT_STATE, 0)
            .add(ALARM, 0);
        core.bind(INPUT_STATE, section.get("MqttStateTopic"), Decode::OnOff);

        Self {
            core,
            codec,
            raw: None,
        }
    }

    pub(super) fn on_inbound(&mut self, topic: &str, payload: &str) -> Vec<Effect> {
        let mut effects = Vec::new();
        match self.codec.decode(payload) {
            Some((raw, strategy)) => {
                tracing::trace!(topic = %topic, ?strategy, raw, "Input state decoded");
                self.raw = Some(raw);
                self.core.update(INPUT_STATE, BusValue::Int(raw.into()), &mut effects);
                self.derive(&mut effects);
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
        let mut effects = Vec::new();
        match path {
            COUNT => {
                let count = value
                    .as_i64()
                    .filter(|c| *c >= 0)
                    .ok_or_else(|| WriteRejected::invalid(path, value))?;
                if self.core.update(path, BusValue::Int(count), &mut effects) {
                    effects.push(self.core.persist("Count", count.to_string()));
                }
            }
            TYPE => {
                let (code, name) = enum_code(&DIGITAL_INPUT_TYPES, value)
                    .ok_or_else(|| WriteRejected::invalid(path, value))?;
                if self.core.update(path, BusValue::Int(code), &mut effects) {
                    effects.push(self.core.persist("Type", name));
                    self.derive(&mut effects);
                }
            }
            INVERT_TRANSLATION | INVERT_ALARM | ALARM_SETTING => {
                let setting = flag(value).ok_or_else(|| WriteRejected::invalid(path, value))?;
                if self.core.update(path, BusValue::Int(setting), &mut effects) {
                    let key = path.rsplit('/').next().unwrap_or(path);
                    effects.push(self.core.persist(key, setting.to_string()));
                    self.derive(&mut effects);
                }
            }
            _ => return Err(self.core.reject(path)),
        }
        Ok(effects)
    }

    /// Recompute `/State` and `/Alarm` from the last raw state.
    fn derive(&mut self, effects: &mut Vec<Effect>) {
        let Some(raw) = self.raw else {
            return;
        };
        let tree = self.core.tree();
        let logical = input_logical_state(raw, tree.get_i64(INVERT_TRANSLATION) == 1);
        let display = input_display_code(tree.get_i64(TYPE), logical);
        let alarm = input_alarm(
            logical,
            tree.get_i64(INVERT_ALARM) == 1,
            tree.get_i64(ALARM_SETTING) == 1,
        );

        self.core.update(STATE, BusValue::Int(display), effects);
        self.core.update(ALARM, BusValue::Int(alarm), effects);
    }
}
