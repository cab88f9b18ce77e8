//! Computed value engine.
//!
//! Pure functions shared by the device synchronizers: payload decoding,
//! command encoding, tank level derivation, digital input state mapping and
//! the enumeration tables used by the store and the bus.

use serde_json::Value;

/// Which decoding rule produced a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeStrategy {
    /// A JSON attribute matched the ON or OFF template's single key.
    JsonAttributeMatch,
    /// The `value` field of a JSON object.
    JsonValueField,
    /// The payload text itself.
    RawStringMatch,
    /// The payload parsed as a number.
    NumericValue,
    /// The payload named an entry of an enumeration table.
    EnumName,
}

/// Template-driven ON/OFF decoder.
///
/// An ON or OFF template that parses as a single-key JSON object enables
/// attribute matching on that key (dotted keys address nested objects).
/// Every template also matches as a raw, case-insensitive string.
#[derive(Debug, Clone, PartialEq)]
pub struct StateCodec {
    on_raw: String,
    off_raw: String,
    on_attribute: Option<AttributeMatch>,
    off_attribute: Option<AttributeMatch>,
}

#[derive(Debug, Clone, PartialEq)]
struct AttributeMatch {
    path: String,
    expected: String,
}

impl AttributeMatch {
    fn from_template(template: &str) -> Option<Self> {
        match serde_json::from_str::<Value>(template) {
            Ok(Value::Object(map)) if map.len() == 1 => {
                let (path, value) = map.into_iter().next()?;
                Some(Self {
                    path,
                    expected: lowered(&value),
                })
            }
            _ => None,
        }
    }

    fn matches(&self, payload: &Value) -> bool {
        json_attribute(payload, &self.path).is_some_and(|v| lowered(v) == self.expected)
    }
}

impl StateCodec {
    pub fn new(on_template: &str, off_template: &str) -> Self {
        Self {
            on_raw: on_template.trim().to_lowercase(),
            off_raw: off_template.trim().to_lowercase(),
            on_attribute: AttributeMatch::from_template(on_template),
            off_attribute: AttributeMatch::from_template(off_template),
        }
    }

    /// Decode a payload to 1 (ON) or 0 (OFF).
    ///
    /// Precedence: JSON attribute match against ON then OFF, then the JSON
    /// `value` field, then the raw payload text. The candidate text is
    /// compared against the lowercased templates.
    pub fn decode(&self, payload: &str) -> Option<(u8, DecodeStrategy)> {
        let payload = payload.trim();

        let (candidate, strategy) = match serde_json::from_str::<Value>(payload) {
            Ok(json) => {
                if self.on_attribute.as_ref().is_some_and(|m| m.matches(&json)) {
                    return Some((1, DecodeStrategy::JsonAttributeMatch));
                }
                if self.off_attribute.as_ref().is_some_and(|m| m.matches(&json)) {
                    return Some((0, DecodeStrategy::JsonAttributeMatch));
                }
                match json.get("value") {
                    Some(value) if json.is_object() => {
                        (lowered(value), DecodeStrategy::JsonValueField)
                    }
                    _ => (payload.to_lowercase(), DecodeStrategy::RawStringMatch),
                }
            }
            Err(_) => (payload.to_lowercase(), DecodeStrategy::RawStringMatch),
        };

        if candidate == self.on_raw {
            Some((1, strategy))
        } else if candidate == self.off_raw {
            Some((0, strategy))
        } else {
            None
        }
    }
}

/// Command payloads published when the bus asks a switch output to change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTemplates {
    pub on: String,
    pub off: String,
}

impl CommandTemplates {
    pub fn new(on: impl Into<String>, off: impl Into<String>) -> Self {
        Self {
            on: on.into(),
            off: off.into(),
        }
    }

    /// Payload for the requested state, verbatim.
    pub fn encode(&self, state: bool) -> &str {
        if state { &self.on } else { &self.off }
    }
}

/// Decode a numeric measurement.
///
/// Accepts a JSON object's `value` field (number, boolean or numeric text),
/// a bare number, or, when `table` is given, a name from that table.
pub fn decode_number(payload: &str, table: Option<&EnumTable>) -> Option<(f64, DecodeStrategy)> {
    let payload = payload.trim();

    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(payload) {
        let value = map.get("value")?;
        let number = match value {
            Value::Number(n) => n.as_f64(),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::String(s) => s
                .trim()
                .parse()
                .ok()
                .or_else(|| table.and_then(|t| t.code(s)).map(|c| c as f64)),
            _ => None,
        };
        return number.map(|n| (n, DecodeStrategy::JsonValueField));
    }

    if let Ok(number) = payload.parse::<f64>() {
        if number.is_finite() {
            return Some((number, DecodeStrategy::NumericValue));
        }
    }

    table
        .and_then(|t| t.code(payload))
        .map(|code| (code as f64, DecodeStrategy::EnumName))
}

/// Round half away from zero to two decimals.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Tank level in percent for a raw sensor reading.
///
/// Clamped to `[0, 100]`; an uncalibrated sensor (`full == empty`) reads 0.
pub fn raw_to_level(raw: f64, empty: f64, full: f64) -> f64 {
    let span = full - empty;
    if span == 0.0 {
        return 0.0;
    }
    ((raw - empty) / span * 100.0).clamp(0.0, 100.0)
}

/// Remaining volume for a level in percent.
pub fn level_to_remaining(level: f64, capacity: f64) -> f64 {
    level / 100.0 * capacity
}

/// Logical state of a digital input after optional inversion.
pub fn input_logical_state(raw: u8, invert: bool) -> u8 {
    let state = u8::from(raw != 0);
    if invert { 1 - state } else { state }
}

/// Display code of a digital input for its type and logical state.
///
/// Door alarm, bilge pump and the alarm-class types have their own state
/// pairs; every other type shows the logical state unchanged.
pub fn input_display_code(input_type: i64, logical: u8) -> i64 {
    let (inactive, active) = match input_type {
        2 => (6, 7),
        3 => (2, 3),
        4..=8 => (8, 9),
        _ => return i64::from(logical),
    };
    if logical != 0 { active } else { inactive }
}

/// Alarm code of a digital input: 2 when alarming is enabled and the
/// (optionally inverted) logical state is active.
pub fn input_alarm(logical: u8, invert_alarm: bool, alarm_enabled: bool) -> i64 {
    let active = (logical != 0) ^ invert_alarm;
    if alarm_enabled && active { 2 } else { 0 }
}

/// Name ↔ code table for an enumerated property.
#[derive(Debug)]
pub struct EnumTable {
    entries: &'static [(&'static str, i64)],
    default: i64,
}

impl EnumTable {
    /// Code for `name`, ignoring case and surrounding whitespace.
    pub fn code(&self, name: &str) -> Option<i64> {
        let name = name.trim();
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, c)| *c)
    }

    /// Code for `name`, or the table default when unknown.
    pub fn code_or_default(&self, name: &str) -> i64 {
        self.code(name).unwrap_or(self.default)
    }

    /// First name registered for `code`.
    pub fn name(&self, code: i64) -> Option<&'static str> {
        self.entries
            .iter()
            .find(|(_, c)| *c == code)
            .map(|(n, _)| *n)
    }

    pub fn default_code(&self) -> i64 {
        self.default
    }
}

pub static TEMPERATURE_TYPES: EnumTable = EnumTable {
    entries: &[
        ("battery", 0),
        ("fridge", 1),
        ("generic", 2),
        ("room", 3),
        ("outdoor", 4),
        ("water heater", 5),
        ("freezer", 6),
    ],
    default: 2,
};

pub static FLUID_TYPES: EnumTable = EnumTable {
    entries: &[
        ("fuel", 0),
        ("fresh water", 1),
        ("waste water", 2),
        ("live well", 3),
        ("oil", 4),
        ("black water", 5),
        ("gasoline", 6),
        ("diesel", 7),
        ("lpg", 8),
        ("lng", 9),
        ("hydraulic oil", 10),
        ("raw water", 11),
    ],
    default: 1,
};

// "generic" is an alias; reverse lookups return the canonical name.
pub static DIGITAL_INPUT_TYPES: EnumTable = EnumTable {
    entries: &[
        ("disabled", 0),
        ("pulse meter", 1),
        ("door alarm", 2),
        ("bilge pump", 3),
        ("bilge alarm", 4),
        ("burglar alarm", 5),
        ("smoke alarm", 6),
        ("fire alarm", 7),
        ("co2 alarm", 8),
        ("generator", 9),
        ("touch input control", 10),
        ("generic", 3),
    ],
    default: 3,
};

pub static CHARGER_STATES: EnumTable = EnumTable {
    entries: &[("off", 0), ("bulk", 3), ("absorption", 4), ("float", 5)],
    default: 0,
};

pub static LOAD_STATES: EnumTable = EnumTable {
    entries: &[("off", 0), ("on", 1)],
    default: 0,
};

/// Follow a dotted path through nested JSON objects.
fn json_attribute<'a>(json: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(json, |node, key| node.as_object()?.get(key))
}

/// Lowercased text form of a JSON value, as compared against templates.
fn lowered(value: &Value) -> String {
    match value {
        Value::String(s) => s.to_lowercase(),
        Value::Null => "none".to_string(),
        other => other.to_string().to_lowercase(),
    }
}
