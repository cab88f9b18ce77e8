//! Device registry.
//!
//! Turns the sections of the device store into [`DeviceEntry`] values, one
//! per configured device, and resolves the broker settings shared by them.

use std::fmt;

use thiserror::Error;
use virtdev_bridge_framework::BrokerConfig;
use virtdev_common::{ConfigStore, StoreSection, service_name};

/// Marker the configuration wizard writes for topics left unset.
const TOPIC_PLACEHOLDER: &str = "path/to/mqtt";

/// Section holding broker settings.
pub const MQTT_SECTION: &str = "MQTT";

/// Section holding process-wide settings.
pub const GLOBAL_SECTION: &str = "Global";

/// Errors in a device's store section. Fatal for that device only.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceConfigError {
    #[error("section [{0}] not found in the device store")]
    MissingSection(String),

    #[error("section [{section}] has no {key}")]
    MissingKey { section: String, key: &'static str },

    #[error("section [{section}]: {key} = '{value}' is not valid")]
    InvalidValue {
        section: String,
        key: &'static str,
        value: String,
    },

    #[error("unknown device kind '{0}'")]
    UnknownKind(String),

    #[error("section [{section}] does not describe a {expected} device")]
    KindMismatch { section: String, expected: DeviceKind },
}

/// The closed set of device kinds the bridge can expose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceKind {
    Switch,
    DigitalInput,
    Temperature,
    Tank,
    Battery,
    Charger,
}

impl DeviceKind {
    pub const ALL: [DeviceKind; 6] = [
        DeviceKind::Switch,
        DeviceKind::DigitalInput,
        DeviceKind::Temperature,
        DeviceKind::Tank,
        DeviceKind::Battery,
        DeviceKind::Charger,
    ];

    /// Store section prefix, matched without regard to case.
    pub fn section_prefix(self) -> &'static str {
        match self {
            DeviceKind::Switch => "Relay_Module_",
            DeviceKind::DigitalInput => "Input_",
            DeviceKind::Temperature => "Temp_Sensor_",
            DeviceKind::Tank => "Tank_Sensor_",
            DeviceKind::Battery => "Virtual_Battery_",
            DeviceKind::Charger => "Pv_Charger_",
        }
    }

    /// Name used on the command line.
    pub fn cli_name(self) -> &'static str {
        match self {
            DeviceKind::Switch => "switch",
            DeviceKind::DigitalInput => "digital_input",
            DeviceKind::Temperature => "temp_sensor",
            DeviceKind::Tank => "tank_sensor",
            DeviceKind::Battery => "battery",
            DeviceKind::Charger => "pv_charger",
        }
    }

    /// Class segment of the bus service name.
    pub fn service_class(self) -> &'static str {
        match self {
            DeviceKind::Switch => "switch",
            DeviceKind::DigitalInput => "digitalinput",
            DeviceKind::Temperature => "temperature",
            DeviceKind::Tank => "tank",
            DeviceKind::Battery => "battery",
            DeviceKind::Charger => "solarcharger",
        }
    }

    pub fn product_id(self) -> i64 {
        match self {
            DeviceKind::Switch => 49257,
            DeviceKind::DigitalInput => 41318,
            DeviceKind::Temperature => 49248,
            DeviceKind::Tank => 49251,
            DeviceKind::Battery => 49253,
            DeviceKind::Charger => 41318,
        }
    }

    pub fn product_name(self) -> &'static str {
        match self {
            DeviceKind::Switch => "Virtual switch",
            DeviceKind::DigitalInput => "Virtual digital input",
            DeviceKind::Temperature => "Virtual temperature",
            DeviceKind::Tank => "Virtual tank",
            DeviceKind::Battery => "Virtual battery",
            DeviceKind::Charger => "Virtual MPPT",
        }
    }

    /// `[Global]` key holding the configured number of devices.
    pub fn count_key(self) -> &'static str {
        match self {
            DeviceKind::Switch => "numberofmodules",
            DeviceKind::DigitalInput => "numberofinputs",
            DeviceKind::Temperature => "numberoftempsensors",
            DeviceKind::Tank => "numberoftanksensors",
            DeviceKind::Battery => "numberofvirtualbatteries",
            DeviceKind::Charger => "numberofpvchargers",
        }
    }

    /// Default `CustomName` when the section has none.
    pub fn default_custom_name(self) -> &'static str {
        match self {
            DeviceKind::DigitalInput => "Digital Input",
            _ => "",
        }
    }

    /// Kind whose prefix starts `section`, if any.
    pub fn from_section(section: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.matches_section(section))
    }

    pub fn from_cli_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.cli_name().eq_ignore_ascii_case(name.trim()))
    }

    fn matches_section(self, section: &str) -> bool {
        let prefix = self.section_prefix();
        section
            .get(..prefix.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.cli_name())
    }
}

/// Identity of one configured device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceEntry {
    pub kind: DeviceKind,
    /// Store section name as written in the file.
    pub section: String,
    pub serial: String,
    pub device_instance: i64,
    /// Number in the section name; keys the per-output sections of a switch.
    pub device_index: u32,
    pub custom_name: String,
}

impl DeviceEntry {
    /// Read the identity of `kind` from `section`.
    pub fn from_section(kind: DeviceKind, section: &StoreSection) -> Result<Self, DeviceConfigError> {
        let name = section.name();

        let serial = section
            .get("Serial")
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| DeviceConfigError::MissingKey {
                section: name.to_string(),
                key: "Serial",
            })?
            .to_string();

        let raw_instance = section
            .get("DeviceInstance")
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| DeviceConfigError::MissingKey {
                section: name.to_string(),
                key: "DeviceInstance",
            })?;
        let device_instance =
            raw_instance
                .parse()
                .map_err(|_| DeviceConfigError::InvalidValue {
                    section: name.to_string(),
                    key: "DeviceInstance",
                    value: raw_instance.to_string(),
                })?;

        Ok(Self {
            kind,
            section: name.to_string(),
            serial,
            device_instance,
            device_index: device_index(name.get(kind.section_prefix().len()..).unwrap_or_default()),
            custom_name: section.get_or("CustomName", kind.default_custom_name()),
        })
    }

    /// Bus service name of this device.
    pub fn service_name(&self) -> String {
        service_name(self.kind.service_class(), &self.serial)
    }
}

/// First run of digits in `suffix`, 0 when there is none.
fn device_index(suffix: &str) -> u32 {
    suffix
        .split(|c: char| !c.is_ascii_digit())
        .find(|run| !run.is_empty())
        .and_then(|run| run.parse().ok())
        .unwrap_or(0)
}

/// Whether a configured topic can be bound.
pub fn is_valid_topic(topic: &str) -> bool {
    let topic = topic.trim();
    !topic.is_empty() && !topic.contains(TOPIC_PLACEHOLDER)
}

/// Every device section of the store, in file order.
///
/// A malformed section yields an error for that entry only.
pub fn discover(store: &ConfigStore) -> Vec<Result<DeviceEntry, DeviceConfigError>> {
    let entries: Vec<_> = store
        .sections()
        .filter_map(|section| {
            DeviceKind::from_section(section.name())
                .map(|kind| DeviceEntry::from_section(kind, section))
        })
        .collect();

    check_global_counts(store);
    entries
}

/// Compare discovered sections against the counts in `[Global]`.
fn check_global_counts(store: &ConfigStore) {
    let Some(global) = store.section(GLOBAL_SECTION) else {
        return;
    };

    for kind in DeviceKind::ALL {
        let Some(expected) = global
            .get(kind.count_key())
            .and_then(|v| v.trim().parse::<usize>().ok())
        else {
            continue;
        };
        let found = store
            .sections()
            .filter(|s| kind.matches_section(s.name()))
            .count();
        if found != expected {
            tracing::warn!(
                kind = %kind,
                expected,
                found,
                "Device count in [Global] does not match the store sections"
            );
        }
    }
}

/// Entry for single-instance mode.
///
/// `section` is a section name, or a bare number standing for
/// `<prefix><number>` of `kind`.
pub fn entry_for(
    store: &ConfigStore,
    kind: &str,
    section: &str,
) -> Result<DeviceEntry, DeviceConfigError> {
    let kind =
        DeviceKind::from_cli_name(kind).ok_or_else(|| DeviceConfigError::UnknownKind(kind.to_string()))?;

    let name = if !section.is_empty() && section.chars().all(|c| c.is_ascii_digit()) {
        format!("{}{}", kind.section_prefix(), section)
    } else {
        section.to_string()
    };

    let found = store
        .section(&name)
        .ok_or_else(|| DeviceConfigError::MissingSection(name.clone()))?;

    if !kind.matches_section(found.name()) {
        return Err(DeviceConfigError::KindMismatch {
            section: found.name().to_string(),
            expected: kind,
        });
    }

    DeviceEntry::from_section(kind, found)
}

/// Broker settings from `[MQTT]`; the client id is the device serial.
pub fn broker_config(store: &ConfigStore, client_id: &str) -> BrokerConfig {
    let section = store.section(MQTT_SECTION);
    let get = |key: &str| {
        section
            .and_then(|s| s.get(key))
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    let port = match get("Port") {
        None => 1883,
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!(port = %raw, "Invalid MQTT port, using 1883");
            1883
        }),
    };

    BrokerConfig {
        host: get("BrokerAddress").unwrap_or("localhost").to_string(),
        port,
        username: get("Username").map(str::to_string),
        password: get("Password").map(str::to_string),
        client_id: client_id.to_string(),
    }
}

/// `LogLevel` from `[Global]`, if set.
pub fn store_log_level(store: &ConfigStore) -> Option<&str> {
    store
        .get(GLOBAL_SECTION, "LogLevel")
        .map(str::trim)
        .filter(|v| !v.is_empty())
}
