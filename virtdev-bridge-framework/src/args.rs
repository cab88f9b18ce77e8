//! CLI argument parsing for the bridge.

use std::path::PathBuf;

use clap::Parser;

/// Default location of the device store written by the configuration wizard.
pub const DEFAULT_STORE_PATH: &str = "/data/setupOptions/venus-os_virtual-devices/optionsSet";

/// Command line of the bridge.
///
/// Without positional arguments the bridge runs in launcher mode and starts
/// every configured device. With `<KIND> <SECTION>` it runs that single
/// device section.
#[derive(Parser, Debug, Clone)]
#[command(about = "Bridges MQTT devices onto the local object bus")]
pub struct BridgeArgs {
    /// Path to runtime settings (JSON5). Defaults apply when omitted.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Path to the device store (INI). Overrides the runtime settings.
    #[arg(short, long)]
    pub store: Option<PathBuf>,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Device kind to run on its own (switch, digital_input, temp_sensor,
    /// tank_sensor, battery, pv_charger).
    #[arg(requires = "section")]
    pub kind: Option<String>,

    /// Store section of the device to run on its own.
    pub section: Option<String>,
}

impl BridgeArgs {
    /// Parse CLI arguments from the process environment.
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }

    /// The `(kind, section)` pair when running a single instance.
    pub fn single_instance(&self) -> Option<(&str, &str)> {
        match (&self.kind, &self.section) {
            (Some(kind), Some(section)) => Some((kind.as_str(), section.as_str())),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_launcher_mode() {
        let args = BridgeArgs::try_parse_from(["zenoh-bridge-mqtt"]).unwrap();
        assert!(args.config.is_none());
        assert!(args.store.is_none());
        assert!(args.single_instance().is_none());
    }

    #[test]
    fn test_single_instance_mode() {
        let args = BridgeArgs::try_parse_from([
            "zenoh-bridge-mqtt",
            "--store",
            "/tmp/optionsSet",
            "--log-level",
            "debug",
            "tank_sensor",
            "Tank_Sensor_1",
        ])
        .unwrap();

        assert_eq!(args.store, Some(PathBuf::from("/tmp/optionsSet")));
        assert_eq!(args.log_level.as_deref(), Some("debug"));
        assert_eq!(
            args.single_instance(),
            Some(("tank_sensor", "Tank_Sensor_1"))
        );
    }

    #[test]
    fn test_kind_requires_section() {
        assert!(BridgeArgs::try_parse_from(["zenoh-bridge-mqtt", "battery"]).is_err());
    }
}
