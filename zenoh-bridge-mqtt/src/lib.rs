//! Zenoh bridge for MQTT-driven virtual devices.
//!
//! Each device configured in the store is exposed on the object bus as a
//! Venus service and kept in sync with its MQTT topics.
//!
//! # Key Expressions
//!
//! ```text
//! venus/com.victronenergy.<class>.virtual_<serial>/<path>          property values
//! venus/com.victronenergy.<class>.virtual_<serial>/@/set/<path>    write requests
//! venus/com.victronenergy.<class>.virtual_<serial>/@/status        instance status
//! venus/com.victronenergy.<class>.virtual_<serial>/@/alive         liveliness token
//! ```
//!
//! Where:
//! - `<class>` - `switch`, `digitalinput`, `temperature`, `tank`, `battery` or `solarcharger`
//! - `<serial>` - Device serial from the store
//! - `<path>` - Property path without its leading slash, e.g. `Dc/0/Voltage`

pub mod codec;
pub mod config;
pub mod devices;
pub mod effect;
pub mod instance;
pub mod registry;
pub mod supervisor;
pub mod tree;
