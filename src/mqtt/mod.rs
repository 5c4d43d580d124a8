//! # MQTT Remote Module
//!
//! Connects the coordinator to the game through a broker. The game side
//! publishes the current scene and active vessel; control values and
//! commands are published back per vessel.
//!
//! ```text
//! mqtt/
//! ├── config.rs        - broker settings and defaults
//! ├── mqtt_handler.rs  - topics, connection event loop, vessel subscription
//! └── vessel.rs        - vessel handle and its publishing control sink
//! ```
//!
//! ## Topics
//!
//! | Topic                              | Direction | Payload               |
//! |------------------------------------|-----------|-----------------------|
//! | `<prefix>/scene`                   | in        | scene name            |
//! | `<prefix>/active_vessel`           | in        | vessel id or `none`   |
//! | `<prefix>/vessel/<id>/control/<a>` | out       | attribute value       |
//! | `<prefix>/vessel/<id>/command/<c>` | out       | empty                 |
//!
//! The event loop thread only reads the connection and never issues
//! blocking client requests.

pub mod config;
pub mod mqtt_handler;
pub mod vessel;

pub use config::MqttConfig;
pub use mqtt_handler::{MqttEventLoop, MqttRemote};
pub use vessel::MqttVessel;
