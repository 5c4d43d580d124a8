use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Broker connection and topic layout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    /// First topic level of every topic the bridge uses
    pub topic_prefix: String,
    pub keep_alive_secs: u64,
    pub reconnect_delay_ms: u64,
}

impl MqttConfig {
    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            client_id: "flightstick".to_string(),
            topic_prefix: "ksp".to_string(),
            keep_alive_secs: 5,
            reconnect_delay_ms: 1000,
        }
    }
}
