use std::fmt;
use std::sync::Arc;

use rumqttc::{Client, QoS};
use tracing::debug;

use super::mqtt_handler::Topics;
use crate::sync::{ControlSink, ControlValue, SinkError, TargetHandle};

/// The active vessel as announced on the active vessel topic
///
/// Two handles are the same vessel when their ids match, the client they
/// publish through is irrelevant.
#[derive(Clone)]
pub struct MqttVessel {
    id: String,
    client: Client,
    topics: Arc<Topics>,
}

impl MqttVessel {
    pub fn new(id: impl Into<String>, client: Client, topics: Arc<Topics>) -> Self {
        Self {
            id: id.into(),
            client,
            topics,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Debug for MqttVessel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MqttVessel").field("id", &self.id).finish()
    }
}

impl PartialEq for MqttVessel {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl TargetHandle for MqttVessel {
    type Sink = VesselControl;

    fn control_sink(&self) -> Result<Self::Sink, SinkError> {
        Ok(VesselControl {
            vessel: self.id.clone(),
            client: self.client.clone(),
            topics: self.topics.clone(),
        })
    }
}

/// Publishes control values and commands for one vessel
///
/// Publishing never blocks: a full request queue is reported as a failed
/// application and the value is retried on the next change.
pub struct VesselControl {
    vessel: String,
    client: Client,
    topics: Arc<Topics>,
}

impl ControlSink for VesselControl {
    fn set_attribute(&self, name: &str, value: &ControlValue) -> Result<(), SinkError> {
        let topic = self.topics.control(&self.vessel, name);
        debug!("Publishing {} = {}", topic, value);

        self.client
            .try_publish(topic, QoS::AtMostOnce, false, value.to_string())
            .map_err(|e| SinkError::ApplicationFailure {
                name: name.to_string(),
                reason: e.to_string(),
            })
    }

    fn invoke(&self, command: &str) -> Result<(), SinkError> {
        let topic = self.topics.command(&self.vessel, command);
        debug!("Publishing command {}", topic);

        self.client
            .try_publish(topic, QoS::AtLeastOnce, false, Vec::new())
            .map_err(|e| SinkError::ApplicationFailure {
                name: command.to_string(),
                reason: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rumqttc::MqttOptions;

    fn client() -> Client {
        let (client, _connection) = Client::new(MqttOptions::new("test", "localhost", 1883), 10);
        client
    }

    #[test]
    fn vessels_compare_by_id() {
        let topics = Arc::new(Topics::new("ksp"));
        let a = MqttVessel::new("kerbal-x", client(), topics.clone());
        let b = MqttVessel::new("kerbal-x", client(), topics.clone());
        let c = MqttVessel::new("mun-lander", client(), topics);

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(format!("{:?}", a), "MqttVessel { id: \"kerbal-x\" }");
    }

    #[test]
    fn closed_connection_is_an_application_failure() {
        let vessel = MqttVessel::new("kerbal-x", client(), Arc::new(Topics::new("ksp")));
        let sink = vessel.control_sink().unwrap();

        assert!(matches!(
            sink.set_attribute("gear", &ControlValue::Bool(true)),
            Err(SinkError::ApplicationFailure { name, .. }) if name == "gear"
        ));
        assert!(matches!(
            sink.invoke("activate_next_stage"),
            Err(SinkError::ApplicationFailure { name, .. }) if name == "activate_next_stage"
        ));
    }
}
