use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rumqttc::{Client, Connection, ConnectionError, Event, MqttOptions, Packet, QoS, RecvTimeoutError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::config::MqttConfig;
use super::vessel::MqttVessel;
use crate::sync::{PendingInputQueue, SinkError, TargetSource};

const REQUEST_CAPACITY: usize = 100;
const POLL_TIMEOUT: Duration = Duration::from_millis(100);
const FLIGHT_SCENE: &str = "flight";

type VesselRoute = Arc<Mutex<Option<Arc<PendingInputQueue<MqttVessel>>>>>;

#[derive(Clone, Default, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

/// Which of the watched topics a message arrived on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicKind {
    Scene,
    ActiveVessel,
}

/// Topic layout below a common prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    prefix: String,
}

impl Topics {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn scene(&self) -> String {
        format!("{}/scene", self.prefix)
    }

    pub fn active_vessel(&self) -> String {
        format!("{}/active_vessel", self.prefix)
    }

    pub fn control(&self, vessel: &str, attribute: &str) -> String {
        format!("{}/vessel/{}/control/{}", self.prefix, vessel, attribute)
    }

    pub fn command(&self, vessel: &str, command: &str) -> String {
        format!("{}/vessel/{}/command/{}", self.prefix, vessel, command)
    }

    pub fn classify(&self, topic: &str) -> Option<TopicKind> {
        let rest = topic.strip_prefix(&self.prefix)?.strip_prefix('/')?;
        match rest {
            "scene" => Some(TopicKind::Scene),
            "active_vessel" => Some(TopicKind::ActiveVessel),
            _ => None,
        }
    }
}

/// `true` when the reported scene is the flight scene
pub fn parse_scene(payload: &[u8]) -> bool {
    String::from_utf8_lossy(payload).trim() == FLIGHT_SCENE
}

/// Vessel id from an active vessel message, `None` for no vessel
pub fn parse_vessel_id(payload: &[u8]) -> Option<String> {
    let id = String::from_utf8_lossy(payload).trim().to_string();
    if id.is_empty() || id == "none" {
        None
    } else {
        Some(id)
    }
}

/// Client side of the broker connection
///
/// Handed to the coordinator as its target source; subscriptions are made
/// from the coordinator thread only.
pub struct MqttRemote {
    client: Client,
    topics: Arc<Topics>,
    route: VesselRoute,
}

impl MqttRemote {
    pub fn connect(config: &MqttConfig) -> (Self, MqttEventLoop) {
        info!(
            "Connecting to MQTT broker {}:{} as {}",
            config.host, config.port, config.client_id
        );

        let mut mqtt_options = MqttOptions::new(&config.client_id, &config.host, config.port);
        mqtt_options
            .set_keep_alive(config.keep_alive())
            .set_clean_session(false);

        let (client, connection) = Client::new(mqtt_options, REQUEST_CAPACITY);
        let topics = Arc::new(Topics::new(&config.topic_prefix));
        let route: VesselRoute = Arc::new(Mutex::new(None));

        let event_loop = MqttEventLoop {
            connection,
            client: client.clone(),
            topics: topics.clone(),
            route: route.clone(),
            reconnect_delay: config.reconnect_delay(),
            state: ConnectionState::default(),
        };

        (
            Self {
                client,
                topics,
                route,
            },
            event_loop,
        )
    }

    /// Subscribes to scene changes, which drive the flight state
    pub fn watch_scene(&self) -> Result<(), SinkError> {
        let topic = self.topics.scene();
        debug!("Subscribing to {}", topic);

        self.client
            .subscribe(topic, QoS::AtLeastOnce)
            .map_err(|e| SinkError::SubscriptionFailure(e.to_string()))
    }
}

impl TargetSource<MqttVessel> for MqttRemote {
    type Subscription = VesselSubscription;

    fn subscribe(
        &mut self,
        pending: Arc<PendingInputQueue<MqttVessel>>,
    ) -> Result<Self::Subscription, SinkError> {
        let topic = self.topics.active_vessel();
        debug!("Subscribing to {}", topic);

        *self.route.lock() = Some(pending);

        if let Err(e) = self.client.subscribe(topic.clone(), QoS::AtLeastOnce) {
            *self.route.lock() = None;
            return Err(SinkError::SubscriptionFailure(e.to_string()));
        }

        Ok(VesselSubscription {
            client: self.client.clone(),
            topic,
            route: self.route.clone(),
        })
    }
}

/// Routes active vessel messages into the coordinator while alive
pub struct VesselSubscription {
    client: Client,
    topic: String,
    route: VesselRoute,
}

impl Drop for VesselSubscription {
    fn drop(&mut self) {
        *self.route.lock() = None;

        debug!("Unsubscribing from {}", self.topic);
        if let Err(e) = self.client.try_unsubscribe(self.topic.clone()) {
            warn!("Failed to unsubscribe from {}: {}", self.topic, e);
        }
    }
}

/// Owns the broker connection and turns notifications into pending input
pub struct MqttEventLoop {
    connection: Connection,
    client: Client,
    topics: Arc<Topics>,
    route: VesselRoute,
    reconnect_delay: Duration,
    state: ConnectionState,
}

impl MqttEventLoop {
    /// Polls the connection until cancelled, meant for a dedicated thread
    pub fn run(mut self, scene: Arc<PendingInputQueue<MqttVessel>>, cancel: CancellationToken) {
        info!("Starting MQTT event loop");
        self.set_state(ConnectionState::Connecting);

        while !cancel.is_cancelled() {
            match self.connection.recv_timeout(POLL_TIMEOUT) {
                Ok(Ok(event)) => self.handle_event(event, &scene),
                Ok(Err(e)) => self.handle_error(e),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    error!("MQTT request channel closed, stopping event loop");
                    break;
                }
            }
        }

        self.set_state(ConnectionState::Disconnected);
        info!("MQTT event loop stopped");
    }

    fn handle_event(&mut self, event: Event, scene: &PendingInputQueue<MqttVessel>) {
        match event {
            Event::Incoming(Packet::ConnAck(ack)) => {
                self.set_state(ConnectionState::Connected);
                if !ack.session_present {
                    self.restore_subscriptions();
                }
            }
            Event::Incoming(Packet::Publish(publish)) => match self.topics.classify(&publish.topic) {
                Some(TopicKind::Scene) => {
                    let flying = parse_scene(&publish.payload);
                    debug!("Scene update, flying: {}", flying);
                    scene.enqueue_flying(flying);
                }
                Some(TopicKind::ActiveVessel) => {
                    let route = self.route.lock();
                    let Some(pending) = route.as_ref() else {
                        debug!("Ignoring active vessel update without a subscription");
                        return;
                    };

                    let vessel = parse_vessel_id(&publish.payload)
                        .map(|id| MqttVessel::new(id, self.client.clone(), self.topics.clone()));
                    debug!("Active vessel update: {:?}", vessel);
                    pending.enqueue_target(vessel);
                }
                None => debug!("Ignoring message on {}", publish.topic),
            },
            other => debug!("MQTT event: {:?}", other),
        }
    }

    // A fresh broker session lost our subscriptions
    fn restore_subscriptions(&self) {
        let mut topics = vec![self.topics.scene()];
        if self.route.lock().is_some() {
            topics.push(self.topics.active_vessel());
        }

        for topic in topics {
            debug!("Restoring subscription {}", topic);
            if let Err(e) = self.client.try_subscribe(topic.clone(), QoS::AtLeastOnce) {
                warn!("Failed to restore subscription {}: {}", topic, e);
            }
        }
    }

    fn handle_error(&mut self, e: ConnectionError) {
        warn!(
            "MQTT connection error: {}, retrying in {:?}",
            e, self.reconnect_delay
        );
        self.set_state(ConnectionState::Reconnecting);
        std::thread::sleep(self.reconnect_delay);
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state != state {
            info!("MQTT connection: {:?} -> {:?}", self.state, state);
            self.state = state;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::WakeGate;

    #[test]
    fn topics_are_built_below_prefix() {
        let topics = Topics::new("ksp/");

        assert_eq!(topics.scene(), "ksp/scene");
        assert_eq!(topics.active_vessel(), "ksp/active_vessel");
        assert_eq!(topics.control("kx", "gear"), "ksp/vessel/kx/control/gear");
        assert_eq!(
            topics.command("kx", "activate_next_stage"),
            "ksp/vessel/kx/command/activate_next_stage"
        );
    }

    #[test]
    fn only_watched_topics_are_classified() {
        let topics = Topics::new("ksp");

        assert_eq!(topics.classify("ksp/scene"), Some(TopicKind::Scene));
        assert_eq!(
            topics.classify("ksp/active_vessel"),
            Some(TopicKind::ActiveVessel)
        );
        assert_eq!(topics.classify("ksp/vessel/kx/control/gear"), None);
        assert_eq!(topics.classify("kspscene"), None);
        assert_eq!(topics.classify("other/scene"), None);
    }

    #[test]
    fn flight_scene_means_flying() {
        assert!(parse_scene(b"flight"));
        assert!(parse_scene(b" flight\n"));
        assert!(!parse_scene(b"space_center"));
        assert!(!parse_scene(b""));
    }

    #[test]
    fn empty_or_none_vessel_is_no_target() {
        assert_eq!(parse_vessel_id(b"kerbal-x"), Some("kerbal-x".to_string()));
        assert_eq!(parse_vessel_id(b""), None);
        assert_eq!(parse_vessel_id(b"none"), None);
        assert_eq!(parse_vessel_id(b"  "), None);
    }

    #[test]
    fn vessel_messages_route_only_while_subscribed() {
        let (mut remote, mut event_loop) = MqttRemote::connect(&MqttConfig::default());
        let gate = Arc::new(WakeGate::new());
        let pending = Arc::new(PendingInputQueue::new(gate));

        let publish = |id: &str| {
            Event::Incoming(Packet::Publish(rumqttc::Publish::new(
                "ksp/active_vessel",
                QoS::AtLeastOnce,
                id.to_string(),
            )))
        };

        event_loop.handle_event(publish("kerbal-x"), &pending);
        assert_eq!(pending.lock().take_target(), None);

        let subscription = remote.subscribe(pending.clone()).unwrap();
        event_loop.handle_event(publish("kerbal-x"), &pending);
        let target = pending.lock().take_target().flatten();
        assert_eq!(target.as_ref().map(MqttVessel::id), Some("kerbal-x"));

        drop(subscription);
        event_loop.handle_event(publish("mun-lander"), &pending);
        assert_eq!(pending.lock().take_target(), None);
    }

    #[test]
    fn scene_messages_set_flying() {
        let (_remote, mut event_loop) = MqttRemote::connect(&MqttConfig::default());
        let pending = Arc::new(PendingInputQueue::new(Arc::new(WakeGate::new())));

        event_loop.handle_event(
            Event::Incoming(Packet::Publish(rumqttc::Publish::new(
                "ksp/scene",
                QoS::AtLeastOnce,
                "flight",
            ))),
            &pending,
        );

        assert_eq!(pending.lock().take_flying(), Some(true));
    }
}
