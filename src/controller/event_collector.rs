use crate::controller::input_router::InputRouter;
use crate::sync::SyncError;
use chrono::Local;
use gilrs::{Event, EventType, Gamepad, GamepadId, Gilrs};
use statum::{machine, state};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

// Collector settings
#[derive(Clone, Debug)]
pub struct CollectorSettings {
    pub device_name: Option<String>,
    pub poll_interval_ms: u64,
}

impl Default for CollectorSettings {
    fn default() -> Self {
        Self {
            device_name: None,
            poll_interval_ms: 1,
        }
    }
}

// Collector errors
#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    #[error("Failed to initialize collector: {0}")]
    InitializationError(String),

    #[error("No gamepad connected: {0}")]
    NoGamepadError(String),

    #[error("Input binding rejected: {0}")]
    BindingError(#[from] SyncError),
}

/// Connected device as shown by `--list-devices`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceInfo {
    pub name: String,
    pub uuid: String,
}

// Define collector states using statum's state macro
#[state]
#[derive(Debug, Clone)]
pub enum CollectionState {
    Initializing,
    Collecting,
}

#[machine]
pub struct EventCollector<S: CollectionState> {
    // Gilrs context
    gilrs: Gilrs,

    // Device whose events are routed, all others are ignored
    active_gamepad: Option<GamepadId>,

    settings: CollectorSettings,

    // Turns samples into attribute writes
    router: InputRouter,
}

// Implementation for Initializing state
impl EventCollector<Initializing> {
    pub fn create(
        settings: Option<CollectorSettings>,
        router: InputRouter,
    ) -> Result<Self, CollectorError> {
        let settings = settings.unwrap_or_default();
        debug!("Creating Event Collector with settings: {:?}", settings);

        info!("Initializing gilrs controller interface");
        let gilrs = open_gilrs()?;

        Ok(Self::new(gilrs, None, settings, router))
    }

    /// Selects the configured device, replays its current state and starts collecting
    pub fn initialize(mut self) -> Result<EventCollector<Collecting>, CollectorError> {
        let gamepads: Vec<(GamepadId, Gamepad<'_>)> = self.gilrs.gamepads().collect();

        if gamepads.is_empty() {
            return Err(CollectorError::NoGamepadError(
                "no input device is connected".to_string(),
            ));
        }

        info!("Found {} gamepads:", gamepads.len());
        for (idx, (id, gamepad)) in gamepads.iter().enumerate() {
            info!("  [{}] ID: {}, Name: {}", idx, id, gamepad.name());
        }

        let selected = match &self.settings.device_name {
            Some(wanted) => gamepads
                .iter()
                .find(|(_, gamepad)| gamepad.name() == wanted)
                .map(|(id, _)| *id)
                .ok_or_else(|| CollectorError::NoGamepadError(wanted.clone()))?,
            None => {
                warn!("No device name configured, using the first connected device");
                gamepads[0].0
            }
        };

        info!("Selected gamepad: {} ({})", self.gilrs.gamepad(selected).name(), selected);
        self.active_gamepad = Some(selected);
        self.sync_device(selected)?;

        info!("Event Collector initialized, transitioning to Collecting state");
        Ok(self.transition())
    }

    // Push the resting state of every input so all bound attributes are defined
    fn sync_device(&mut self, id: GamepadId) -> Result<(), CollectorError> {
        // gilrs only updates the cached state while events are drained
        while self.gilrs.next_event().is_some() {}

        let state = self.gilrs.gamepad(id).state().clone();

        let mut axes: Vec<(u32, f32)> = state
            .axes()
            .map(|(code, data)| (code.into_u32(), data.value()))
            .collect();
        axes.sort_by_key(|(code, _)| *code);

        let mut buttons: Vec<(u32, bool)> = state
            .buttons()
            .map(|(code, data)| (code.into_u32(), data.is_pressed()))
            .collect();
        buttons.sort_by_key(|(code, _)| *code);

        debug!(
            "Syncing {} axes and {} buttons from device",
            axes.len(),
            buttons.len()
        );

        for (code, value) in axes {
            self.router.handle_axis(code, value)?;
        }
        for (code, pressed) in buttons {
            self.router.handle_button(code, pressed)?;
        }

        Ok(())
    }
}

// Implementation for Controller in Collecting state
impl EventCollector<Collecting> {
    /// Drains all queued gilrs events, returns how many were routed
    pub fn collect_events(&mut self) -> Result<usize, CollectorError> {
        let mut routed = 0;

        while let Some(Event { id, event, .. }) = self.gilrs.next_event() {
            if let Some(active_id) = self.active_gamepad {
                if id != active_id {
                    debug!("Skipping event from non-active gamepad: {:?}", id);
                    continue;
                }
            }

            match event {
                EventType::AxisChanged(axis, value, code) => {
                    debug!("Axis changed: {:?} ({}) = {:.4}", axis, code, value);
                    self.router.handle_axis(code.into_u32(), value)?;
                }
                EventType::ButtonPressed(button, code) => {
                    debug!("Button pressed: {:?} ({})", button, code);
                    self.router.handle_button(code.into_u32(), true)?;
                }
                EventType::ButtonReleased(button, code) => {
                    debug!("Button released: {:?} ({})", button, code);
                    self.router.handle_button(code.into_u32(), false)?;
                }
                EventType::Connected => {
                    info!("Controller connected event detected");
                }
                EventType::Disconnected => {
                    warn!("Controller disconnected, inputs hold their last value");
                }
                _ => {
                    debug!("Unhandled event type: {:?}", event);
                    continue;
                }
            }

            routed += 1;
        }

        Ok(routed)
    }

    // Run the collector until cancelled
    pub fn run_collection_loop(&mut self, cancel: &CancellationToken) -> Result<(), CollectorError> {
        info!("Starting Event Collector loop");

        let poll_interval = Duration::from_millis(self.settings.poll_interval_ms.max(1));
        let mut event_count = 0;
        let mut last_log_time = Local::now();
        let log_interval = chrono::Duration::seconds(10);

        while !cancel.is_cancelled() {
            match self.collect_events() {
                Ok(routed) => event_count += routed,
                Err(e) => {
                    error!("Stopping Event Collector: {}", e);
                    return Err(e);
                }
            }

            let now = Local::now();
            if now - last_log_time > log_interval {
                debug!(
                    "Event Collector stats: routed {} events in last {} seconds (avg {:.2}/sec)",
                    event_count,
                    log_interval.num_seconds(),
                    event_count as f64 / log_interval.num_seconds() as f64
                );
                event_count = 0;
                last_log_time = now;
            }

            std::thread::sleep(poll_interval);
        }

        info!("Event Collector cancelled");
        Ok(())
    }
}

/// Names and UUIDs of every connected device
pub fn list_devices() -> Result<Vec<DeviceInfo>, CollectorError> {
    let gilrs = open_gilrs()?;

    Ok(gilrs
        .gamepads()
        .map(|(_, gamepad)| DeviceInfo {
            name: gamepad.name().to_string(),
            uuid: gamepad
                .uuid()
                .iter()
                .map(|byte| format!("{:02x}", byte))
                .collect(),
        })
        .collect())
}

fn open_gilrs() -> Result<Gilrs, CollectorError> {
    match Gilrs::new() {
        Ok(g) => {
            debug!("Successfully initialized gilrs");
            Ok(g)
        }
        Err(e) => {
            error!("Failed to initialize gilrs: {}", e);
            Err(CollectorError::InitializationError(e.to_string()))
        }
    }
}
