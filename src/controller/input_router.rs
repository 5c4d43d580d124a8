//! Routes conditioned device input into the attribute store
//!
//! Bindings are plain configuration; the router owns no global tables.

use crate::config::DeviceConfig;
use crate::controller::calibration::{normalize, AxisFilter, Calibration};
use crate::sync::{AttributeStore, ControlValue, SyncError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info};

/// How a normalized axis value is turned into an attribute value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AxisMode {
    /// Stick axis, written as is in [-1, 1]
    #[default]
    Centered,
    /// Lever such as a throttle, written in [0, 1]
    Lever,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxisBinding {
    pub code: u32,
    pub attribute: String,
    #[serde(default)]
    pub mode: AxisMode,
    #[serde(default)]
    pub inverted: bool,
    #[serde(default)]
    pub calibration: Option<Calibration>,
}

impl AxisBinding {
    /// Attribute value for an already normalized axis position
    pub fn value_for(&self, normalized: f32) -> f32 {
        match self.mode {
            AxisMode::Centered if self.inverted => -normalized,
            AxisMode::Centered => normalized,
            AxisMode::Lever => {
                let lever = (normalized + 1.0) / 2.0;
                if self.inverted {
                    1.0 - lever
                } else {
                    lever
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ButtonBinding {
    /// Two-state switch driving a boolean attribute
    ///
    /// `presets` are written first on every change, e.g. a mode the boolean
    /// attribute depends on.
    Switch {
        code: u32,
        attribute: String,
        #[serde(default)]
        inverted: bool,
        #[serde(default)]
        presets: BTreeMap<String, ControlValue>,
    },
    /// Raises a one-shot command when pressed
    Command { code: u32, command: String },
}

impl ButtonBinding {
    pub fn code(&self) -> u32 {
        match self {
            ButtonBinding::Switch { code, .. } | ButtonBinding::Command { code, .. } => *code,
        }
    }
}

pub struct InputRouter {
    store: Arc<AttributeStore>,
    axes: HashMap<u32, AxisBinding>,
    buttons: HashMap<u32, ButtonBinding>,
    filter: AxisFilter,
    dead_band: f32,
}

impl InputRouter {
    pub fn new(config: &DeviceConfig, store: Arc<AttributeStore>) -> Self {
        debug!(
            "Creating input router with {} axis and {} button bindings",
            config.axes.len(),
            config.buttons.len()
        );

        Self {
            store,
            axes: config
                .axes
                .iter()
                .map(|binding| (binding.code, binding.clone()))
                .collect(),
            buttons: config
                .buttons
                .iter()
                .map(|binding| (binding.code(), binding.clone()))
                .collect(),
            filter: AxisFilter::new(config.dead_band),
            dead_band: config.dead_band,
        }
    }

    /// Feeds a raw axis sample through dead band, calibration and binding
    pub fn handle_axis(&mut self, code: u32, position: f32) -> Result<(), SyncError> {
        let Some(binding) = self.axes.get(&code) else {
            debug!("Ignoring unbound axis code {}", code);
            return Ok(());
        };

        if !self.filter.accept(code, position) {
            return Ok(());
        }

        let normalized = normalize(position, binding.calibration.as_ref(), self.dead_band);
        let value = binding.value_for(normalized);

        debug!("{}: {:.3}", binding.attribute, value);
        self.store.set(&binding.attribute, value)
    }

    pub fn handle_button(&mut self, code: u32, pressed: bool) -> Result<(), SyncError> {
        let Some(binding) = self.buttons.get(&code) else {
            debug!("Ignoring unbound button code {}", code);
            return Ok(());
        };

        match binding {
            ButtonBinding::Switch {
                attribute,
                inverted,
                presets,
                ..
            } => {
                for (name, value) in presets {
                    self.store.set(name, value.clone())?;
                }

                let engaged = pressed != *inverted;
                info!("{}: {}", attribute, if engaged { "on" } else { "off" });
                self.store.set(attribute, engaged)
            }
            ButtonBinding::Command { command, .. } => {
                if !pressed {
                    return Ok(());
                }

                info!("Command: {}", command);
                self.store.command(command)
            }
        }
    }
}
