//! On-disk configuration
//!
//! One TOML file with optional `[vocabulary]`, `[device]` and `[mqtt]`
//! sections. Missing fields fall back to the defaults below, a missing file
//! is written with those defaults.

use crate::controller::calibration::Calibration;
use crate::controller::input_router::{AxisBinding, AxisMode, ButtonBinding};
use crate::mqtt::config::MqttConfig;
use crate::sync::{ControlValue, Vocabulary};
use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const CONFIG_DIR: &str = "flightstick";
const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Binding for code {code} names unknown attribute '{name}'")]
    UnknownAttribute { code: u32, name: String },

    #[error("Binding for code {code} names unknown command '{name}'")]
    UnknownCommand { code: u32, name: String },

    #[error("Code {0} is bound more than once")]
    DuplicateCode(u32),

    #[error("Calibration of axis {code} needs min < 0 < max, got min {min} max {max}")]
    InvalidCalibration { code: u32, min: f32, max: f32 },

    #[error("Dead band must be in [0, 0.5), got {0}")]
    InvalidDeadBand(f32),
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub vocabulary: Vocabulary,
    pub device: DeviceConfig,
    pub mqtt: MqttConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Device to bind, the first connected one when unset
    pub name: Option<String>,
    pub dead_band: f32,
    pub poll_interval_ms: u64,
    pub axes: Vec<AxisBinding>,
    pub buttons: Vec<ButtonBinding>,
}

impl Default for DeviceConfig {
    // Linux evdev codes of a stick with a throttle lever
    fn default() -> Self {
        Self {
            name: None,
            dead_band: 0.02,
            poll_interval_ms: 1,
            axes: vec![
                AxisBinding {
                    code: 196608,
                    attribute: "roll".to_string(),
                    mode: AxisMode::Centered,
                    inverted: false,
                    calibration: Some(Calibration {
                        min: -0.6,
                        max: 0.6,
                        center: 0.011_749_626,
                    }),
                },
                AxisBinding {
                    code: 196609,
                    attribute: "pitch".to_string(),
                    mode: AxisMode::Centered,
                    inverted: false,
                    calibration: Some(Calibration {
                        min: -0.55,
                        max: 0.55,
                        center: -0.003_936_888,
                    }),
                },
                AxisBinding {
                    code: 196610,
                    attribute: "throttle".to_string(),
                    mode: AxisMode::Lever,
                    inverted: true,
                    calibration: Some(Calibration {
                        min: -0.55,
                        max: 0.55,
                        center: 0.027_436_14,
                    }),
                },
                AxisBinding {
                    code: 196612,
                    attribute: "yaw".to_string(),
                    mode: AxisMode::Centered,
                    inverted: false,
                    calibration: Some(Calibration {
                        min: -0.6,
                        max: 0.6,
                        center: 0.011_749_626,
                    }),
                },
            ],
            buttons: vec![
                ButtonBinding::Switch {
                    code: 65824,
                    attribute: "brakes".to_string(),
                    inverted: false,
                    presets: BTreeMap::new(),
                },
                ButtonBinding::Switch {
                    code: 65825,
                    attribute: "gear".to_string(),
                    inverted: false,
                    presets: BTreeMap::new(),
                },
                ButtonBinding::Command {
                    code: 65826,
                    command: "activate_next_stage".to_string(),
                },
                ButtonBinding::Switch {
                    code: 65827,
                    attribute: "sas".to_string(),
                    inverted: true,
                    presets: BTreeMap::from([(
                        "sas_mode".to_string(),
                        ControlValue::from("stability_assist"),
                    )]),
                },
            ],
        }
    }
}

impl Config {
    /// Checks bindings against the vocabulary and the numeric ranges
    pub fn validate(&self) -> Result<(), ConfigError> {
        let device = &self.device;

        if !(0.0..0.5).contains(&device.dead_band) {
            return Err(ConfigError::InvalidDeadBand(device.dead_band));
        }

        let mut axis_codes = HashSet::new();
        for axis in &device.axes {
            if !axis_codes.insert(axis.code) {
                return Err(ConfigError::DuplicateCode(axis.code));
            }
            self.check_attribute(axis.code, &axis.attribute)?;

            if let Some(calibration) = &axis.calibration {
                if !calibration.is_valid() {
                    return Err(ConfigError::InvalidCalibration {
                        code: axis.code,
                        min: calibration.min,
                        max: calibration.max,
                    });
                }
            }
        }

        let mut button_codes = HashSet::new();
        for button in &device.buttons {
            if !button_codes.insert(button.code()) {
                return Err(ConfigError::DuplicateCode(button.code()));
            }

            match button {
                ButtonBinding::Switch {
                    code,
                    attribute,
                    presets,
                    ..
                } => {
                    self.check_attribute(*code, attribute)?;
                    for name in presets.keys() {
                        self.check_attribute(*code, name)?;
                    }
                }
                ButtonBinding::Command { code, command } => {
                    if !self.vocabulary.has_command(command) {
                        return Err(ConfigError::UnknownCommand {
                            code: *code,
                            name: command.clone(),
                        });
                    }
                }
            }
        }

        debug!(
            "Configuration valid: {} axes, {} buttons",
            device.axes.len(),
            device.buttons.len()
        );
        Ok(())
    }

    fn check_attribute(&self, code: u32, name: &str) -> Result<(), ConfigError> {
        if self.vocabulary.has_attribute(name) {
            Ok(())
        } else {
            Err(ConfigError::UnknownAttribute {
                code,
                name: name.to_string(),
            })
        }
    }

    /// `<config_dir>/flightstick/config.toml`
    pub fn default_path() -> PathBuf {
        let mut path = dirs::config_dir().unwrap_or_else(|| {
            warn!("No config directory available, using the working directory");
            PathBuf::from(".")
        });
        path.push(CONFIG_DIR);
        path.push(CONFIG_FILE);
        path
    }

    /// Reads the file at `path`, writing the defaults there first if it is missing
    pub async fn load_or_create(path: &Path) -> Result<Self> {
        if !tokio::fs::try_exists(path)
            .await
            .map_err(|e| eyre!("Failed to check if config file exists: {}", e))?
        {
            info!("No config at {}, writing defaults", path.display());
            let config = Config::default();
            config.save(path).await?;
            return Ok(config);
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| eyre!("Failed to create config directory: {}", e))?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| eyre!("Failed to serialize config: {}", e))?;
        tokio::fs::write(path, content)
            .await
            .map_err(|e| eyre!("Failed to write config file {}: {}", path.display(), e))?;

        debug!("Saved config to {}", path.display());
        Ok(())
    }
}
