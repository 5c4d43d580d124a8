pub mod cli;
pub mod config;
pub mod controller;
pub mod mqtt;
pub mod sync;

use crate::cli::Cli;
use crate::config::Config;
use crate::controller::{list_devices, CollectorSettings, ControllerHandle, InputRouter};
use crate::mqtt::{MqttRemote, MqttVessel};
use crate::sync::Coordinator;
use clap::Parser;
use color_eyre::{eyre::eyre, Result};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup(cli.verbose)?;

    if cli.list_devices {
        return print_devices();
    }

    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let mut config = Config::load_or_create(&config_path).await?;
    if let Some(device) = cli.device {
        config.device.name = Some(device);
    }
    config
        .validate()
        .map_err(|e| eyre!("Invalid config {}: {}", config_path.display(), e))?;
    debug!("Effective config: {:?}", config);

    let cancel = CancellationToken::new();

    // Remote side
    let (remote, event_loop) = MqttRemote::connect(&config.mqtt);
    remote
        .watch_scene()
        .map_err(|e| eyre!("Failed to watch scene: {}", e))?;

    let coordinator = Coordinator::<MqttVessel>::spawn(&config.vocabulary, remote)
        .map_err(|e| eyre!("Failed to start coordinator: {}", e))?;

    let pending = coordinator.pending();
    let mqtt_cancel = cancel.clone();
    let _mqtt_thread = std::thread::Builder::new()
        .name("mqtt-events".to_string())
        .spawn(move || event_loop.run(pending, mqtt_cancel))
        .map_err(|e| eyre!("Failed to spawn MQTT event thread: {}", e))?;

    // Device side
    let router = InputRouter::new(&config.device, coordinator.store());
    let settings = CollectorSettings {
        device_name: config.device.name.clone(),
        poll_interval_ms: config.device.poll_interval_ms,
    };
    let controller = ControllerHandle::spawn(settings, router, cancel.clone())
        .await
        .map_err(|e| eyre!("Failed to spawn controller: {}", e))?;

    info!("flightstick running, press Ctrl-C to stop");

    let result = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.map_err(|e| eyre!("Failed to listen for Ctrl-C: {}", e))?;
            info!("Ctrl-C received, shutting down");
            Ok(())
        }
        stopped = controller.wait() => {
            stopped.map_err(|e| {
                error!("Device reader stopped: {}", e);
                eyre!("Device reader stopped: {}", e)
            })
        }
    };

    cancel.cancel();
    result
}

fn print_devices() -> Result<()> {
    let devices = list_devices().map_err(|e| eyre!("Failed to list devices: {}", e))?;

    if devices.is_empty() {
        println!("No input devices connected");
    }
    for device in devices {
        println!("{}  {}", device.uuid, device.name);
    }

    Ok(())
}

fn setup(verbose: bool) -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    setup_logging_env(if verbose { Level::DEBUG } else { Level::INFO });
    Ok(())
}

fn setup_logging_env(level: Level) {
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}
