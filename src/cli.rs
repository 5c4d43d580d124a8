//! CLI argument parsing for flightstick

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "flightstick")]
#[command(author, version, about = "Bridges a flight stick to the active vessel over MQTT", long_about = None)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Name of the input device to bind, overrides the config file
    #[arg(short, long)]
    pub device: Option<String>,

    /// Print connected input devices and exit
    #[arg(long)]
    pub list_devices: bool,

    /// Log at debug level
    #[arg(short, long)]
    pub verbose: bool,
}
