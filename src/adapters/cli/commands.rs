//! CLI Commands
//!
//! Argument definitions for the volzone binary.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// volzone - volatility zones, session bias and order-flow confirmed signals
#[derive(Parser, Debug)]
#[command(
    name = "volzone",
    version = env!("CARGO_PKG_VERSION"),
    about = "Intraday signal engine: volatility zones, opening range bias and order-flow gating",
    long_about = "volzone forecasts the daily move with GARCH-family models, lays a support/resistance \
                  ladder around the session open and emits breakout, rejection and imbalance signals \
                  once volume profile and live order flow agree."
)]
pub struct CliApp {
    /// The command to execute
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the evaluation loop (paper gateway)
    Run(RunCmd),

    /// Forecast today's move and print the zone map for an instrument
    Forecast(ForecastCmd),

    /// Print a zone ladder from an explicit open and move
    Zones(ZonesCmd),

    /// Write the default configuration to a file
    InitConfig(InitConfigCmd),
}

impl Command {
    /// Configuration file the command reads, if any
    pub fn config_path(&self) -> Option<&Path> {
        match self {
            Command::Run(cmd) => Some(&cmd.config),
            Command::Forecast(cmd) => Some(&cmd.config),
            Command::Zones(_) | Command::InitConfig(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Start evaluation loop
#[derive(Parser, Debug)]
pub struct RunCmd {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Override the configured instruments (repeatable)
    #[arg(short, long = "instrument", value_name = "SYMBOL")]
    pub instruments: Vec<String>,

    /// Run a single tick for every instrument and exit
    #[arg(long)]
    pub once: bool,
}

/// Daily forecast
#[derive(Parser, Debug)]
pub struct ForecastCmd {
    /// Instrument symbol (e.g., BTCUSDT)
    #[arg(value_name = "SYMBOL")]
    pub instrument: String,

    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

/// Offline zone ladder
#[derive(Parser, Debug)]
pub struct ZonesCmd {
    /// Reference open price
    #[arg(long, value_name = "PRICE")]
    pub open: f64,

    /// Expected move as a fraction (0.02 = 2%)
    #[arg(long, value_name = "FRACTION")]
    pub pct: f64,

    /// Levels between the open and each bound
    #[arg(short, long, value_name = "N", default_value = "4")]
    pub subdivisions: usize,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

/// Write defaults
#[derive(Parser, Debug)]
pub struct InitConfigCmd {
    /// Destination file
    #[arg(short, long, value_name = "FILE", default_value = DEFAULT_CONFIG_PATH)]
    pub output: PathBuf,

    /// Overwrite an existing file
    #[arg(long)]
    pub force: bool,
}
