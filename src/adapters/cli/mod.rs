//! CLI Adapter
//!
//! Command-line interface for volzone.
//! Uses clap derive macros for argument parsing.

mod commands;

pub use commands::{
    CliApp, Command, ForecastCmd, InitConfigCmd, OutputFormat, RunCmd, ZonesCmd, DEFAULT_CONFIG_PATH,
};
