//! Configuration Module
//!
//! Loads and validates configuration from TOML files and `VOLZONE__*`
//! environment overrides.

pub mod loader;

pub use loader::{
    load_config, load_config_with_env, parse_config, Config, ConfigError, LoggingConfig, ENV_PREFIX,
};
