//! Configuration Loader
//!
//! Layers a TOML file with `VOLZONE__SECTION__KEY` environment overrides,
//! deserializes the result and validates every section.

use std::collections::HashMap;
use std::path::Path;

use ::config::{Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::adapters::binance::{BinanceConfig, DEPTH_LIMITS};
use crate::application::{MutationConfig, OrchestratorConfig};
use crate::strategy::{
    DecisionConfig, EngineConfig, ImbalanceConfig, OpeningRangeConfig, OrderFlowConfig,
    ProfileConfig, VolatilityConfig, ZoneConfig,
};

/// Prefix of environment overrides
pub const ENV_PREFIX: &str = "VOLZONE";

/// Complete application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Instruments and tick scheduling
    pub engine: OrchestratorConfig,
    /// Volatility forecaster
    pub volatility: VolatilityConfig,
    /// Zone ladder
    pub zones: ZoneConfig,
    /// Opening range tracker
    pub opening_range: OpeningRangeConfig,
    /// Volume profile classifier
    pub profile: ProfileConfig,
    /// Imbalance detector
    pub imbalance: ImbalanceConfig,
    /// Order-flow gate
    pub order_flow: OrderFlowConfig,
    /// Decision engine
    pub decision: DecisionConfig,
    /// Protective level mutation throttling
    pub mutation: MutationConfig,
    /// Binance REST endpoints
    pub market_data: BinanceConfig,
    /// Logging settings
    pub logging: LoggingConfig,
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when neither RUST_LOG nor --verbose/--debug is set
    pub level: String,
    /// Emit JSON lines instead of the human-readable format
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            json: false,
        }
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Load error: {0}")]
    LoadError(#[from] ::config::ConfigError),

    #[error("Serialize error: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// Load configuration from a TOML file, with environment overrides
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    load_config_with_env(path, None)
}

/// Same as `load_config`, with the environment replaced by `env` when given
pub fn load_config_with_env<P: AsRef<Path>>(
    path: P,
    env: Option<HashMap<String, String>>,
) -> Result<Config, ConfigError> {
    let expanded = shellexpand::tilde(&path.as_ref().to_string_lossy()).to_string();
    let path = Path::new(&expanded);
    // Surface a missing file as IO rather than a config-crate message
    std::fs::metadata(path)?;

    let config: Config = ::config::Config::builder()
        .add_source(File::from(path).format(FileFormat::Toml))
        .add_source(environment(env))
        .build()?
        .try_deserialize()?;

    config.validate()?;
    Ok(config)
}

/// Parse configuration from TOML text, without environment overrides
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let config: Config = ::config::Config::builder()
        .add_source(File::from_str(content, FileFormat::Toml))
        .build()?
        .try_deserialize()?;

    config.validate()?;
    Ok(config)
}

fn environment(source: Option<HashMap<String, String>>) -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .separator("__")
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("engine.instruments")
        .source(source)
}

impl Config {
    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.engine
            .validate()
            .map_err(|e| ConfigError::ValidationError(format!("engine: {}", e)))?;

        EngineConfig::from(self)
            .validate()
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;

        self.mutation
            .validate()
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;

        // The order-flow sample has to fit inside a tick
        let flow_deadline = self.order_flow.window_ms + self.order_flow.timeout_grace_ms;
        if flow_deadline >= self.engine.tick_deadline_ms {
            return Err(ConfigError::ValidationError(format!(
                "order_flow window + grace ({} ms) must be below engine.tick_deadline_ms ({} ms)",
                flow_deadline, self.engine.tick_deadline_ms
            )));
        }

        // Validate market data
        if !(self.market_data.base_url.starts_with("http://")
            || self.market_data.base_url.starts_with("https://"))
        {
            return Err(ConfigError::ValidationError(format!(
                "market_data.base_url must be an http(s) URL, got '{}'",
                self.market_data.base_url
            )));
        }
        if self.market_data.request_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "market_data.request_timeout_ms must be > 0".to_string(),
            ));
        }
        if !DEPTH_LIMITS.contains(&self.market_data.depth_limit) {
            return Err(ConfigError::ValidationError(format!(
                "market_data.depth_limit must be one of {:?}, got {}",
                DEPTH_LIMITS, self.market_data.depth_limit
            )));
        }

        // Validate logging
        let level = self.logging.level.to_lowercase();
        if !["trace", "debug", "info", "warn", "error"].contains(&level.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "logging.level must be trace/debug/info/warn/error, got '{}'",
                self.logging.level
            )));
        }

        Ok(())
    }

    /// Render as TOML, e.g. for `volzone init-config`
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

impl From<&Config> for EngineConfig {
    fn from(config: &Config) -> Self {
        Self {
            volatility: config.volatility.clone(),
            zones: config.zones.clone(),
            opening_range: config.opening_range.clone(),
            profile: config.profile.clone(),
            imbalance: config.imbalance.clone(),
            order_flow: config.order_flow.clone(),
            decision: config.decision.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::CandleInterval;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_valid_config() -> &'static str {
        r#"
[engine]
instruments = ["BTCUSDT", "ETHUSDT"]
intraday_interval = "5m"
intraday_count = 120
poll_interval_ms = 30000
tick_deadline_ms = 15000
session_open_hour_utc = 13

[volatility]
horizon = 3
lookback_days = 90

[zones]
subdivisions = 6

[order_flow]
window_ms = 6000

[decision]
acceptance_threshold = 0.5

[market_data]
base_url = "https://api.binance.com"
depth_limit = 50

[logging]
level = "info"
"#
    }

    fn write_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_valid_config() {
        let file = write_config(create_valid_config());
        let config = load_config_with_env(file.path(), Some(HashMap::new())).unwrap();

        assert_eq!(config.engine.instruments, vec!["BTCUSDT", "ETHUSDT"]);
        assert_eq!(config.engine.intraday_interval, CandleInterval::FiveMinutes);
        assert_eq!(config.engine.session_open_hour_utc, 13);
        assert_eq!(config.volatility.horizon, 3);
        assert_eq!(config.zones.subdivisions, 6);
        assert_eq!(config.market_data.depth_limit, 50);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_missing_sections_use_defaults() {
        let config = parse_config("[zones]\nsubdivisions = 8\n").unwrap();
        assert_eq!(config.zones.subdivisions, 8);
        assert_eq!(config.volatility, VolatilityConfig::default());
        assert_eq!(config.mutation, MutationConfig::default());
        assert_eq!(config.engine.instruments, vec!["BTCUSDT"]);
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let config = parse_config(create_valid_config()).unwrap();
        assert_eq!(config.volatility.min_points, 30);
        assert_eq!(config.order_flow.window_ms, 6_000);
        assert_eq!(config.order_flow.timeout_grace_ms, 1_000);
    }

    #[test]
    fn test_env_overrides_file() {
        let file = write_config(create_valid_config());
        let env = HashMap::from([
            ("VOLZONE__DECISION__ACCEPTANCE_THRESHOLD".to_string(), "0.65".to_string()),
            ("VOLZONE__ENGINE__INSTRUMENTS".to_string(), "SOLUSDT,BNBUSDT".to_string()),
            ("VOLZONE__ZONES__SUBDIVISIONS".to_string(), "2".to_string()),
            ("UNRELATED__ZONES__SUBDIVISIONS".to_string(), "9".to_string()),
        ]);
        let config = load_config_with_env(file.path(), Some(env)).unwrap();

        assert_eq!(config.decision.acceptance_threshold, 0.65);
        assert_eq!(config.engine.instruments, vec!["SOLUSDT", "BNBUSDT"]);
        assert_eq!(config.zones.subdivisions, 2);
    }

    #[test]
    fn test_load_missing_file() {
        let result = load_config("/nonexistent/path/config.toml");
        assert!(matches!(result, Err(ConfigError::IoError(_))));
    }

    #[test]
    fn test_invalid_toml() {
        let result = parse_config("[engine\ninstruments = ");
        assert!(matches!(result, Err(ConfigError::LoadError(_))));
    }

    #[test]
    fn test_invalid_threshold() {
        let result = parse_config("[decision]\nacceptance_threshold = 1.5\n");
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_invalid_depth_limit() {
        let err = parse_config("[market_data]\ndepth_limit = 42\n").unwrap_err();
        assert!(err.to_string().contains("depth_limit"));
    }

    #[test]
    fn test_flow_window_must_fit_tick() {
        let err = parse_config("[engine]\ntick_deadline_ms = 5000\n").unwrap_err();
        assert!(err.to_string().contains("tick_deadline_ms"));
    }

    #[test]
    fn test_invalid_log_level() {
        let result = parse_config("[logging]\nlevel = \"loud\"\n");
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_empty_instruments_rejected() {
        let err = parse_config("[engine]\ninstruments = []\n").unwrap_err();
        assert!(err.to_string().contains("engine"));
    }

    #[test]
    fn test_engine_config_conversion() {
        let config = parse_config(create_valid_config()).unwrap();
        let engine = EngineConfig::from(&config);
        assert_eq!(engine.zones.subdivisions, 6);
        assert_eq!(engine.decision.acceptance_threshold, 0.5);
        assert_eq!(engine.order_flow, config.order_flow);
    }

    #[test]
    fn test_defaults_render_and_reload() {
        let rendered = Config::default().to_toml().unwrap();
        assert!(rendered.contains("[volatility]"));
        assert!(rendered.contains("[market_data]"));

        let file = write_config(&rendered);
        let reloaded = load_config_with_env(file.path(), Some(HashMap::new())).unwrap();
        assert_eq!(reloaded, Config::default());
    }
}
