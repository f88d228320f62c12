//! Strategy Parameters
//!
//! Configuration structs for every stage of the decision pipeline.
//! Defaults are the tuned production values.

use serde::{Deserialize, Serialize};

/// Main engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub volatility: VolatilityConfig,
    pub zones: ZoneConfig,
    pub opening_range: OpeningRangeConfig,
    pub profile: ProfileConfig,
    pub imbalance: ImbalanceConfig,
    pub order_flow: OrderFlowConfig,
    pub decision: DecisionConfig,
}

impl EngineConfig {
    /// Create a new config with a custom acceptance threshold
    pub fn with_acceptance_threshold(mut self, threshold: f64) -> Self {
        self.decision.acceptance_threshold = threshold;
        self
    }

    /// Create a new config with a custom zone subdivision count
    pub fn with_subdivisions(mut self, subdivisions: usize) -> Self {
        self.zones.subdivisions = subdivisions;
        self
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.volatility.validate()?;
        self.zones.validate()?;
        self.opening_range.validate()?;
        self.profile.validate()?;
        self.imbalance.validate()?;
        self.order_flow.validate()?;
        self.decision.validate()?;
        Ok(())
    }
}

/// Volatility forecaster settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VolatilityConfig {
    /// Minimum daily closes required for a forecast
    pub min_points: usize,
    /// Forecast horizon in trading periods
    pub horizon: usize,
    /// Lower clamp for the averaged move (fraction)
    pub floor_pct: f64,
    /// Upper clamp for the averaged move (fraction)
    pub cap_pct: f64,
    /// Nelder-Mead iteration budget per model
    pub max_iterations: usize,
    /// Decay of the EWMA fallback
    pub ewma_lambda: f64,
    /// Daily closes requested from market data
    pub lookback_days: usize,
}

impl Default for VolatilityConfig {
    fn default() -> Self {
        Self {
            min_points: 30,
            horizon: 5,
            floor_pct: 0.01,
            cap_pct: 0.10,
            max_iterations: 2_000,
            ewma_lambda: 0.94,
            lookback_days: 120,
        }
    }
}

impl VolatilityConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_points < 30 {
            return Err(ConfigError::InvalidMinPoints(self.min_points));
        }
        if self.horizon == 0 {
            return Err(ConfigError::InvalidHorizon(self.horizon));
        }
        if !(self.floor_pct > 0.0 && self.floor_pct < self.cap_pct && self.cap_pct < 1.0) {
            return Err(ConfigError::InvalidClamp(self.floor_pct, self.cap_pct));
        }
        if !(self.ewma_lambda > 0.0 && self.ewma_lambda < 1.0) {
            return Err(ConfigError::InvalidFraction("ewma_lambda", self.ewma_lambda));
        }
        if self.lookback_days < self.min_points {
            return Err(ConfigError::InvalidLookbackDays(self.lookback_days, self.min_points));
        }
        Ok(())
    }
}

/// Zone ladder settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoneConfig {
    /// Levels between the open and each bound
    pub subdivisions: usize,
}

impl Default for ZoneConfig {
    fn default() -> Self {
        Self { subdivisions: 4 }
    }
}

impl ZoneConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.subdivisions == 0 || self.subdivisions > 64 {
            return Err(ConfigError::InvalidSubdivisions(self.subdivisions));
        }
        Ok(())
    }
}

/// Opening range settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpeningRangeConfig {
    /// Length of the opening window
    pub window_secs: u64,
    /// Close must clear the range edge by this fraction
    pub breakout_margin_pct: f64,
    /// Time price must hold beyond the level to confirm
    pub hold_secs: u64,
}

impl Default for OpeningRangeConfig {
    fn default() -> Self {
        Self {
            window_secs: 300, // 5 minutes
            breakout_margin_pct: 0.001,
            hold_secs: 30,
        }
    }
}

impl OpeningRangeConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_secs == 0 {
            return Err(ConfigError::InvalidDuration("opening_range.window_secs"));
        }
        if !(0.0..0.1).contains(&self.breakout_margin_pct) {
            return Err(ConfigError::InvalidFraction(
                "breakout_margin_pct",
                self.breakout_margin_pct,
            ));
        }
        Ok(())
    }
}

/// Volume profile settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileConfig {
    /// Histogram bucket width as a fraction of the target price
    pub bucket_size_pct: f64,
    /// Search radius for the nearest populated bucket (fraction of price)
    pub tolerance_pct: f64,
    /// Percentile at/above which a bucket is a high-volume node
    pub hvn_percentile: f64,
    /// Percentile at/below which a bucket is a low-volume node
    pub lvn_percentile: f64,
    /// Intraday candles fed to the profile
    pub lookback_candles: usize,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            bucket_size_pct: 0.001,
            tolerance_pct: 0.002,
            hvn_percentile: 75.0,
            lvn_percentile: 25.0,
            lookback_candles: 240,
        }
    }
}

impl ProfileConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.bucket_size_pct > 0.0 && self.bucket_size_pct < 0.1) {
            return Err(ConfigError::InvalidFraction("bucket_size_pct", self.bucket_size_pct));
        }
        if !(0.0..0.1).contains(&self.tolerance_pct) {
            return Err(ConfigError::InvalidFraction("tolerance_pct", self.tolerance_pct));
        }
        if !(0.0 <= self.lvn_percentile
            && self.lvn_percentile < self.hvn_percentile
            && self.hvn_percentile <= 100.0)
        {
            return Err(ConfigError::InvalidPercentiles(
                self.lvn_percentile,
                self.hvn_percentile,
            ));
        }
        Ok(())
    }
}

/// Imbalance detector settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImbalanceConfig {
    /// Candle volume below this fraction of the local average is "thin"
    pub void_volume_fraction: f64,
    /// Minimum consecutive thin candles forming a void
    pub void_min_run: usize,
    /// Trailing candles used for the local volume average
    pub void_average_window: usize,
    /// Gaps narrower than this fraction of price are ignored
    pub min_gap_pct: f64,
    /// Close beyond the far edge by this fraction invalidates
    pub invalidation_margin_pct: f64,
}

impl Default for ImbalanceConfig {
    fn default() -> Self {
        Self {
            void_volume_fraction: 0.5,
            void_min_run: 3,
            void_average_window: 20,
            min_gap_pct: 0.0,
            invalidation_margin_pct: 0.001,
        }
    }
}

impl ImbalanceConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.void_volume_fraction > 0.0 && self.void_volume_fraction < 1.0) {
            return Err(ConfigError::InvalidFraction(
                "void_volume_fraction",
                self.void_volume_fraction,
            ));
        }
        if self.void_min_run < 2 {
            return Err(ConfigError::InvalidWindow("void_min_run", self.void_min_run));
        }
        if self.void_average_window < self.void_min_run {
            return Err(ConfigError::InvalidWindow(
                "void_average_window",
                self.void_average_window,
            ));
        }
        if !(0.0..0.1).contains(&self.invalidation_margin_pct) {
            return Err(ConfigError::InvalidFraction(
                "invalidation_margin_pct",
                self.invalidation_margin_pct,
            ));
        }
        Ok(())
    }
}

/// Order-flow gate settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrderFlowConfig {
    /// Sampling window
    pub window_ms: u64,
    /// Extra time allowed on top of the window before giving up
    pub timeout_grace_ms: u64,
    /// Resting notional needed to call a wall (USD)
    pub wall_min_notional: f64,
    /// Proximity band around the level in basis points
    pub tolerance_bps: f64,
    /// Aggressive volume over baseline * multiple is a surge
    pub surge_multiple: f64,
    /// Smoothing factor of the per-instrument volume baseline
    pub baseline_alpha: f64,
    /// Share of aggressive flow one side needs to count as absorbed
    pub absorption_dominance: f64,
    /// Minimum opposite-side trades for absorption
    pub absorption_min_trades: usize,
    /// Winning side must lead by this much evidence
    pub bias_margin: f64,
    /// Minimum evidence for a directional bias
    pub min_evidence: f64,
}

impl Default for OrderFlowConfig {
    fn default() -> Self {
        Self {
            window_ms: 8_000,
            timeout_grace_ms: 1_000,
            wall_min_notional: 50_000.0,
            tolerance_bps: 5.0,
            surge_multiple: 2.0,
            baseline_alpha: 0.2,
            absorption_dominance: 0.65,
            absorption_min_trades: 3,
            bias_margin: 0.1,
            min_evidence: 0.2,
        }
    }
}

impl OrderFlowConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_ms == 0 {
            return Err(ConfigError::InvalidDuration("order_flow.window_ms"));
        }
        if self.wall_min_notional <= 0.0 {
            return Err(ConfigError::InvalidNotional(self.wall_min_notional));
        }
        if !(self.tolerance_bps > 0.0 && self.tolerance_bps <= 500.0) {
            return Err(ConfigError::InvalidTolerance(self.tolerance_bps));
        }
        if self.surge_multiple <= 1.0 {
            return Err(ConfigError::InvalidFraction("surge_multiple", self.surge_multiple));
        }
        if !(self.baseline_alpha > 0.0 && self.baseline_alpha <= 1.0) {
            return Err(ConfigError::InvalidFraction("baseline_alpha", self.baseline_alpha));
        }
        if !(self.absorption_dominance > 0.5 && self.absorption_dominance <= 1.0) {
            return Err(ConfigError::InvalidFraction(
                "absorption_dominance",
                self.absorption_dominance,
            ));
        }
        Ok(())
    }
}

/// Decision engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionConfig {
    /// Candidates below this confidence are dropped
    pub acceptance_threshold: f64,
    /// Zone boundaries further than this fraction from price are ignored
    pub touch_tolerance_pct: f64,
    /// A rejection wick must reach within this many bps of the level
    pub rejection_touch_bps: f64,
    /// Stop distance beyond the invalidating level (fraction)
    pub stop_buffer_pct: f64,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            acceptance_threshold: 0.4,
            touch_tolerance_pct: 0.003,
            rejection_touch_bps: 5.0,
            stop_buffer_pct: 0.002,
        }
    }
}

impl DecisionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.acceptance_threshold) {
            return Err(ConfigError::InvalidThreshold(self.acceptance_threshold));
        }
        if !(self.touch_tolerance_pct > 0.0 && self.touch_tolerance_pct < 0.05) {
            return Err(ConfigError::InvalidFraction(
                "touch_tolerance_pct",
                self.touch_tolerance_pct,
            ));
        }
        if !(0.0..0.05).contains(&self.stop_buffer_pct) {
            return Err(ConfigError::InvalidFraction("stop_buffer_pct", self.stop_buffer_pct));
        }
        Ok(())
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid minimum data points: {0} (minimum 30)")]
    InvalidMinPoints(usize),
    #[error("Invalid forecast horizon: {0} (must be >= 1)")]
    InvalidHorizon(usize),
    #[error("Invalid clamp range: [{0}, {1}] (need 0 < floor < cap < 1)")]
    InvalidClamp(f64, f64),
    #[error("Invalid lookback: {0} days (must cover at least {1})")]
    InvalidLookbackDays(usize, usize),
    #[error("Invalid subdivisions: {0} (must be 1-64)")]
    InvalidSubdivisions(usize),
    #[error("Invalid duration for {0} (must be > 0)")]
    InvalidDuration(&'static str),
    #[error("Invalid value for {0}: {1}")]
    InvalidFraction(&'static str, f64),
    #[error("Invalid window for {0}: {1}")]
    InvalidWindow(&'static str, usize),
    #[error("Invalid percentiles: lvn {0} / hvn {1} (need 0 <= lvn < hvn <= 100)")]
    InvalidPercentiles(f64, f64),
    #[error("Invalid wall notional: {0} (must be > 0)")]
    InvalidNotional(f64),
    #[error("Invalid tolerance: {0} bps (must be 0 < tol <= 500)")]
    InvalidTolerance(f64),
    #[error("Invalid acceptance threshold: {0} (must be 0-1)")]
    InvalidThreshold(f64),
}
