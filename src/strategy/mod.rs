//! Strategy Layer - Volatility Zones, Session Bias and Signal Decisions
//!
//! Turns candles and order-book samples into at most one signal per tick:
//! - Volatility forecast (GARCH / EGARCH / GJR-GARCH) sizes the daily move
//! - Zone engine lays the support/resistance ladder around the daily open
//! - Opening range tracker resolves the write-once session bias
//! - Volume profile classifies levels as high or low volume nodes
//! - Imbalance detector finds fair-value gaps and volume voids
//! - Order flow gate confirms a level against live depth and the tape
//! - Decision engine ranks the candidates and emits the winner

pub mod decision;
pub mod imbalance;
pub mod opening_range;
pub mod order_flow;
pub mod params;
pub mod profile;
pub mod volatility;
pub mod zone_engine;

pub use decision::{EvaluationContext, SignalDecisionEngine};
pub use imbalance::{Direction, Imbalance, ImbalanceBook, ImbalanceDetector, ImbalanceKind};
pub use opening_range::{OpeningRangeTracker, OrbUpdate};
pub use order_flow::{
    FlowObservation, OrderFlowFlags, OrderFlowGate, OrderFlowQuery, OrderFlowReading,
};
pub use params::{
    ConfigError, DecisionConfig, EngineConfig, ImbalanceConfig, OpeningRangeConfig, OrderFlowConfig,
    ProfileConfig, VolatilityConfig, ZoneConfig,
};
pub use profile::{ProfileClassifier, ProfileReading, VolumeNode, VolumeProfile};
pub use volatility::{VolatilityEstimate, VolatilityForecaster};
pub use zone_engine::{ZoneEngine, ZoneLevel, ZoneMap, ZoneQuadrant};
