//! volzone - Intraday Volatility Zone Signal Engine
//!
//! Forecasts the daily move with GARCH-family models, lays a zone ladder
//! around the session open and emits at most one signal per instrument per
//! tick once volume profile and live order flow agree.
//!
//! # Modules
//!
//! - `domain`: Core types (Candle, Signal, SessionContext, MutationState, EngineError)
//! - `ports`: Trait abstractions (MarketDataPort, OrderBookPort, ExecutionGateway, SignalSink)
//! - `strategy`: Volatility forecast, zones, opening range, profile, imbalances, order flow, decisions
//! - `application`: Per-instrument state, tick orchestrator and mutation manager
//! - `adapters`: External implementations (Binance REST, paper gateway, CLI)
//! - `config`: Configuration loading and validation

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
pub mod strategy;

pub use application::{DecisionOrchestrator, MutationSyncManager};
pub use domain::{EngineError, EngineResult, Signal};
pub use strategy::{EngineConfig, SignalDecisionEngine, VolatilityForecaster, ZoneEngine};
