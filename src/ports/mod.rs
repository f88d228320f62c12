//! Ports Layer - Trait definitions for external collaborators
//!
//! This module defines the interfaces (ports) that adapters must implement.
//! Following hexagonal architecture, these traits abstract:
//! - Market data (candles)
//! - Order-book and trade-tape sampling
//! - Protective-level mutations on the execution gateway
//! - The downstream risk/persistence collaborator receiving signals

pub mod execution;
pub mod market_data;
pub mod mocks;
pub mod models;
pub mod order_book;
pub mod signal_sink;

pub use execution::{ExecutionGateway, GatewayError};
pub use market_data::{CandleInterval, MarketDataError, MarketDataPort};
pub use models::{Aggressor, BookLevel, BookSnapshot, OrderBookSample, TapeTrade};
pub use order_book::{OrderBookError, OrderBookPort};
pub use signal_sink::{SignalSink, SinkError};
