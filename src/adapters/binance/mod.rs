//! Binance Adapter
//!
//! Implements `MarketDataPort` and `OrderBookPort` over the public Binance
//! spot REST API.

mod client;
mod types;

pub use client::{BinanceClient, BinanceConfig, DEPTH_LIMITS};
pub use types::{AggTrade, DepthResponse, RawKline};
