//! Adapters Layer - External System Implementations
//!
//! Implementations of the port traits plus the command line:
//! - Binance: klines, depth and trade tape over REST
//! - Paper: in-memory execution gateway and logging signal sink
//! - CLI: Command-line interface definitions

pub mod binance;
pub mod cli;
pub mod paper;

pub use binance::{BinanceClient, BinanceConfig};
pub use cli::CliApp;
pub use paper::{LoggingSink, PaperGateway};
