//! Paper Adapters
//!
//! In-process implementations of the outbound ports for running without a
//! venue: protective levels live in memory and signals go to the log.

mod gateway;
mod sink;

pub use gateway::{PaperGateway, ProtectiveLevels};
pub use sink::LoggingSink;
