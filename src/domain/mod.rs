//! Domain Layer - Core value types for the volzone decision engine
//!
//! Pure data types shared across layers. External interactions happen through
//! the ports layer; numerics live in the strategy layer.
//!
//! - `candle`: OHLCV bars
//! - `session`: per-session opening-range context and write-once bias
//! - `signal`: emitted trade signals with full evaluation context
//! - `mutation`: protective-level mutation requests and outcomes
//! - `error`: engine error taxonomy

pub mod candle;
pub mod error;
pub mod mutation;
pub mod session;
pub mod signal;

pub use candle::Candle;
pub use error::{EngineError, EngineResult};
pub use mutation::{MutationOutcome, MutationRequest, MutationState};
pub use session::{Bias, SessionContext, SessionPhase};
pub use signal::{SetupType, Signal, SignalContext, TradeSide, ZoneInfo};
