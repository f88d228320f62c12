//! Engine Error Taxonomy
//!
//! `InsufficientData`, `InvalidInput` and `NonFiniteInput` are fatal to the call
//! that raised them and are never retried internally. `DataUnavailable` is
//! transient and collaborator-sourced. Mutation failures carry the gateway
//! error verbatim.

use thiserror::Error;

use crate::ports::execution::GatewayError;

/// Common result type for core operations
pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum EngineError {
    #[error("Insufficient data: need {required} points, have {available}")]
    InsufficientData { required: usize, available: usize },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Data unavailable: {0}")]
    DataUnavailable(String),

    #[error("Non-finite input: {0}")]
    NonFiniteInput(String),

    #[error("Mutation for trade {trade_id} exhausted after {attempts} attempts: {source}")]
    MutationExhausted {
        trade_id: String,
        attempts: u32,
        source: GatewayError,
    },

    #[error("Mutation for trade {trade_id} cancelled before completion")]
    MutationCancelled { trade_id: String },
}

impl EngineError {
    /// Bad input stays bad; only collaborator outages are worth retrying
    pub fn is_transient(&self) -> bool {
        matches!(self, EngineError::DataUnavailable(_))
    }
}
