use async_trait::async_trait;
use thiserror::Error;

use crate::domain::Signal;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SinkError {
    #[error("Signal rejected by sink: {0}")]
    Rejected(String),
    #[error("Sink unavailable: {0}")]
    Unavailable(String),
}

/// Downstream risk/persistence collaborator that receives emitted signals.
/// Sizing, leverage and order placement happen behind this port.
#[async_trait]
pub trait SignalSink: Send + Sync {
    async fn publish(&self, signal: &Signal) -> Result<(), SinkError>;
}
