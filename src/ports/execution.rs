use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum GatewayError {
    /// Idempotent no-op: the trade already carries the requested levels
    #[error("Protective levels already at requested value")]
    AlreadyAtRequestedValue,
    #[error("Gateway unavailable: {0}")]
    DataUnavailable(String),
    #[error("Gateway rejected request: {0}")]
    Rejected(String),
    #[error("Unknown trade: {0}")]
    UnknownTrade(String),
}

impl GatewayError {
    pub fn is_noop(&self) -> bool {
        matches!(self, GatewayError::AlreadyAtRequestedValue)
    }
}

/// Execution gateway. `set_protective_levels` is idempotent per trade id.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExecutionGateway: Send + Sync {
    async fn set_protective_levels(
        &self,
        trade_id: &str,
        take_profit: Option<Decimal>,
        stop_loss: Option<Decimal>,
    ) -> Result<(), GatewayError>;
}
