use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use super::models::OrderBookSample;
use crate::domain::EngineError;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum OrderBookError {
    #[error("Order book data unavailable: {0}")]
    DataUnavailable(String),
}

impl From<OrderBookError> for EngineError {
    fn from(err: OrderBookError) -> Self {
        match err {
            OrderBookError::DataUnavailable(msg) => EngineError::DataUnavailable(msg),
        }
    }
}

/// Order-book collaborator. Samples depth and the trade tape across a window.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OrderBookPort: Send + Sync {
    async fn sample(
        &self,
        instrument: &str,
        window: Duration,
    ) -> Result<OrderBookSample, OrderBookError>;
}
