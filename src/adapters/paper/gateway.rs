//! Paper Execution Gateway
//!
//! Keeps protective levels in memory instead of sending them to a venue.
//! Repeating the current levels reports `AlreadyAtRequestedValue`, like a
//! venue that rejects a no-op amendment.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::info;

use crate::ports::{ExecutionGateway, GatewayError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProtectiveLevels {
    pub take_profit: Option<Decimal>,
    pub stop_loss: Option<Decimal>,
}

#[derive(Debug, Default)]
pub struct PaperGateway {
    levels: Mutex<HashMap<String, ProtectiveLevels>>,
}

impl PaperGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn levels(&self, trade_id: &str) -> Option<ProtectiveLevels> {
        self.levels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(trade_id)
            .copied()
    }
}

#[async_trait]
impl ExecutionGateway for PaperGateway {
    async fn set_protective_levels(
        &self,
        trade_id: &str,
        take_profit: Option<Decimal>,
        stop_loss: Option<Decimal>,
    ) -> Result<(), GatewayError> {
        let mut levels = self.levels.lock().unwrap_or_else(PoisonError::into_inner);
        let current = levels.get(trade_id).copied().unwrap_or_default();

        // Absent fields keep their current value
        let next = ProtectiveLevels {
            take_profit: take_profit.or(current.take_profit),
            stop_loss: stop_loss.or(current.stop_loss),
        };
        if levels.contains_key(trade_id) && next == current {
            return Err(GatewayError::AlreadyAtRequestedValue);
        }

        levels.insert(trade_id.to_string(), next);
        info!(
            trade_id,
            take_profit = ?next.take_profit,
            stop_loss = ?next.stop_loss,
            "[PAPER] Protective levels set"
        );
        Ok(())
    }
}
