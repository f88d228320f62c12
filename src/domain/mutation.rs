//! Protective-Level Mutations
//!
//! Request/state/outcome types for take-profit and stop-loss updates issued
//! against the execution gateway. One state entry per trade id.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use super::error::EngineError;

/// Desired protective levels for one trade
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutationRequest {
    pub trade_id: String,
    pub desired_take_profit: Option<Decimal>,
    pub desired_stop_loss: Option<Decimal>,
}

impl MutationRequest {
    pub fn new(trade_id: impl Into<String>) -> Self {
        Self {
            trade_id: trade_id.into(),
            desired_take_profit: None,
            desired_stop_loss: None,
        }
    }

    pub fn with_take_profit(mut self, price: Decimal) -> Self {
        self.desired_take_profit = Some(price);
        self
    }

    pub fn with_stop_loss(mut self, price: Decimal) -> Self {
        self.desired_stop_loss = Some(price);
        self
    }

    /// A request that changes nothing is rejected up front
    pub fn is_empty(&self) -> bool {
        self.desired_take_profit.is_none() && self.desired_stop_loss.is_none()
    }
}

/// Per-trade bookkeeping held by the sync manager
#[derive(Debug, Clone)]
pub struct MutationState {
    pub in_progress: bool,
    pub last_attempt_at: Instant,
    pub retry_count: u32,
    pub last_error: Option<String>,
    /// Bumped whenever a newer request takes over the entry
    pub generation: u64,
}

impl MutationState {
    pub fn started(generation: u64) -> Self {
        Self {
            in_progress: true,
            last_attempt_at: Instant::now(),
            retry_count: 0,
            last_error: None,
            generation,
        }
    }
}

/// Result of a `submit` call
#[derive(Debug, Clone, PartialEq)]
pub enum MutationOutcome {
    /// Gateway accepted the levels (or reported they were already in place)
    Applied { retries: u32 },
    /// Another mutation for this trade is in flight
    SkippedInFlight,
    /// Previous attempt for this trade finished too recently
    SkippedRateLimited,
    /// Terminal failure, surfaced verbatim
    Failed(EngineError),
}

impl MutationOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, MutationOutcome::Applied { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(
            self,
            MutationOutcome::SkippedInFlight | MutationOutcome::SkippedRateLimited
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_request_builder() {
        let req = MutationRequest::new("trade-7")
            .with_take_profit(dec!(102500))
            .with_stop_loss(dec!(99375.5));
        assert_eq!(req.trade_id, "trade-7");
        assert_eq!(req.desired_take_profit, Some(dec!(102500)));
        assert_eq!(req.desired_stop_loss, Some(dec!(99375.5)));
        assert!(!req.is_empty());
        assert!(MutationRequest::new("x").is_empty());
    }

    #[test]
    fn test_outcome_helpers() {
        assert!(MutationOutcome::Applied { retries: 0 }.is_applied());
        assert!(MutationOutcome::SkippedInFlight.is_skipped());
        assert!(MutationOutcome::SkippedRateLimited.is_skipped());
        let failed = MutationOutcome::Failed(EngineError::MutationCancelled { trade_id: "t".into() });
        assert!(!failed.is_applied());
        assert!(!failed.is_skipped());
    }

    #[test]
    fn test_state_starts_in_progress() {
        let state = MutationState::started(3);
        assert!(state.in_progress);
        assert_eq!(state.retry_count, 0);
        assert_eq!(state.generation, 3);
        assert!(state.last_error.is_none());
    }
}
