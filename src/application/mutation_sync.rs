//! Mutation Sync Manager
//!
//! Pushes take-profit / stop-loss updates to the execution gateway with at
//! most one mutation in flight per trade id. Requests are shed, never queued:
//! - in flight for the same trade: `SkippedInFlight`
//! - previous attempt finished under `min_interval` ago: `SkippedRateLimited`
//!
//! Failed attempts retry with a linear backoff (`base_delay * attempt`). The
//! gateway's "already at requested value" answer counts as success. A newer
//! request arriving during backoff, at least `min_interval` after the failed
//! attempt, takes over the entry, and `cancel` clears it; the superseded
//! attempt then reports `MutationCancelled`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::domain::{EngineError, MutationOutcome, MutationRequest, MutationState};
use crate::ports::{ExecutionGateway, GatewayError};
use crate::strategy::params::ConfigError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MutationConfig {
    /// Minimum gap between a finished attempt and the next one for a trade
    pub min_interval_ms: u64,
    /// Backoff unit; attempt n waits `n * base_delay_ms`
    pub base_delay_ms: u64,
    /// Retries after the first attempt
    pub max_retries: u32,
}

impl Default for MutationConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: 1_000,
            base_delay_ms: 2_000,
            max_retries: 2,
        }
    }
}

impl MutationConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_delay_ms == 0 {
            return Err(ConfigError::InvalidDuration("mutation.base_delay_ms"));
        }
        Ok(())
    }

    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }

    pub fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.base_delay_ms.saturating_mul(attempt as u64))
    }
}

pub struct MutationSyncManager {
    gateway: Arc<dyn ExecutionGateway>,
    config: MutationConfig,
    states: Mutex<HashMap<String, MutationState>>,
    /// When each trade's last attempt finished
    completed: Mutex<HashMap<String, Instant>>,
    generation: AtomicU64,
}

impl MutationSyncManager {
    pub fn new(gateway: Arc<dyn ExecutionGateway>, config: MutationConfig) -> Self {
        Self {
            gateway,
            config,
            states: Mutex::new(HashMap::new()),
            completed: Mutex::new(HashMap::new()),
            generation: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &MutationConfig {
        &self.config
    }

    /// Snapshot of the state entry for `trade_id`, if one exists
    pub fn state(&self, trade_id: &str) -> Option<MutationState> {
        self.states().get(trade_id).cloned()
    }

    pub fn in_flight(&self) -> usize {
        self.states().values().filter(|s| s.in_progress).count()
    }

    /// Drop the entry for a trade, abandoning any pending retry.
    /// Returns whether there was anything to cancel.
    pub fn cancel(&self, trade_id: &str) -> bool {
        let removed = self.states().remove(trade_id).is_some();
        if removed {
            info!(trade_id, "Mutation cancelled");
        }
        removed
    }

    /// Apply `request`, retrying transient failures. Never holds a lock across
    /// a gateway call.
    pub async fn submit(&self, request: MutationRequest) -> MutationOutcome {
        if request.is_empty() {
            return MutationOutcome::Failed(EngineError::InvalidInput(format!(
                "mutation for {} sets no levels",
                request.trade_id
            )));
        }
        let trade_id = request.trade_id.clone();

        let generation = match self.begin(&trade_id) {
            Ok(generation) => generation,
            Err(skipped) => {
                debug!(trade_id = %trade_id, outcome = ?skipped, "Mutation skipped");
                return skipped;
            }
        };

        let mut attempt: u32 = 0;
        loop {
            let result = self
                .gateway
                .set_protective_levels(
                    &trade_id,
                    request.desired_take_profit,
                    request.desired_stop_loss,
                )
                .await;

            match result {
                Ok(()) => return self.finish_applied(&trade_id, generation, attempt, false),
                Err(e) if e.is_noop() => return self.finish_applied(&trade_id, generation, attempt, true),
                Err(e) if attempt >= self.config.max_retries => {
                    return self.finish_exhausted(&trade_id, generation, attempt + 1, e);
                }
                Err(e) => {
                    attempt += 1;
                    if !self.mark_retrying(&trade_id, generation, &e) {
                        return cancelled(&trade_id);
                    }
                    let delay = self.config.backoff(attempt);
                    warn!(
                        trade_id = %trade_id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Mutation failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    if !self.resume(&trade_id, generation) {
                        return cancelled(&trade_id);
                    }
                }
            }
        }
    }

    fn states(&self) -> MutexGuard<'_, HashMap<String, MutationState>> {
        self.states.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn completed(&self) -> MutexGuard<'_, HashMap<String, Instant>> {
        self.completed.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claim the entry for a new attempt or say why not
    fn begin(&self, trade_id: &str) -> Result<u64, MutationOutcome> {
        let now = Instant::now();
        let min_interval = self.config.min_interval();
        let mut states = self.states();
        let superseding = match states.get(trade_id) {
            Some(state) if state.in_progress => return Err(MutationOutcome::SkippedInFlight),
            // The failed attempt now in backoff counts as the previous attempt
            Some(state) if now.duration_since(state.last_attempt_at) < min_interval => {
                return Err(MutationOutcome::SkippedRateLimited);
            }
            Some(_) => true,
            None => false,
        };

        if !superseding {
            let mut completed = self.completed();
            completed.retain(|_, at| now.duration_since(*at) < min_interval);
            if completed.contains_key(trade_id) {
                return Err(MutationOutcome::SkippedRateLimited);
            }
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        states.insert(trade_id.to_string(), MutationState::started(generation));
        if superseding {
            debug!(trade_id, generation, "Superseding mutation waiting on retry");
        }
        Ok(generation)
    }

    fn owns(states: &HashMap<String, MutationState>, trade_id: &str, generation: u64) -> bool {
        states
            .get(trade_id)
            .is_some_and(|state| state.generation == generation)
    }

    fn mark_retrying(&self, trade_id: &str, generation: u64, error: &GatewayError) -> bool {
        let mut states = self.states();
        match states.get_mut(trade_id) {
            Some(state) if state.generation == generation => {
                state.in_progress = false;
                state.retry_count += 1;
                state.last_error = Some(error.to_string());
                state.last_attempt_at = Instant::now();
                true
            }
            _ => false,
        }
    }

    fn resume(&self, trade_id: &str, generation: u64) -> bool {
        let mut states = self.states();
        match states.get_mut(trade_id) {
            Some(state) if state.generation == generation => {
                state.in_progress = true;
                state.last_attempt_at = Instant::now();
                true
            }
            _ => false,
        }
    }

    fn finish(&self, trade_id: &str, generation: u64) {
        let mut states = self.states();
        if Self::owns(&states, trade_id, generation) {
            states.remove(trade_id);
        }
        drop(states);
        self.completed().insert(trade_id.to_string(), Instant::now());
    }

    fn finish_applied(&self, trade_id: &str, generation: u64, retries: u32, noop: bool) -> MutationOutcome {
        self.finish(trade_id, generation);
        info!(trade_id, retries, noop, "Protective levels applied");
        MutationOutcome::Applied { retries }
    }

    fn finish_exhausted(
        &self,
        trade_id: &str,
        generation: u64,
        attempts: u32,
        source: GatewayError,
    ) -> MutationOutcome {
        self.finish(trade_id, generation);
        warn!(trade_id, attempts, error = %source, "Mutation retries exhausted");
        MutationOutcome::Failed(EngineError::MutationExhausted {
            trade_id: trade_id.to_string(),
            attempts,
            source,
        })
    }
}

fn cancelled(trade_id: &str) -> MutationOutcome {
    debug!(trade_id, "Mutation superseded or cancelled during backoff");
    MutationOutcome::Failed(EngineError::MutationCancelled {
        trade_id: trade_id.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::execution::MockExecutionGateway;
    use crate::ports::mocks::ScriptedGateway;
    use rust_decimal_macros::dec;

    fn fast_config() -> MutationConfig {
        MutationConfig {
            min_interval_ms: 1_000,
            base_delay_ms: 10,
            max_retries: 2,
        }
    }

    fn create_test_manager(gateway: ScriptedGateway, config: MutationConfig) -> Arc<MutationSyncManager> {
        Arc::new(MutationSyncManager::new(Arc::new(gateway), config))
    }

    fn request(trade_id: &str) -> MutationRequest {
        MutationRequest::new(trade_id)
            .with_take_profit(dec!(102500))
            .with_stop_loss(dec!(99375))
    }

    #[tokio::test]
    async fn test_applies_and_clears_state() {
        let gateway = ScriptedGateway::new();
        let manager = create_test_manager(gateway.clone(), fast_config());

        let outcome = manager.submit(request("t-1")).await;
        assert_eq!(outcome, MutationOutcome::Applied { retries: 0 });
        assert!(manager.state("t-1").is_none());

        let calls = gateway.get_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].take_profit, Some(dec!(102500)));
        assert_eq!(calls[0].stop_loss, Some(dec!(99375)));
    }

    #[tokio::test]
    async fn test_concurrent_submit_skips_in_flight() {
        let gateway = ScriptedGateway::new().with_delay(Duration::from_millis(50));
        let manager = create_test_manager(gateway.clone(), fast_config());

        let (a, b) = tokio::join!(manager.submit(request("t-1")), manager.submit(request("t-1")));
        let outcomes = [a, b];
        assert_eq!(outcomes.iter().filter(|o| o.is_applied()).count(), 1);
        assert_eq!(
            outcomes
                .iter()
                .filter(|o| **o == MutationOutcome::SkippedInFlight)
                .count(),
            1
        );
        assert_eq!(gateway.call_count(), 1);
    }

    #[tokio::test]
    async fn test_different_trades_run_concurrently() {
        let gateway = ScriptedGateway::new().with_delay(Duration::from_millis(30));
        let manager = create_test_manager(gateway.clone(), fast_config());

        let (a, b) = tokio::join!(manager.submit(request("t-1")), manager.submit(request("t-2")));
        assert!(a.is_applied());
        assert!(b.is_applied());
        assert_eq!(gateway.call_count(), 2);
    }

    #[tokio::test]
    async fn test_rate_limited_after_completion() {
        let gateway = ScriptedGateway::new();
        let manager = create_test_manager(gateway.clone(), fast_config());

        assert!(manager.submit(request("t-1")).await.is_applied());
        assert_eq!(manager.submit(request("t-1")).await, MutationOutcome::SkippedRateLimited);
        assert_eq!(gateway.call_count(), 1);

        let short = MutationConfig {
            min_interval_ms: 20,
            ..fast_config()
        };
        let manager = create_test_manager(gateway.clone(), short);
        assert!(manager.submit(request("t-1")).await.is_applied());
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(manager.submit(request("t-1")).await.is_applied());
    }

    #[tokio::test]
    async fn test_noop_counts_as_success() {
        let gateway = ScriptedGateway::new().with_responses(vec![Err(GatewayError::AlreadyAtRequestedValue)]);
        let manager = create_test_manager(gateway.clone(), fast_config());

        assert_eq!(
            manager.submit(request("t-1")).await,
            MutationOutcome::Applied { retries: 0 }
        );
        assert_eq!(gateway.call_count(), 1);
    }

    #[tokio::test]
    async fn test_retries_then_applies() {
        let gateway = ScriptedGateway::new().with_responses(vec![Err(GatewayError::DataUnavailable(
            "502".into(),
        ))]);
        let manager = create_test_manager(gateway.clone(), fast_config());

        assert_eq!(
            manager.submit(request("t-1")).await,
            MutationOutcome::Applied { retries: 1 }
        );
        assert_eq!(gateway.call_count(), 2);
        assert!(manager.state("t-1").is_none());
    }

    #[tokio::test]
    async fn test_exhaustion_surfaces_gateway_error() {
        let rejected = GatewayError::Rejected("price off tick".into());
        let gateway = ScriptedGateway::new().with_responses(vec![
            Err(rejected.clone()),
            Err(rejected.clone()),
            Err(rejected.clone()),
        ]);
        let manager = create_test_manager(gateway.clone(), fast_config());

        let outcome = manager.submit(request("t-9")).await;
        assert_eq!(
            outcome,
            MutationOutcome::Failed(EngineError::MutationExhausted {
                trade_id: "t-9".into(),
                attempts: 3,
                source: rejected,
            })
        );
        assert_eq!(gateway.call_count(), 3);
        assert!(manager.state("t-9").is_none());
    }

    #[tokio::test]
    async fn test_cancel_during_backoff() {
        let gateway = ScriptedGateway::new().with_responses(vec![Err(GatewayError::DataUnavailable(
            "timeout".into(),
        ))]);
        let config = MutationConfig {
            base_delay_ms: 200,
            ..fast_config()
        };
        let manager = create_test_manager(gateway.clone(), config);

        let task = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.submit(request("t-1")).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        let state = manager.state("t-1").unwrap();
        assert!(!state.in_progress);
        assert_eq!(state.retry_count, 1);
        assert!(state.last_error.as_deref().unwrap().contains("timeout"));

        assert!(manager.cancel("t-1"));
        assert!(!manager.cancel("t-1"));
        assert_eq!(
            task.await.unwrap(),
            MutationOutcome::Failed(EngineError::MutationCancelled { trade_id: "t-1".into() })
        );
        assert_eq!(gateway.call_count(), 1);
    }

    #[tokio::test]
    async fn test_newer_request_supersedes_backoff() {
        let gateway = ScriptedGateway::new().with_responses(vec![Err(GatewayError::DataUnavailable(
            "timeout".into(),
        ))]);
        let config = MutationConfig {
            min_interval_ms: 50,
            base_delay_ms: 400,
            ..fast_config()
        };
        let manager = create_test_manager(gateway.clone(), config);

        let first = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.submit(request("t-1")).await })
        };
        // Past min_interval, still inside the 400ms backoff
        tokio::time::sleep(Duration::from_millis(150)).await;

        let newer = request("t-1").with_stop_loss(dec!(100000));
        assert_eq!(manager.submit(newer).await, MutationOutcome::Applied { retries: 0 });
        assert!(matches!(
            first.await.unwrap(),
            MutationOutcome::Failed(EngineError::MutationCancelled { .. })
        ));
        assert_eq!(gateway.call_count(), 2);
        assert_eq!(gateway.get_calls()[1].stop_loss, Some(dec!(100000)));
    }

    #[tokio::test]
    async fn test_request_right_after_failed_attempt_is_rate_limited() {
        let gateway = ScriptedGateway::new().with_responses(vec![Err(GatewayError::DataUnavailable(
            "timeout".into(),
        ))]);
        let config = MutationConfig {
            base_delay_ms: 200,
            ..fast_config()
        };
        let manager = create_test_manager(gateway.clone(), config);

        let first = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.submit(request("t-1")).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        let newer = request("t-1").with_stop_loss(dec!(100000));
        assert_eq!(manager.submit(newer).await, MutationOutcome::SkippedRateLimited);

        // The original request keeps its entry and retries on schedule
        assert_eq!(first.await.unwrap(), MutationOutcome::Applied { retries: 1 });
        let calls = gateway.get_calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].stop_loss, Some(dec!(99375)));
    }

    #[tokio::test]
    async fn test_empty_request_rejected() {
        let mut gateway = MockExecutionGateway::new();
        gateway.expect_set_protective_levels().never();
        let manager = MutationSyncManager::new(Arc::new(gateway), fast_config());

        assert!(matches!(
            manager.submit(MutationRequest::new("t-1")).await,
            MutationOutcome::Failed(EngineError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_backoff_is_linear() {
        let config = MutationConfig::default();
        assert_eq!(config.backoff(1), Duration::from_secs(2));
        assert_eq!(config.backoff(2), Duration::from_secs(4));
        assert!(config.validate().is_ok());
        assert!(MutationConfig { base_delay_ms: 0, ..config }.validate().is_err());
    }
}
