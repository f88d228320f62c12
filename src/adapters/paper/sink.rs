//! Logging Signal Sink
//!
//! Publishes signals as structured `tracing` events and keeps a bounded
//! history for the status output. With protection enabled, each signal also
//! moves the paper position's take-profit and stop-loss through the
//! mutation manager, one paper position per instrument.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::application::MutationSyncManager;
use crate::domain::{MutationOutcome, MutationRequest, Signal};
use crate::ports::{SignalSink, SinkError};

/// Decimal places kept when converting levels for the gateway
const PRICE_DP: u32 = 2;

pub struct LoggingSink {
    history: Mutex<VecDeque<Signal>>,
    capacity: usize,
    protection: Option<Arc<MutationSyncManager>>,
}

impl LoggingSink {
    pub fn new(capacity: usize) -> Self {
        Self {
            history: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity: capacity.max(1),
            protection: None,
        }
    }

    /// Forward each signal's levels to `manager` in the background
    pub fn with_protection(mut self, manager: Arc<MutationSyncManager>) -> Self {
        self.protection = Some(manager);
        self
    }

    /// Most recent signals, oldest first
    pub fn recent(&self) -> Vec<Signal> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }
}

impl Default for LoggingSink {
    fn default() -> Self {
        Self::new(100)
    }
}

#[async_trait]
impl SignalSink for LoggingSink {
    async fn publish(&self, signal: &Signal) -> Result<(), SinkError> {
        signal.validate().map_err(SinkError::Rejected)?;

        info!(
            instrument = %signal.instrument,
            setup = ?signal.setup_type,
            side = ?signal.side,
            entry = signal.entry,
            take_profit = signal.take_profit,
            stop_loss = signal.stop_loss,
            confidence = format!("{:.3}", signal.confidence),
            reward_risk = format!("{:.2}", signal.reward_risk()),
            "SIGNAL {}",
            signal.context.reason
        );

        let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        if history.len() == self.capacity {
            history.pop_front();
        }
        history.push_back(signal.clone());
        drop(history);

        if let Some(manager) = &self.protection {
            self.protect(Arc::clone(manager), signal);
        }
        Ok(())
    }
}

impl LoggingSink {
    fn protect(&self, manager: Arc<MutationSyncManager>, signal: &Signal) {
        let to_decimal = |price: f64| Decimal::from_f64(price).map(|d| d.round_dp(PRICE_DP));
        let mut request = MutationRequest::new(signal.instrument.clone());
        if let Some(tp) = to_decimal(signal.take_profit) {
            request = request.with_take_profit(tp);
        }
        if let Some(sl) = to_decimal(signal.stop_loss) {
            request = request.with_stop_loss(sl);
        }

        // Retries back off for seconds; keep them off the tick
        tokio::spawn(async move {
            let trade_id = request.trade_id.clone();
            match manager.submit(request).await {
                MutationOutcome::Failed(e) => {
                    warn!(trade_id = %trade_id, error = %e, "Protective level update failed")
                }
                outcome => info!(trade_id = %trade_id, ?outcome, "Protective level update"),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::paper::PaperGateway;
    use crate::application::MutationConfig;
    use crate::domain::{Bias, SetupType, SignalContext, TradeSide, ZoneInfo};
    use crate::strategy::{OrderFlowReading, ProfileReading, ZoneQuadrant};
    use chrono::{TimeZone, Utc};

    fn signal(entry: f64, take_profit: f64) -> Signal {
        Signal {
            instrument: "BTCUSDT".into(),
            timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 0, 30, 0).unwrap(),
            setup_type: SetupType::ZoneRejection,
            side: TradeSide::Long,
            entry,
            take_profit,
            stop_loss: entry * 0.9,
            confidence: 0.55,
            context: SignalContext {
                session_bias: Bias::Neutral,
                profile: ProfileReading::neutral(entry),
                order_flow: OrderFlowReading::neutral(),
                zone: ZoneInfo {
                    level_price: entry,
                    level_label: "S1".into(),
                    quadrant: ZoneQuadrant::LowerInner,
                },
                imbalance: None,
                reason: "rejection".into(),
            },
        }
    }

    #[tokio::test]
    async fn test_history_is_bounded() {
        let sink = LoggingSink::new(2);
        for entry in [100.0, 200.0, 300.0] {
            sink.publish(&signal(entry, entry + 50.0)).await.unwrap();
        }

        let recent = sink.recent();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].entry, 200.0);
        assert_eq!(recent[1].entry, 300.0);
    }

    #[tokio::test]
    async fn test_invalid_signal_rejected() {
        let sink = LoggingSink::default();
        let result = sink.publish(&signal(100.0, 90.0)).await;
        assert!(matches!(result, Err(SinkError::Rejected(_))));
        assert!(sink.recent().is_empty());
    }

    #[tokio::test]
    async fn test_protection_moves_paper_levels() {
        let gateway = Arc::new(PaperGateway::new());
        let manager = Arc::new(MutationSyncManager::new(
            gateway.clone(),
            MutationConfig::default(),
        ));
        let sink = LoggingSink::default().with_protection(manager);

        sink.publish(&signal(100.0, 150.0)).await.unwrap();

        let mut levels = None;
        for _ in 0..50 {
            levels = gateway.levels("BTCUSDT");
            if levels.is_some() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        let levels = levels.unwrap();
        assert_eq!(levels.take_profit, Decimal::from_f64(150.0));
        assert_eq!(levels.stop_loss, Decimal::from_f64(90.0));
    }
}
