//! Decision Orchestrator
//!
//! Drives evaluation ticks for a fixed set of instruments:
//! 1. Fetch intraday candles
//! 2. Refresh the daily volatility estimate and zone map once per day
//! 3. Advance the opening range tracker and refresh imbalances
//! 4. Run the decision engine and publish any signal to the sink, once per
//!    setup, level and candle
//!
//! Ticks for different instruments run in parallel. Each tick is bounded by
//! the evaluation deadline and yields "no signal" when it runs out.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use super::engine_state::{DailyLevels, InstrumentState, PublishedKey};
use crate::domain::{Bias, Candle, EngineError, Signal};
use crate::ports::{CandleInterval, MarketDataPort, OrderBookPort, SignalSink, SinkError};
use crate::strategy::{
    EngineConfig, EvaluationContext, ImbalanceBook, ImbalanceDetector, OrderFlowGate,
    ProfileClassifier, SignalDecisionEngine, VolatilityForecaster, ZoneEngine,
};

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Unknown instrument: {0}")]
    UnknownInstrument(String),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("Signal sink error: {0}")]
    Sink(#[from] SinkError),
}

/// Tick scheduling settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub instruments: Vec<String>,
    pub intraday_interval: CandleInterval,
    /// Intraday candles fetched per tick
    pub intraday_count: usize,
    pub poll_interval_ms: u64,
    /// A tick that runs longer is abandoned with no signal
    pub tick_deadline_ms: u64,
    /// Session open as an hour of the UTC day
    pub session_open_hour_utc: u32,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            instruments: vec!["BTCUSDT".to_string()],
            intraday_interval: CandleInterval::OneMinute,
            intraday_count: 240,
            poll_interval_ms: 15_000,
            tick_deadline_ms: 12_000,
            session_open_hour_utc: 0,
        }
    }
}

impl OrchestratorConfig {
    pub fn validate(&self) -> Result<(), OrchestratorError> {
        if self.instruments.is_empty() {
            return Err(OrchestratorError::ConfigError("no instruments configured".to_string()));
        }
        if self.intraday_count < 2 {
            return Err(OrchestratorError::ConfigError(format!(
                "intraday_count must be >= 2, got {}",
                self.intraday_count
            )));
        }
        if self.tick_deadline_ms == 0 || self.poll_interval_ms == 0 {
            return Err(OrchestratorError::ConfigError(
                "poll interval and tick deadline must be positive".to_string(),
            ));
        }
        if self.session_open_hour_utc > 23 {
            return Err(OrchestratorError::ConfigError(format!(
                "session_open_hour_utc must be 0-23, got {}",
                self.session_open_hour_utc
            )));
        }
        Ok(())
    }

    /// Session start for the trading day containing `at`
    pub fn session_start(&self, at: DateTime<Utc>) -> DateTime<Utc> {
        let today = at.date_naive();
        let start = session_open(today, self.session_open_hour_utc);
        if at >= start {
            start
        } else {
            today
                .pred_opt()
                .map(|yesterday| session_open(yesterday, self.session_open_hour_utc))
                .unwrap_or(start)
        }
    }
}

fn session_open(day: NaiveDate, hour: u32) -> DateTime<Utc> {
    let time = NaiveTime::from_hms_opt(hour.min(23), 0, 0).unwrap_or_default();
    Utc.from_utc_datetime(&day.and_time(time))
}

/// Per-instrument status snapshot
#[derive(Debug, Clone)]
pub struct InstrumentStatus {
    pub instrument: String,
    pub day: Option<NaiveDate>,
    pub averaged_pct: Option<f64>,
    pub session_bias: Bias,
    pub live_imbalances: usize,
}

#[derive(Debug, Clone)]
pub struct OrchestratorStatus {
    pub is_running: bool,
    pub instruments: Vec<InstrumentStatus>,
}

/// Ties the strategy layer to the ports
pub struct DecisionOrchestrator {
    config: OrchestratorConfig,
    strategy: EngineConfig,
    market_data: Arc<dyn MarketDataPort>,
    sink: Arc<dyn SignalSink>,
    forecaster: VolatilityForecaster,
    zone_engine: ZoneEngine,
    detector: ImbalanceDetector,
    engine: SignalDecisionEngine,
    instruments: HashMap<String, Arc<InstrumentState>>,
    is_running: Arc<RwLock<bool>>,
}

impl DecisionOrchestrator {
    pub fn new(
        config: OrchestratorConfig,
        strategy: EngineConfig,
        market_data: Arc<dyn MarketDataPort>,
        order_book: Arc<dyn OrderBookPort>,
        sink: Arc<dyn SignalSink>,
    ) -> Result<Self, OrchestratorError> {
        config.validate()?;
        strategy
            .validate()
            .map_err(|e| OrchestratorError::ConfigError(e.to_string()))?;

        let gate = Arc::new(OrderFlowGate::new(order_book, strategy.order_flow.clone()));
        let engine = SignalDecisionEngine::new(
            strategy.decision.clone(),
            ProfileClassifier::new(strategy.profile.clone()),
            gate,
        );

        let session_start = config.session_start(Utc::now());
        let instruments = config
            .instruments
            .iter()
            .map(|name| {
                let state = InstrumentState::new(name.clone(), strategy.opening_range.clone(), session_start);
                (name.clone(), Arc::new(state))
            })
            .collect();

        Ok(Self {
            forecaster: VolatilityForecaster::new(strategy.volatility.clone()),
            zone_engine: ZoneEngine::new(strategy.zones.clone()),
            detector: ImbalanceDetector::new(strategy.imbalance.clone()),
            engine,
            config,
            strategy,
            market_data,
            sink,
            instruments,
            is_running: Arc::new(RwLock::new(false)),
        })
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn state(&self, instrument: &str) -> Option<Arc<InstrumentState>> {
        self.instruments.get(instrument).cloned()
    }

    /// Run ticks for every instrument until `stop` is called
    pub async fn run(&self) -> Result<(), OrchestratorError> {
        *self.is_running.write().await = true;
        info!(
            instruments = ?self.config.instruments,
            poll_ms = self.config.poll_interval_ms,
            "Starting decision orchestrator"
        );

        while *self.is_running.read().await {
            for (instrument, result) in self.tick_all().await {
                if let Err(e) = result {
                    // Keep running; the next tick may succeed
                    error!(instrument = %instrument, error = %e, "Tick failed");
                }
            }
            tokio::time::sleep(Duration::from_millis(self.config.poll_interval_ms)).await;
        }

        info!("Decision orchestrator stopped");
        Ok(())
    }

    pub async fn stop(&self) {
        *self.is_running.write().await = false;
        info!("Stop signal sent to orchestrator");
    }

    /// One tick per instrument, all in parallel
    pub async fn tick_all(&self) -> Vec<(String, Result<Option<Signal>, OrchestratorError>)> {
        let names: Vec<String> = self.config.instruments.clone();
        let results = join_all(names.iter().map(|name| self.tick(name))).await;
        names.into_iter().zip(results).collect()
    }

    /// Evaluate one instrument. Returns the emitted signal, if any.
    pub async fn tick(&self, instrument: &str) -> Result<Option<Signal>, OrchestratorError> {
        let state = self
            .state(instrument)
            .ok_or_else(|| OrchestratorError::UnknownInstrument(instrument.to_string()))?;

        let deadline = Duration::from_millis(self.config.tick_deadline_ms);
        match tokio::time::timeout(deadline, self.evaluate(&state)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    instrument,
                    deadline_ms = self.config.tick_deadline_ms,
                    "Tick deadline exceeded, no signal"
                );
                Ok(None)
            }
        }
    }

    async fn evaluate(&self, state: &InstrumentState) -> Result<Option<Signal>, OrchestratorError> {
        let instrument = state.instrument();
        let candles = self
            .market_data
            .get_candles(instrument, self.config.intraday_interval, self.config.intraday_count)
            .await
            .map_err(EngineError::from)?;
        let Some(current) = candles.last() else {
            return Err(EngineError::InsufficientData {
                required: 1,
                available: 0,
            }
            .into());
        };

        let now = current.timestamp;
        let session_start = self.config.session_start(now);
        let daily = self.daily_levels(state, session_start, &candles).await?;

        let (session, orb) = state.advance(session_start, &candles).await;

        let session_candles: Vec<Candle> = candles
            .iter()
            .filter(|c| c.timestamp >= session_start)
            .copied()
            .collect();
        let book = ImbalanceBook::refresh(&self.detector, &session_candles, &daily.zones);
        let imbalances = state.set_imbalances(book).await;

        let ctx = EvaluationContext {
            instrument: instrument.to_string(),
            timestamp: now,
            candles,
            zones: Arc::clone(&daily.zones),
            session: (*session).clone(),
            orb,
            imbalances,
        };

        let Some(signal) = self.engine.evaluate(&ctx).await? else {
            debug!(instrument, "No signal");
            return Ok(None);
        };

        // The current candle is re-read until it closes
        let key = PublishedKey::from(&signal);
        if state.already_published(&key).await {
            debug!(instrument, setup = %signal.setup_type, "Signal already published for this candle");
            return Ok(None);
        }
        self.sink.publish(&signal).await?;
        state.mark_published(key).await;
        Ok(Some(signal))
    }

    /// Daily levels for the session containing `at`, computed on first use
    pub async fn levels(
        &self,
        instrument: &str,
        at: DateTime<Utc>,
    ) -> Result<Arc<DailyLevels>, OrchestratorError> {
        let state = self
            .state(instrument)
            .ok_or_else(|| OrchestratorError::UnknownInstrument(instrument.to_string()))?;
        self.daily_levels(&state, self.config.session_start(at), &[]).await
    }

    /// Cached levels for the session's day, recomputing them on rollover
    async fn daily_levels(
        &self,
        state: &InstrumentState,
        session_start: DateTime<Utc>,
        intraday: &[Candle],
    ) -> Result<Arc<DailyLevels>, OrchestratorError> {
        let day = session_start.date_naive();
        if let Some(levels) = state.daily_for(day).await {
            return Ok(levels);
        }

        let instrument = state.instrument();
        let daily = self
            .market_data
            .get_candles(
                instrument,
                CandleInterval::OneDay,
                self.strategy.volatility.lookback_days + 1,
            )
            .await
            .map_err(EngineError::from)?;

        let closes: Vec<f64> = daily
            .iter()
            .filter(|c| c.timestamp.date_naive() < day)
            .map(|c| c.close)
            .collect();
        let estimate = self.forecaster.forecast(&closes, day)?;

        let reference_open = daily
            .iter()
            .find(|c| c.timestamp.date_naive() == day)
            .map(|c| c.open)
            .or_else(|| {
                intraday
                    .iter()
                    .find(|c| c.timestamp >= session_start)
                    .map(|c| c.open)
            })
            .ok_or_else(|| {
                EngineError::DataUnavailable(format!("no reference open for {} on {}", instrument, day))
            })?;
        let zones = self.zone_engine.build_map(reference_open, estimate.averaged_pct)?;

        info!(
            instrument,
            %day,
            reference_open,
            averaged_pct = estimate.averaged_pct,
            degraded = ?estimate.degraded_models,
            "Daily levels computed"
        );

        Ok(state
            .set_daily(DailyLevels {
                day,
                estimate,
                zones: Arc::new(zones),
            })
            .await)
    }

    pub async fn status(&self) -> OrchestratorStatus {
        let mut instruments = Vec::with_capacity(self.instruments.len());
        for name in &self.config.instruments {
            let Some(state) = self.state(name) else { continue };
            let daily = state.daily().await;
            instruments.push(InstrumentStatus {
                instrument: name.clone(),
                day: daily.as_ref().map(|d| d.day),
                averaged_pct: daily.as_ref().map(|d| d.estimate.averaged_pct),
                session_bias: state.session_bias().await,
                live_imbalances: state.imbalances().await.len(),
            });
        }
        OrchestratorStatus {
            is_running: *self.is_running.read().await,
            instruments,
        }
    }
}
