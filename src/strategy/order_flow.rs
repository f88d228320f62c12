//! Order Flow Gate
//!
//! Samples the order book and trade tape around a candidate level and turns
//! what it sees into a directional bias with a confidence:
//! - Walls: resting notional within the proximity band above the wall minimum
//! - Absorption: one side is hit persistently while price holds the level
//! - Volume surge: aggressive notional well above the instrument's baseline
//! - Delta: net aggressive buy/sell share over the window
//!
//! Evidence is scored per side; the gate only calls a bias when one side
//! leads clearly. A sample that does not arrive within the window plus grace
//! is `DataUnavailable`.
//!
//! One `observe` call per instrument per tick feeds every level read in that
//! tick, so the surge baseline advances once per tick.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::domain::{Bias, EngineError, EngineResult, TradeSide};
use crate::ports::{Aggressor, OrderBookPort, OrderBookSample};
use crate::strategy::params::OrderFlowConfig;

/// Evidence weights per side
const WALL_WEIGHT: f64 = 0.35;
const ABSORPTION_WEIGHT: f64 = 0.25;
const SURGE_WEIGHT: f64 = 0.20;
const DELTA_WEIGHT: f64 = 0.20;

/// Boolean observations behind a reading
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderFlowFlags {
    /// Sellers keep hitting bids but price holds the level
    pub absorbing_bids: bool,
    /// Buyers keep lifting offers but price holds the level
    pub absorbing_asks: bool,
    pub buy_volume_surge: bool,
    pub sell_volume_surge: bool,
    pub bid_wall: bool,
    pub ask_wall: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrderFlowReading {
    pub bias: Bias,
    /// 0 when neutral
    pub confidence: f64,
    pub flags: OrderFlowFlags,
}

impl OrderFlowReading {
    pub fn neutral() -> Self {
        Self {
            bias: Bias::Neutral,
            confidence: 0.0,
            flags: OrderFlowFlags::default(),
        }
    }
}

/// Level and side a candidate wants confirmed
#[derive(Debug, Clone, PartialEq)]
pub struct OrderFlowQuery {
    pub instrument: String,
    pub level: f64,
    pub side: TradeSide,
}

impl OrderFlowQuery {
    pub fn new(instrument: impl Into<String>, level: f64, side: TradeSide) -> Self {
        Self {
            instrument: instrument.into(),
            level,
            side,
        }
    }
}

/// One order-book sample and the surge baseline it is judged against
#[derive(Debug, Clone, PartialEq)]
pub struct FlowObservation {
    pub instrument: String,
    pub sample: OrderBookSample,
    /// Baseline before this sample was folded in
    pub baseline: Option<f64>,
}

/// Aggregates of one sample relative to a level
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FlowMetrics {
    /// Mean resting bid notional inside the band per snapshot
    pub bid_notional: f64,
    /// Mean resting ask notional inside the band per snapshot
    pub ask_notional: f64,
    pub buy_notional: f64,
    pub sell_notional: f64,
    pub buy_trades: usize,
    pub sell_trades: usize,
    pub min_trade_price: Option<f64>,
    pub max_trade_price: Option<f64>,
}

impl FlowMetrics {
    pub fn measure(sample: &OrderBookSample, level: f64, tolerance: f64) -> Self {
        let near = |price: f64| (price - level).abs() <= tolerance;

        let mut metrics = FlowMetrics::default();
        if !sample.snapshots.is_empty() {
            let count = sample.snapshots.len() as f64;
            for snapshot in &sample.snapshots {
                metrics.bid_notional += snapshot
                    .bids
                    .iter()
                    .filter(|l| near(l.price))
                    .map(|l| l.notional())
                    .sum::<f64>();
                metrics.ask_notional += snapshot
                    .asks
                    .iter()
                    .filter(|l| near(l.price))
                    .map(|l| l.notional())
                    .sum::<f64>();
            }
            metrics.bid_notional /= count;
            metrics.ask_notional /= count;
        }

        for trade in &sample.trades {
            match trade.aggressor {
                Aggressor::Buy => {
                    metrics.buy_notional += trade.notional();
                    metrics.buy_trades += 1;
                }
                Aggressor::Sell => {
                    metrics.sell_notional += trade.notional();
                    metrics.sell_trades += 1;
                }
            }
            metrics.min_trade_price = Some(metrics.min_trade_price.map_or(trade.price, |p| p.min(trade.price)));
            metrics.max_trade_price = Some(metrics.max_trade_price.map_or(trade.price, |p| p.max(trade.price)));
        }

        metrics
    }

    pub fn aggressive_notional(&self) -> f64 {
        self.buy_notional + self.sell_notional
    }

    /// Net aggressive share in [-1, 1]; positive when buyers dominate
    pub fn delta(&self) -> f64 {
        let total = self.aggressive_notional();
        if total <= 0.0 {
            0.0
        } else {
            (self.buy_notional - self.sell_notional) / total
        }
    }
}

/// Score one sample against a level.
///
/// `baseline` is the instrument's typical aggressive notional per window;
/// without one no surge can be called.
pub fn analyze(
    sample: &OrderBookSample,
    level: f64,
    baseline: Option<f64>,
    config: &OrderFlowConfig,
) -> OrderFlowReading {
    let tolerance = level.abs() * config.tolerance_bps / 10_000.0;
    let metrics = FlowMetrics::measure(sample, level, tolerance);

    let total = metrics.aggressive_notional();
    let sell_share = if total > 0.0 { metrics.sell_notional / total } else { 0.0 };
    let buy_share = if total > 0.0 { metrics.buy_notional / total } else { 0.0 };

    let held_above = metrics.min_trade_price.map_or(false, |p| p >= level - tolerance);
    let held_below = metrics.max_trade_price.map_or(false, |p| p <= level + tolerance);

    let surge = matches!(baseline, Some(b) if b > 0.0 && total > b * config.surge_multiple);

    let flags = OrderFlowFlags {
        absorbing_bids: sell_share >= config.absorption_dominance
            && metrics.sell_trades >= config.absorption_min_trades
            && held_above,
        absorbing_asks: buy_share >= config.absorption_dominance
            && metrics.buy_trades >= config.absorption_min_trades
            && held_below,
        buy_volume_surge: surge && metrics.buy_notional >= metrics.sell_notional,
        sell_volume_surge: surge && metrics.sell_notional > metrics.buy_notional,
        bid_wall: metrics.bid_notional >= config.wall_min_notional,
        ask_wall: metrics.ask_notional >= config.wall_min_notional,
    };

    let weight = |on: bool, w: f64| if on { w } else { 0.0 };
    let delta = metrics.delta();
    let long_score = weight(flags.bid_wall, WALL_WEIGHT)
        + weight(flags.absorbing_bids, ABSORPTION_WEIGHT)
        + weight(flags.buy_volume_surge, SURGE_WEIGHT)
        + DELTA_WEIGHT * delta.max(0.0);
    let short_score = weight(flags.ask_wall, WALL_WEIGHT)
        + weight(flags.absorbing_asks, ABSORPTION_WEIGHT)
        + weight(flags.sell_volume_surge, SURGE_WEIGHT)
        + DELTA_WEIGHT * (-delta).max(0.0);

    let (bias, confidence) = if long_score - short_score >= config.bias_margin
        && long_score >= config.min_evidence
    {
        (Bias::Long, (long_score - short_score).clamp(0.0, 1.0))
    } else if short_score - long_score >= config.bias_margin && short_score >= config.min_evidence {
        (Bias::Short, (short_score - long_score).clamp(0.0, 1.0))
    } else {
        (Bias::Neutral, 0.0)
    };

    OrderFlowReading {
        bias,
        confidence,
        flags,
    }
}

/// Bounded order-flow confirmation against the order-book port
pub struct OrderFlowGate {
    port: Arc<dyn OrderBookPort>,
    config: OrderFlowConfig,
    /// Smoothed aggressive notional per instrument
    baselines: Mutex<HashMap<String, f64>>,
}

impl OrderFlowGate {
    pub fn new(port: Arc<dyn OrderBookPort>, config: OrderFlowConfig) -> Self {
        Self {
            port,
            config,
            baselines: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &OrderFlowConfig {
        &self.config
    }

    pub fn window(&self) -> Duration {
        Duration::from_millis(self.config.window_ms)
    }

    /// Longest a confirmation may take before it is abandoned
    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.config.window_ms + self.config.timeout_grace_ms)
    }

    pub fn baseline(&self, instrument: &str) -> Option<f64> {
        self.baselines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(instrument)
            .copied()
    }

    /// Sample the book for `instrument` and advance its surge baseline.
    ///
    /// Never blocks past the deadline. Missing or empty samples are
    /// `DataUnavailable`; the caller decides what to do with its candidates.
    pub async fn observe(&self, instrument: &str) -> EngineResult<FlowObservation> {
        let sample = match tokio::time::timeout(self.deadline(), self.port.sample(instrument, self.window())).await {
            Ok(Ok(sample)) => sample,
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => {
                warn!(
                    instrument,
                    deadline_ms = self.deadline().as_millis() as u64,
                    "Order book sample timed out"
                );
                return Err(EngineError::DataUnavailable(format!(
                    "order book sample for {} timed out",
                    instrument
                )));
            }
        };

        if sample.is_empty() {
            return Err(EngineError::DataUnavailable(format!(
                "empty order book sample for {}",
                instrument
            )));
        }

        let baseline = self.baseline(instrument);
        self.update_baseline(instrument, &sample);
        Ok(FlowObservation {
            instrument: instrument.to_string(),
            sample,
            baseline,
        })
    }

    /// Score an observation around one level
    pub fn read(&self, observation: &FlowObservation, level: f64, side: TradeSide) -> OrderFlowReading {
        let reading = analyze(&observation.sample, level, observation.baseline, &self.config);
        debug!(
            instrument = %observation.instrument,
            level,
            side = %side,
            bias = ?reading.bias,
            confidence = reading.confidence,
            flags = ?reading.flags,
            "Order flow read"
        );
        reading
    }

    /// Observe and read a single level
    pub async fn confirm(&self, query: &OrderFlowQuery) -> EngineResult<OrderFlowReading> {
        let observation = self.observe(&query.instrument).await?;
        Ok(self.read(&observation, query.level, query.side))
    }

    fn update_baseline(&self, instrument: &str, sample: &OrderBookSample) {
        let observed: f64 = sample.trades.iter().map(|t| t.notional()).sum();
        let alpha = self.config.baseline_alpha;
        let mut baselines = self.baselines.lock().unwrap_or_else(PoisonError::into_inner);
        baselines
            .entry(instrument.to_string())
            .and_modify(|b| *b = alpha * observed + (1.0 - alpha) * *b)
            .or_insert(observed);
    }
}
