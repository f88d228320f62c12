//! Signal Decision Engine
//!
//! Resolves at most one signal per evaluation tick:
//! 1. While the opening range is still collecting nothing is emitted. On the
//!    tick the breakout confirms only the ORB setup is considered.
//! 2. Otherwise candidates are zone boundaries near price (breakout or
//!    rejection) and live imbalances price just re-entered or ran through.
//! 3. The order book is sampled once for the tick. Each candidate gets a
//!    profile reading and an order-flow reading at its level. Flow that cannot
//!    be sampled drops every candidate, and an ORB candidate also needs flow
//!    agreeing with the breakout direction.
//! 4. Confidence = base * flow factor * profile factor * session factor.
//!    The highest candidate at or above the acceptance threshold wins; ties
//!    go to the earlier candidate.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::domain::{
    Bias, Candle, EngineError, EngineResult, SessionContext, SetupType, Signal, SignalContext,
    TradeSide, ZoneInfo,
};
use crate::strategy::imbalance::{Direction, Imbalance, ImbalanceBook};
use crate::strategy::opening_range::OrbUpdate;
use crate::strategy::order_flow::{OrderFlowGate, OrderFlowReading};
use crate::strategy::params::DecisionConfig;
use crate::strategy::profile::{ProfileClassifier, ProfileReading, VolumeNode, VolumeProfile};
use crate::strategy::zone_engine::{ZoneLevel, ZoneMap};

/// Base confidence per setup before gating
const ORB_BASE: f64 = 0.65;
const ZONE_BREAKOUT_BASE: f64 = 0.60;
const ZONE_REJECTION_BASE: f64 = 0.60;
const IMBALANCE_RETEST_BASE: f64 = 0.55;
const IMBALANCE_CONTINUATION_BASE: f64 = 0.50;

/// Order flow agreeing with the candidate: floor plus confidence share
const FLOW_ALIGNED_FLOOR: f64 = 0.70;
const FLOW_ALIGNED_SLOPE: f64 = 0.50;
const FLOW_NEUTRAL: f64 = 0.50;
const FLOW_OPPOSED: f64 = 0.15;

/// HVN favours rejections, LVN favours breakouts
const PROFILE_MATCH_FLOOR: f64 = 1.0;
const PROFILE_MATCH_SLOPE: f64 = 0.20;
const PROFILE_NEUTRAL: f64 = 0.90;
const PROFILE_MISMATCH: f64 = 0.75;

const SESSION_ALIGNED: f64 = 1.15;
const SESSION_OPPOSED: f64 = 0.70;

/// Everything one evaluation tick looks at
#[derive(Debug, Clone)]
pub struct EvaluationContext {
    pub instrument: String,
    pub timestamp: DateTime<Utc>,
    /// Intraday candles, ascending; the last one is the current candle
    pub candles: Vec<Candle>,
    pub zones: Arc<ZoneMap>,
    /// Snapshot of the session after the current candle was applied
    pub session: SessionContext,
    /// What the current candle did to the opening range tracker
    pub orb: OrbUpdate,
    pub imbalances: Arc<ImbalanceBook>,
}

impl EvaluationContext {
    fn current(&self) -> Option<&Candle> {
        self.candles.last()
    }

    fn previous(&self) -> Option<&Candle> {
        self.candles.iter().rev().nth(1)
    }
}

/// A setup that has not yet been gated
#[derive(Debug, Clone)]
struct Candidate {
    setup: SetupType,
    side: TradeSide,
    /// Price the order flow is read at
    level: f64,
    zone: ZoneInfo,
    imbalance: Option<Imbalance>,
    entry: f64,
    take_profit: f64,
    stop_loss: f64,
    base_confidence: f64,
}

/// A candidate after gating
#[derive(Debug, Clone)]
struct Scored {
    candidate: Candidate,
    profile: ProfileReading,
    flow: OrderFlowReading,
    confidence: f64,
}

pub struct SignalDecisionEngine {
    config: DecisionConfig,
    profile: ProfileClassifier,
    gate: Arc<OrderFlowGate>,
}

impl SignalDecisionEngine {
    pub fn new(config: DecisionConfig, profile: ProfileClassifier, gate: Arc<OrderFlowGate>) -> Self {
        Self {
            config,
            profile,
            gate,
        }
    }

    pub fn config(&self) -> &DecisionConfig {
        &self.config
    }

    /// Evaluate one tick. `Ok(None)` is the normal "no signal" outcome.
    pub async fn evaluate(&self, ctx: &EvaluationContext) -> EngineResult<Option<Signal>> {
        let Some(current) = ctx.current() else {
            return Err(EngineError::InsufficientData {
                required: 1,
                available: 0,
            });
        };
        if !current.is_valid() {
            return Err(EngineError::NonFiniteInput(format!(
                "current candle at {} is malformed",
                current.timestamp
            )));
        }

        let candidates = match ctx.orb {
            OrbUpdate::Confirmed(side) => self.orb_candidate(ctx, current, side).into_iter().collect(),
            _ if ctx.session.is_collecting() => Vec::new(),
            _ => {
                let mut candidates = self.zone_candidates(ctx, current);
                candidates.extend(self.imbalance_candidates(ctx, current));
                candidates
            }
        };
        if candidates.is_empty() {
            return Ok(None);
        }

        let observation = match self.gate.observe(&ctx.instrument).await {
            Ok(observation) => observation,
            Err(e) => {
                debug!(
                    instrument = %ctx.instrument,
                    candidates = candidates.len(),
                    error = %e,
                    "Order flow unavailable, dropping candidates"
                );
                return Ok(None);
            }
        };

        let profile = self.build_profile(ctx, current.close);
        let session_bias = ctx.session.session_bias();
        let mut best: Option<Scored> = None;
        for candidate in candidates {
            let flow = self.gate.read(&observation, candidate.level, candidate.side);
            if candidate.setup == SetupType::Orb && !flow.bias.aligns_with(candidate.side) {
                debug!(
                    instrument = %ctx.instrument,
                    side = %candidate.side,
                    flow = ?flow.bias,
                    "Opening range breakout not confirmed by order flow"
                );
                continue;
            }
            let profile_reading = match &profile {
                Some(profile) => self.profile.classify_with(profile, candidate.level),
                None => ProfileReading::neutral(candidate.level),
            };
            let confidence = score(&candidate, &profile_reading, &flow, session_bias);

            debug!(
                setup = %candidate.setup,
                side = %candidate.side,
                level = candidate.level,
                flow = ?flow.bias,
                node = %profile_reading.node,
                confidence,
                "Candidate scored"
            );

            if confidence < self.config.acceptance_threshold {
                continue;
            }
            if best.as_ref().map_or(true, |b| confidence > b.confidence) {
                best = Some(Scored {
                    candidate,
                    profile: profile_reading,
                    flow,
                    confidence,
                });
            }
        }

        let Some(best) = best else {
            return Ok(None);
        };
        let signal = build_signal(ctx, session_bias, best);
        if let Err(reason) = signal.validate() {
            debug!(instrument = %ctx.instrument, %reason, "Discarding malformed signal");
            return Ok(None);
        }

        info!(
            instrument = %signal.instrument,
            setup = %signal.setup_type,
            side = %signal.side,
            entry = signal.entry,
            confidence = signal.confidence,
            "Signal emitted"
        );
        Ok(Some(signal))
    }

    fn build_profile(&self, ctx: &EvaluationContext, price: f64) -> Option<VolumeProfile> {
        let lookback = self.profile.config().lookback_candles.min(ctx.candles.len());
        let window = &ctx.candles[ctx.candles.len() - lookback..];
        match VolumeProfile::build(window, price * self.profile.config().bucket_size_pct) {
            Ok(profile) => Some(profile),
            Err(e) => {
                debug!(instrument = %ctx.instrument, error = %e, "No volume profile, using neutral context");
                None
            }
        }
    }

    fn orb_candidate(&self, ctx: &EvaluationContext, current: &Candle, side: TradeSide) -> Option<Candidate> {
        let (low, high) = ctx.session.opening_range()?;
        let level = match side {
            TradeSide::Long => high,
            TradeSide::Short => low,
        };
        let entry = current.close;
        Some(Candidate {
            setup: SetupType::Orb,
            side,
            level,
            zone: ZoneInfo {
                level_price: level,
                level_label: match side {
                    TradeSide::Long => "ORH".to_string(),
                    TradeSide::Short => "ORL".to_string(),
                },
                quadrant: ctx.zones.quadrant_of(level),
            },
            imbalance: None,
            entry,
            take_profit: target_beyond(&ctx.zones, entry, side),
            stop_loss: (low + high) / 2.0,
            base_confidence: ORB_BASE,
        })
    }

    fn zone_candidates(&self, ctx: &EvaluationContext, current: &Candle) -> Vec<Candidate> {
        let Some(previous) = ctx.previous() else {
            return Vec::new();
        };
        let touch = self.config.rejection_touch_bps / 10_000.0;
        let buffer = self.config.stop_buffer_pct;
        let entry = current.close;

        let mut candidates = Vec::new();
        for ZoneLevel { price: level, label } in
            ctx.zones.boundaries_near(entry, self.config.touch_tolerance_pct)
        {
            let (setup, side, stop_loss) = if previous.close <= level && entry > level {
                (SetupType::ZoneBreakout, TradeSide::Long, level * (1.0 - buffer))
            } else if previous.close >= level && entry < level {
                (SetupType::ZoneBreakout, TradeSide::Short, level * (1.0 + buffer))
            } else if previous.close > level
                && entry > level
                && current.low <= level * (1.0 + touch)
                && current.is_bullish()
            {
                let stop = current.low.min(level) * (1.0 - buffer);
                (SetupType::ZoneRejection, TradeSide::Long, stop)
            } else if previous.close < level
                && entry < level
                && current.high >= level * (1.0 - touch)
                && current.is_bearish()
            {
                let stop = current.high.max(level) * (1.0 + buffer);
                (SetupType::ZoneRejection, TradeSide::Short, stop)
            } else {
                continue;
            };

            let base_confidence = match setup {
                SetupType::ZoneBreakout => ZONE_BREAKOUT_BASE,
                _ => ZONE_REJECTION_BASE,
            };
            candidates.push(Candidate {
                setup,
                side,
                level,
                zone: ZoneInfo {
                    level_price: level,
                    level_label: label,
                    quadrant: ctx.zones.quadrant_of(level),
                },
                imbalance: None,
                entry,
                take_profit: target_beyond(&ctx.zones, entry, side),
                stop_loss,
                base_confidence,
            });
        }
        candidates
    }

    fn imbalance_candidates(&self, ctx: &EvaluationContext, current: &Candle) -> Vec<Candidate> {
        let Some(previous) = ctx.previous() else {
            return Vec::new();
        };
        let buffer = self.config.stop_buffer_pct;
        let entry = current.close;

        let mut candidates = Vec::new();
        for imbalance in ctx.imbalances.live() {
            let (upper, lower) = (imbalance.upper_boundary, imbalance.lower_boundary);
            let setup = match imbalance.direction {
                Direction::Bullish if previous.close > upper && current.low <= upper && entry >= lower => {
                    SetupType::ImbalanceRetest
                }
                Direction::Bearish if previous.close < lower && current.high >= lower && entry <= upper => {
                    SetupType::ImbalanceRetest
                }
                Direction::Bullish if previous.close < lower && entry > upper => {
                    SetupType::ImbalanceContinuation
                }
                Direction::Bearish if previous.close > upper && entry < lower => {
                    SetupType::ImbalanceContinuation
                }
                _ => continue,
            };

            let side = imbalance.direction.side();
            let (level, stop_loss) = match side {
                TradeSide::Long => (upper, lower * (1.0 - buffer)),
                TradeSide::Short => (lower, upper * (1.0 + buffer)),
            };
            let nearest = nearest_level(&ctx.zones, imbalance.midpoint);
            candidates.push(Candidate {
                setup,
                side,
                level,
                zone: ZoneInfo {
                    level_price: nearest.price,
                    level_label: nearest.label,
                    quadrant: imbalance.zone_quadrant,
                },
                imbalance: Some(imbalance.clone()),
                entry,
                take_profit: target_beyond(&ctx.zones, entry, side),
                stop_loss,
                base_confidence: match setup {
                    SetupType::ImbalanceRetest => IMBALANCE_RETEST_BASE,
                    _ => IMBALANCE_CONTINUATION_BASE,
                },
            });
        }
        candidates
    }
}

fn score(candidate: &Candidate, profile: &ProfileReading, flow: &OrderFlowReading, session: Bias) -> f64 {
    let flow_factor = if flow.bias.aligns_with(candidate.side) {
        FLOW_ALIGNED_FLOOR + FLOW_ALIGNED_SLOPE * flow.confidence
    } else if flow.bias.opposes(candidate.side) {
        FLOW_OPPOSED
    } else {
        FLOW_NEUTRAL
    };

    let favoured = match profile.node {
        VolumeNode::Hvn => Some(candidate.setup.is_rejection_style()),
        VolumeNode::Lvn => Some(candidate.setup.is_breakout_style()),
        VolumeNode::Neutral => None,
    };
    let profile_factor = match favoured {
        Some(true) => PROFILE_MATCH_FLOOR + PROFILE_MATCH_SLOPE * profile.confidence,
        Some(false) => PROFILE_MISMATCH,
        None => PROFILE_NEUTRAL,
    };

    let session_factor = if session.aligns_with(candidate.side) {
        SESSION_ALIGNED
    } else if session.opposes(candidate.side) {
        SESSION_OPPOSED
    } else {
        1.0
    };

    (candidate.base_confidence * flow_factor * profile_factor * session_factor).clamp(0.0, 1.0)
}

/// Next zone level beyond `entry` in the trade direction, extending the
/// ladder by whole spacings past the outer bound
fn target_beyond(zones: &ZoneMap, entry: f64, side: TradeSide) -> f64 {
    let spacing = zones.spacing();
    match side {
        TradeSide::Long => zones.level_above(entry).map(|l| l.price).unwrap_or_else(|| {
            let steps = ((entry - zones.upper_bound) / spacing).floor().max(0.0) + 1.0;
            zones.upper_bound + steps * spacing
        }),
        TradeSide::Short => zones.level_below(entry).map(|l| l.price).unwrap_or_else(|| {
            let steps = ((zones.lower_bound - entry) / spacing).floor().max(0.0) + 1.0;
            zones.lower_bound - steps * spacing
        }),
    }
}

fn nearest_level(zones: &ZoneMap, price: f64) -> ZoneLevel {
    zones
        .boundaries()
        .into_iter()
        .min_by(|a, b| (a.price - price).abs().total_cmp(&(b.price - price).abs()))
        .unwrap_or(ZoneLevel {
            price: zones.reference_open,
            label: "OPEN".to_string(),
        })
}

fn build_signal(ctx: &EvaluationContext, session_bias: Bias, scored: Scored) -> Signal {
    let Scored {
        candidate,
        profile,
        flow,
        confidence,
    } = scored;

    let mut reason = format!(
        "{} {} at {} ({:.2}): profile {} ({:.2}), order flow {} ({:.2}), session bias {}",
        candidate.setup,
        candidate.side,
        candidate.zone.level_label,
        candidate.level,
        profile.node,
        profile.confidence,
        flow.bias,
        flow.confidence,
        session_bias,
    );
    if let Some(imbalance) = &candidate.imbalance {
        reason.push_str(&format!(
            ", {} {} {:.2}-{:.2}",
            imbalance.direction, imbalance.kind, imbalance.lower_boundary, imbalance.upper_boundary
        ));
    }

    Signal {
        instrument: ctx.instrument.clone(),
        timestamp: ctx.timestamp,
        setup_type: candidate.setup,
        side: candidate.side,
        entry: candidate.entry,
        take_profit: candidate.take_profit,
        stop_loss: candidate.stop_loss,
        confidence,
        context: SignalContext {
            session_bias,
            profile,
            order_flow: flow,
            zone: candidate.zone,
            imbalance: candidate.imbalance,
            reason,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::mocks::ScriptedOrderBook;
    use crate::ports::{Aggressor, BookLevel, BookSnapshot, OrderBookSample, TapeTrade};
    use crate::strategy::imbalance::ImbalanceKind;
    use crate::strategy::params::{OrderFlowConfig, ProfileConfig};
    use crate::strategy::zone_engine::{ZoneEngine, ZoneQuadrant};
    use approx::assert_relative_eq;
    use chrono::{Duration, TimeZone};
    use regex::Regex;

    const INSTRUMENT: &str = "BTCUSDT";

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
    }

    fn at(minute: i64) -> DateTime<Utc> {
        start() + Duration::minutes(minute)
    }

    fn create_test_zones() -> Arc<ZoneMap> {
        Arc::new(ZoneEngine::build(100_000.0, 0.025, 4).unwrap())
    }

    /// Resting size and aggressive flow in favour of `side` around `level`
    fn flow_sample(level: f64, side: TradeSide) -> OrderBookSample {
        let s = side.sign();
        let resting = vec![BookLevel::new(level - s * 10.0, 1.0)];
        let (bids, asks) = match side {
            TradeSide::Long => (resting, vec![]),
            TradeSide::Short => (vec![], resting),
        };
        let (with, against) = match side {
            TradeSide::Long => (Aggressor::Buy, Aggressor::Sell),
            TradeSide::Short => (Aggressor::Sell, Aggressor::Buy),
        };
        let ts = at(30);
        OrderBookSample {
            snapshots: vec![BookSnapshot {
                timestamp: ts,
                bids,
                asks,
            }],
            trades: vec![
                TapeTrade { timestamp: ts, price: level + s * 100.0, size: 0.5, aggressor: with },
                TapeTrade { timestamp: ts, price: level + s * 110.0, size: 0.4, aggressor: with },
                TapeTrade { timestamp: ts, price: level, size: 0.1, aggressor: against },
            ],
        }
    }

    fn create_test_engine(book: ScriptedOrderBook) -> SignalDecisionEngine {
        let gate = OrderFlowGate::new(Arc::new(book), OrderFlowConfig::default());
        SignalDecisionEngine::new(
            DecisionConfig::default(),
            ProfileClassifier::new(ProfileConfig::default()),
            Arc::new(gate),
        )
    }

    fn watching_session() -> SessionContext {
        let mut session = SessionContext::new(start());
        session.opening_range_low = Some(100_000.0);
        session.opening_range_high = Some(100_400.0);
        session.phase = crate::domain::SessionPhase::Watching;
        session
    }

    /// Heavy trade between 101000 and 102000, then a thin push through the
    /// upper bound closing 0.2% above it
    fn breakout_candles() -> Vec<Candle> {
        let mut candles: Vec<Candle> = (0..20)
            .map(|i| Candle::new(at(10 + i), 101_500.0, 102_000.0, 101_000.0, 101_600.0, 1_000.0))
            .collect();
        candles.push(Candle::new(at(30), 102_300.0, 102_450.0, 102_280.0, 102_400.0, 5.0));
        candles.push(Candle::new(at(31), 102_400.0, 102_720.0, 102_380.0, 102_705.0, 5.0));
        candles
    }

    fn create_test_context(candles: Vec<Candle>, session: SessionContext) -> EvaluationContext {
        EvaluationContext {
            instrument: INSTRUMENT.to_string(),
            timestamp: candles.last().map(|c| c.timestamp).unwrap_or_else(start),
            candles,
            zones: create_test_zones(),
            session,
            orb: OrbUpdate::None,
            imbalances: Arc::new(ImbalanceBook::default()),
        }
    }

    #[tokio::test]
    async fn test_lvn_breakout_with_long_flow() {
        let book = ScriptedOrderBook::new().with_sample(INSTRUMENT, flow_sample(102_500.0, TradeSide::Long));
        let engine = create_test_engine(book);
        let ctx = create_test_context(breakout_candles(), watching_session());

        let signal = engine.evaluate(&ctx).await.unwrap().expect("breakout signal");
        assert_eq!(signal.setup_type, SetupType::ZoneBreakout);
        assert_eq!(signal.side, TradeSide::Long);
        assert!(signal.confidence > 0.6 && signal.confidence <= 1.0);
        assert_eq!(signal.context.profile.node, VolumeNode::Lvn);
        assert_eq!(signal.context.order_flow.bias, Bias::Long);
        assert_eq!(signal.context.zone.level_label, "R4");
        assert_eq!(signal.context.zone.quadrant, ZoneQuadrant::UpperOuter);

        assert_relative_eq!(signal.entry, 102_705.0);
        // Beyond the ladder: one spacing past the upper bound
        assert_relative_eq!(signal.take_profit, 103_125.0, epsilon = 1e-6);
        assert_relative_eq!(signal.stop_loss, 102_500.0 * 0.998, epsilon = 1e-6);
        assert!(signal.validate().is_ok());

        let reason = Regex::new(r"^ZONE_BREAKOUT LONG at R4 \(102500\.00\): profile LVN \(\d\.\d\d\), order flow long").unwrap();
        assert!(reason.is_match(&signal.context.reason), "{}", signal.context.reason);
    }

    #[tokio::test]
    async fn test_breakout_against_flow_is_gated_out() {
        let book = ScriptedOrderBook::new().with_sample(INSTRUMENT, flow_sample(102_500.0, TradeSide::Short));
        let engine = create_test_engine(book.clone());
        let ctx = create_test_context(breakout_candles(), watching_session());

        assert!(engine.evaluate(&ctx).await.unwrap().is_none());
        assert_eq!(book.get_calls().len(), 1);
    }

    #[tokio::test]
    async fn test_unavailable_flow_drops_candidate() {
        let book = ScriptedOrderBook::new().with_failure(INSTRUMENT, "no depth");
        let engine = create_test_engine(book);
        let ctx = create_test_context(breakout_candles(), watching_session());

        assert_eq!(engine.evaluate(&ctx).await, Ok(None));
    }

    #[tokio::test]
    async fn test_collecting_session_emits_nothing() {
        let book = ScriptedOrderBook::new().with_sample(INSTRUMENT, flow_sample(102_500.0, TradeSide::Long));
        let engine = create_test_engine(book.clone());
        let ctx = create_test_context(breakout_candles(), SessionContext::new(start()));

        assert!(engine.evaluate(&ctx).await.unwrap().is_none());
        assert!(book.get_calls().is_empty());
    }

    #[tokio::test]
    async fn test_orb_signal_on_confirmation() {
        let book = ScriptedOrderBook::new().with_sample(INSTRUMENT, flow_sample(100_400.0, TradeSide::Long));
        let engine = create_test_engine(book);

        let mut session = watching_session();
        session.resolve_bias(Bias::Long);
        let candles = vec![
            Candle::new(at(6), 100_350.0, 100_520.0, 100_340.0, 100_510.0, 20.0),
            Candle::new(at(7), 100_510.0, 100_610.0, 100_500.0, 100_600.0, 20.0),
        ];
        let mut ctx = create_test_context(candles, session);
        ctx.orb = OrbUpdate::Confirmed(TradeSide::Long);

        let signal = engine.evaluate(&ctx).await.unwrap().expect("orb signal");
        assert_eq!(signal.setup_type, SetupType::Orb);
        assert_eq!(signal.side, TradeSide::Long);
        assert_eq!(signal.context.session_bias, Bias::Long);
        assert_eq!(signal.context.zone.level_label, "ORH");
        assert_relative_eq!(signal.stop_loss, 100_200.0);
        assert_relative_eq!(signal.take_profit, 100_625.0, epsilon = 1e-6);
    }

    #[tokio::test]
    async fn test_imbalance_retest() {
        let book = ScriptedOrderBook::new().with_sample(INSTRUMENT, flow_sample(101_200.0, TradeSide::Long));
        let engine = create_test_engine(book);

        let zones = create_test_zones();
        let gap = Imbalance {
            kind: ImbalanceKind::FairValueGap,
            direction: Direction::Bullish,
            upper_boundary: 101_200.0,
            lower_boundary: 101_000.0,
            midpoint: 101_100.0,
            strength: 0.6,
            zone_quadrant: zones.quadrant_of(101_100.0),
            created_at: at(12),
        };
        let mut candles: Vec<Candle> = (0..5)
            .map(|i| Candle::new(at(13 + i), 101_450.0, 101_500.0, 101_400.0, 101_450.0, 10.0))
            .collect();
        candles.push(Candle::new(at(18), 101_450.0, 101_460.0, 101_380.0, 101_400.0, 10.0));
        // Bearish candle dipping into the gap; no zone setup fires at R2
        candles.push(Candle::new(at(19), 101_400.0, 101_420.0, 101_150.0, 101_300.0, 12.0));

        let mut session = watching_session();
        session.resolve_bias(Bias::Long);
        let mut ctx = create_test_context(candles, session);
        ctx.imbalances = Arc::new(ImbalanceBook::from_imbalances(vec![gap.clone()]));

        let signal = engine.evaluate(&ctx).await.unwrap().expect("retest signal");
        assert_eq!(signal.setup_type, SetupType::ImbalanceRetest);
        assert_eq!(signal.side, TradeSide::Long);
        assert_eq!(signal.context.imbalance, Some(gap));
        assert_relative_eq!(signal.entry, 101_300.0);
        assert_relative_eq!(signal.stop_loss, 101_000.0 * 0.998, epsilon = 1e-6);
        assert_relative_eq!(signal.take_profit, 101_875.0, epsilon = 1e-6);
        assert!(signal.context.reason.contains("bullish FVG 101000.00-101200.00"));
    }

    /// Resting size far from any level and no trades: readable, but neutral
    fn quiet_sample() -> OrderBookSample {
        OrderBookSample {
            snapshots: vec![BookSnapshot {
                timestamp: at(7),
                bids: vec![BookLevel::new(99_000.0, 1.0)],
                asks: vec![BookLevel::new(101_900.0, 1.0)],
            }],
            trades: vec![],
        }
    }

    /// Heavy trade inside one bucket around R2 (101250), light trade above
    /// and below it
    fn hvn_candles() -> Vec<Candle> {
        let mut candles: Vec<Candle> = (0..20)
            .map(|i| Candle::new(at(10 + i), 101_240.0, 101_290.0, 101_210.0, 101_260.0, 1_000.0))
            .collect();
        candles.extend((0..3).map(|i| Candle::new(at(30 + i), 101_550.0, 101_700.0, 101_500.0, 101_600.0, 10.0)));
        candles.extend((0..3).map(|i| Candle::new(at(33 + i), 100_900.0, 101_000.0, 100_800.0, 100_850.0, 30.0)));
        candles
    }

    #[tokio::test]
    async fn test_orb_needs_order_flow_in_breakout_direction() {
        let book = ScriptedOrderBook::new().with_sample(INSTRUMENT, quiet_sample());
        let engine = create_test_engine(book.clone());

        // Same thin push through ORH as the confirmed ORB case: LVN at the
        // level and an aligned session bias, but no flow behind it
        let mut session = watching_session();
        session.resolve_bias(Bias::Long);
        let candles = vec![
            Candle::new(at(6), 100_350.0, 100_520.0, 100_340.0, 100_510.0, 20.0),
            Candle::new(at(7), 100_510.0, 100_610.0, 100_500.0, 100_600.0, 20.0),
        ];
        let mut ctx = create_test_context(candles, session);
        ctx.orb = OrbUpdate::Confirmed(TradeSide::Long);

        assert_eq!(engine.evaluate(&ctx).await, Ok(None));
        assert_eq!(book.get_calls().len(), 1);
    }

    #[tokio::test]
    async fn test_candidates_share_one_order_book_sample() {
        let book = ScriptedOrderBook::new().with_sample(INSTRUMENT, flow_sample(102_500.0, TradeSide::Long));
        let engine = create_test_engine(book.clone());

        let zones = create_test_zones();
        // Bullish gap the breakout candle runs straight through
        let gap = Imbalance {
            kind: ImbalanceKind::FairValueGap,
            direction: Direction::Bullish,
            upper_boundary: 102_650.0,
            lower_boundary: 102_450.0,
            midpoint: 102_550.0,
            strength: 0.5,
            zone_quadrant: zones.quadrant_of(102_550.0),
            created_at: at(29),
        };
        let mut ctx = create_test_context(breakout_candles(), watching_session());
        ctx.imbalances = Arc::new(ImbalanceBook::from_imbalances(vec![gap]));

        let signal = engine.evaluate(&ctx).await.unwrap().expect("breakout signal");
        assert_eq!(signal.setup_type, SetupType::ZoneBreakout);
        assert_eq!(book.get_calls(), vec![INSTRUMENT.to_string()]);
    }

    #[tokio::test]
    async fn test_bullish_rejection_off_hvn() {
        let book = ScriptedOrderBook::new().with_sample(INSTRUMENT, flow_sample(101_250.0, TradeSide::Long));
        let engine = create_test_engine(book);

        let mut candles = hvn_candles();
        candles.push(Candle::new(at(40), 101_380.0, 101_420.0, 101_360.0, 101_400.0, 10.0));
        // Wick back to R2, close higher
        candles.push(Candle::new(at(41), 101_300.0, 101_420.0, 101_260.0, 101_400.0, 10.0));
        let ctx = create_test_context(candles, watching_session());

        let signal = engine.evaluate(&ctx).await.unwrap().expect("rejection signal");
        assert_eq!(signal.setup_type, SetupType::ZoneRejection);
        assert_eq!(signal.side, TradeSide::Long);
        assert_eq!(signal.context.zone.level_label, "R2");
        assert_eq!(signal.context.profile.node, VolumeNode::Hvn);
        assert_eq!(signal.context.order_flow.bias, Bias::Long);
        // HVN lifts a rejection above its base
        assert!(signal.confidence > ZONE_REJECTION_BASE);

        assert_relative_eq!(signal.entry, 101_400.0);
        assert_relative_eq!(signal.stop_loss, 101_250.0 * 0.998, epsilon = 1e-6);
        assert_relative_eq!(signal.take_profit, 101_875.0, epsilon = 1e-6);
        assert!(signal.validate().is_ok());
    }

    #[tokio::test]
    async fn test_bearish_rejection_off_hvn() {
        let book = ScriptedOrderBook::new().with_sample(INSTRUMENT, flow_sample(101_250.0, TradeSide::Short));
        let engine = create_test_engine(book);

        let mut candles = hvn_candles();
        candles.push(Candle::new(at(40), 101_090.0, 101_140.0, 101_070.0, 101_100.0, 10.0));
        // Wick up to R2, close lower
        candles.push(Candle::new(at(41), 101_200.0, 101_240.0, 101_080.0, 101_100.0, 10.0));
        let ctx = create_test_context(candles, watching_session());

        let signal = engine.evaluate(&ctx).await.unwrap().expect("rejection signal");
        assert_eq!(signal.setup_type, SetupType::ZoneRejection);
        assert_eq!(signal.side, TradeSide::Short);
        assert_eq!(signal.context.zone.level_label, "R2");
        assert_eq!(signal.context.profile.node, VolumeNode::Hvn);
        assert!(signal.confidence > ZONE_REJECTION_BASE);

        assert_relative_eq!(signal.entry, 101_100.0);
        assert_relative_eq!(signal.stop_loss, 101_250.0 * 1.002, epsilon = 1e-6);
        assert_relative_eq!(signal.take_profit, 100_625.0, epsilon = 1e-6);
        assert!(signal.validate().is_ok());
    }

    #[tokio::test]
    async fn test_imbalance_continuation() {
        let book = ScriptedOrderBook::new().with_sample(INSTRUMENT, flow_sample(101_600.0, TradeSide::Long));
        let engine = create_test_engine(book);

        let zones = create_test_zones();
        let gap = Imbalance {
            kind: ImbalanceKind::FairValueGap,
            direction: Direction::Bullish,
            upper_boundary: 101_600.0,
            lower_boundary: 101_450.0,
            midpoint: 101_525.0,
            strength: 0.5,
            zone_quadrant: zones.quadrant_of(101_525.0),
            created_at: at(9),
        };
        // Volume sits below the gap, so the band itself is thin
        let mut candles: Vec<Candle> = (0..20)
            .map(|i| Candle::new(at(10 + i), 101_320.0, 101_380.0, 101_300.0, 101_340.0, 1_000.0))
            .collect();
        candles.push(Candle::new(at(30), 101_350.0, 101_420.0, 101_340.0, 101_400.0, 10.0));
        // Closes from below the gap to above it in one candle
        candles.push(Candle::new(at(31), 101_400.0, 101_680.0, 101_390.0, 101_650.0, 10.0));
        let mut ctx = create_test_context(candles, watching_session());
        ctx.imbalances = Arc::new(ImbalanceBook::from_imbalances(vec![gap.clone()]));

        let signal = engine.evaluate(&ctx).await.unwrap().expect("continuation signal");
        assert_eq!(signal.setup_type, SetupType::ImbalanceContinuation);
        assert_eq!(signal.side, TradeSide::Long);
        assert_eq!(signal.context.imbalance, Some(gap));
        assert_eq!(signal.context.profile.node, VolumeNode::Lvn);
        assert_relative_eq!(signal.entry, 101_650.0);
        assert_relative_eq!(signal.stop_loss, 101_450.0 * 0.998, epsilon = 1e-6);
        assert_relative_eq!(signal.take_profit, 101_875.0, epsilon = 1e-6);
        let reason = &signal.context.reason;
        assert!(reason.starts_with("IMBALANCE_CONTINUATION LONG"), "{}", reason);
        assert!(reason.ends_with(&format!("bullish {} 101450.00-101600.00", ImbalanceKind::FairValueGap)));
    }

    #[tokio::test]
    async fn test_empty_candles_is_an_error() {
        let engine = create_test_engine(ScriptedOrderBook::new());
        let ctx = create_test_context(Vec::new(), watching_session());
        assert!(matches!(
            engine.evaluate(&ctx).await,
            Err(EngineError::InsufficientData { .. })
        ));
    }

    #[test]
    fn test_score_factors() {
        let candidate = Candidate {
            setup: SetupType::ZoneRejection,
            side: TradeSide::Short,
            level: 100.0,
            zone: ZoneInfo {
                level_price: 100.0,
                level_label: "R1".into(),
                quadrant: ZoneQuadrant::UpperInner,
            },
            imbalance: None,
            entry: 99.5,
            take_profit: 98.0,
            stop_loss: 100.5,
            base_confidence: ZONE_REJECTION_BASE,
        };
        let hvn = ProfileReading {
            node: VolumeNode::Hvn,
            confidence: 0.5,
            ..ProfileReading::neutral(100.0)
        };
        let short_flow = OrderFlowReading {
            bias: Bias::Short,
            confidence: 0.6,
            flags: Default::default(),
        };

        let aligned = score(&candidate, &hvn, &short_flow, Bias::Short);
        assert_relative_eq!(aligned, 0.6 * (0.7 + 0.3) * 1.1 * 1.15, epsilon = 1e-12);

        let neutral_flow = OrderFlowReading::neutral();
        let lvn = ProfileReading {
            node: VolumeNode::Lvn,
            ..hvn.clone()
        };
        let weak = score(&candidate, &lvn, &neutral_flow, Bias::Long);
        assert_relative_eq!(weak, 0.6 * 0.5 * 0.75 * 0.7, epsilon = 1e-12);
        assert!(weak < DecisionConfig::default().acceptance_threshold);
    }

    #[test]
    fn test_target_beyond_extends_ladder() {
        let zones = create_test_zones();
        assert_relative_eq!(target_beyond(&zones, 100_700.0, TradeSide::Long), 101_250.0, epsilon = 1e-6);
        assert_relative_eq!(target_beyond(&zones, 103_200.0, TradeSide::Long), 103_750.0, epsilon = 1e-6);
        assert_relative_eq!(target_beyond(&zones, 99_000.0, TradeSide::Short), 98_750.0, epsilon = 1e-6);
        assert_relative_eq!(target_beyond(&zones, 97_400.0, TradeSide::Short), 96_875.0, epsilon = 1e-6);
    }
}
