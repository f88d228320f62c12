//! Opening Range Tracker
//!
//! Per-session state machine: `Collecting → Watching → Resolved(bias)`.
//!
//! - Collecting: candles inside the opening window extend the range high/low
//! - Watching: a close beyond the range by the breakout margin starts a
//!   pending breakout; it confirms once price has held beyond the range for
//!   the hold duration, and is cancelled by a close back inside the range
//! - Resolved: the first confirmed breakout sets the session bias; nothing
//!   afterwards changes it

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::domain::{Bias, Candle, SessionContext, SessionPhase, TradeSide};
use crate::strategy::params::OpeningRangeConfig;

/// What a candle did to the tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrbUpdate {
    None,
    /// Price is beyond the range but has not held long enough
    BreakoutPending(TradeSide),
    /// Breakout confirmed on this candle; session bias just resolved
    Confirmed(TradeSide),
}

impl OrbUpdate {
    pub fn confirmed_side(&self) -> Option<TradeSide> {
        match self {
            OrbUpdate::Confirmed(side) => Some(*side),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct PendingBreakout {
    side: TradeSide,
    since: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct OpeningRangeTracker {
    config: OpeningRangeConfig,
    context: SessionContext,
    pending: Option<PendingBreakout>,
    last_seen: Option<DateTime<Utc>>,
}

impl OpeningRangeTracker {
    pub fn new(config: OpeningRangeConfig, session_start: DateTime<Utc>) -> Self {
        Self {
            config,
            context: SessionContext::new(session_start),
            pending: None,
            last_seen: None,
        }
    }

    /// Start a fresh session
    pub fn reset(&mut self, session_start: DateTime<Utc>) {
        self.context = SessionContext::new(session_start);
        self.pending = None;
        self.last_seen = None;
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    pub fn session_bias(&self) -> Bias {
        self.context.session_bias()
    }

    pub fn window_end(&self) -> DateTime<Utc> {
        self.context.session_start + Duration::seconds(self.config.window_secs as i64)
    }

    pub fn in_opening_window(&self, at: DateTime<Utc>) -> bool {
        at >= self.context.session_start && at < self.window_end()
    }

    /// Feed the next candle. Candles before the session start or older than
    /// the last one seen are ignored.
    pub fn update(&mut self, candle: &Candle) -> OrbUpdate {
        if candle.timestamp < self.context.session_start {
            return OrbUpdate::None;
        }
        if matches!(self.last_seen, Some(last) if candle.timestamp < last) {
            return OrbUpdate::None;
        }
        self.last_seen = Some(candle.timestamp);

        if self.in_opening_window(candle.timestamp) {
            self.extend_range(candle);
            return OrbUpdate::None;
        }

        match self.context.phase {
            SessionPhase::Resolved => return OrbUpdate::None,
            SessionPhase::Collecting => self.context.phase = SessionPhase::Watching,
            SessionPhase::Watching => {}
        }

        let Some((low, high)) = self.context.opening_range() else {
            return OrbUpdate::None;
        };
        self.watch(candle, low, high)
    }

    fn extend_range(&mut self, candle: &Candle) {
        let high = self
            .context
            .opening_range_high
            .map_or(candle.high, |h| h.max(candle.high));
        let low = self
            .context
            .opening_range_low
            .map_or(candle.low, |l| l.min(candle.low));
        self.context.opening_range_high = Some(high);
        self.context.opening_range_low = Some(low);
    }

    fn watch(&mut self, candle: &Candle, low: f64, high: f64) -> OrbUpdate {
        let margin = self.config.breakout_margin_pct;
        let breakout = if candle.close > high * (1.0 + margin) {
            Some(TradeSide::Long)
        } else if candle.close < low * (1.0 - margin) {
            Some(TradeSide::Short)
        } else {
            None
        };

        let holding = |side: TradeSide| match side {
            TradeSide::Long => candle.close > high,
            TradeSide::Short => candle.close < low,
        };

        match self.pending {
            Some(pending) if holding(pending.side) && breakout != Some(pending.side.opposite()) => {
                let held = candle.timestamp - pending.since;
                if held >= Duration::seconds(self.config.hold_secs as i64) {
                    self.confirm(pending.side, candle)
                } else {
                    OrbUpdate::BreakoutPending(pending.side)
                }
            }
            _ => {
                self.pending = breakout.map(|side| PendingBreakout {
                    side,
                    since: candle.timestamp,
                });
                breakout.map_or(OrbUpdate::None, OrbUpdate::BreakoutPending)
            }
        }
    }

    fn confirm(&mut self, side: TradeSide, candle: &Candle) -> OrbUpdate {
        self.pending = None;
        if self.context.resolve_bias(Bias::from(side)) {
            info!(
                side = %side,
                close = candle.close,
                high = ?self.context.opening_range_high,
                low = ?self.context.opening_range_low,
                "Opening range breakout confirmed"
            );
            OrbUpdate::Confirmed(side)
        } else {
            OrbUpdate::None
        }
    }
}
