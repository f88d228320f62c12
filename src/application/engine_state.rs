//! Instrument State
//!
//! Long-lived per-instrument state shared by evaluation ticks:
//! - daily levels (volatility estimate + zone map), recomputed once per day
//! - the opening range tracker and the session snapshot it publishes
//! - the live imbalance book
//! - the last published signal, so a candle re-read on the next poll does
//!   not publish the same setup twice
//!
//! Readers clone an `Arc` snapshot under a short read lock; writers build the
//! replacement first and swap it in. No lock is held across an await on a
//! collaborator.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::{Mutex, RwLock};
use tracing::info;

use crate::domain::{Bias, Candle, SessionContext, SetupType, Signal, TradeSide};
use crate::strategy::params::OpeningRangeConfig;
use crate::strategy::{ImbalanceBook, OpeningRangeTracker, OrbUpdate, VolatilityEstimate, ZoneMap};

/// Zone map and the forecast it was built from, valid for one trading day
#[derive(Debug, Clone, PartialEq)]
pub struct DailyLevels {
    pub day: NaiveDate,
    pub estimate: VolatilityEstimate,
    pub zones: Arc<ZoneMap>,
}

/// Identity of a published signal: one setup at one level per candle
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedKey {
    pub setup: SetupType,
    pub side: TradeSide,
    pub level_label: String,
    pub level_price: f64,
    pub candle: DateTime<Utc>,
}

impl From<&Signal> for PublishedKey {
    fn from(signal: &Signal) -> Self {
        Self {
            setup: signal.setup_type,
            side: signal.side,
            level_label: signal.context.zone.level_label.clone(),
            level_price: signal.context.zone.level_price,
            candle: signal.timestamp,
        }
    }
}

pub struct InstrumentState {
    instrument: String,
    daily: RwLock<Option<Arc<DailyLevels>>>,
    session: RwLock<Arc<SessionContext>>,
    imbalances: RwLock<Arc<ImbalanceBook>>,
    /// Single writer of the session snapshot
    tracker: Mutex<OpeningRangeTracker>,
    last_published: Mutex<Option<PublishedKey>>,
}

impl InstrumentState {
    pub fn new(instrument: impl Into<String>, config: OpeningRangeConfig, session_start: DateTime<Utc>) -> Self {
        let tracker = OpeningRangeTracker::new(config, session_start);
        Self {
            instrument: instrument.into(),
            daily: RwLock::new(None),
            session: RwLock::new(Arc::new(tracker.context().clone())),
            imbalances: RwLock::new(Arc::new(ImbalanceBook::default())),
            tracker: Mutex::new(tracker),
            last_published: Mutex::new(None),
        }
    }

    pub fn instrument(&self) -> &str {
        &self.instrument
    }

    pub async fn daily(&self) -> Option<Arc<DailyLevels>> {
        self.daily.read().await.clone()
    }

    /// Daily levels if they were computed for `day`
    pub async fn daily_for(&self, day: NaiveDate) -> Option<Arc<DailyLevels>> {
        self.daily().await.filter(|levels| levels.day == day)
    }

    pub async fn set_daily(&self, levels: DailyLevels) -> Arc<DailyLevels> {
        let levels = Arc::new(levels);
        *self.daily.write().await = Some(Arc::clone(&levels));
        levels
    }

    pub async fn session(&self) -> Arc<SessionContext> {
        self.session.read().await.clone()
    }

    pub async fn session_bias(&self) -> Bias {
        self.session().await.session_bias()
    }

    pub async fn imbalances(&self) -> Arc<ImbalanceBook> {
        self.imbalances.read().await.clone()
    }

    pub async fn set_imbalances(&self, book: ImbalanceBook) -> Arc<ImbalanceBook> {
        let book = Arc::new(book);
        *self.imbalances.write().await = Arc::clone(&book);
        book
    }

    /// Whether `key` matches the last published signal
    pub async fn already_published(&self, key: &PublishedKey) -> bool {
        self.last_published.lock().await.as_ref() == Some(key)
    }

    pub async fn mark_published(&self, key: PublishedKey) {
        *self.last_published.lock().await = Some(key);
    }

    /// Feed candles to the tracker, starting a fresh session when
    /// `session_start` moved. Returns the new session snapshot and what the
    /// latest candle did to the opening range.
    pub async fn advance(&self, session_start: DateTime<Utc>, candles: &[Candle]) -> (Arc<SessionContext>, OrbUpdate) {
        let mut tracker = self.tracker.lock().await;
        if tracker.context().session_start != session_start {
            info!(instrument = %self.instrument, %session_start, "New session");
            tracker.reset(session_start);
        }

        let mut latest = OrbUpdate::None;
        for candle in candles {
            latest = tracker.update(candle);
        }

        let snapshot = Arc::new(tracker.context().clone());
        *self.session.write().await = Arc::clone(&snapshot);
        (snapshot, latest)
    }
}
