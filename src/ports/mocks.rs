//! Scripted in-memory port implementations
//!
//! Deterministic stand-ins for the external collaborators, used by the test
//! suites and by offline demos. Each records the calls it receives.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;

use super::execution::{ExecutionGateway, GatewayError};
use super::market_data::{CandleInterval, MarketDataError, MarketDataPort};
use super::models::OrderBookSample;
use super::order_book::{OrderBookError, OrderBookPort};
use super::signal_sink::{SignalSink, SinkError};
use crate::domain::{Candle, Signal};

/// Market data port serving fixed candle series
#[derive(Debug, Default, Clone)]
pub struct StaticMarketData {
    series: Arc<Mutex<HashMap<(String, CandleInterval), Vec<Candle>>>>,
    calls: Arc<Mutex<Vec<(String, CandleInterval, usize)>>>,
}

impl StaticMarketData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to set the candles served for an instrument/interval
    pub fn with_candles(self, instrument: &str, interval: CandleInterval, candles: Vec<Candle>) -> Self {
        self.set_candles(instrument, interval, candles);
        self
    }

    pub fn set_candles(&self, instrument: &str, interval: CandleInterval, candles: Vec<Candle>) {
        self.series
            .lock()
            .unwrap()
            .insert((instrument.to_string(), interval), candles);
    }

    /// Get all recorded calls
    pub fn get_calls(&self) -> Vec<(String, CandleInterval, usize)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl MarketDataPort for StaticMarketData {
    async fn get_candles(
        &self,
        instrument: &str,
        interval: CandleInterval,
        count: usize,
    ) -> Result<Vec<Candle>, MarketDataError> {
        self.calls
            .lock()
            .unwrap()
            .push((instrument.to_string(), interval, count));
        let series = self.series.lock().unwrap();
        let candles = series
            .get(&(instrument.to_string(), interval))
            .ok_or_else(|| MarketDataError::Network(format!("no candles for {}", instrument)))?;
        let start = candles.len().saturating_sub(count);
        Ok(candles[start..].to_vec())
    }
}

/// Order book port returning a configured sample per instrument
#[derive(Debug, Default, Clone)]
pub struct ScriptedOrderBook {
    responses: Arc<Mutex<HashMap<String, Result<OrderBookSample, OrderBookError>>>>,
    delay: Option<Duration>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl ScriptedOrderBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sample(self, instrument: &str, sample: OrderBookSample) -> Self {
        self.set_response(instrument, Ok(sample));
        self
    }

    pub fn with_failure(self, instrument: &str, message: &str) -> Self {
        self.set_response(
            instrument,
            Err(OrderBookError::DataUnavailable(message.to_string())),
        );
        self
    }

    /// Delay every response, simulating a slow venue
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn set_response(&self, instrument: &str, response: Result<OrderBookSample, OrderBookError>) {
        self.responses
            .lock()
            .unwrap()
            .insert(instrument.to_string(), response);
    }

    pub fn get_calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl OrderBookPort for ScriptedOrderBook {
    async fn sample(
        &self,
        instrument: &str,
        _window: Duration,
    ) -> Result<OrderBookSample, OrderBookError> {
        self.calls.lock().unwrap().push(instrument.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.responses
            .lock()
            .unwrap()
            .get(instrument)
            .cloned()
            .unwrap_or_else(|| {
                Err(OrderBookError::DataUnavailable(format!(
                    "no sample scripted for {}",
                    instrument
                )))
            })
    }
}

/// Gateway call as recorded by `ScriptedGateway`
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayCall {
    pub trade_id: String,
    pub take_profit: Option<Decimal>,
    pub stop_loss: Option<Decimal>,
}

/// Execution gateway replaying a queue of responses; `Ok(())` once exhausted
#[derive(Debug, Default, Clone)]
pub struct ScriptedGateway {
    responses: Arc<Mutex<VecDeque<Result<(), GatewayError>>>>,
    delay: Option<Duration>,
    calls: Arc<Mutex<Vec<GatewayCall>>>,
    call_count: Arc<AtomicUsize>,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_responses(self, responses: Vec<Result<(), GatewayError>>) -> Self {
        self.responses.lock().unwrap().extend(responses);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    pub fn get_calls(&self) -> Vec<GatewayCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ExecutionGateway for ScriptedGateway {
    async fn set_protective_levels(
        &self,
        trade_id: &str,
        take_profit: Option<Decimal>,
        stop_loss: Option<Decimal>,
    ) -> Result<(), GatewayError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        self.calls.lock().unwrap().push(GatewayCall {
            trade_id: trade_id.to_string(),
            take_profit,
            stop_loss,
        });
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.responses.lock().unwrap().pop_front().unwrap_or(Ok(()))
    }
}

/// Signal sink that keeps everything it receives
#[derive(Debug, Default, Clone)]
pub struct RecordingSink {
    signals: Arc<Mutex<Vec<Signal>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signals(&self) -> Vec<Signal> {
        self.signals.lock().unwrap().clone()
    }
}

#[async_trait]
impl SignalSink for RecordingSink {
    async fn publish(&self, signal: &Signal) -> Result<(), SinkError> {
        self.signals.lock().unwrap().push(signal.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[tokio::test]
    async fn test_static_market_data_tail() {
        let candles: Vec<Candle> = (0..5)
            .map(|i| {
                let p = 100.0 + i as f64;
                Candle::new(Utc.timestamp_opt(i * 60, 0).unwrap(), p, p, p, p, 1.0)
            })
            .collect();
        let mock = StaticMarketData::new().with_candles("BTCUSDT", CandleInterval::OneMinute, candles);

        let tail = mock.get_candles("BTCUSDT", CandleInterval::OneMinute, 2).await.unwrap();
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[1].close, 104.0);
        assert_eq!(mock.get_calls().len(), 1);

        assert!(mock.get_candles("ETHUSDT", CandleInterval::OneMinute, 2).await.is_err());
    }

    #[tokio::test]
    async fn test_scripted_gateway_replays_then_succeeds() {
        let gateway = ScriptedGateway::new()
            .with_responses(vec![Err(GatewayError::DataUnavailable("502".into()))]);

        assert!(gateway.set_protective_levels("t", None, None).await.is_err());
        assert!(gateway.set_protective_levels("t", None, None).await.is_ok());
        assert_eq!(gateway.call_count(), 2);
    }

    #[tokio::test]
    async fn test_scripted_order_book_unscripted_instrument() {
        let book = ScriptedOrderBook::new();
        let result = book.sample("SOLUSDT", Duration::from_millis(10)).await;
        assert!(matches!(result, Err(OrderBookError::DataUnavailable(_))));
        assert_eq!(book.get_calls(), vec!["SOLUSDT".to_string()]);
    }
}
