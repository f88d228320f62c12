//! Binance REST Client
//!
//! Read-only client for the public spot endpoints:
//! - `/api/v3/klines` backs the `MarketDataPort`
//! - `/api/v3/depth` polled across the window plus `/api/v3/aggTrades` back
//!   the `OrderBookPort`

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::types::{AggTrade, ApiErrorBody, DepthResponse, RawKline};
use crate::domain::Candle;
use crate::ports::{
    BookSnapshot, CandleInterval, MarketDataError, MarketDataPort, OrderBookError, OrderBookPort,
    OrderBookSample, TapeTrade,
};

/// Most rows the kline and aggTrades endpoints return per request
const MAX_ROWS: usize = 1_000;

/// Depth limits the endpoint accepts
pub const DEPTH_LIMITS: [u32; 8] = [5, 10, 20, 50, 100, 500, 1_000, 5_000];

/// Binance client configuration (`[market_data]` section)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BinanceConfig {
    pub base_url: String,
    pub request_timeout_ms: u64,
    /// Retries after the first attempt on 429, 5xx and transport errors
    pub max_retries: u32,
    /// Price levels per depth snapshot
    pub depth_limit: u32,
    /// Gap between depth snapshots inside a sampling window
    pub depth_poll_ms: u64,
}

impl Default for BinanceConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.binance.com".to_string(),
            request_timeout_ms: 5_000,
            max_retries: 2,
            depth_limit: 100,
            depth_poll_ms: 1_000,
        }
    }
}

impl BinanceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn depth_poll(&self) -> Duration {
        Duration::from_millis(self.depth_poll_ms.max(100))
    }
}

#[derive(Debug, Clone)]
pub struct BinanceClient {
    config: BinanceConfig,
    http: Client,
}

impl BinanceClient {
    pub fn new(config: BinanceConfig) -> Result<Self, MarketDataError> {
        let http = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| MarketDataError::Network(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { config, http })
    }

    pub fn config(&self) -> &BinanceConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// GET with retry on rate limits and server errors
    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, MarketDataError> {
        let url = self.url(path);
        let mut last_error = None;
        let mut rate_limited = false;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let backoff = if rate_limited {
                    Duration::from_secs(2u64.pow(attempt)) // 2s, 4s, 8s
                } else {
                    Duration::from_millis(500 * attempt as u64)
                };
                tokio::time::sleep(backoff).await;
            }

            let response = match self.http.get(&url).query(query).send().await {
                Ok(response) => response,
                Err(e) => {
                    debug!(path, attempt, error = %e, "Request failed");
                    last_error = Some(MarketDataError::Network(e.to_string()));
                    rate_limited = false;
                    continue;
                }
            };

            let status = response.status();
            if status.is_success() {
                return response
                    .json::<T>()
                    .await
                    .map_err(|e| MarketDataError::ParseError(e.to_string()));
            }

            rate_limited = status == StatusCode::TOO_MANY_REQUESTS;
            if rate_limited || status.is_server_error() {
                warn!(
                    path,
                    %status,
                    attempt = attempt + 1,
                    max_attempts = self.config.max_retries + 1,
                    "Retryable HTTP status"
                );
                last_error = Some(MarketDataError::Network(format!("HTTP {}", status)));
                continue;
            }

            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorBody>(&body)
                .map(|e| format!("{} (code {})", e.msg, e.code))
                .unwrap_or(body);
            return Err(MarketDataError::RestError(format!("HTTP {}: {}", status, message)));
        }

        Err(last_error.unwrap_or_else(|| MarketDataError::Network("max retries exceeded".into())))
    }

    /// Latest `count` klines, oldest first. Pages backwards past the row cap.
    pub async fn klines(
        &self,
        symbol: &str,
        interval: CandleInterval,
        count: usize,
    ) -> Result<Vec<Candle>, MarketDataError> {
        let mut candles: Vec<Candle> = Vec::with_capacity(count);
        let mut end_time: Option<i64> = None;

        while candles.len() < count {
            let limit = (count - candles.len()).min(MAX_ROWS);
            let mut query = vec![
                ("symbol", symbol.to_string()),
                ("interval", interval.as_str().to_string()),
                ("limit", limit.to_string()),
            ];
            if let Some(end) = end_time {
                query.push(("endTime", end.to_string()));
            }

            let rows: Vec<RawKline> = self.get_json("/api/v3/klines", &query).await?;
            let Some(first_open) = rows.first().map(|row| row.0) else {
                break;
            };
            let fetched = rows.len();
            let mut page = rows
                .into_iter()
                .map(RawKline::into_candle)
                .collect::<Result<Vec<_>, _>>()?;
            page.append(&mut candles);
            candles = page;

            if fetched < limit {
                break;
            }
            end_time = Some(first_open - 1);
        }

        Ok(candles)
    }

    pub async fn depth(&self, symbol: &str) -> Result<BookSnapshot, MarketDataError> {
        let query = [
            ("symbol", symbol.to_string()),
            ("limit", self.config.depth_limit.to_string()),
        ];
        let depth: DepthResponse = self.get_json("/api/v3/depth", &query).await?;
        depth.into_snapshot(Utc::now())
    }

    /// Aggregated trades executed in `[from, to]`
    pub async fn agg_trades(
        &self,
        symbol: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<TapeTrade>, MarketDataError> {
        let query = [
            ("symbol", symbol.to_string()),
            ("startTime", from.timestamp_millis().to_string()),
            ("endTime", to.timestamp_millis().to_string()),
            ("limit", MAX_ROWS.to_string()),
        ];
        let rows: Vec<AggTrade> = self.get_json("/api/v3/aggTrades", &query).await?;
        rows.into_iter().map(AggTrade::into_tape_trade).collect()
    }
}

fn symbol(instrument: &str) -> String {
    instrument.trim().to_uppercase()
}

#[async_trait]
impl MarketDataPort for BinanceClient {
    async fn get_candles(
        &self,
        instrument: &str,
        interval: CandleInterval,
        count: usize,
    ) -> Result<Vec<Candle>, MarketDataError> {
        self.klines(&symbol(instrument), interval, count).await
    }
}

#[async_trait]
impl OrderBookPort for BinanceClient {
    async fn sample(
        &self,
        instrument: &str,
        window: Duration,
    ) -> Result<OrderBookSample, OrderBookError> {
        let symbol = symbol(instrument);
        let started_at = Utc::now();
        let deadline = tokio::time::Instant::now() + window;
        let poll = self.config.depth_poll();

        let mut snapshots = Vec::new();
        loop {
            match self.depth(&symbol).await {
                Ok(snapshot) => snapshots.push(snapshot),
                Err(e) => warn!(symbol = %symbol, error = %e, "Depth snapshot failed"),
            }
            if tokio::time::Instant::now() + poll > deadline {
                break;
            }
            tokio::time::sleep(poll).await;
        }
        tokio::time::sleep_until(deadline).await;

        let trades = match self.agg_trades(&symbol, started_at, Utc::now()).await {
            Ok(trades) => trades,
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "Trade tape unavailable");
                Vec::new()
            }
        };

        if snapshots.is_empty() && trades.is_empty() {
            return Err(OrderBookError::DataUnavailable(format!(
                "no depth or trades for {} in {:?}",
                symbol, window
            )));
        }

        debug!(
            symbol = %symbol,
            snapshots = snapshots.len(),
            trades = trades.len(),
            "Order book sampled"
        );
        Ok(OrderBookSample { snapshots, trades })
    }
}
