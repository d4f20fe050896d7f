//! Upbit REST market-data adapter
//!
//! ## API Reference
//!
//! - `GET /v1/market/all` - market list (KRW markets are selection candidates)
//! - `GET /v1/ticker?markets=A,B` - 24h ticker stats
//! - `GET /v1/candles/days?market=A&count=N` - daily candles, newest first
//! - `GET /v1/candles/minutes/60?market=A&count=N` - hourly candles, newest first

use super::source::{CurrentStats, Granularity, MarketDataSource, OhlcBar, SourceError};
use crate::selection::CandidateStats;
use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;

/// Quote currency prefix of markets eligible for selection
const QUOTE_PREFIX: &str = "KRW-";

/// Markets per ticker request
const TICKER_BATCH_SIZE: usize = 100;

#[derive(Debug, Clone, Deserialize)]
pub struct UpbitMarket {
    pub market: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpbitTicker {
    pub market: String,
    pub trade_price: Option<f64>,
    pub high_price: Option<f64>,
    pub low_price: Option<f64>,
    pub signed_change_rate: Option<f64>,
    pub acc_trade_volume_24h: Option<f64>,
    pub acc_trade_price_24h: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpbitCandle {
    pub candle_date_time_utc: String,
    pub opening_price: f64,
    pub high_price: f64,
    pub low_price: f64,
    pub trade_price: f64,
    pub candle_acc_trade_volume: Option<f64>,
}

impl UpbitCandle {
    fn to_bar(&self) -> Result<OhlcBar, SourceError> {
        let start = NaiveDateTime::parse_from_str(&self.candle_date_time_utc, "%Y-%m-%dT%H:%M:%S")
            .map_err(|e| {
                SourceError::Decode(format!(
                    "bad candle time {}: {}",
                    self.candle_date_time_utc, e
                ))
            })?;

        Ok(OhlcBar {
            period_start: start.and_utc().timestamp(),
            open: self.opening_price,
            high: self.high_price,
            low: self.low_price,
            close: self.trade_price,
            volume: self.candle_acc_trade_volume,
        })
    }
}

pub struct UpbitSource {
    client: reqwest::Client,
    base_url: String,
}

impl UpbitSource {
    pub fn new(base_url: &str) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, SourceError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.client.get(&url).query(query).send().await?;

        if !response.status().is_success() {
            return Err(SourceError::Status {
                url,
                status: response.status().as_u16(),
            });
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| SourceError::Decode(format!("{}: {}", path, e)))
    }

    async fn tickers(&self, markets: &[String]) -> Result<Vec<UpbitTicker>, SourceError> {
        let mut tickers = Vec::with_capacity(markets.len());
        for batch in markets.chunks(TICKER_BATCH_SIZE) {
            let batch: Vec<UpbitTicker> = self
                .get_json("/v1/ticker", &[("markets", batch.join(","))])
                .await?;
            tickers.extend(batch);
        }
        Ok(tickers)
    }
}

#[async_trait]
impl MarketDataSource for UpbitSource {
    async fn get_current_stats(
        &self,
        instruments: &[String],
    ) -> Result<Vec<CurrentStats>, SourceError> {
        if instruments.is_empty() {
            return Ok(Vec::new());
        }

        let tickers = self.tickers(instruments).await?;
        Ok(tickers
            .into_iter()
            .filter_map(|t| match (t.trade_price, t.acc_trade_volume_24h) {
                (Some(price), Some(volume_24h)) => Some(CurrentStats {
                    instrument: t.market,
                    price,
                    volume_24h,
                }),
                _ => {
                    log::debug!("Ticker for {} missing price or volume", t.market);
                    None
                }
            })
            .collect())
    }

    async fn get_historical_ohlc(
        &self,
        instrument: &str,
        granularity: Granularity,
        count: usize,
    ) -> Result<Vec<OhlcBar>, SourceError> {
        let path = match granularity {
            Granularity::Hourly => "/v1/candles/minutes/60",
            Granularity::Daily => "/v1/candles/days",
        };

        let candles: Vec<UpbitCandle> = self
            .get_json(
                path,
                &[("market", instrument.to_string()), ("count", count.to_string())],
            )
            .await?;

        let mut bars = candles
            .iter()
            .map(UpbitCandle::to_bar)
            .collect::<Result<Vec<_>, _>>()?;
        bars.sort_by_key(|bar| bar.period_start);
        Ok(bars)
    }

    async fn get_candidate_snapshot(
        &self,
    ) -> Result<BTreeMap<String, CandidateStats>, SourceError> {
        let markets: Vec<UpbitMarket> = self.get_json("/v1/market/all", &[]).await?;
        let krw_markets: Vec<String> = markets
            .into_iter()
            .map(|m| m.market)
            .filter(|m| m.starts_with(QUOTE_PREFIX))
            .collect();

        log::info!("✅ {} {} markets listed", krw_markets.len(), QUOTE_PREFIX.trim_end_matches('-'));

        let tickers = self.tickers(&krw_markets).await?;
        Ok(tickers
            .into_iter()
            .map(|t| {
                let stats = CandidateStats::from_ticker(
                    t.acc_trade_price_24h,
                    t.signed_change_rate,
                    t.high_price,
                    t.low_price,
                    t.trade_price,
                );
                (t.market, stats)
            })
            .collect())
    }
}
