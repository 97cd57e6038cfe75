//! Market-data collaborator backed by Yahoo Finance.
//!
//! Daily adjusted closes are fetched asynchronously into a shared
//! [`PriceTable`], which then serves the synchronous lookups of the
//! simulation. Requests go through a single-slot pacing limiter and are
//! bounded by a timeout.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};
use yahoo_finance_api::YahooConnector;

use crate::error::{Result, SimError};
use crate::prices::PriceTable;

/// Minimum spacing between two outgoing requests.
pub struct RateLimiter {
    interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Mutex::new(None),
        }
    }

    /// Waits for the slot. Concurrent callers queue on the lock.
    pub async fn acquire(&self) {
        let mut last = self.last.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.interval {
                tokio::time::sleep(self.interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedSeries {
    fetched_on: NaiveDate,
    prices: BTreeMap<NaiveDate, f64>,
}

pub struct YahooSource {
    client: YahooConnector,
    table: Arc<PriceTable>,
    fetched_on: DashMap<String, NaiveDate>,
    limiter: RateLimiter,
    timeout: Duration,
    history_start: NaiveDate,
}

impl YahooSource {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self {
            client: YahooConnector::new(),
            table: Arc::new(PriceTable::new()),
            fetched_on: DashMap::new(),
            limiter: RateLimiter::new(interval),
            timeout,
            history_start: NaiveDate::from_ymd_opt(1990, 1, 1).unwrap_or(NaiveDate::MIN),
        }
    }

    /// The shared store all fetched data lands in.
    pub fn prices(&self) -> Arc<PriceTable> {
        self.table.clone()
    }

    /// Fetches `symbol` unless it was already fetched on `today`.
    pub async fn ensure(&self, symbol: &str, today: NaiveDate) -> Result<()> {
        let fresh = self
            .fetched_on
            .get(symbol)
            .is_some_and(|fetched| *fetched >= today);
        if fresh && self.table.contains(symbol) {
            debug!(symbol, "Using cached prices");
            return Ok(());
        }

        let series = self.fetch(symbol, today).await?;
        info!(symbol, observations = series.len(), "Fetched daily prices");
        self.table.replace(symbol, series);
        self.fetched_on.insert(symbol.to_string(), today);
        Ok(())
    }

    async fn fetch(&self, symbol: &str, today: NaiveDate) -> Result<BTreeMap<NaiveDate, f64>> {
        let fetch_err = |message: String| SimError::Fetch {
            symbol: symbol.to_string(),
            message,
        };
        let start = to_offset(self.history_start).map_err(fetch_err)?;
        let end = to_offset(today).map_err(fetch_err)?;

        self.limiter.acquire().await;
        debug!(symbol, "Requesting quote history");
        let request = self.client.get_quote_history(symbol, start, end);
        let response = tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| fetch_err(format!("timed out after {:?}", self.timeout)))?
            .map_err(|e| fetch_err(e.to_string()))?;
        let quotes = response.quotes().map_err(|e| fetch_err(e.to_string()))?;

        Ok(quotes
            .iter()
            .filter_map(|q| {
                let date = DateTime::from_timestamp(q.timestamp as i64, 0)?.date_naive();
                Some((date, q.adjclose))
            })
            .collect())
    }

    /// Loads a cache written by [`save_cache`](Self::save_cache). A missing
    /// file is an empty cache.
    pub async fn load_cache(&self, path: &Path) -> Result<usize> {
        let raw = match tokio::fs::read(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };
        let cache: HashMap<String, CachedSeries> = serde_json::from_slice(&raw)?;
        for (symbol, cached) in &cache {
            let first = cached.prices.keys().next();
            let last = cached.prices.keys().next_back();
            if let (Some(first), Some(last)) = (first, last) {
                info!(
                    symbol = %symbol,
                    entries = cached.prices.len(),
                    first = %first,
                    last = %last,
                    "Loaded cached prices"
                );
            }
        }
        let count = cache.len();
        for (symbol, cached) in cache {
            self.fetched_on.insert(symbol.clone(), cached.fetched_on);
            self.table.replace(&symbol, cached.prices);
        }
        Ok(count)
    }

    pub async fn save_cache(&self, path: &Path) -> Result<()> {
        let snapshot = self.table.snapshot();
        let cache: HashMap<String, CachedSeries> = snapshot
            .into_iter()
            .filter_map(|(symbol, prices)| {
                let fetched_on = *self.fetched_on.get(&symbol)?;
                Some((symbol, CachedSeries { fetched_on, prices }))
            })
            .collect();
        tokio::fs::write(path, serde_json::to_vec_pretty(&cache)?).await?;
        info!(path = %path.display(), symbols = cache.len(), "Wrote price cache");
        Ok(())
    }
}

fn to_offset(date: NaiveDate) -> std::result::Result<OffsetDateTime, String> {
    let secs = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| format!("invalid date {date}"))?
        .and_utc()
        .timestamp();
    OffsetDateTime::from_unix_timestamp(secs).map_err(|e| e.to_string())
}
