//! Price lookup capability consumed by the ledger and the strategies.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{Days, NaiveDate};
use dashmap::DashMap;

use crate::error::{Result, SimError};

/// Daily closing prices by symbol.
///
/// Fails with [`SimError::DataUnavailable`] when there is no observation
/// for the exact date. Implementations must tolerate concurrent reads.
pub trait PriceProvider: Send + Sync {
    fn price(&self, symbol: &str, date: NaiveDate) -> Result<f64>;
}

impl<P: PriceProvider + ?Sized> PriceProvider for Arc<P> {
    fn price(&self, symbol: &str, date: NaiveDate) -> Result<f64> {
        (**self).price(symbol, date)
    }
}

pub type Series = BTreeMap<NaiveDate, f64>;

/// In-memory store of daily observations, sharded per symbol.
#[derive(Debug, Default)]
pub struct PriceTable {
    series: DashMap<String, Series>,
}

impl PriceTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, symbol: &str, date: NaiveDate, price: f64) {
        self.series
            .entry(symbol.to_string())
            .or_default()
            .insert(date, price);
    }

    pub fn extend<I>(&self, symbol: &str, observations: I)
    where
        I: IntoIterator<Item = (NaiveDate, f64)>,
    {
        self.series
            .entry(symbol.to_string())
            .or_default()
            .extend(observations);
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.series.contains_key(symbol)
    }

    /// Earliest and latest observation for a symbol.
    pub fn date_range(&self, symbol: &str) -> Option<(NaiveDate, NaiveDate)> {
        let series = self.series.get(symbol)?;
        let first = *series.keys().next()?;
        let last = *series.keys().next_back()?;
        Some((first, last))
    }

    /// Observations in `[from, to]`, in date order.
    pub fn series(&self, symbol: &str, from: NaiveDate, to: NaiveDate) -> Vec<(NaiveDate, f64)> {
        match self.series.get(symbol) {
            Some(series) if from <= to => {
                series.range(from..=to).map(|(d, p)| (*d, *p)).collect()
            }
            _ => Vec::new(),
        }
    }

    pub fn snapshot(&self) -> HashMap<String, Series> {
        self.series
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    pub fn replace(&self, symbol: &str, series: Series) {
        self.series.insert(symbol.to_string(), series);
    }
}

impl PriceProvider for PriceTable {
    fn price(&self, symbol: &str, date: NaiveDate) -> Result<f64> {
        self.series
            .get(symbol)
            .and_then(|series| series.get(&date).copied())
            .ok_or_else(|| SimError::data_unavailable(symbol, date))
    }
}

/// Falls back to the most recent observation up to `max_days` before the
/// requested date, which covers weekends and exchange holidays.
pub struct Lookback<P> {
    inner: P,
    max_days: u64,
}

pub const DEFAULT_LOOKBACK_DAYS: u64 = 7;

impl<P: PriceProvider> Lookback<P> {
    pub fn new(inner: P) -> Self {
        Self::with_max_days(inner, DEFAULT_LOOKBACK_DAYS)
    }

    pub fn with_max_days(inner: P, max_days: u64) -> Self {
        Self { inner, max_days }
    }
}

impl<P: PriceProvider> PriceProvider for Lookback<P> {
    fn price(&self, symbol: &str, date: NaiveDate) -> Result<f64> {
        for back in 0..=self.max_days {
            let Some(day) = date.checked_sub_days(Days::new(back)) else {
                break;
            };
            match self.inner.price(symbol, day) {
                Ok(price) => return Ok(price),
                Err(SimError::DataUnavailable { .. }) => continue,
                Err(e) => return Err(e),
            }
        }
        Err(SimError::data_unavailable(symbol, date))
    }
}
