//! Investment strategies deciding when to deploy cash.
//!
//! A tick triggers at most one rebalance. When the rebalance fails, or the
//! reference price is missing, the strategy keeps its state so the same
//! trigger is retried on a later day.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{Datelike, NaiveDate, TimeDelta};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::portfolio::Ledger;
use crate::prices::PriceProvider;

pub const DEFAULT_MIN_DAY: u32 = 14;

pub trait Strategy: Send {
    fn tick(&mut self, date: NaiveDate, ledger: &mut dyn Ledger);
}

fn year_month(date: NaiveDate) -> (i32, u32) {
    (date.year(), date.month())
}

/// Deploys all cash, returning whether the rebalance went through.
fn invest(ledger: &mut dyn Ledger, date: NaiveDate) -> bool {
    let cash = ledger.cash_balance();
    match ledger.rebalance(cash, date) {
        Ok(()) => {
            debug!(date = %date, cash, "Invested");
            true
        }
        Err(e) if e.is_recoverable() => {
            debug!(date = %date, error = %e, "Rebalance skipped");
            false
        }
        Err(e) => {
            warn!(date = %date, error = %e, "Rebalance failed");
            false
        }
    }
}

/// Invests once per calendar month, on or after `min_day`.
#[derive(Debug, Clone)]
pub struct MidMonth {
    last_invested: Option<(i32, u32)>,
    min_day: u32,
}

impl Default for MidMonth {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_DAY)
    }
}

impl MidMonth {
    pub fn new(min_day: u32) -> Self {
        Self {
            last_invested: None,
            min_day,
        }
    }

    fn due(&self, date: NaiveDate) -> bool {
        self.last_invested != Some(year_month(date)) && date.day() >= self.min_day
    }
}

impl Strategy for MidMonth {
    fn tick(&mut self, date: NaiveDate, ledger: &mut dyn Ledger) {
        if self.due(date) && invest(ledger, date) {
            self.last_invested = Some(year_month(date));
        }
    }
}

/// [`MidMonth`] restricted to a set of calendar months (1-12).
#[derive(Debug, Clone)]
pub struct FixedMonths {
    months: BTreeSet<u32>,
    inner: MidMonth,
}

impl FixedMonths {
    pub fn new(months: impl IntoIterator<Item = u32>, min_day: u32) -> Self {
        Self {
            months: months.into_iter().collect(),
            inner: MidMonth::new(min_day),
        }
    }
}

impl Strategy for FixedMonths {
    fn tick(&mut self, date: NaiveDate, ledger: &mut dyn Ledger) {
        if self.months.contains(&date.month()) {
            self.inner.tick(date, ledger);
        }
    }
}

/// Never invests; the cash-only baseline.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoInvest;

impl Strategy for NoInvest {
    fn tick(&mut self, _date: NaiveDate, _ledger: &mut dyn Ledger) {}
}

/// Tracks the running peak of a reference symbol and invests once its
/// price falls to `rel_val` of that peak. A successful investment restarts
/// the tracking from the price it was made at.
pub struct MinDrawdown {
    last_top: f64,
    rel_val: f64,
    ref_symbol: String,
    prices: Arc<dyn PriceProvider>,
}

impl MinDrawdown {
    pub fn new(rel_val: f64, ref_symbol: &str, prices: Arc<dyn PriceProvider>) -> Self {
        Self {
            last_top: 0.0,
            rel_val,
            ref_symbol: ref_symbol.to_string(),
            prices,
        }
    }

    pub fn last_top(&self) -> f64 {
        self.last_top
    }
}

impl Strategy for MinDrawdown {
    fn tick(&mut self, date: NaiveDate, ledger: &mut dyn Ledger) {
        let price = match self.prices.price(&self.ref_symbol, date) {
            Ok(price) => price,
            Err(_) => return,
        };

        if price > self.last_top {
            self.last_top = price;
            return;
        }

        if price / self.last_top <= self.rel_val && invest(ledger, date) {
            self.last_top = price;
        }
    }
}

/// Invests every `wait` or on a [`MinDrawdown`] trigger, whichever comes
/// first. Either kind of investment resets both the clock and the peak.
pub struct AdaptivePeriodic {
    last_invested: NaiveDate,
    wait: TimeDelta,
    last_top: f64,
    rel_val: f64,
    ref_symbol: String,
    prices: Arc<dyn PriceProvider>,
}

impl AdaptivePeriodic {
    /// The clock starts one `wait` before `start` so the first tick is due.
    pub fn new(
        start: NaiveDate,
        wait: TimeDelta,
        rel_val: f64,
        ref_symbol: &str,
        prices: Arc<dyn PriceProvider>,
    ) -> Self {
        Self {
            last_invested: start.checked_sub_signed(wait).unwrap_or(NaiveDate::MIN),
            wait,
            last_top: 0.0,
            rel_val,
            ref_symbol: ref_symbol.to_string(),
            prices,
        }
    }

    pub fn last_invested(&self) -> NaiveDate {
        self.last_invested
    }

    pub fn last_top(&self) -> f64 {
        self.last_top
    }
}

impl Strategy for AdaptivePeriodic {
    fn tick(&mut self, date: NaiveDate, ledger: &mut dyn Ledger) {
        let price = match self.prices.price(&self.ref_symbol, date) {
            Ok(price) => price,
            Err(_) => return,
        };

        let periodic = date - self.last_invested >= self.wait;
        let drawdown = self.last_top > 0.0 && price / self.last_top <= self.rel_val;

        if periodic || drawdown {
            if invest(ledger, date) {
                self.last_invested = date;
                self.last_top = price;
            }
        } else if price > self.last_top {
            self.last_top = price;
        }
    }
}

/// Declarative strategy selection, as read from configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StrategyKind {
    Monthly {
        #[serde(default = "default_min_day")]
        min_day: u32,
    },
    FixedMonths {
        months: Vec<u32>,
        #[serde(default = "default_min_day")]
        min_day: u32,
    },
    NoInvest,
    MinDrawdown {
        rel_val: f64,
    },
    AdaptivePeriodic {
        wait_days: i64,
        rel_val: f64,
    },
}

fn default_min_day() -> u32 {
    DEFAULT_MIN_DAY
}

impl StrategyKind {
    /// A fresh strategy for one run. Drawdown variants watch `symbol`.
    pub fn build(
        &self,
        start: NaiveDate,
        symbol: &str,
        prices: Arc<dyn PriceProvider>,
    ) -> Box<dyn Strategy> {
        match self {
            StrategyKind::Monthly { min_day } => Box::new(MidMonth::new(*min_day)),
            StrategyKind::FixedMonths { months, min_day } => {
                Box::new(FixedMonths::new(months.iter().copied(), *min_day))
            }
            StrategyKind::NoInvest => Box::new(NoInvest),
            StrategyKind::MinDrawdown { rel_val } => {
                Box::new(MinDrawdown::new(*rel_val, symbol, prices))
            }
            StrategyKind::AdaptivePeriodic { wait_days, rel_val } => Box::new(AdaptivePeriodic::new(
                start,
                TimeDelta::days(*wait_days),
                *rel_val,
                symbol,
                prices,
            )),
        }
    }

    /// The cash-only baseline has no meaningful return.
    pub fn reports_irr(&self) -> bool {
        !matches!(self, StrategyKind::NoInvest)
    }
}
