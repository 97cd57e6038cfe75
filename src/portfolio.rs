use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::assets::{Asset, Stock};
use crate::error::{Result, SimError};
use crate::irr::{self, Cashflow, SearchRange};
use crate::prices::PriceProvider;

pub const RATIO_TOLERANCE: f64 = 1e-6;

/// Broker fees charged per trade: a fixed amount plus a share of the
/// traded value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FeeSchedule {
    #[serde(default)]
    pub fixed: f64,
    #[serde(default)]
    pub variable: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Transaction {
    Income {
        date: NaiveDate,
        amount: f64,
    },
    Trade {
        date: NaiveDate,
        stock: Stock,
        shares: i64,
        /// Per-share price with fees folded in.
        price: f64,
    },
}

impl Transaction {
    /// Net cash effect: positive for income, negative for a purchase.
    pub fn delta(&self) -> f64 {
        match self {
            Transaction::Income { amount, .. } => *amount,
            Transaction::Trade { shares, price, .. } => -(*shares as f64) * price,
        }
    }

    pub fn date(&self) -> NaiveDate {
        match self {
            Transaction::Income { date, .. } | Transaction::Trade { date, .. } => *date,
        }
    }
}

mod sealed {
    pub trait Sealed {}
}

/// The part of the portfolio a strategy may act on.
///
/// Strategies receive it on every tick from [`simulate`](crate::simulate).
/// The trait is sealed: [`Portfolio`] is its only implementation.
#[cfg_attr(test, mockall::automock)]
pub trait Ledger: sealed::Sealed {
    fn cash_balance(&self) -> f64;

    /// Moves holdings toward their goal ratios, deploying `amount` of cash.
    fn rebalance(&mut self, amount: f64, date: NaiveDate) -> Result<()>;
}

pub struct Portfolio {
    start: Option<NaiveDate>,
    initial_cash: f64,
    initial_holdings: HashMap<Stock, i64>,
    cash: f64,
    holdings: HashMap<Stock, i64>,
    goal_ratios: HashMap<Stock, f64>,
    fees: FeeSchedule,
    search_range: SearchRange,
    transactions: Vec<Transaction>,
    prices: Arc<dyn PriceProvider>,
}

impl std::fmt::Debug for Portfolio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Portfolio {{ cash: {:.2}, holdings: {:?}, transactions: {} }}",
            self.cash,
            self.holdings,
            self.transactions.len()
        )
    }
}

impl Portfolio {
    pub fn builder() -> PortfolioBuilder {
        PortfolioBuilder::new()
    }

    pub fn new(
        cash: f64,
        holdings: HashMap<Stock, i64>,
        goal_ratios: HashMap<Stock, f64>,
        fees: FeeSchedule,
        prices: Arc<dyn PriceProvider>,
    ) -> Result<Self> {
        validate(&holdings, &goal_ratios)?;
        Ok(Self {
            start: None,
            initial_cash: cash,
            initial_holdings: holdings.clone(),
            cash,
            holdings,
            goal_ratios,
            fees,
            search_range: SearchRange::default(),
            transactions: Vec::new(),
            prices,
        })
    }

    /// Anchors the clock for return calculations. Called once before the first tick.
    pub fn set_start(&mut self, date: NaiveDate) {
        self.start = Some(date);
    }

    pub fn start(&self) -> Option<NaiveDate> {
        self.start
    }

    pub fn cash_balance(&self) -> f64 {
        self.cash
    }

    pub fn shares(&self, stock: &Stock) -> i64 {
        self.holdings.get(stock).copied().unwrap_or(0)
    }

    pub fn holdings(&self) -> &HashMap<Stock, i64> {
        &self.holdings
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    /// Cash plus the market value of all holdings on `date`.
    pub fn total_value(&self, date: NaiveDate) -> Result<f64> {
        Ok(self.cash + stock_value(&self.holdings, self.prices.as_ref(), date)?)
    }

    /// Share of the invested stock value held in each symbol.
    pub fn actual_weights(&self, date: NaiveDate) -> Result<HashMap<String, f64>> {
        let total = stock_value(&self.holdings, self.prices.as_ref(), date)?;
        let mut weights = HashMap::new();
        for (stock, shares) in &self.holdings {
            let value = match shares {
                0 => 0.0,
                n => *n as f64 * self.prices.price(stock.ticker(), date)?,
            };
            let weight = if total > 0.0 { value / total } else { 0.0 };
            weights.insert(stock.ticker().to_string(), weight);
        }
        Ok(weights)
    }

    /// Annualized money-weighted return up to `as_of`, in percent.
    ///
    /// External contributions are the starting capital (cash plus initial
    /// holdings at the start date) and every income transaction. Trades only
    /// move value between cash and holdings and do not enter the calculation.
    pub fn calc_irr(&self, as_of: NaiveDate) -> Result<f64> {
        let terminal = self.total_value(as_of)?;
        let flows = self.contributions()?;
        if flows.is_empty() {
            return Ok(0.0);
        }
        Ok(irr::solve(&flows, terminal, as_of, self.search_range))
    }

    fn contributions(&self) -> Result<Vec<Cashflow>> {
        let mut flows = Vec::with_capacity(self.transactions.len() + 1);
        if let Some(start) = self.start {
            let amount = self.initial_cash
                + stock_value(&self.initial_holdings, self.prices.as_ref(), start)?;
            if amount != 0.0 {
                flows.push(Cashflow { date: start, amount });
            }
        }
        flows.extend(self.transactions.iter().filter_map(|tr| match tr {
            Transaction::Income { date, amount } => Some(Cashflow {
                date: *date,
                amount: *amount,
            }),
            Transaction::Trade { .. } => None,
        }));
        Ok(flows)
    }

    pub(crate) fn transact(&mut self, tr: Transaction) {
        self.cash += tr.delta();
        if let Transaction::Trade { stock, shares, .. } = &tr {
            *self.holdings.entry(stock.clone()).or_insert(0) += shares;
        }
        self.transactions.push(tr);
    }

    /// Plans one trade per holding and applies them only if every holding
    /// changes by at least one share.
    pub(crate) fn rebalance(&mut self, amount: f64, date: NaiveDate) -> Result<()> {
        let total_goal = stock_value(&self.holdings, self.prices.as_ref(), date)? + amount;

        let mut positions: Vec<(&Stock, i64)> =
            self.holdings.iter().map(|(s, v)| (s, *v)).collect();
        positions.sort_by_key(|(stock, _)| stock.id());

        let mut trades = Vec::with_capacity(positions.len());
        for (stock, current) in positions {
            let price = self.prices.price(stock.ticker(), date)?;
            let ratio = self.goal_ratios.get(stock).copied().ok_or_else(|| {
                SimError::configuration(format!("{} has no goal ratio", stock.symbol))
            })?;
            let (goal_shares, adjusted_price) =
                goal_shares_adjusted_price(ratio * total_goal, price, &self.fees);
            let delta = goal_shares - current;
            if goal_shares <= 0 || delta == 0 {
                return Err(SimError::InsufficientFunds {
                    symbol: stock.symbol.clone(),
                    date,
                });
            }
            trades.push(Transaction::Trade {
                date,
                stock: stock.clone(),
                shares: delta,
                price: adjusted_price,
            });
        }

        for tr in trades {
            debug!(date = %date, delta = tr.delta(), "Applying trade");
            self.transact(tr);
        }
        Ok(())
    }
}

impl sealed::Sealed for Portfolio {}

#[cfg(test)]
impl sealed::Sealed for MockLedger {}

impl Ledger for Portfolio {
    fn cash_balance(&self) -> f64 {
        self.cash
    }

    fn rebalance(&mut self, amount: f64, date: NaiveDate) -> Result<()> {
        Portfolio::rebalance(self, amount, date)
    }
}

/// Whole shares affordable for `goal_value` after fees, and the per-share
/// price that makes `shares * price` equal the cash actually debited.
///
/// `shares * price * (1 + variable) + fixed <= goal_value`
pub fn goal_shares_adjusted_price(goal_value: f64, price: f64, fees: &FeeSchedule) -> (i64, f64) {
    let shares = ((goal_value - fees.fixed) / (price * (1.0 + fees.variable))).floor();
    let adjusted = (1.0 + fees.variable) * price + fees.fixed / shares;
    (shares as i64, adjusted)
}

/// Market value of `holdings` on `date`. Empty positions need no price.
fn stock_value(
    holdings: &HashMap<Stock, i64>,
    prices: &dyn PriceProvider,
    date: NaiveDate,
) -> Result<f64> {
    holdings
        .iter()
        .filter(|(_, shares)| **shares != 0)
        .try_fold(0.0, |acc, (stock, shares)| {
            Ok(acc + *shares as f64 * prices.price(stock.ticker(), date)?)
        })
}

fn validate(holdings: &HashMap<Stock, i64>, goal_ratios: &HashMap<Stock, f64>) -> Result<()> {
    for stock in goal_ratios.keys() {
        if !holdings.contains_key(stock) {
            return Err(SimError::configuration(format!(
                "Stock {} found in goal ratios but not in holdings",
                stock.symbol
            )));
        }
    }
    if let Some(stock) = holdings.keys().find(|s| !goal_ratios.contains_key(*s)) {
        return Err(SimError::configuration(format!(
            "Stock {} is missing a goal ratio",
            stock.symbol
        )));
    }
    if let Some((stock, shares)) = holdings.iter().find(|(_, v)| **v < 0) {
        return Err(SimError::configuration(format!(
            "Stock {} starts with negative shares ({shares})",
            stock.symbol
        )));
    }
    let sum: f64 = goal_ratios.values().sum();
    if (sum - 1.0).abs() > RATIO_TOLERANCE {
        return Err(SimError::configuration(format!(
            "Goal ratios sum to {sum}, expected 1.0"
        )));
    }
    Ok(())
}

pub struct PortfolioBuilder {
    cash: f64,
    holdings: HashMap<Stock, i64>,
    goal_ratios: HashMap<Stock, f64>,
    fees: FeeSchedule,
    search_range: SearchRange,
    prices: Option<Arc<dyn PriceProvider>>,
}

impl Default for PortfolioBuilder {
    fn default() -> Self {
        Self {
            cash: 0.0,
            holdings: HashMap::new(),
            goal_ratios: HashMap::new(),
            fees: FeeSchedule::default(),
            search_range: SearchRange::default(),
            prices: None,
        }
    }
}

impl PortfolioBuilder {
    pub fn new() -> PortfolioBuilder {
        PortfolioBuilder::default()
    }

    pub fn build(self) -> Result<Portfolio> {
        let prices = self
            .prices
            .ok_or_else(|| SimError::configuration("Portfolio needs a price provider"))?;
        let mut portfolio = Portfolio::new(
            self.cash,
            self.holdings,
            self.goal_ratios,
            self.fees,
            prices,
        )?;
        portfolio.search_range = self.search_range;
        Ok(portfolio)
    }

    pub fn cash(mut self, cash: f64) -> Self {
        self.cash = cash;
        self
    }

    /// Adds a position together with its goal ratio.
    pub fn holding(mut self, stock: Stock, shares: i64, ratio: f64) -> Self {
        self.goal_ratios.insert(stock.clone(), ratio);
        self.holdings.insert(stock, shares);
        self
    }

    pub fn shares(mut self, stock: Stock, shares: i64) -> Self {
        self.holdings.insert(stock, shares);
        self
    }

    pub fn ratio(mut self, stock: Stock, ratio: f64) -> Self {
        self.goal_ratios.insert(stock, ratio);
        self
    }

    pub fn fees(mut self, fees: FeeSchedule) -> Self {
        self.fees = fees;
        self
    }

    pub fn search_range(mut self, range: SearchRange) -> Self {
        self.search_range = range;
        self
    }

    pub fn prices(mut self, prices: Arc<dyn PriceProvider>) -> Self {
        self.prices = Some(prices);
        self
    }
}
