//! Backtesting of periodic investment strategies.
//!
//! A [`Portfolio`] receives monthly income, a [`Strategy`] decides on which
//! days to deploy the cash, and [`simulate`] records the portfolio value on
//! the first of every month. [`Portfolio::calc_irr`] turns the ledger into
//! an annualized money-weighted return.

pub mod analysis;
pub mod assets;
pub mod config;
pub mod error;
pub mod income;
pub mod irr;
pub mod portfolio;
pub mod prices;
pub mod report;
pub mod scenario;
pub mod simulator;
pub mod strategy;
pub mod yahoo;

pub use assets::{Asset, Stock};
pub use error::{Result, SimError};
pub use income::{Income, MonthlyIncome};
pub use irr::SearchRange;
pub use portfolio::{FeeSchedule, Ledger, Portfolio, PortfolioBuilder, Transaction};
pub use prices::{Lookback, PriceProvider, PriceTable};
pub use scenario::{
    adaptive_sweep, biyearly_strategies, compare, default_strategies, drawdown_sweep, Comparison,
    NamedStrategy, Scenario, StrategyOutcome, StrategySet,
};
pub use simulator::{simulate, ValueSeries};
pub use strategy::{
    AdaptivePeriodic, FixedMonths, MidMonth, MinDrawdown, NoInvest, Strategy, StrategyKind,
};
