//! Day-by-day simulation driver.

use chrono::{Datelike, Days, NaiveDate};
use tracing::{debug, info};

use crate::error::{Result, SimError};
use crate::income::Income;
use crate::portfolio::{Portfolio, Transaction};
use crate::strategy::Strategy;

/// Total portfolio value on the first day of every simulated month.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValueSeries {
    pub dates: Vec<NaiveDate>,
    pub values: Vec<f64>,
}

impl ValueSeries {
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn last(&self) -> Option<(NaiveDate, f64)> {
        Some((*self.dates.last()?, *self.values.last()?))
    }

    fn push(&mut self, date: NaiveDate, value: f64) {
        self.dates.push(date);
        self.values.push(value);
    }
}

/// Runs `strategy` on `portfolio` for every day from `start` through `as_of`.
///
/// Income is booked before the strategy ticks. A missing price at a monthly
/// snapshot aborts the run.
pub fn simulate(
    start: NaiveDate,
    portfolio: &mut Portfolio,
    income: &mut dyn Income,
    strategy: &mut dyn Strategy,
    as_of: NaiveDate,
) -> Result<ValueSeries> {
    if start > as_of {
        return Err(SimError::StartInFuture { start, as_of });
    }

    info!(start = %start, as_of = %as_of, "Starting simulation");
    portfolio.set_start(start);

    let mut series = ValueSeries::default();
    let mut day = start;
    while day <= as_of {
        let amount = income.tick(day);
        if amount != 0.0 {
            portfolio.transact(Transaction::Income { date: day, amount });
        }

        strategy.tick(day, portfolio);

        if day.day() == 1 {
            let value = portfolio.total_value(day)?.round();
            debug!(date = %day, value, "Monthly snapshot");
            series.push(day, value);
        }

        day = match day.checked_add_days(Days::new(1)) {
            Some(next) => next,
            None => break,
        };
    }

    info!(
        snapshots = series.len(),
        cash = portfolio.cash_balance(),
        transactions = portfolio.transactions().len(),
        "Simulation finished"
    );
    Ok(series)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::Stock;
    use crate::income::MonthlyIncome;
    use crate::prices::PriceTable;
    use crate::strategy::{MidMonth, NoInvest};
    use std::sync::Arc;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn flat_portfolio(from: NaiveDate, to: NaiveDate) -> Portfolio {
        let table = PriceTable::new();
        let days = from.iter_days().take_while(|day| *day <= to);
        table.extend("SPY", days.map(|day| (day, 100.0)));
        Portfolio::builder()
            .holding(Stock::new("SPY"), 0, 1.0)
            .prices(Arc::new(table))
            .build()
            .unwrap()
    }

    #[test]
    fn test_start_in_future() {
        let mut p = flat_portfolio(d(2020, 1, 1), d(2020, 1, 2));
        let mut income = MonthlyIncome::new(d(2020, 1, 2), 1000.0);
        let res = simulate(d(2020, 1, 2), &mut p, &mut income, &mut NoInvest, d(2020, 1, 1));
        assert!(matches!(res, Err(SimError::StartInFuture { .. })));
        assert!(p.start().is_none());
    }

    #[test]
    fn test_single_day() {
        let mut p = flat_portfolio(d(2020, 1, 1), d(2020, 1, 1));
        let mut income = MonthlyIncome::new(d(2020, 1, 1), 1000.0);
        let series =
            simulate(d(2020, 1, 1), &mut p, &mut income, &mut NoInvest, d(2020, 1, 1)).unwrap();
        assert_eq!(series.dates, vec![d(2020, 1, 1)]);
        assert_eq!(series.values, vec![1000.0]);
        assert_eq!(p.start(), Some(d(2020, 1, 1)));
    }

    #[test]
    fn test_no_invest_accumulates_cash() {
        let mut p = flat_portfolio(d(2020, 1, 15), d(2020, 4, 15));
        let mut income = MonthlyIncome::new(d(2020, 1, 15), 1000.0);
        let series =
            simulate(d(2020, 1, 15), &mut p, &mut income, &mut NoInvest, d(2020, 4, 15)).unwrap();

        assert_eq!(series.dates, vec![d(2020, 2, 1), d(2020, 3, 1), d(2020, 4, 1)]);
        assert_eq!(series.values, vec![2000.0, 3000.0, 4000.0]);
        assert_eq!(p.cash_balance(), 4000.0);
        assert_eq!(p.transactions().len(), 4);
    }

    #[test]
    fn test_snapshot_needs_price() {
        // Prices end before the first of February
        let mut p = flat_portfolio(d(2020, 1, 1), d(2020, 1, 31));
        let mut income = MonthlyIncome::new(d(2020, 1, 1), 1000.0);
        let mut strat = MidMonth::default();
        let res = simulate(d(2020, 1, 1), &mut p, &mut income, &mut strat, d(2020, 2, 10));
        assert!(matches!(res, Err(SimError::DataUnavailable { .. })));
    }
}
