//! Descriptive series for a single symbol, shown next to the comparison.

use chrono::{Datelike, Months, NaiveDate};

use crate::irr::round2;
use crate::prices::PriceProvider;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StockOverview {
    pub dates: Vec<NaiveDate>,
    pub prices: Vec<f64>,
    /// Day-over-day change in percent; the first entry is zero.
    pub rel_change_pct: Vec<f64>,
    /// Decline from the running peak in percent; zero at new peaks.
    pub drawdown_pct: Vec<f64>,
}

/// Walks every calendar day in `[start, as_of]` and keeps the days with a price.
pub fn stock_overview(
    prices: &dyn PriceProvider,
    symbol: &str,
    start: NaiveDate,
    as_of: NaiveDate,
) -> StockOverview {
    let mut overview = StockOverview::default();
    let mut last_max = 0.0;
    let mut last_price = None;

    for day in start.iter_days().take_while(|day| *day <= as_of) {
        let Ok(price) = prices.price(symbol, day) else {
            continue;
        };
        let price = round2(price);

        let drawdown = if price >= last_max {
            last_max = price;
            0.0
        } else {
            round2((price / last_max - 1.0) * 100.0)
        };
        let change = match last_price {
            Some(prev) => round2((price / prev - 1.0) * 100.0),
            None => 0.0,
        };
        last_price = Some(price);

        overview.dates.push(day);
        overview.prices.push(price);
        overview.rel_change_pct.push(change);
        overview.drawdown_pct.push(drawdown);
    }
    overview
}

/// First day of the month after `earliest`, so a simulation starts on a
/// full month of data.
pub fn first_full_month(earliest: NaiveDate) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(earliest.year(), earliest.month(), 1)?
        .checked_add_months(Months::new(1))
}
