use polars::prelude::*;

use crate::analysis::StockOverview;
use crate::error::Result;
use crate::irr::SearchRange;
use crate::scenario::{irr_label, Comparison};

/// One row per snapshot date, one value column per strategy.
pub fn comparison_frame(comparison: &Comparison) -> Result<DataFrame> {
    let dates: Vec<String> = comparison.dates.iter().map(|d| d.to_string()).collect();
    let mut columns = vec![Series::new("date", dates)];
    for outcome in &comparison.outcomes {
        columns.push(Series::new(&outcome.name, &outcome.series.values));
    }
    Ok(DataFrame::new(columns)?)
}

pub fn irr_frame(comparison: &Comparison, range: SearchRange) -> Result<DataFrame> {
    let reported: Vec<_> = comparison
        .outcomes
        .iter()
        .filter_map(|o| o.irr.map(|irr| (o.name.clone(), irr)))
        .collect();
    let names: Vec<String> = reported.iter().map(|(name, _)| name.clone()).collect();
    let irrs: Vec<f64> = reported.iter().map(|(_, irr)| *irr).collect();
    let labels: Vec<String> = irrs.iter().map(|irr| irr_label(*irr, range)).collect();
    Ok(df!(
        "strategy" => names,
        "irr_pct" => irrs,
        "label" => labels
    )?)
}

pub fn overview_frame(overview: &StockOverview) -> Result<DataFrame> {
    let dates: Vec<String> = overview.dates.iter().map(|d| d.to_string()).collect();
    Ok(df!(
        "date" => dates,
        "price" => &overview.prices,
        "rel_change_pct" => &overview.rel_change_pct,
        "drawdown_pct" => &overview.drawdown_pct
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::StrategyOutcome;
    use crate::simulator::ValueSeries;
    use chrono::NaiveDate;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn comparison() -> Comparison {
        let dates = vec![d(2020, 1, 1), d(2020, 2, 1)];
        let outcome = |name: &str, values: Vec<f64>, irr| StrategyOutcome {
            name: name.to_string(),
            series: ValueSeries {
                dates: dates.clone(),
                values,
            },
            irr,
        };
        Comparison {
            symbol: "SPY".to_string(),
            dates: dates.clone(),
            outcomes: vec![
                outcome("Monthly", vec![1000.0, 2100.0], Some(7.5)),
                outcome("NoInvest", vec![1000.0, 2000.0], None),
                outcome("30%Drawdown", vec![1000.0, 2000.0], Some(400.0)),
            ],
        }
    }

    #[test]
    fn test_comparison_frame() {
        let df = comparison_frame(&comparison()).unwrap();
        assert_eq!(df.shape(), (2, 4));
        assert_eq!(df.get_column_names(), &["date", "Monthly", "NoInvest", "30%Drawdown"]);
    }

    #[test]
    fn test_irr_frame_skips_baseline() {
        let df = irr_frame(&comparison(), SearchRange::default()).unwrap();
        assert_eq!(df.height(), 2);
        let labels: Vec<_> = df
            .column("label")
            .unwrap()
            .str()
            .unwrap()
            .into_no_null_iter()
            .collect();
        assert_eq!(labels, vec!["7.50%", "unbounded"]);
    }

    #[test]
    fn test_overview_frame() {
        let overview = StockOverview {
            dates: vec![d(2020, 1, 2)],
            prices: vec![100.0],
            rel_change_pct: vec![0.0],
            drawdown_pct: vec![0.0],
        };
        assert_eq!(overview_frame(&overview).unwrap().shape(), (1, 4));
    }
}
