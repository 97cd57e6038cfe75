//! Reference single-stock scenario and concurrent strategy comparison.

use std::sync::Arc;

use chrono::{Month, NaiveDate};
use futures::{stream::FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::assets::Stock;
use crate::error::{Result, SimError};
use crate::income::MonthlyIncome;
use crate::irr::SearchRange;
use crate::portfolio::{FeeSchedule, Portfolio};
use crate::prices::PriceProvider;
use crate::simulator::{simulate, ValueSeries};
use crate::strategy::{StrategyKind, DEFAULT_MIN_DAY};

/// Wait of the half-yearly drawdown hybrids.
pub const HALF_YEAR_DAYS: i64 = 182;
/// Drawdown levels covered by the sweeps, in percent below the peak.
pub const SWEEP_MIN_DROP: u32 = 5;
pub const SWEEP_MAX_DROP: u32 = 70;
pub const SWEEP_STEP: u32 = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedStrategy {
    pub name: String,
    #[serde(flatten)]
    pub kind: StrategyKind,
}

impl NamedStrategy {
    pub fn new(name: &str, kind: StrategyKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
        }
    }
}

/// Everything one comparison run needs besides the strategy.
#[derive(Debug, Clone)]
pub struct Scenario {
    pub symbol: String,
    pub wkn: Option<String>,
    pub isin: Option<String>,
    pub start: NaiveDate,
    pub as_of: NaiveDate,
    pub monthly_income: f64,
    pub initial_cash: f64,
    pub fees: FeeSchedule,
    pub irr_range: SearchRange,
}

#[derive(Debug, Clone)]
pub struct StrategyOutcome {
    pub name: String,
    pub series: ValueSeries,
    /// `None` for strategies without a meaningful return.
    pub irr: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct Comparison {
    pub symbol: String,
    pub dates: Vec<NaiveDate>,
    pub outcomes: Vec<StrategyOutcome>,
}

impl Scenario {
    /// Fully allocated to `symbol`, starting without shares.
    pub fn portfolio(&self, prices: Arc<dyn PriceProvider>) -> Result<Portfolio> {
        Portfolio::builder()
            .cash(self.initial_cash)
            .holding(
                Stock::with_identifiers(&self.symbol, self.wkn.as_deref(), self.isin.as_deref()),
                0,
                1.0,
            )
            .fees(self.fees)
            .search_range(self.irr_range)
            .prices(prices)
            .build()
    }

    /// Simulates one strategy on its own portfolio.
    pub fn run(
        &self,
        strategy: &NamedStrategy,
        prices: Arc<dyn PriceProvider>,
    ) -> Result<StrategyOutcome> {
        let mut portfolio = self.portfolio(prices.clone())?;
        let mut income = MonthlyIncome::new(self.start, self.monthly_income);
        let mut strat = strategy.kind.build(self.start, &self.symbol, prices);

        let series = simulate(
            self.start,
            &mut portfolio,
            &mut income,
            strat.as_mut(),
            self.as_of,
        )?;
        if series.is_empty() {
            warn!(strategy = %strategy.name, "No month start between start and as_of");
        }
        let irr = if strategy.kind.reports_irr() {
            Some(portfolio.calc_irr(self.as_of)?)
        } else {
            None
        };

        info!(strategy = %strategy.name, irr = ?irr, "Strategy evaluated");
        Ok(StrategyOutcome {
            name: strategy.name.clone(),
            series,
            irr,
        })
    }
}

/// Runs every strategy concurrently, each on its own portfolio. Outcomes
/// keep the order of `strategies`.
pub async fn compare(
    scenario: Arc<Scenario>,
    prices: Arc<dyn PriceProvider>,
    strategies: &[NamedStrategy],
) -> Result<Comparison> {
    let mut runs: FuturesUnordered<_> = strategies
        .iter()
        .cloned()
        .enumerate()
        .map(|(idx, strategy)| {
            let scenario = scenario.clone();
            let prices = prices.clone();
            tokio::task::spawn_blocking(move || (idx, scenario.run(&strategy, prices)))
        })
        .collect();

    let mut outcomes = Vec::with_capacity(strategies.len());
    while let Some(joined) = runs.next().await {
        let (idx, outcome) = joined?;
        outcomes.push((idx, outcome?));
    }
    outcomes.sort_by_key(|(idx, _)| *idx);
    let outcomes: Vec<StrategyOutcome> = outcomes.into_iter().map(|(_, o)| o).collect();

    let dates = outcomes
        .first()
        .map(|o| o.series.dates.clone())
        .unwrap_or_default();
    if let Some(odd) = outcomes.iter().find(|o| o.series.dates != dates) {
        return Err(SimError::DateMismatch {
            name: odd.name.clone(),
        });
    }

    Ok(Comparison {
        symbol: scenario.symbol.clone(),
        dates,
        outcomes,
    })
}

/// Returns at the top of the search range carry no signal.
pub fn irr_label(irr: f64, range: SearchRange) -> String {
    if irr >= range.ceiling_pct() - 0.01 {
        "unbounded".to_string()
    } else {
        format!("{irr:.2}%")
    }
}

/// Named strategy sets to compare.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategySet {
    /// Monthly, two fixed-month pairs, two drawdown levels and their hybrids.
    #[default]
    Mixed,
    /// Every pair of months half a year apart.
    Biyearly,
    /// [`drawdown_sweep`] with the default step.
    Drawdown,
    /// [`adaptive_sweep`] over half a year with the default step.
    AdaptivePeriodic,
}

impl StrategySet {
    pub fn strategies(self) -> Vec<NamedStrategy> {
        match self {
            StrategySet::Mixed => default_strategies(),
            StrategySet::Biyearly => biyearly_strategies(),
            StrategySet::Drawdown => drawdown_sweep(SWEEP_STEP),
            StrategySet::AdaptivePeriodic => adaptive_sweep(HALF_YEAR_DAYS, SWEEP_STEP),
        }
    }
}

fn fixed(months: Vec<u32>) -> StrategyKind {
    StrategyKind::FixedMonths {
        months,
        min_day: DEFAULT_MIN_DAY,
    }
}

/// `NoInvest` first, so every set carries the cash baseline.
fn with_baseline(strategies: impl IntoIterator<Item = NamedStrategy>) -> Vec<NamedStrategy> {
    std::iter::once(NamedStrategy::new("NoInvest", StrategyKind::NoInvest))
        .chain(strategies)
        .collect()
}

/// Peak-relative trigger level for a drop in percent, e.g. 30 -> 0.7.
fn rel_val(drop_pct: u32) -> f64 {
    f64::from(100 - drop_pct) / 100.0
}

fn drops(step: u32) -> impl Iterator<Item = u32> {
    (SWEEP_MIN_DROP..=SWEEP_MAX_DROP).step_by(step.max(1) as usize)
}

fn wait_label(wait_days: i64) -> String {
    if wait_days == HALF_YEAR_DAYS {
        "6m".to_string()
    } else {
        format!("{wait_days}d")
    }
}

/// The strategy set of the comparison page: monthly, half-yearly fixed
/// months, two drawdown levels and their six-month hybrids.
pub fn default_strategies() -> Vec<NamedStrategy> {
    let monthly = StrategyKind::Monthly {
        min_day: DEFAULT_MIN_DAY,
    };
    let hybrid = |rel_val| StrategyKind::AdaptivePeriodic {
        wait_days: HALF_YEAR_DAYS,
        rel_val,
    };
    vec![
        NamedStrategy::new("Monthly", monthly),
        NamedStrategy::new("NoInvest", StrategyKind::NoInvest),
        NamedStrategy::new("January/July", fixed(vec![1, 7])),
        NamedStrategy::new("April/October", fixed(vec![4, 10])),
        NamedStrategy::new("30%Drawdown", StrategyKind::MinDrawdown { rel_val: 0.7 }),
        NamedStrategy::new("55%Drawdown", StrategyKind::MinDrawdown { rel_val: 0.45 }),
        NamedStrategy::new("6m||30%Drawdown", hybrid(0.7)),
        NamedStrategy::new("6m||55%Drawdown", hybrid(0.45)),
    ]
}

/// January/July through June/December.
pub fn biyearly_strategies() -> Vec<NamedStrategy> {
    let mut first = Month::January;
    let mut pairs = Vec::with_capacity(6);
    for _ in 0..6 {
        let second = (0..6).fold(first, |month, _| month.succ());
        pairs.push(NamedStrategy::new(
            &format!("{}/{}", first.name(), second.name()),
            fixed(vec![first.number_from_month(), second.number_from_month()]),
        ));
        first = first.succ();
    }
    with_baseline(pairs)
}

/// [`MinDrawdown`](crate::MinDrawdown) from a 5% to a 70% drop below the
/// peak, `step` percentage points apart.
pub fn drawdown_sweep(step: u32) -> Vec<NamedStrategy> {
    with_baseline(drops(step).map(|drop| {
        NamedStrategy::new(
            &format!("{drop}%Drawdown"),
            StrategyKind::MinDrawdown {
                rel_val: rel_val(drop),
            },
        )
    }))
}

/// The drawdown sweep, each level combined with a periodic investment every
/// `wait_days`.
pub fn adaptive_sweep(wait_days: i64, step: u32) -> Vec<NamedStrategy> {
    let label = wait_label(wait_days);
    with_baseline(drops(step).map(|drop| {
        NamedStrategy::new(
            &format!("{label}||{drop}%Drawdown"),
            StrategyKind::AdaptivePeriodic {
                wait_days,
                rel_val: rel_val(drop),
            },
        )
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prices::PriceTable;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn scenario() -> Scenario {
        Scenario {
            symbol: "SPY".to_string(),
            wkn: None,
            isin: None,
            start: d(2020, 1, 1),
            as_of: d(2020, 12, 31),
            monthly_income: 1000.0,
            initial_cash: 0.0,
            fees: FeeSchedule::default(),
            irr_range: SearchRange::default(),
        }
    }

    fn monthly() -> NamedStrategy {
        NamedStrategy::new("Monthly", StrategyKind::Monthly { min_day: 14 })
    }

    fn flat_prices() -> Arc<dyn PriceProvider> {
        let table = PriceTable::new();
        table.extend(
            "SPY",
            d(2020, 1, 1)
                .iter_days()
                .take_while(|day| *day <= d(2020, 12, 31))
                .map(|day| (day, 50.0)),
        );
        Arc::new(table)
    }

    #[test]
    fn test_run_monthly_flat_market() {
        let outcome = scenario()
            .run(&monthly(), flat_prices())
            .unwrap();
        assert_eq!(outcome.series.len(), 12);
        assert_eq!(outcome.series.values[0], 1000.0);
        assert_eq!(outcome.series.values[11], 12000.0);
        assert!(outcome.irr.unwrap().abs() < 0.01);
    }

    #[test]
    fn test_run_no_invest_has_no_irr() {
        let outcome = scenario()
            .run(&NamedStrategy::new("NoInvest", StrategyKind::NoInvest), flat_prices())
            .unwrap();
        assert!(outcome.irr.is_none());
    }

    #[tokio::test]
    async fn test_compare_keeps_order() {
        let strategies = default_strategies();
        let cmp = compare(Arc::new(scenario()), flat_prices(), &strategies).await.unwrap();

        let names: Vec<_> = cmp.outcomes.iter().map(|o| o.name.as_str()).collect();
        let expected: Vec<_> = strategies.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, expected);
        assert_eq!(cmp.dates.len(), 12);
        assert_eq!(cmp.symbol, "SPY");
        for outcome in &cmp.outcomes {
            // Flat prices and no fees: every strategy ends at paid-in capital
            assert_eq!(outcome.series.values.last(), Some(&12000.0));
        }
    }

    #[tokio::test]
    async fn test_compare_fails_on_missing_data() {
        // Quotes stop after January, the February snapshot has none
        let table = PriceTable::new();
        table.extend(
            "SPY",
            d(2020, 1, 1)
                .iter_days()
                .take_while(|day| *day <= d(2020, 1, 31))
                .map(|day| (day, 50.0)),
        );
        let res = compare(Arc::new(scenario()), Arc::new(table), &default_strategies()).await;
        assert!(matches!(res, Err(SimError::DataUnavailable { .. })));
    }

    #[test]
    fn test_irr_label() {
        let range = SearchRange::default();
        assert_eq!(irr_label(7.4567, range), "7.46%");
        assert_eq!(irr_label(400.0, range), "unbounded");
        assert_eq!(irr_label(399.995, range), "unbounded");
    }

    #[test]
    fn test_scenario_stock_identifiers() {
        let mut sc = scenario();
        sc.wkn = Some("A0RPWH".to_string());
        sc.isin = Some("IE00B4L5Y983".to_string());
        let p = sc.portfolio(flat_prices()).unwrap();
        let (stock, shares) = p.holdings().iter().next().unwrap();
        assert_eq!(stock.symbol, "SPY");
        assert_eq!(stock.wkn.as_deref(), Some("A0RPWH"));
        assert_eq!(stock.isin.as_deref(), Some("IE00B4L5Y983"));
        assert_eq!(*shares, 0);
    }

    #[test]
    fn test_run_before_first_month_start() {
        let mut sc = scenario();
        sc.start = d(2020, 1, 2);
        sc.as_of = d(2020, 1, 20);
        let outcome = sc
            .run(&monthly(), flat_prices())
            .unwrap();
        assert!(outcome.series.is_empty());
        assert!(outcome.irr.is_some());
    }

    #[test]
    fn test_biyearly_strategies() {
        let set = biyearly_strategies();
        let names: Vec<_> = set.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "NoInvest",
                "January/July",
                "February/August",
                "March/September",
                "April/October",
                "May/November",
                "June/December"
            ]
        );
        assert_eq!(set[3].kind, fixed(vec![3, 9]));
        assert_eq!(set[6].kind, fixed(vec![6, 12]));
    }

    #[test]
    fn test_drawdown_sweep() {
        let set = drawdown_sweep(SWEEP_STEP);
        assert_eq!(set.len(), 15);
        assert_eq!(set[0].kind, StrategyKind::NoInvest);
        assert_eq!(set[1].name, "5%Drawdown");
        assert_eq!(set[1].kind, StrategyKind::MinDrawdown { rel_val: 0.95 });
        assert_eq!(set[6].name, "30%Drawdown");
        assert_eq!(set[6].kind, StrategyKind::MinDrawdown { rel_val: 0.7 });
        assert_eq!(set[14].name, "70%Drawdown");
        assert_eq!(set[14].kind, StrategyKind::MinDrawdown { rel_val: 0.3 });

        let coarse = drawdown_sweep(20);
        let names: Vec<_> = coarse.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["NoInvest", "5%Drawdown", "25%Drawdown", "45%Drawdown", "65%Drawdown"]
        );
    }

    #[test]
    fn test_adaptive_sweep() {
        let set = adaptive_sweep(HALF_YEAR_DAYS, SWEEP_STEP);
        assert_eq!(set.len(), 15);
        assert_eq!(set[11].name, "6m||55%Drawdown");
        assert_eq!(
            set[11].kind,
            StrategyKind::AdaptivePeriodic { wait_days: 182, rel_val: 0.45 }
        );

        let quarterly = adaptive_sweep(91, 35);
        let names: Vec<_> = quarterly.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["NoInvest", "91d||5%Drawdown", "91d||40%Drawdown"]);
    }

    #[test]
    fn test_strategy_sets() {
        assert_eq!(StrategySet::default().strategies(), default_strategies());
        assert_eq!(StrategySet::Biyearly.strategies().len(), 7);
        assert_eq!(StrategySet::Drawdown.strategies(), drawdown_sweep(5));
        assert_eq!(StrategySet::AdaptivePeriodic.strategies(), adaptive_sweep(182, 5));
    }
}
