//! Money-weighted return via bisection.
//!
//! The net present value function is built from dated external
//! contributions and the terminal portfolio value:
//!
//! `f(x) = -terminal + Σ amount_i * x^(years from contribution_i to as_of)`
//!
//! `f` grows with `x` for positive contributions, so the root is found by
//! halving a growth-factor bracket on the sign of `f(midpoint)`.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::warn;

pub const DAYS_PER_YEAR: f64 = 365.0;
pub const PRECISION: f64 = 1e-3;
pub const MAX_ITERATIONS: usize = 100;

/// Growth-factor bracket searched by the solver. The default `[1.0, 5.0]`
/// limits reportable returns to -100%..+400%.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchRange {
    pub low: f64,
    pub high: f64,
}

impl Default for SearchRange {
    fn default() -> Self {
        Self { low: 1.0, high: 5.0 }
    }
}

impl SearchRange {
    /// Upper end of the bracket expressed as a return in percent.
    pub fn ceiling_pct(&self) -> f64 {
        growth_to_pct(self.high)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bisection {
    pub root: f64,
    pub iterations: usize,
    pub converged: bool,
}

pub fn bisect<F>(f: F, range: SearchRange, precision: f64, max_iterations: usize) -> Bisection
where
    F: Fn(f64) -> f64,
{
    let (mut low, mut high) = (range.low, range.high);
    let mut x = low + (high - low) / 2.0;
    let mut diff = f(x);
    let mut iterations = 0;

    while diff.abs() > precision && iterations < max_iterations {
        if diff > 0.0 {
            high = x;
        } else {
            low = x;
        }
        x = low + (high - low) / 2.0;
        diff = f(x);
        iterations += 1;
    }

    Bisection {
        root: x,
        iterations,
        converged: diff.abs() <= precision,
    }
}

/// A dated external contribution. Positive for capital paid in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cashflow {
    pub date: NaiveDate,
    pub amount: f64,
}

pub fn npv_fn(flows: &[Cashflow], terminal: f64, as_of: NaiveDate) -> impl Fn(f64) -> f64 + '_ {
    move |x| {
        flows.iter().fold(-terminal, |acc, flow| {
            let years = (as_of - flow.date).num_days() as f64 / DAYS_PER_YEAR;
            acc + flow.amount * x.powf(years)
        })
    }
}

/// Annualized return in percent, rounded to two decimals.
pub fn solve(flows: &[Cashflow], terminal: f64, as_of: NaiveDate, range: SearchRange) -> f64 {
    let result = bisect(npv_fn(flows, terminal, as_of), range, PRECISION, MAX_ITERATIONS);
    if !result.converged {
        warn!(
            iterations = result.iterations,
            estimate = result.root,
            "IRR bisection reached max iterations without converging"
        );
    }
    round2(growth_to_pct(result.root))
}

pub fn growth_to_pct(x: f64) -> f64 {
    (x - 1.0) * 100.0
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_bisect_finds_root() {
        let res = bisect(|x| x * x - 4.0, SearchRange::default(), 1e-6, 100);
        assert!(res.converged);
        assert!((res.root - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_bisect_midpoint_first() {
        // Root exactly at the first midpoint needs no iteration
        let res = bisect(|x| x - 3.0, SearchRange::default(), 1e-3, 100);
        assert_eq!(res.iterations, 0);
        assert_eq!(res.root, 3.0);
    }

    #[test]
    fn test_bisect_iteration_cap() {
        let res = bisect(|x| x - 1.234_567, SearchRange::default(), 1e-12, 5);
        assert!(!res.converged);
        assert_eq!(res.iterations, 5);
        assert!((res.root - 1.234_567).abs() < 4.0 / 32.0);
    }

    #[test]
    fn test_bisect_saturates_at_upper_bound() {
        let res = bisect(|x| x - 10.0, SearchRange::default(), 1e-3, 100);
        assert!(!res.converged);
        assert!(res.root > 4.99);
    }

    #[test]
    fn test_single_contribution_one_year() {
        // 1000 in, 1100 out one year later: 10%
        let flows = [Cashflow { date: d(2020, 1, 1), amount: 1000.0 }];
        let irr = solve(&flows, 1100.0, d(2020, 12, 31), SearchRange::default());
        assert!((irr - 10.0).abs() < 0.01, "irr = {irr}");
    }

    #[test]
    fn test_flat_value_is_zero_return() {
        let flows = [
            Cashflow { date: d(2019, 1, 1), amount: 500.0 },
            Cashflow { date: d(2019, 7, 1), amount: 500.0 },
        ];
        let irr = solve(&flows, 1000.0, d(2020, 1, 1), SearchRange::default());
        assert!(irr.abs() < 0.01, "irr = {irr}");
    }

    #[test]
    fn test_loss_is_floored_at_lower_bound() {
        let flows = [Cashflow { date: d(2019, 1, 1), amount: 1000.0 }];
        let irr = solve(&flows, 500.0, d(2020, 1, 1), SearchRange::default());
        assert!(irr <= 0.01 && irr >= 0.0, "irr = {irr}");
    }

    #[test]
    fn test_wider_range_reports_losses() {
        let flows = [Cashflow { date: d(2019, 1, 1), amount: 1000.0 }];
        let range = SearchRange { low: 0.0, high: 5.0 };
        let irr = solve(&flows, 500.0, d(2020, 1, 1), range);
        assert!((irr + 50.0).abs() < 0.2, "irr = {irr}");
    }

    #[test]
    fn test_round2() {
        assert_eq!(round2(12.345_6), 12.35);
        assert_eq!(round2(-0.004), -0.0);
        assert_eq!(SearchRange::default().ceiling_pct(), 400.0);
    }
}
