use chrono::{Datelike, Months, NaiveDate};

pub trait Income: Send {
    /// Cash paid out on `date`, zero when nothing is due.
    fn tick(&mut self, date: NaiveDate) -> f64;
}

/// Pays a fixed amount on the first tick of every calendar month.
#[derive(Debug, Clone)]
pub struct MonthlyIncome {
    last_paid: NaiveDate,
    amount: f64,
}

impl MonthlyIncome {
    /// The last payout is backdated one month so the first tick pays.
    pub fn new(start: NaiveDate, amount: f64) -> Self {
        Self {
            last_paid: start.checked_sub_months(Months::new(1)).unwrap_or(NaiveDate::MIN),
            amount,
        }
    }

    pub fn amount(&self) -> f64 {
        self.amount
    }

    pub fn last_paid(&self) -> NaiveDate {
        self.last_paid
    }
}

impl Income for MonthlyIncome {
    fn tick(&mut self, date: NaiveDate) -> f64 {
        if (self.last_paid.year(), self.last_paid.month()) == (date.year(), date.month()) {
            return 0.0;
        }
        self.last_paid = date;
        self.amount
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_new_income() {
        let income = MonthlyIncome::new(d(2020, 2, 1), 1000.0);
        assert_eq!(income.amount(), 1000.0);
        assert_eq!(income.last_paid(), d(2020, 1, 1));
    }

    #[test]
    fn test_monthly_tick() {
        let start = d(2020, 2, 1);
        let mut income = MonthlyIncome::new(start, 1000.0);

        assert_eq!(income.tick(start), 1000.0);
        assert_eq!(income.tick(d(2020, 2, 2)), 0.0);
        assert_eq!(income.tick(d(2020, 2, 29)), 0.0);
        assert_eq!(income.tick(d(2020, 3, 1)), 1000.0);
    }

    #[test]
    fn test_same_month_next_year_pays() {
        let mut income = MonthlyIncome::new(d(2020, 1, 15), 500.0);
        assert_eq!(income.tick(d(2020, 1, 15)), 500.0);
        // Skipping a whole year of ticks must not suppress the next January
        assert_eq!(income.tick(d(2021, 1, 3)), 500.0);
        assert_eq!(income.tick(d(2021, 1, 4)), 0.0);
    }

    #[test]
    fn test_start_mid_month_pays_immediately() {
        let mut income = MonthlyIncome::new(d(2020, 3, 31), 250.0);
        assert_eq!(income.last_paid(), d(2020, 2, 29));
        assert_eq!(income.tick(d(2020, 3, 31)), 250.0);
    }
}
