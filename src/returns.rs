//! Aggregate investor returns over a selection of loans.

use std::cmp::Ordering;

use chrono::{Datelike, Duration, NaiveDate};
use serde::Serialize;

use crate::loan::LoanFinancialSummary;

/// Population level statistics of a loan selection.
///
/// The default value (all zeros) is the result of selecting no loans.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct LoanReturn {
    pub num_loans: usize,
    /// Annualized return in percent, compounded from the monthly profit ratio.
    pub net_apy: f64,
    /// Mean nominal interest rate of the selection, in percent.
    pub expected_apy: f64,
    pub pct_defaulted: f64,
    pub avg_default_loss: f64,
    /// Loans issued in the volume reference month.
    pub loans_per_month: usize,
    pub num_defaulted: usize,
}

impl LoanReturn {
    pub fn is_empty(&self) -> bool {
        self.num_loans == 0
    }

    /// Whether enough loans back the result for its net APY to count.
    pub fn is_significant(&self, min_loans: usize) -> bool {
        self.num_loans > 0 && self.num_loans >= min_loans
    }

    /// Sort key of the search: net APY for significant selections, zero for
    /// thin ones and negative infinity for an empty selection.
    pub fn fitness(&self, min_loans: usize) -> f64 {
        if self.is_empty() {
            f64::NEG_INFINITY
        } else if self.num_loans >= min_loans {
            self.net_apy
        } else {
            0.0
        }
    }

    /// Descending order by [`fitness`](Self::fitness).
    pub fn compare_fitness(&self, other: &Self, min_loans: usize) -> Ordering {
        other.fitness(min_loans).total_cmp(&self.fitness(min_loans))
    }
}

/// Calendar month used to count recent loan volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VolumeMonth {
    pub year: i32,
    pub month: u32,
}

impl VolumeMonth {
    /// Most recent fully matured monthly cohort: `reference` minus the young
    /// loan cutoff and one extra month.
    pub fn from_reference(reference: NaiveDate, young_loans_in_days: u32) -> Self {
        let date = reference - Duration::days(i64::from(young_loans_in_days) + 30);
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    #[inline]
    pub fn contains(&self, date: NaiveDate) -> bool {
        date.year() == self.year && date.month() == self.month
    }
}

/// Reduce the selected loans to a [`LoanReturn`].
pub fn aggregate_returns<'a, I>(loans: I, volume_month: VolumeMonth) -> LoanReturn
where
    I: IntoIterator<Item = &'a LoanFinancialSummary>,
{
    let mut num_loans = 0usize;
    let mut num_defaulted = 0usize;
    let mut per_month = 0usize;
    let mut profit = 0.0;
    let mut principal = 0.0;
    let mut lost = 0.0;
    let mut rate = 0.0;

    for loan in loans {
        num_loans += 1;
        profit += loan.profit;
        principal += loan.principal;
        lost += loan.lost;
        rate += loan.annual_rate;
        if loan.defaulted {
            num_defaulted += 1;
        }
        if volume_month.contains(loan.issue_date) {
            per_month += 1;
        }
    }

    if num_loans == 0 {
        return LoanReturn::default();
    }

    let net_apy = if principal == 0.0 {
        0.0
    } else {
        100.0 * ((1.0 + profit / principal).powi(12) - 1.0)
    };

    LoanReturn {
        num_loans,
        net_apy,
        expected_apy: rate / num_loans as f64,
        pct_defaulted: 100.0 * num_defaulted as f64 / num_loans as f64,
        avg_default_loss: if num_defaulted > 0 {
            lost / num_defaulted as f64
        } else {
            0.0
        },
        loans_per_month: per_month,
        num_defaulted,
    }
}
