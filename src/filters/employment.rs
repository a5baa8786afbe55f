use std::sync::Arc;

use super::{clamp_index, Attribute, Filter, FilterValue, LoanRecord};
use crate::errors::{LoanBacktestError, Result};

/// Employment tenure filter.
///
/// Encoding: `n/a` is 0, `< 1 year` is 1, `N years` is N + 1 for N in 1..=9,
/// `10 years` is 10 and `10+ years` is 11. The predicate keeps loans whose
/// tenure is at or below the current threshold.
#[derive(Debug, Clone)]
pub struct EmploymentLength {
    options: Arc<[FilterValue]>,
    current: usize,
}

impl EmploymentLength {
    pub const NAME: &'static str = "Employment Length";

    pub fn new(options: Arc<[FilterValue]>) -> Self {
        Self {
            options,
            current: 0,
        }
    }

    /// Options `0..12`, one per encoded tenure.
    pub fn default_options() -> Arc<[FilterValue]> {
        (0..12).collect::<Vec<FilterValue>>().into()
    }
}

impl Filter for EmploymentLength {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    #[inline]
    fn options(&self) -> &[FilterValue] {
        &self.options
    }

    #[inline]
    fn current(&self) -> usize {
        self.current
    }

    #[inline]
    fn set_current(&mut self, index: usize) {
        self.current = clamp_index(index, self.options.len());
    }

    fn convert(&self, raw: &str) -> Result<FilterValue> {
        let raw = raw.trim();
        let unknown = || LoanBacktestError::UnknownCategory {
            filter: Self::NAME,
            token: raw.to_string(),
        };
        match raw {
            "n/a" | "" => Ok(0),
            "< 1 year" => Ok(1),
            "10 years" => Ok(10),
            "10+ years" => Ok(11),
            _ => {
                let years = raw
                    .strip_suffix(" years")
                    .or_else(|| raw.strip_suffix(" year"))
                    .ok_or_else(unknown)?;
                match years.parse::<FilterValue>() {
                    Ok(years @ 1..=9) => Ok(years + 1),
                    _ => Err(unknown()),
                }
            }
        }
    }

    fn stringify(&self, value: FilterValue) -> String {
        match value {
            0 => "n/a".to_string(),
            1 => "<1 year".to_string(),
            2 => ">1 year".to_string(),
            10 | 11 => ">10 years".to_string(),
            _ => format!(">{} years", value - 1),
        }
    }

    #[inline]
    fn apply(&self, loan: &LoanRecord) -> bool {
        loan.get(Attribute::EmploymentLength) <= self.value()
    }
}
