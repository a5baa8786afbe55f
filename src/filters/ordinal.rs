use std::sync::Arc;

use chrono::{Datelike, NaiveDate};

use super::{clamp_index, Attribute, Filter, FilterValue, LoanRecord};
use crate::errors::{LoanBacktestError, Result};

/// Direction of an ordinal predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    /// Loan value must be at or below the threshold.
    AtMost,
    /// Loan value must be at or above the threshold.
    AtLeast,
}

impl Comparison {
    #[inline]
    pub fn holds(self, value: FilterValue, threshold: FilterValue) -> bool {
        match self {
            Comparison::AtMost => value <= threshold,
            Comparison::AtLeast => value >= threshold,
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            Comparison::AtMost => "<=",
            Comparison::AtLeast => ">=",
        }
    }
}

/// How raw export text becomes an ordinal value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrdinalParser {
    /// Whole number; blank is zero.
    Integer,
    /// Whole number; blank means the event never happened.
    IntegerOrNever { never: FilterValue },
    /// Decimal (optionally `%` suffixed) multiplied by `scale` and rounded.
    Scaled { scale: u32 },
    /// Number of whitespace separated words.
    WordCount,
    /// Whole months between a `Mon-YYYY` / `YYYY-MM-DD` date and `reference`.
    MonthsSince { reference: NaiveDate },
}

impl OrdinalParser {
    fn parse(self, field: &str, raw: &str) -> Result<FilterValue> {
        let trimmed = raw.trim();
        match self {
            OrdinalParser::WordCount => Ok(trimmed.split_whitespace().count() as FilterValue),
            _ if trimmed.is_empty() => Ok(match self {
                OrdinalParser::IntegerOrNever { never } => never,
                _ => 0,
            }),
            OrdinalParser::Integer | OrdinalParser::IntegerOrNever { .. } => {
                parse_non_negative(field, trimmed, 1.0)
            }
            OrdinalParser::Scaled { scale } => {
                let number = trimmed.trim_end_matches('%').trim();
                parse_non_negative(field, number, f64::from(scale))
            }
            OrdinalParser::MonthsSince { reference } => {
                let opened = parse_month_year(trimmed)?;
                Ok(months_between(opened, reference))
            }
        }
    }

    fn render(self, value: FilterValue) -> String {
        match self {
            OrdinalParser::IntegerOrNever { never } if value >= never => "never".to_string(),
            OrdinalParser::Scaled { scale } => format!("{:.2}", value as f64 / f64::from(scale)),
            OrdinalParser::MonthsSince { .. } => format!("{} months", value),
            _ => value.to_string(),
        }
    }
}

fn parse_non_negative(field: &str, raw: &str, scale: f64) -> Result<FilterValue> {
    let number: f64 = raw
        .parse()
        .map_err(|_| LoanBacktestError::number_parsing(field, raw))?;
    if !number.is_finite() {
        return Err(LoanBacktestError::number_parsing(field, raw));
    }
    Ok((number * scale).round().max(0.0) as FilterValue)
}

/// Parse the month-granular dates used by the loan export (`Jan-2001`,
/// `2001-01-01`).
pub fn parse_month_year(raw: &str) -> Result<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(&format!("01-{}", raw), "%d-%b-%Y")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%Y-%m-%d"))
        .map_err(LoanBacktestError::from)
}

fn months_between(start: NaiveDate, end: NaiveDate) -> FilterValue {
    let months = (i64::from(end.year()) - i64::from(start.year())) * 12
        + (i64::from(end.month()) - i64::from(start.month()));
    months.max(0) as FilterValue
}

/// Shared, immutable description of an ordinal filter.
#[derive(Debug)]
pub struct OrdinalSpec {
    pub name: &'static str,
    pub attribute: Attribute,
    pub comparison: Comparison,
    pub parser: OrdinalParser,
    pub options: Vec<FilterValue>,
}

impl OrdinalSpec {
    /// Spec whose options are `lo, lo + step, ...` up to but excluding `hi`.
    pub fn range(
        name: &'static str,
        attribute: Attribute,
        comparison: Comparison,
        parser: OrdinalParser,
        lo: FilterValue,
        hi: FilterValue,
        step: FilterValue,
    ) -> Self {
        let options = (lo..hi).step_by(step.max(1) as usize).collect();
        Self {
            name,
            attribute,
            comparison,
            parser,
            options,
        }
    }
}

/// Threshold filter over one numeric attribute.
#[derive(Debug, Clone)]
pub struct OrdinalFilter {
    spec: Arc<OrdinalSpec>,
    current: usize,
}

impl OrdinalFilter {
    pub fn new(spec: Arc<OrdinalSpec>) -> Self {
        Self { spec, current: 0 }
    }

    pub fn attribute(&self) -> Attribute {
        self.spec.attribute
    }
}

impl Filter for OrdinalFilter {
    fn name(&self) -> &'static str {
        self.spec.name
    }

    #[inline]
    fn options(&self) -> &[FilterValue] {
        &self.spec.options
    }

    #[inline]
    fn current(&self) -> usize {
        self.current
    }

    #[inline]
    fn set_current(&mut self, index: usize) {
        self.current = clamp_index(index, self.spec.options.len());
    }

    fn convert(&self, raw: &str) -> Result<FilterValue> {
        self.spec.parser.parse(self.spec.attribute.csv_name(), raw)
    }

    fn stringify(&self, value: FilterValue) -> String {
        format!(
            "{}{}",
            self.spec.comparison.symbol(),
            self.spec.parser.render(value)
        )
    }

    #[inline]
    fn apply(&self, loan: &LoanRecord) -> bool {
        self.spec
            .comparison
            .holds(loan.get(self.spec.attribute), self.value())
    }
}
