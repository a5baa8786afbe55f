//! # Loan Screening Filters
//!
//! A filter screens loans on one attribute. Every filter owns an ordered list
//! of candidate [`FilterValue`]s and a current selection index into it; the
//! genetic search only ever moves that index.
//!
//! Two families exist:
//!
//! - **Ordinal** filters compare a numeric attribute against the current
//!   threshold ([`OrdinalFilter`], [`EmploymentLength`]).
//! - **Bitmask** filters give every category its own bit and pass loans whose
//!   category bit intersects the current mask ([`BitmaskFilter`]).
//!
//! [`VariantFilter`] is the closed sum over the concrete filters. A chromosome
//! is a plain `Vec<VariantFilter>`, and every operation dispatches through a
//! `match` without heap indirection. Option lists and conversion tables live
//! behind `Arc`s built once by [`FilterCatalog`], so cloning a filter never
//! allocates.
//!
//! ## Example
//!
//! ```rust
//! use chrono::NaiveDate;
//! use lc_ga_backtest::filters::{Attribute, Filter, FilterCatalog, LoanRecord};
//!
//! let catalog = FilterCatalog::new("ABCDEFG", NaiveDate::from_ymd_opt(2014, 7, 1).unwrap()).unwrap();
//! let mut grade = catalog.build(Attribute::CreditGrade);
//!
//! let mut loan = LoanRecord::default();
//! loan.set(Attribute::CreditGrade, grade.convert("B").unwrap());
//!
//! let index = grade.options().iter().position(|&v| v == grade.convert("AB").unwrap()).unwrap();
//! grade.set_current(index);
//! assert!(grade.apply(&loan));
//! assert_eq!(grade.current_string(), "A,B");
//! ```

mod bitmask;
mod catalog;
mod employment;
mod ordinal;

pub use bitmask::{BitmaskFilter, CategoryTable};
pub use catalog::{
    FilterCatalog, GRADE_LABELS, HOME_OWNERSHIP_LABELS, INCOME_VALIDATED_LABELS, NEVER_DELINQUENT,
    PURPOSE_LABELS, STATE_LABELS,
};
pub use employment::EmploymentLength;
pub use ordinal::{parse_month_year, Comparison, OrdinalFilter, OrdinalParser, OrdinalSpec};

use serde::{Deserialize, Serialize};

use crate::errors::Result;

/// Integer encoding of one screening dimension: a threshold for ordinal
/// filters, an OR of category bits for bitmask filters.
pub type FilterValue = u64;

/// Loan attributes that can be screened on.
///
/// The discriminant doubles as the index into [`LoanRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Attribute {
    #[serde(rename = "acc_open_past_24mths")]
    AccOpenPast24Mths,
    FundedAmount,
    AnnualIncome,
    CreditGrade,
    DebtToIncomeRatio,
    #[serde(rename = "delinq_2yrs")]
    Delinq2Yrs,
    EarliestCreditLine,
    EmploymentLength,
    HomeOwnership,
    IncomeValidated,
    #[serde(rename = "inq_last_6mths")]
    InqLast6Mths,
    LoanPurpose,
    MthsSinceLastDelinq,
    PubRec,
    RevolUtilization,
    AddrState,
    TotalAcc,
    DescWordCount,
}

impl Attribute {
    /// Number of screenable attributes.
    pub const COUNT: usize = 18;

    /// Every attribute in index order.
    pub const ALL: [Attribute; Attribute::COUNT] = [
        Attribute::AccOpenPast24Mths,
        Attribute::FundedAmount,
        Attribute::AnnualIncome,
        Attribute::CreditGrade,
        Attribute::DebtToIncomeRatio,
        Attribute::Delinq2Yrs,
        Attribute::EarliestCreditLine,
        Attribute::EmploymentLength,
        Attribute::HomeOwnership,
        Attribute::IncomeValidated,
        Attribute::InqLast6Mths,
        Attribute::LoanPurpose,
        Attribute::MthsSinceLastDelinq,
        Attribute::PubRec,
        Attribute::RevolUtilization,
        Attribute::AddrState,
        Attribute::TotalAcc,
        Attribute::DescWordCount,
    ];

    /// Position of the attribute inside a [`LoanRecord`].
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Column name in the LendingClub stats export.
    pub fn csv_name(self) -> &'static str {
        match self {
            Attribute::AccOpenPast24Mths => "acc_open_past_24mths",
            Attribute::FundedAmount => "funded_amnt",
            Attribute::AnnualIncome => "annual_inc",
            Attribute::CreditGrade => "grade",
            Attribute::DebtToIncomeRatio => "dti",
            Attribute::Delinq2Yrs => "delinq_2yrs",
            Attribute::EarliestCreditLine => "earliest_cr_line",
            Attribute::EmploymentLength => "emp_length",
            Attribute::HomeOwnership => "home_ownership",
            Attribute::IncomeValidated => "is_inc_v",
            Attribute::InqLast6Mths => "inq_last_6mths",
            Attribute::LoanPurpose => "purpose",
            Attribute::MthsSinceLastDelinq => "mths_since_last_delinq",
            Attribute::PubRec => "pub_rec",
            Attribute::RevolUtilization => "revol_util",
            Attribute::AddrState => "addr_state",
            Attribute::TotalAcc => "total_acc",
            Attribute::DescWordCount => "desc",
        }
    }
}

/// Normalized screening attributes of one historical loan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoanRecord {
    values: [FilterValue; Attribute::COUNT],
}

impl LoanRecord {
    /// Build a record from values in [`Attribute::ALL`] order.
    pub fn from_values(values: [FilterValue; Attribute::COUNT]) -> Self {
        Self { values }
    }

    #[inline]
    pub fn get(&self, attribute: Attribute) -> FilterValue {
        self.values[attribute.index()]
    }

    #[inline]
    pub fn set(&mut self, attribute: Attribute, value: FilterValue) {
        self.values[attribute.index()] = value;
    }
}

/// Uniform contract shared by every concrete filter.
pub trait Filter {
    /// Display name used in reports and the results log header.
    fn name(&self) -> &'static str;

    /// Immutable ordered list of candidate values.
    fn options(&self) -> &[FilterValue];

    /// Current selection index, always within `0..option_count()`.
    fn current(&self) -> usize;

    /// Move the selection. Out of range indices are clamped to the last option.
    fn set_current(&mut self, index: usize);

    /// Map a raw token from the loan export to this filter's encoding.
    fn convert(&self, raw: &str) -> Result<FilterValue>;

    /// Render a value for reports.
    fn stringify(&self, value: FilterValue) -> String;

    /// Whether a loan passes the filter at its current selection.
    fn apply(&self, loan: &LoanRecord) -> bool;

    fn option_count(&self) -> usize {
        self.options().len()
    }

    /// Value at the current selection index.
    #[inline]
    fn value(&self) -> FilterValue {
        self.options()[self.current()]
    }

    fn current_string(&self) -> String {
        self.stringify(self.value())
    }

    /// Select the largest option that does not exceed `value`, or the first
    /// option when all of them do.
    fn initialize(&mut self, value: FilterValue) {
        let index = self
            .options()
            .iter()
            .enumerate()
            .filter(|(_, option)| **option <= value)
            .max_by_key(|(_, option)| **option)
            .map(|(index, _)| index)
            .unwrap_or(0);
        self.set_current(index);
    }
}

/// Filter that lets every loan through. Useful as a chromosome placeholder.
#[derive(Debug, Clone, Default)]
pub struct StubFilter;

impl Filter for StubFilter {
    fn name(&self) -> &'static str {
        "Stub"
    }

    fn options(&self) -> &[FilterValue] {
        &[0]
    }

    fn current(&self) -> usize {
        0
    }

    fn set_current(&mut self, _index: usize) {}

    fn convert(&self, _raw: &str) -> Result<FilterValue> {
        Ok(0)
    }

    fn stringify(&self, _value: FilterValue) -> String {
        String::new()
    }

    fn apply(&self, _loan: &LoanRecord) -> bool {
        true
    }
}

/// Closed set of concrete filters stored side by side in a chromosome.
#[derive(Debug, Clone)]
pub enum VariantFilter {
    Ordinal(OrdinalFilter),
    Bitmask(BitmaskFilter),
    EmploymentLength(EmploymentLength),
    Stub(StubFilter),
}

macro_rules! dispatch {
    ($self:expr, $filter:ident => $body:expr) => {
        match $self {
            VariantFilter::Ordinal($filter) => $body,
            VariantFilter::Bitmask($filter) => $body,
            VariantFilter::EmploymentLength($filter) => $body,
            VariantFilter::Stub($filter) => $body,
        }
    };
}

impl VariantFilter {
    /// Attribute screened by the filter; `None` for the stub.
    pub fn attribute(&self) -> Option<Attribute> {
        match self {
            VariantFilter::Ordinal(filter) => Some(filter.attribute()),
            VariantFilter::Bitmask(filter) => Some(filter.attribute()),
            VariantFilter::EmploymentLength(_) => Some(Attribute::EmploymentLength),
            VariantFilter::Stub(_) => None,
        }
    }
}

impl Filter for VariantFilter {
    fn name(&self) -> &'static str {
        dispatch!(self, filter => filter.name())
    }

    #[inline]
    fn options(&self) -> &[FilterValue] {
        dispatch!(self, filter => filter.options())
    }

    #[inline]
    fn current(&self) -> usize {
        dispatch!(self, filter => filter.current())
    }

    #[inline]
    fn set_current(&mut self, index: usize) {
        dispatch!(self, filter => filter.set_current(index))
    }

    fn convert(&self, raw: &str) -> Result<FilterValue> {
        dispatch!(self, filter => filter.convert(raw))
    }

    fn stringify(&self, value: FilterValue) -> String {
        dispatch!(self, filter => filter.stringify(value))
    }

    #[inline]
    fn apply(&self, loan: &LoanRecord) -> bool {
        dispatch!(self, filter => filter.apply(loan))
    }
}

/// Whether a loan passes every filter of a chromosome.
#[inline]
pub fn passes_all(filters: &[VariantFilter], loan: &LoanRecord) -> bool {
    filters.iter().all(|filter| filter.apply(loan))
}

/// Clamp helper shared by the concrete filters.
#[inline]
pub(crate) fn clamp_index(index: usize, option_count: usize) -> usize {
    index.min(option_count.saturating_sub(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn catalog() -> FilterCatalog {
        FilterCatalog::new("ABCDEFG", NaiveDate::from_ymd_opt(2014, 7, 1).unwrap()).unwrap()
    }

    #[test]
    fn attribute_indices_match_all_order() {
        for (position, attribute) in Attribute::ALL.iter().enumerate() {
            assert_eq!(attribute.index(), position);
        }
    }

    #[test]
    fn loan_record_is_indexed_by_attribute() {
        let mut loan = LoanRecord::default();
        loan.set(Attribute::PubRec, 3);
        loan.set(Attribute::TotalAcc, 17);
        assert_eq!(loan.get(Attribute::PubRec), 3);
        assert_eq!(loan.get(Attribute::TotalAcc), 17);
        assert_eq!(loan.get(Attribute::FundedAmount), 0);
    }

    #[test]
    fn stub_passes_everything() {
        let stub = VariantFilter::Stub(StubFilter);
        assert_eq!(stub.option_count(), 1);
        assert_eq!(stub.value(), 0);
        assert!(stub.apply(&LoanRecord::default()));
        assert_eq!(stub.attribute(), None);
    }

    #[test]
    fn variant_dispatch_reaches_concrete_filter() {
        let catalog = catalog();
        let mut filter = catalog.build(Attribute::PubRec);
        assert_eq!(filter.name(), "Public Records");
        assert_eq!(filter.attribute(), Some(Attribute::PubRec));

        filter.set_current(2);
        assert_eq!(filter.current(), 2);
        assert_eq!(filter.value(), 2);

        let mut loan = LoanRecord::default();
        loan.set(Attribute::PubRec, 2);
        assert!(filter.apply(&loan));
        loan.set(Attribute::PubRec, 3);
        assert!(!filter.apply(&loan));
    }

    #[test]
    fn initialize_picks_largest_option_not_above_value() {
        let catalog = catalog();
        let mut funded = catalog.build(Attribute::FundedAmount);
        funded.initialize(12_600);
        assert_eq!(funded.value(), 12_500);

        funded.initialize(0);
        assert_eq!(funded.value(), 0);
    }

    #[test]
    fn passes_all_requires_every_filter() {
        let catalog = catalog();
        let mut pub_rec = catalog.build(Attribute::PubRec);
        pub_rec.set_current(0);
        let stub = VariantFilter::Stub(StubFilter);

        let clean = LoanRecord::default();
        let mut blemished = LoanRecord::default();
        blemished.set(Attribute::PubRec, 1);

        let chromosome = vec![stub, pub_rec];
        assert!(passes_all(&chromosome, &clean));
        assert!(!passes_all(&chromosome, &blemished));
    }
}
