use std::sync::Arc;

use chrono::NaiveDate;

use super::ordinal::{Comparison, OrdinalFilter, OrdinalParser, OrdinalSpec};
use super::{
    Attribute, BitmaskFilter, CategoryTable, EmploymentLength, Filter, FilterValue, VariantFilter,
};
use crate::errors::{LoanBacktestError, Result};

/// Grades LendingClub assigns, in bit order.
pub const GRADE_LABELS: [&str; 7] = ["A", "B", "C", "D", "E", "F", "G"];

pub const HOME_OWNERSHIP_LABELS: [&str; 6] = ["MORTGAGE", "NONE", "OTHER", "OWN", "RENT", "ANY"];

pub const INCOME_VALIDATED_LABELS: [&str; 3] = ["Not Verified", "Verified", "Source Verified"];

pub const PURPOSE_LABELS: [&str; 14] = [
    "other",
    "debt_consolidation",
    "educational",
    "credit_card",
    "car",
    "home_improvement",
    "small_business",
    "vacation",
    "moving",
    "wedding",
    "house",
    "medical",
    "major_purchase",
    "renewable_energy",
];

/// Borrower states, District of Columbia included.
pub const STATE_LABELS: [&str; 51] = [
    "AK", "AL", "AR", "AZ", "CA", "CO", "CT", "DC", "DE", "FL", "GA", "HI", "IA", "ID", "IL", "IN",
    "KS", "KY", "LA", "MA", "MD", "ME", "MI", "MN", "MO", "MS", "MT", "NC", "ND", "NE", "NH", "NJ",
    "NM", "NV", "NY", "OH", "OK", "OR", "PA", "RI", "SC", "SD", "TN", "TX", "UT", "VA", "VT", "WA",
    "WI", "WV", "WY",
];

/// Value used for "no delinquency on record".
pub const NEVER_DELINQUENT: FilterValue = 9_999;

/// One prototype filter per attribute, sharing option lists and conversion
/// tables built once at start-up.
#[derive(Debug, Clone)]
pub struct FilterCatalog {
    prototypes: Vec<VariantFilter>,
}

impl FilterCatalog {
    /// Build every table. `grades` is the contiguous grade alphabet the
    /// credit grade filter searches over; `reference_date` anchors the credit
    /// history length.
    pub fn new(grades: &str, reference_date: NaiveDate) -> Result<Self> {
        let prototypes = Attribute::ALL
            .iter()
            .map(|&attribute| Self::prototype(attribute, grades, reference_date))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { prototypes })
    }

    fn prototype(attribute: Attribute, grades: &str, reference: NaiveDate) -> Result<VariantFilter> {
        use Comparison::{AtLeast, AtMost};
        use OrdinalParser::*;

        let ordinal = |name: &'static str,
                       comparison: Comparison,
                       parser: OrdinalParser,
                       lo: FilterValue,
                       hi: FilterValue,
                       step: FilterValue| {
            VariantFilter::Ordinal(OrdinalFilter::new(Arc::new(OrdinalSpec::range(
                name, attribute, comparison, parser, lo, hi, step,
            ))))
        };
        let bitmask = |table: CategoryTable| VariantFilter::Bitmask(BitmaskFilter::new(Arc::new(table)));

        let filter = match attribute {
            Attribute::AccOpenPast24Mths => {
                ordinal("Accounts Opened Past 24 Months", AtMost, Integer, 0, 25, 1)
            }
            Attribute::FundedAmount => ordinal("Funded Amount", AtMost, Integer, 0, 35_001, 2_500),
            Attribute::AnnualIncome => {
                ordinal("Annual Income", AtLeast, Integer, 0, 200_001, 10_000)
            }
            Attribute::CreditGrade => {
                if grades.trim().is_empty() {
                    return Err(LoanBacktestError::config_error("grade alphabet must not be empty"));
                }
                bitmask(CategoryTable::contiguous_runs(
                    "Credit Grade",
                    attribute,
                    &GRADE_LABELS,
                    grades.trim(),
                )?)
            }
            Attribute::DebtToIncomeRatio => ordinal(
                "Debt To Income Ratio",
                AtMost,
                Scaled { scale: 100 },
                0,
                3_501,
                250,
            ),
            Attribute::Delinq2Yrs => ordinal("Delinquencies Past 2 Years", AtMost, Integer, 0, 11, 1),
            Attribute::EarliestCreditLine => ordinal(
                "Earliest Credit Line",
                AtLeast,
                MonthsSince { reference },
                0,
                601,
                12,
            ),
            Attribute::EmploymentLength => {
                VariantFilter::EmploymentLength(EmploymentLength::new(EmploymentLength::default_options()))
            }
            Attribute::HomeOwnership => bitmask(CategoryTable::power_set(
                "Home Ownership",
                attribute,
                &HOME_OWNERSHIP_LABELS,
            )),
            Attribute::IncomeValidated => bitmask(
                CategoryTable::power_set("Income Validated", attribute, &INCOME_VALIDATED_LABELS)
                    .with_alias("FALSE", "Not Verified")
                    .with_alias("TRUE", "Verified"),
            ),
            Attribute::InqLast6Mths => ordinal("Inquiries Past 6 Months", AtMost, Integer, 0, 11, 1),
            Attribute::LoanPurpose => {
                bitmask(CategoryTable::power_set("Loan Purpose", attribute, &PURPOSE_LABELS))
            }
            Attribute::MthsSinceLastDelinq => ordinal(
                "Months Since Last Delinquency",
                AtLeast,
                IntegerOrNever {
                    never: NEVER_DELINQUENT,
                },
                0,
                121,
                12,
            ),
            Attribute::PubRec => ordinal("Public Records", AtMost, Integer, 0, 6, 1),
            Attribute::RevolUtilization => ordinal(
                "Revolving Line Utilization",
                AtMost,
                Scaled { scale: 100 },
                0,
                15_001,
                500,
            ),
            Attribute::AddrState => {
                bitmask(CategoryTable::exclusions("Address State", attribute, &STATE_LABELS))
            }
            Attribute::TotalAcc => ordinal("Total Accounts", AtLeast, Integer, 0, 61, 2),
            Attribute::DescWordCount => {
                ordinal("Description Word Count", AtLeast, WordCount, 0, 301, 10)
            }
        };
        Ok(filter)
    }

    /// Fresh filter for `attribute`, positioned at its first option.
    pub fn build(&self, attribute: Attribute) -> VariantFilter {
        self.prototypes[attribute.index()].clone()
    }

    /// One filter per attribute, in the given order.
    pub fn chromosome(&self, attributes: &[Attribute]) -> Vec<VariantFilter> {
        attributes.iter().map(|&attribute| self.build(attribute)).collect()
    }

    /// Normalize a raw export token for `attribute`.
    pub fn convert(&self, attribute: Attribute, raw: &str) -> Result<FilterValue> {
        self.prototypes[attribute.index()].convert(raw)
    }

    /// Render a value the way the filter for `attribute` would.
    pub fn stringify(&self, attribute: Attribute, value: FilterValue) -> String {
        self.prototypes[attribute.index()].stringify(value)
    }
}
