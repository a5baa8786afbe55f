//! # Loan Data Loading
//!
//! Reads a LendingClub stats export and turns every usable row into a
//! [`LoanRecord`] (one normalized value per screening attribute) plus a cached
//! [`LoanFinancialSummary`] produced by the simulator.
//!
//! Rows are dropped, in this order, when:
//!
//! - status, funded amount or issue date is blank, or the issue date does not parse
//! - the loan was issued within `young_loans_in_days` of the reference date
//! - the status is `Removed` or `Expired`
//! - the term is neither 36 nor 60 months
//!
//! A categorical value outside a filter's vocabulary aborts the whole load.
//!
//! ## Example
//!
//! ```rust,ignore
//! use lc_ga_backtest::data::LoanDataLoader;
//! use lc_ga_backtest::filters::FilterCatalog;
//!
//! let catalog = FilterCatalog::new("ABCDEFG", reference_date)?;
//! let loader = LoanDataLoader::new(&catalog, 120, 25.0, reference_date);
//! let dataset = loader.load_path("LoanStats3a.csv")?;
//! println!("{} loans loaded", dataset.len());
//! ```

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::errors::{LoanBacktestError, Result};
use crate::filters::{parse_month_year, Attribute, Filter, FilterCatalog, LoanRecord, VariantFilter};
use crate::loan::{simulate_loan, LoanCashFlows, LoanFinancialSummary, LoanTerm};
use crate::returns::VolumeMonth;

/// One row of the stats export, as text.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawLoan {
    pub acc_open_past_24mths: String,
    pub funded_amnt: String,
    pub annual_inc: String,
    pub grade: String,
    pub dti: String,
    pub delinq_2yrs: String,
    pub earliest_cr_line: String,
    pub emp_length: String,
    pub home_ownership: String,
    pub is_inc_v: String,
    pub inq_last_6mths: String,
    pub purpose: String,
    pub mths_since_last_delinq: String,
    pub pub_rec: String,
    pub revol_util: String,
    pub addr_state: String,
    pub total_acc: String,
    pub desc: String,
    pub loan_status: String,
    pub issue_d: String,
    pub term: String,
    pub installment: String,
    pub int_rate: String,
    pub total_pymnt: String,
    pub total_rec_int: String,
    pub total_rec_prncp: String,
}

impl RawLoan {
    /// Raw text of the column backing `attribute`.
    pub fn field(&self, attribute: Attribute) -> &str {
        match attribute {
            Attribute::AccOpenPast24Mths => &self.acc_open_past_24mths,
            Attribute::FundedAmount => &self.funded_amnt,
            Attribute::AnnualIncome => &self.annual_inc,
            Attribute::CreditGrade => &self.grade,
            Attribute::DebtToIncomeRatio => &self.dti,
            Attribute::Delinq2Yrs => &self.delinq_2yrs,
            Attribute::EarliestCreditLine => &self.earliest_cr_line,
            Attribute::EmploymentLength => &self.emp_length,
            Attribute::HomeOwnership => &self.home_ownership,
            Attribute::IncomeValidated => &self.is_inc_v,
            Attribute::InqLast6Mths => &self.inq_last_6mths,
            Attribute::LoanPurpose => &self.purpose,
            Attribute::MthsSinceLastDelinq => &self.mths_since_last_delinq,
            Attribute::PubRec => &self.pub_rec,
            Attribute::RevolUtilization => &self.revol_util,
            Attribute::AddrState => &self.addr_state,
            Attribute::TotalAcc => &self.total_acc,
            Attribute::DescWordCount => &self.desc,
        }
    }
}

/// Row counters collected while loading.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoadStatistics {
    pub rows: usize,
    pub loaded: usize,
    /// Blank required fields, unparseable issue dates or truncated lines.
    pub skipped: usize,
    pub young: usize,
    pub removed_expired: usize,
    pub unsupported_term: usize,
}

/// Loans that survived loading, with their cached financial summaries.
#[derive(Debug, Clone)]
pub struct LoanDataset {
    records: Vec<LoanRecord>,
    summaries: Vec<LoanFinancialSummary>,
    volume_month: VolumeMonth,
    statistics: LoadStatistics,
}

impl LoanDataset {
    /// Assemble a dataset from already normalized loans.
    pub fn from_parts(
        records: Vec<LoanRecord>,
        summaries: Vec<LoanFinancialSummary>,
        volume_month: VolumeMonth,
    ) -> Result<Self> {
        if records.len() != summaries.len() {
            return Err(LoanBacktestError::data_integrity(format!(
                "{} loan records but {} financial summaries",
                records.len(),
                summaries.len()
            )));
        }
        let statistics = LoadStatistics {
            rows: records.len(),
            loaded: records.len(),
            ..LoadStatistics::default()
        };
        Ok(Self {
            records,
            summaries,
            volume_month,
            statistics,
        })
    }

    pub fn records(&self) -> &[LoanRecord] {
        &self.records
    }

    pub fn summaries(&self) -> &[LoanFinancialSummary] {
        &self.summaries
    }

    pub fn volume_month(&self) -> VolumeMonth {
        self.volume_month
    }

    pub fn statistics(&self) -> LoadStatistics {
        self.statistics
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Mean of `attribute` after dropping the lowest and highest 5% of loans.
    pub fn trimmed_average(&self, attribute: Attribute) -> Option<f64> {
        let mut values: Vec<_> = self.records.iter().map(|loan| loan.get(attribute)).collect();
        values.sort_unstable();

        let start = (values.len() as f64 * 0.05) as usize;
        let end = (values.len() as f64 * 0.95) as usize;
        if end <= start {
            return None;
        }
        let sum: f64 = values[start..end].iter().map(|&value| value as f64).sum();
        Some(sum / (end - start) as f64)
    }

    /// Log the trimmed average of every ordinal attribute, rendered as the
    /// nearest filter setting.
    pub fn log_averages(&self, catalog: &FilterCatalog) {
        for attribute in Attribute::ALL {
            let mut filter = catalog.build(attribute);
            if matches!(filter, VariantFilter::Bitmask(_)) {
                continue;
            }
            if let Some(average) = self.trimmed_average(attribute) {
                filter.initialize(average.round() as u64);
                info!(
                    "Avg {}={:.2} filter is {}",
                    filter.name(),
                    average,
                    filter.current_string()
                );
            }
        }
    }
}

enum RowCheck {
    Accept(NaiveDate),
    Skipped,
    Young,
    RemovedOrExpired,
}

/// Turns stats export rows into a [`LoanDataset`].
#[derive(Debug, Clone)]
pub struct LoanDataLoader<'a> {
    catalog: &'a FilterCatalog,
    young_loans_in_days: u32,
    stake: f64,
    reference_date: NaiveDate,
}

impl<'a> LoanDataLoader<'a> {
    pub fn new(
        catalog: &'a FilterCatalog,
        young_loans_in_days: u32,
        stake: f64,
        reference_date: NaiveDate,
    ) -> Self {
        Self {
            catalog,
            young_loans_in_days,
            stake,
            reference_date,
        }
    }

    /// Load a stats export from disk.
    pub fn load_path<P: AsRef<Path>>(&self, path: P) -> Result<LoanDataset> {
        let path = path.as_ref();
        info!("Initializing from {}", path.display());
        let file = File::open(path).map_err(|err| {
            LoanBacktestError::Io(std::io::Error::new(
                err.kind(),
                format!("{}: {}", path.display(), err),
            ))
        })?;
        let dataset = self.load_reader(file)?;
        info!("Initializing from {} done.", path.display());
        Ok(dataset)
    }

    /// Load a stats export from any reader. A leading `Notes offered by
    /// Prospectus` banner line is skipped.
    pub fn load_reader<R: Read>(&self, reader: R) -> Result<LoanDataset> {
        let mut reader = BufReader::new(reader);
        skip_banner(&mut reader)?;

        let mut csv_reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::Headers)
            .from_reader(reader);
        let headers = csv_reader.headers()?.clone();

        let mut statistics = LoadStatistics::default();
        let mut records = Vec::new();
        let mut summaries = Vec::new();

        for row in csv_reader.records() {
            let row = row?;
            statistics.rows += 1;

            // Footer lines such as "Loans that do not meet the credit policy".
            if row.len() < headers.len() {
                statistics.skipped += 1;
                continue;
            }
            let raw: RawLoan = row.deserialize(Some(&headers))?;

            let issue_date = match self.check_loan(&raw) {
                RowCheck::Accept(issue_date) => issue_date,
                RowCheck::Skipped => {
                    statistics.skipped += 1;
                    continue;
                }
                RowCheck::Young => {
                    statistics.young += 1;
                    continue;
                }
                RowCheck::RemovedOrExpired => {
                    statistics.removed_expired += 1;
                    continue;
                }
            };

            match self.normalize_loan(&raw, issue_date) {
                Ok((record, summary)) => {
                    records.push(record);
                    summaries.push(summary);
                }
                Err(err) if err.is_row_error() => {
                    warn!("{}, skipping", err);
                    statistics.unsupported_term += 1;
                }
                Err(err) => return Err(err),
            }
        }

        statistics.loaded = records.len();
        info!(
            "Loaded {} of {} loans ({} skipped, {} young, {} removed/expired, {} unsupported term)",
            statistics.loaded,
            statistics.rows,
            statistics.skipped,
            statistics.young,
            statistics.removed_expired,
            statistics.unsupported_term
        );

        Ok(LoanDataset {
            records,
            summaries,
            volume_month: VolumeMonth::from_reference(self.reference_date, self.young_loans_in_days),
            statistics,
        })
    }

    fn check_loan(&self, raw: &RawLoan) -> RowCheck {
        if raw.loan_status.trim().is_empty()
            || raw.funded_amnt.trim().is_empty()
            || raw.issue_d.trim().is_empty()
        {
            return RowCheck::Skipped;
        }

        let issue_date = match parse_month_year(&raw.issue_d) {
            Ok(date) => date,
            Err(_) => {
                debug!("Skipping loan, did not parse issue_d '{}'", raw.issue_d);
                return RowCheck::Skipped;
            }
        };

        let young_date = self.reference_date - Duration::days(i64::from(self.young_loans_in_days));
        if young_date < issue_date {
            return RowCheck::Young;
        }

        match raw.loan_status.trim() {
            "Removed" | "Expired" => RowCheck::RemovedOrExpired,
            _ => RowCheck::Accept(issue_date),
        }
    }

    fn normalize_loan(
        &self,
        raw: &RawLoan,
        issue_date: NaiveDate,
    ) -> Result<(LoanRecord, LoanFinancialSummary)> {
        let mut record = LoanRecord::default();
        for attribute in Attribute::ALL {
            record.set(attribute, self.catalog.convert(attribute, raw.field(attribute))?);
        }

        let term = LoanTerm::parse(&raw.term)?;
        let flows = LoanCashFlows {
            funded_amount: parse_amount("funded_amnt", &raw.funded_amnt)?,
            number_of_payments: term.months(),
            annual_rate: parse_amount("int_rate", &raw.int_rate)?,
            installment: parse_amount("installment", &raw.installment)?,
            total_payment: parse_amount("total_pymnt", &raw.total_pymnt)?,
            total_received_interest: parse_amount("total_rec_int", &raw.total_rec_int)?,
            total_received_principal: parse_amount("total_rec_prncp", &raw.total_rec_prncp)?,
            status: raw.loan_status.trim().to_string(),
            issue_date,
        };

        Ok((record, simulate_loan(&flows, self.stake)))
    }
}

fn skip_banner<R: BufRead>(reader: &mut R) -> Result<()> {
    let starts_with_banner = reader.fill_buf()?.starts_with(b"Notes offered");
    if starts_with_banner {
        let mut banner = String::new();
        reader.read_line(&mut banner)?;
    }
    Ok(())
}

/// Parse a finite dollar or percent amount; blank is zero.
fn parse_amount(field: &str, raw: &str) -> Result<f64> {
    let trimmed = raw.trim().trim_end_matches('%').trim();
    if trimmed.is_empty() {
        return Ok(0.0);
    }
    let amount: f64 = trimmed
        .parse()
        .map_err(|_| LoanBacktestError::number_parsing(field, raw))?;
    if !amount.is_finite() {
        return Err(LoanBacktestError::number_parsing(field, raw));
    }
    Ok(amount)
}
