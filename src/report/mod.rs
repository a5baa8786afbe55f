//! Reporting utilities for search results.
//!
//! [`ResultsLog`] is the append-only CSV receiving one row every time the
//! search improves on its best net APY. [`SearchReport`] summarises a finished
//! run and can be exported as JSON.

use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::errors::{LoanBacktestError, Result};
use crate::filters::{Filter, VariantFilter};
use crate::returns::LoanReturn;
use crate::search::SearchOutcome;

/// Statistic columns following the per-filter columns of every row.
pub const RESULT_COLUMNS: [&str; 6] = [
    "expected_apy",
    "num_loans",
    "num_defaulted",
    "pct_defaulted",
    "avg_default_loss",
    "net_apy",
];

/// Append-only CSV log of improving chromosomes.
pub struct ResultsLog<W: Write> {
    writer: csv::Writer<W>,
    filter_columns: usize,
}

impl<W: Write> fmt::Debug for ResultsLog<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultsLog")
            .field("filter_columns", &self.filter_columns)
            .finish()
    }
}

impl ResultsLog<File> {
    /// Create (or truncate) the log file at `path` and write its header.
    pub fn create<P: AsRef<Path>>(path: P, chromosome: &[VariantFilter]) -> Result<Self> {
        let file = File::create(path.as_ref())?;
        Self::new(file, chromosome)
    }
}

impl<W: Write> ResultsLog<W> {
    /// Wrap `inner` and write the header: one column per filter name, then
    /// [`RESULT_COLUMNS`].
    pub fn new(inner: W, chromosome: &[VariantFilter]) -> Result<Self> {
        let mut writer = csv::Writer::from_writer(inner);
        let header = chromosome
            .iter()
            .map(|filter| filter.name())
            .chain(RESULT_COLUMNS.iter().copied());
        writer.write_record(header)?;
        writer.flush()?;
        Ok(Self {
            writer,
            filter_columns: chromosome.len(),
        })
    }

    /// Append one row and flush it so it survives an abrupt exit.
    pub fn append(&mut self, chromosome: &[VariantFilter], result: &LoanReturn) -> Result<()> {
        if chromosome.len() != self.filter_columns {
            return Err(LoanBacktestError::validation_error(format!(
                "results log expects {} filters, got {}",
                self.filter_columns,
                chromosome.len()
            )));
        }

        let mut record: Vec<String> = chromosome
            .iter()
            .map(|filter| filter.current_string())
            .collect();
        record.push(result.expected_apy.to_string());
        record.push(result.num_loans.to_string());
        record.push(result.num_defaulted.to_string());
        record.push(result.pct_defaulted.to_string());
        record.push(result.avg_default_loss.to_string());
        record.push(result.net_apy.to_string());

        self.writer.write_record(&record)?;
        self.writer.flush()?;
        Ok(())
    }

    /// Flush and hand back the underlying writer.
    pub fn into_inner(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|err| LoanBacktestError::Io(err.into_error()))
    }
}

/// One filter of the winning chromosome.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterSetting {
    pub name: String,
    pub value: String,
}

/// Summary of a finished search.
#[derive(Debug, Clone, Serialize)]
pub struct SearchReport {
    pub generated_at: DateTime<Utc>,
    pub iterations: usize,
    pub total_loans: usize,
    pub distinct_chromosomes: usize,
    /// Best net APY that was written to the results log.
    pub best_net_apy: f64,
    pub filters: Vec<FilterSetting>,
    pub result: LoanReturn,
}

impl SearchReport {
    pub fn from_outcome(outcome: &SearchOutcome, total_loans: usize) -> Self {
        let filters = outcome
            .chromosome
            .iter()
            .map(|filter| FilterSetting {
                name: filter.name().to_string(),
                value: filter.current_string(),
            })
            .collect();

        Self {
            generated_at: Utc::now(),
            iterations: outcome.iterations,
            total_loans,
            distinct_chromosomes: outcome.distinct_chromosomes,
            best_net_apy: outcome.best_net_apy,
            filters,
            result: outcome.best,
        }
    }

    /// Emit the report through `tracing`.
    pub fn log_summary(&self) {
        info!(
            "Search finished after {} iterations ({} distinct chromosomes tried)",
            self.iterations, self.distinct_chromosomes
        );
        for setting in &self.filters {
            info!("  {} is {}", setting.name, setting.value);
        }
        info!(
            "Matched {}/{} loans, {:.4}% expected APY, {:.4}% defaulted, {:.4}% net APY (best logged {:.4}%)",
            self.result.num_loans,
            self.total_loans,
            self.result.expected_apy,
            self.result.pct_defaulted,
            self.result.net_apy,
            self.best_net_apy
        );
    }

    /// Write the report as pretty printed JSON.
    pub fn write_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }
}
