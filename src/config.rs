//! Run configuration.
//!
//! Values come from an optional JSON file and are then overridden from the
//! command line. Every section implements `Default`, so a partial file only
//! needs the keys it changes.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::errors::{LoanBacktestError, Result};
use crate::filters::Attribute;
use crate::loan::DEFAULT_STAKE;

/// Genetic search parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Number of chromosomes per generation.
    pub population_size: usize,
    /// Number of generations to evaluate.
    pub iterations: usize,
    /// Fraction of the sorted population carried over unchanged.
    pub elite_rate: f64,
    /// Inverse of the per-position mutation probability.
    pub mutation_rate: u32,
    /// Minimum matched loans for a net APY to count as fitness.
    pub fitness_sort_min_loans: usize,
    /// Attributes screened by each chromosome, in chromosome order.
    pub filters: Vec<Attribute>,
    /// Seed for the random source; a fresh seed is drawn when absent.
    pub seed: Option<u64>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            population_size: 512,
            iterations: 4_096,
            elite_rate: 0.05,
            mutation_rate: 100,
            fitness_sort_min_loans: 2_000,
            filters: Attribute::ALL.to_vec(),
            seed: None,
        }
    }
}

impl SearchConfig {
    /// Individuals copied verbatim into the next generation.
    pub fn elite_count(&self) -> usize {
        (self.elite_rate * self.population_size as f64).floor() as usize
    }

    /// Number of top individuals that act as mating partners; at least one.
    pub fn mate_pool_size(&self) -> usize {
        (self.population_size / 5).max(1)
    }

    pub fn validate(&self) -> Result<()> {
        if self.population_size == 0 {
            return Err(LoanBacktestError::EmptyPopulation);
        }
        if !(0.0..1.0).contains(&self.elite_rate) {
            return Err(LoanBacktestError::InvalidElitism(self.elite_rate));
        }
        if self.mutation_rate == 0 {
            return Err(LoanBacktestError::config_error(
                "mutation_rate must be at least 1",
            ));
        }
        if self.filters.is_empty() {
            return Err(LoanBacktestError::config_error(
                "at least one filter must be configured",
            ));
        }
        Ok(())
    }
}

/// Loan data and result file settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// LendingClub stats export to backtest against.
    pub stats: PathBuf,
    /// Results log receiving one row per improvement.
    pub results_csv: PathBuf,
    /// Loans issued within this many days of the reference date are ignored.
    pub young_loans_in_days: u32,
    /// Dollar amount invested per loan.
    pub stake: f64,
    /// Grade alphabet the credit grade filter searches over.
    pub grades: String,
    /// "Today" for age calculations; defaults to the local date.
    pub reference_date: Option<NaiveDate>,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            stats: PathBuf::from("LoanStats.csv"),
            results_csv: PathBuf::from("lc_best.csv"),
            young_loans_in_days: 120,
            stake: DEFAULT_STAKE,
            grades: "ABCDEFG".to_string(),
            reference_date: None,
        }
    }
}

impl DataConfig {
    pub fn reference_date(&self) -> NaiveDate {
        self.reference_date
            .unwrap_or_else(|| Local::now().date_naive())
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.stake.is_finite() && self.stake > 0.0) {
            return Err(LoanBacktestError::config_error(format!(
                "stake must be a positive amount, got {}",
                self.stake
            )));
        }
        if self.grades.trim().is_empty() {
            return Err(LoanBacktestError::config_error(
                "grades must name at least one grade",
            ));
        }
        Ok(())
    }
}

/// Top-level configuration of an `lcga` run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LcgaConfig {
    pub data: DataConfig,
    pub search: SearchConfig,
    pub log_level: String,
}

impl Default for LcgaConfig {
    fn default() -> Self {
        Self {
            data: DataConfig::default(),
            search: SearchConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

impl LcgaConfig {
    /// Read a JSON configuration file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn validate(&self) -> Result<()> {
        self.data.validate()?;
        self.search.validate()
    }
}
