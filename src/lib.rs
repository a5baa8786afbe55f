//! Genetic search over LendingClub loan screening filters.
//!
//! A chromosome is a list of [`filters::VariantFilter`]s, one per screened
//! attribute. The search looks for the combination whose historically matched
//! loans give the best net annualized return for a fractional investor
//! putting a fixed stake into every note.
//!
//! The pieces, bottom-up:
//!
//! - [`loan`] replays one loan's amortization schedule for the stake
//! - [`returns`] aggregates a selection of loans into a [`returns::LoanReturn`]
//! - [`data`] loads and normalizes a stats export
//! - [`backtest`] screens the corpus with a chromosome
//! - [`search`] runs the genetic algorithm
//! - [`report`] writes the results log and the final report

pub mod backtest;
pub mod config;
pub mod data;
pub mod errors;
pub mod filters;
pub mod loan;
pub mod report;
pub mod returns;
pub mod search;
pub mod telemetry;

#[cfg(test)]
mod tests {
    mod fixtures;
    mod loader_tests;
    mod search_workflow_tests;
}

/// Convenient re-export of the most common items.
pub mod prelude {
    pub use crate::backtest::{BacktestEvaluator, LoanBacktester};
    pub use crate::config::{DataConfig, LcgaConfig, SearchConfig};
    pub use crate::data::{LoadStatistics, LoanDataLoader, LoanDataset};
    pub use crate::errors::{LoanBacktestError, Result};
    pub use crate::filters::{Attribute, Filter, FilterCatalog, LoanRecord, VariantFilter};
    pub use crate::loan::{simulate_loan, LoanCashFlows, LoanFinancialSummary};
    pub use crate::report::{ResultsLog, SearchReport};
    pub use crate::returns::{aggregate_returns, LoanReturn};
    pub use crate::search::{GenerationPhase, GeneticSearch, SearchOutcome};
}
