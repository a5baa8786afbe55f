use crate::data::LoanDataset;
use crate::filters::{passes_all, VariantFilter};
use crate::returns::{aggregate_returns, LoanReturn};

/// Scores a chromosome against a loan corpus.
///
/// Implementations must be deterministic and free of side effects visible to
/// the search.
pub trait BacktestEvaluator {
    /// Aggregate returns of every loan that passes all filters.
    fn evaluate(&self, chromosome: &[VariantFilter]) -> LoanReturn;

    /// Size of the corpus the evaluator screens.
    fn total_loans(&self) -> usize;
}

/// Backtests chromosomes over a loaded [`LoanDataset`].
#[derive(Debug, Clone)]
pub struct LoanBacktester {
    dataset: LoanDataset,
}

impl LoanBacktester {
    pub fn new(dataset: LoanDataset) -> Self {
        Self { dataset }
    }
}

impl BacktestEvaluator for LoanBacktester {
    fn evaluate(&self, chromosome: &[VariantFilter]) -> LoanReturn {
        let selected = self
            .dataset
            .records()
            .iter()
            .zip(self.dataset.summaries())
            .filter(|(record, _)| passes_all(chromosome, record))
            .map(|(_, summary)| summary);
        aggregate_returns(selected, self.dataset.volume_month())
    }

    fn total_loans(&self) -> usize {
        self.dataset.len()
    }
}
