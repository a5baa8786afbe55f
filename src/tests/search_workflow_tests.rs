use rand::rngs::StdRng;
use rand::SeedableRng;

use super::fixtures::{catalog, export, generate_corpus, reference_date};
use crate::backtest::{BacktestEvaluator, LoanBacktester};
use crate::config::SearchConfig;
use crate::data::LoanDataLoader;
use crate::filters::{Attribute, Filter};
use crate::report::{ResultsLog, SearchReport, RESULT_COLUMNS};
use crate::search::{GeneticSearch, SearchOutcome};

const FILTERS: [Attribute; 3] = [
    Attribute::CreditGrade,
    Attribute::HomeOwnership,
    Attribute::PubRec,
];

fn backtester() -> LoanBacktester {
    let catalog = catalog();
    let loader = LoanDataLoader::new(&catalog, 120, 25.0, reference_date());
    let dataset = loader
        .load_reader(export(&generate_corpus(70)).as_bytes())
        .unwrap();
    LoanBacktester::new(dataset)
}

fn search_config() -> SearchConfig {
    SearchConfig {
        population_size: 24,
        iterations: 6,
        elite_rate: 0.125,
        mutation_rate: 8,
        fitness_sort_min_loans: 5,
        filters: FILTERS.to_vec(),
        seed: Some(42),
    }
}

fn run_search(path: &std::path::Path, seed: u64) -> SearchOutcome {
    let template = catalog().chromosome(&FILTERS);
    let log = ResultsLog::create(path, &template).unwrap();
    let mut search = GeneticSearch::new(
        search_config(),
        backtester(),
        template,
        log,
        StdRng::seed_from_u64(seed),
    )
    .unwrap();
    search.run().unwrap()
}

#[test]
fn search_over_loaded_corpus_writes_results_log() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("lc_best.csv");
    let outcome = run_search(&path, 42);

    assert_eq!(outcome.iterations, 6);
    assert_eq!(outcome.chromosome.len(), FILTERS.len());
    // 24 initial chromosomes plus 21 bred ones for each of five reproductions.
    assert_eq!(outcome.distinct_chromosomes, 24 + 5 * 21);

    let mut reader = csv::Reader::from_path(&path).unwrap();
    let header: Vec<String> = reader
        .headers()
        .unwrap()
        .iter()
        .map(str::to_string)
        .collect();
    assert_eq!(&header[..3], &["Credit Grade", "Home Ownership", "Public Records"]);
    assert_eq!(&header[3..], &RESULT_COLUMNS);

    let rows: Vec<csv::StringRecord> = reader.records().map(|row| row.unwrap()).collect();
    let net_apys: Vec<f64> = rows
        .iter()
        .map(|row| row[header.len() - 1].parse().unwrap())
        .collect();
    // Rows only appear on strict improvement.
    assert!(net_apys.windows(2).all(|pair| pair[0] < pair[1]));
    if let Some(&last) = net_apys.last() {
        assert_eq!(last, outcome.best_net_apy);
    }
}

#[test]
fn outcome_matches_backtest_of_best_chromosome() {
    let dir = tempfile::tempdir().unwrap();
    let outcome = run_search(&dir.path().join("lc_best.csv"), 7);

    let rescored = backtester().evaluate(&outcome.chromosome);
    assert_eq!(rescored, outcome.best);
}

#[test]
fn same_seed_reproduces_the_search() {
    let dir = tempfile::tempdir().unwrap();
    let first = run_search(&dir.path().join("first.csv"), 99);
    let second = run_search(&dir.path().join("second.csv"), 99);

    let currents = |outcome: &SearchOutcome| -> Vec<usize> {
        outcome.chromosome.iter().map(|filter| filter.current()).collect()
    };
    assert_eq!(currents(&first), currents(&second));
    assert_eq!(first.best, second.best);
    assert_eq!(first.best_net_apy, second.best_net_apy);

    let report = SearchReport::from_outcome(&first, 70);
    assert_eq!(report.filters.len(), FILTERS.len());
    assert_eq!(report.result, first.best);
}
