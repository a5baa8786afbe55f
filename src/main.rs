use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::info;

use lc_ga_backtest::backtest::{BacktestEvaluator, LoanBacktester};
use lc_ga_backtest::config::LcgaConfig;
use lc_ga_backtest::data::LoanDataLoader;
use lc_ga_backtest::errors::LoanBacktestError;
use lc_ga_backtest::filters::FilterCatalog;
use lc_ga_backtest::report::{ResultsLog, SearchReport};
use lc_ga_backtest::search::GeneticSearch;
use lc_ga_backtest::telemetry;

/// Search LendingClub screening filters for the best historical net APY.
#[derive(Parser, Debug)]
#[command(name = "lcga", version)]
struct Cli {
    /// JSON configuration file; flags below override its values
    #[arg(long)]
    config: Option<PathBuf>,
    /// LendingClub loan stats CSV
    #[arg(long)]
    stats: Option<PathBuf>,
    /// Results log receiving one row per improvement
    #[arg(long)]
    results_csv: Option<PathBuf>,
    #[arg(long)]
    population_size: Option<usize>,
    #[arg(long)]
    iterations: Option<usize>,
    /// Fraction of the population carried over unchanged
    #[arg(long)]
    elite_rate: Option<f64>,
    /// Inverse of the per-position mutation probability
    #[arg(long)]
    mutation_rate: Option<u32>,
    /// Minimum matched loans for a net APY to count as fitness
    #[arg(long)]
    fitness_sort_min_loans: Option<usize>,
    /// Ignore loans issued within this many days
    #[arg(long)]
    young_loans_in_days: Option<u32>,
    /// Grade alphabet searched by the credit grade filter, e.g. "ABCD"
    #[arg(long)]
    grades: Option<String>,
    /// Seed for reproducible runs
    #[arg(long)]
    seed: Option<u64>,
    /// Also write the final report as JSON
    #[arg(long)]
    report_json: Option<PathBuf>,
    /// Log filter used when RUST_LOG is unset
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    fn apply(&self, config: &mut LcgaConfig) {
        if let Some(stats) = &self.stats {
            config.data.stats = stats.clone();
        }
        if let Some(results_csv) = &self.results_csv {
            config.data.results_csv = results_csv.clone();
        }
        if let Some(days) = self.young_loans_in_days {
            config.data.young_loans_in_days = days;
        }
        if let Some(grades) = &self.grades {
            config.data.grades = grades.clone();
        }
        if let Some(size) = self.population_size {
            config.search.population_size = size;
        }
        if let Some(iterations) = self.iterations {
            config.search.iterations = iterations;
        }
        if let Some(rate) = self.elite_rate {
            config.search.elite_rate = rate;
        }
        if let Some(rate) = self.mutation_rate {
            config.search.mutation_rate = rate;
        }
        if let Some(min_loans) = self.fitness_sort_min_loans {
            config.search.fitness_sort_min_loans = min_loans;
        }
        if let Some(seed) = self.seed {
            config.search.seed = Some(seed);
        }
        if let Some(level) = &self.log_level {
            config.log_level = level.clone();
        }
    }
}

fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => LcgaConfig::from_file(path)
            .with_context(|| format!("failed to read config {}", path.display()))?,
        None => LcgaConfig::default(),
    };
    cli.apply(&mut config);

    telemetry::init(&config.log_level)?;
    config.validate()?;

    let reference_date = config.data.reference_date();
    let catalog = FilterCatalog::new(&config.data.grades, reference_date)?;
    let loader = LoanDataLoader::new(
        &catalog,
        config.data.young_loans_in_days,
        config.data.stake,
        reference_date,
    );
    let dataset = loader.load_path(&config.data.stats)?;
    if dataset.is_empty() {
        bail!("no usable loans in {}", config.data.stats.display());
    }
    dataset.log_averages(&catalog);

    let backtester = LoanBacktester::new(dataset);
    let total_loans = backtester.total_loans();

    let template = catalog.chromosome(&config.search.filters);
    let results_log = ResultsLog::create(&config.data.results_csv, &template)?;

    let seed = config.search.seed.unwrap_or_else(rand::random::<u64>);
    info!("Random seed {}", seed);

    let mut search = GeneticSearch::new(
        config.search.clone(),
        backtester,
        template,
        results_log,
        StdRng::seed_from_u64(seed),
    )?;
    let outcome = search.run()?;

    let report = SearchReport::from_outcome(&outcome, total_loans);
    report.log_summary();
    if let Some(path) = &cli.report_json {
        report.write_json(path)?;
        info!("Wrote report to {}", path.display());
    }
    Ok(())
}

fn main() {
    if let Err(err) = run() {
        match err.downcast_ref::<LoanBacktestError>() {
            Some(app_err) => eprintln!("lcga error: {}", app_err.user_message()),
            None => eprintln!("lcga error: {err:#}"),
        }
        std::process::exit(1);
    }
}
