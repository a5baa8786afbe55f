//! Genetic search over filter chromosomes.
//!
//! Every generation walks the phases of [`GenerationPhase`]: evaluate each
//! chromosome through a [`BacktestEvaluator`], stable-sort by fitness, log the
//! leader, then breed the next generation. Elites pass through unchanged; the
//! remaining slots copy each position from a random partner among the top of
//! the population and mutate it with probability `1 / mutation_rate`.
//!
//! Every accepted chromosome registers its identity hash in a memo set that
//! lives for the whole run. A chromosome whose hash is already known is thrown
//! away and rebuilt from scratch, so the search never spends an evaluation on
//! a filter combination it has already tried (up to hash collisions).
//!
//! The retry loops assume the option space is much larger than the number of
//! chromosomes the run will ever need. They warn every
//! [`DUPLICATE_WARNING_INTERVAL`] consecutive rejections but do not give up.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::io::Write;
use std::time::{Duration, Instant};

use rand::Rng;
use tracing::{debug, info, warn};

use crate::backtest::BacktestEvaluator;
use crate::config::SearchConfig;
use crate::errors::{LoanBacktestError, Result};
use crate::filters::{Filter, VariantFilter};
use crate::report::ResultsLog;
use crate::returns::LoanReturn;

/// Consecutive duplicate rejections between two liveness warnings.
pub const DUPLICATE_WARNING_INTERVAL: u64 = 10_000;

/// Step of the per-generation state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationPhase {
    Evaluate,
    SelectAndSort,
    Log,
    Reproduce,
    Finished,
}

/// A chromosome together with its latest evaluation.
#[derive(Debug, Clone)]
pub struct Citizen {
    pub result: LoanReturn,
    pub chromosome: Vec<VariantFilter>,
}

impl Citizen {
    fn unevaluated(chromosome: Vec<VariantFilter>) -> Self {
        Self {
            result: LoanReturn::default(),
            chromosome,
        }
    }
}

/// Result of a finished search.
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    /// Evaluation of the top chromosome of the final population.
    pub best: LoanReturn,
    pub chromosome: Vec<VariantFilter>,
    /// Highest net APY written to the results log; zero if nothing qualified.
    pub best_net_apy: f64,
    pub iterations: usize,
    /// Number of identity hashes registered during the run.
    pub distinct_chromosomes: usize,
}

/// Combined identity hash of a chromosome: XOR over positions of
/// `hash(position, value) << 1`.
///
/// Including the position makes the hash order sensitive. Distinct
/// chromosomes can still collide.
pub fn chromosome_hash(chromosome: &[VariantFilter]) -> u64 {
    chromosome
        .iter()
        .enumerate()
        .fold(0u64, |combined, (position, filter)| {
            let mut hasher = DefaultHasher::new();
            (position, filter.value()).hash(&mut hasher);
            combined ^ (hasher.finish() << 1)
        })
}

/// Statistics of `result` as reported by the search: zeroed, apart from the
/// loan count, when too few loans back them.
pub fn reported_result(result: &LoanReturn, min_loans: usize) -> LoanReturn {
    if result.is_significant(min_loans) {
        *result
    } else {
        LoanReturn {
            num_loans: result.num_loans,
            ..LoanReturn::default()
        }
    }
}

/// Genetic search driver.
pub struct GeneticSearch<E, W, R>
where
    E: BacktestEvaluator,
    W: Write,
    R: Rng,
{
    config: SearchConfig,
    evaluator: E,
    results_log: ResultsLog<W>,
    rng: R,
    population: Vec<Citizen>,
    memo: HashSet<u64>,
    phase: GenerationPhase,
    iteration: usize,
    best_net_apy: f64,
    iteration_time: Duration,
    evaluate_started: Option<Instant>,
    bred_positions: u64,
    mutated_positions: u64,
}

impl<E, W, R> GeneticSearch<E, W, R>
where
    E: BacktestEvaluator,
    W: Write,
    R: Rng,
{
    /// Validate the configuration and build a random initial population of
    /// distinct chromosomes shaped like `template`.
    pub fn new(
        config: SearchConfig,
        evaluator: E,
        template: Vec<VariantFilter>,
        results_log: ResultsLog<W>,
        mut rng: R,
    ) -> Result<Self> {
        config.validate()?;
        if template.is_empty() {
            return Err(LoanBacktestError::config_error(
                "chromosome must hold at least one filter",
            ));
        }
        let combinations = template
            .iter()
            .fold(1usize, |acc, filter| acc.saturating_mul(filter.option_count()));
        if combinations < config.population_size {
            return Err(LoanBacktestError::config_error(format!(
                "{} filter combinations cannot fill a population of {}",
                combinations, config.population_size
            )));
        }

        let mut memo = HashSet::with_capacity(config.population_size * 2);
        let population: Vec<Citizen> = (0..config.population_size)
            .map(|_| Citizen::unevaluated(random_chromosome(&template, &mut memo, &mut rng)))
            .collect();

        info!(
            "Initialized population of {} chromosomes over {} filters",
            population.len(),
            template.len()
        );

        let phase = if config.iterations == 0 {
            GenerationPhase::Finished
        } else {
            GenerationPhase::Evaluate
        };

        Ok(Self {
            config,
            evaluator,
            results_log,
            rng,
            population,
            memo,
            phase,
            iteration: 0,
            best_net_apy: 0.0,
            iteration_time: Duration::ZERO,
            evaluate_started: None,
            bred_positions: 0,
            mutated_positions: 0,
        })
    }

    /// Run the remaining generations.
    pub fn run(&mut self) -> Result<SearchOutcome> {
        while self.phase != GenerationPhase::Finished {
            self.advance()?;
        }
        Ok(self.outcome())
    }

    /// Execute the current phase and return the next one.
    pub fn advance(&mut self) -> Result<GenerationPhase> {
        self.phase = match self.phase {
            GenerationPhase::Evaluate => {
                self.evaluate_started = Some(Instant::now());
                self.evaluate();
                GenerationPhase::SelectAndSort
            }
            GenerationPhase::SelectAndSort => {
                self.sort_by_fitness();
                if let Some(started) = self.evaluate_started.take() {
                    self.iteration_time += started.elapsed();
                }
                GenerationPhase::Log
            }
            GenerationPhase::Log => {
                self.log_best()?;
                if self.iteration + 1 >= self.config.iterations {
                    self.iteration += 1;
                    GenerationPhase::Finished
                } else {
                    GenerationPhase::Reproduce
                }
            }
            GenerationPhase::Reproduce => {
                self.reproduce();
                self.iteration += 1;
                GenerationPhase::Evaluate
            }
            GenerationPhase::Finished => GenerationPhase::Finished,
        };
        Ok(self.phase)
    }

    pub fn outcome(&self) -> SearchOutcome {
        let best = &self.population[0];
        SearchOutcome {
            best: best.result,
            chromosome: best.chromosome.clone(),
            best_net_apy: self.best_net_apy,
            iterations: self.iteration,
            distinct_chromosomes: self.memo.len(),
        }
    }

    pub fn phase(&self) -> GenerationPhase {
        self.phase
    }

    /// Zero-based index of the generation in progress.
    pub fn iteration(&self) -> usize {
        self.iteration
    }

    pub fn population(&self) -> &[Citizen] {
        &self.population
    }

    pub fn memo_len(&self) -> usize {
        self.memo.len()
    }

    pub fn best_net_apy(&self) -> f64 {
        self.best_net_apy
    }

    /// Positions rebuilt during reproduction and how many of them mutated.
    pub fn mutation_counts(&self) -> (u64, u64) {
        (self.bred_positions, self.mutated_positions)
    }

    /// Give back the results log, e.g. to inspect an in-memory writer.
    pub fn into_results_log(self) -> ResultsLog<W> {
        self.results_log
    }

    fn evaluate(&mut self) {
        for citizen in &mut self.population {
            citizen.result = self.evaluator.evaluate(&citizen.chromosome);
        }
        debug!(
            "Evaluated generation {} ({} chromosomes)",
            self.iteration,
            self.population.len()
        );
    }

    fn sort_by_fitness(&mut self) {
        let min_loans = self.config.fitness_sort_min_loans;
        // sort_by is stable: ties keep their previous order.
        self.population
            .sort_by(|a, b| a.result.compare_fitness(&b.result, min_loans));
    }

    fn log_best(&mut self) -> Result<()> {
        let best = &self.population[0];
        let reported = reported_result(&best.result, self.config.fitness_sort_min_loans);

        if reported.net_apy > self.best_net_apy {
            self.results_log.append(&best.chromosome, &reported)?;
            self.best_net_apy = reported.net_apy;
        }

        let filters = best
            .chromosome
            .iter()
            .map(|filter| format!("{} is {}", filter.name(), filter.current_string()))
            .collect::<Vec<_>>()
            .join(", ");
        info!("Best Filter: {}", filters);

        let seconds_per_iteration = self.iteration_time.as_secs_f64() / (self.iteration + 1) as f64;
        info!(
            "[iteration {}/{} {:.4} sec/iter] Matched {}/{} loans ({}/mo.) test at {:.4}% APY. \
             {} loans defaulted ({:.4}%, ${:.4} avg loss) {:.4}% net APY",
            self.iteration + 1,
            self.config.iterations,
            seconds_per_iteration,
            reported.num_loans,
            self.evaluator.total_loans(),
            reported.loans_per_month,
            reported.expected_apy,
            reported.num_defaulted,
            reported.pct_defaulted,
            reported.avg_default_loss,
            reported.net_apy
        );
        Ok(())
    }

    fn reproduce(&mut self) {
        let elite_count = self.config.elite_count().min(self.population.len());
        let pool_size = self.config.mate_pool_size().min(self.population.len());
        let parents = &self.population[..pool_size];

        let mut next = Vec::with_capacity(self.population.len());
        next.extend(self.population[..elite_count].iter().cloned());

        for slot in elite_count..self.population.len() {
            let (chromosome, bred, mutated) = mate(
                &self.population[slot].chromosome,
                parents,
                self.config.mutation_rate,
                &mut self.memo,
                &mut self.rng,
            );
            self.bred_positions += bred;
            self.mutated_positions += mutated;
            next.push(Citizen::unevaluated(chromosome));
        }

        self.population = next;
    }
}

impl<E, W, R> fmt::Debug for GeneticSearch<E, W, R>
where
    E: BacktestEvaluator,
    W: Write,
    R: Rng,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeneticSearch")
            .field("config", &self.config)
            .field("phase", &self.phase)
            .field("iteration", &self.iteration)
            .field("memo_len", &self.memo.len())
            .finish()
    }
}

fn randomize<R: Rng>(filter: &mut VariantFilter, rng: &mut R) {
    let index = rng.gen_range(0..filter.option_count());
    filter.set_current(index);
}

fn warn_on_duplicates(rejected: u64, distinct: usize) {
    if rejected % DUPLICATE_WARNING_INTERVAL == 0 {
        warn!(
            "{} consecutive duplicate chromosomes rejected with {} distinct seen; the option space may be exhausted",
            rejected, distinct
        );
    }
}

fn random_chromosome<R: Rng>(
    template: &[VariantFilter],
    memo: &mut HashSet<u64>,
    rng: &mut R,
) -> Vec<VariantFilter> {
    let mut chromosome = template.to_vec();
    let mut rejected = 0u64;
    loop {
        for filter in chromosome.iter_mut() {
            randomize(filter, rng);
        }
        if memo.insert(chromosome_hash(&chromosome)) {
            return chromosome;
        }
        rejected += 1;
        warn_on_duplicates(rejected, memo.len());
    }
}

/// Breed a child shaped like `base` from `parents`. Returns the chromosome
/// plus the number of positions built and mutated, rejected attempts included.
fn mate<R: Rng>(
    base: &[VariantFilter],
    parents: &[Citizen],
    mutation_rate: u32,
    memo: &mut HashSet<u64>,
    rng: &mut R,
) -> (Vec<VariantFilter>, u64, u64) {
    let mut child = base.to_vec();
    let mut bred = 0u64;
    let mut mutated = 0u64;
    let mut rejected = 0u64;
    loop {
        for (position, filter) in child.iter_mut().enumerate() {
            let partner = &parents[rng.gen_range(0..parents.len())];
            filter.set_current(partner.chromosome[position].current());
            if rng.gen_ratio(1, mutation_rate) {
                randomize(filter, rng);
                mutated += 1;
            }
            bred += 1;
        }
        if memo.insert(chromosome_hash(&child)) {
            return (child, bred, mutated);
        }
        rejected += 1;
        warn_on_duplicates(rejected, memo.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::{Attribute, FilterCatalog};
    use chrono::NaiveDate;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    /// Scores a chromosome by the sum of its selection indices.
    struct IndexSumEvaluator;

    impl BacktestEvaluator for IndexSumEvaluator {
        fn evaluate(&self, chromosome: &[VariantFilter]) -> LoanReturn {
            let sum: usize = chromosome.iter().map(|filter| filter.current()).sum();
            LoanReturn {
                num_loans: 100 + sum,
                net_apy: sum as f64,
                ..LoanReturn::default()
            }
        }

        fn total_loans(&self) -> usize {
            1_000
        }
    }

    fn template() -> Vec<VariantFilter> {
        let catalog =
            FilterCatalog::new("ABCDEFG", NaiveDate::from_ymd_opt(2014, 7, 28).unwrap()).unwrap();
        catalog.chromosome(&[Attribute::LoanPurpose, Attribute::FundedAmount, Attribute::TotalAcc])
    }

    fn config(population_size: usize, iterations: usize) -> SearchConfig {
        SearchConfig {
            population_size,
            iterations,
            elite_rate: 0.1,
            mutation_rate: 10,
            fitness_sort_min_loans: 10,
            seed: Some(7),
            ..SearchConfig::default()
        }
    }

    fn search(
        config: SearchConfig,
        seed: u64,
    ) -> GeneticSearch<IndexSumEvaluator, Vec<u8>, StdRng> {
        let template = template();
        let log = ResultsLog::new(Vec::new(), &template).unwrap();
        GeneticSearch::new(config, IndexSumEvaluator, template, log, StdRng::seed_from_u64(seed))
            .unwrap()
    }

    fn currents(citizen: &Citizen) -> Vec<usize> {
        citizen.chromosome.iter().map(|filter| filter.current()).collect()
    }

    #[test]
    fn hash_depends_on_position() {
        let catalog =
            FilterCatalog::new("ABCDEFG", NaiveDate::from_ymd_opt(2014, 7, 28).unwrap()).unwrap();
        let mut forward = catalog.chromosome(&[Attribute::PubRec, Attribute::Delinq2Yrs]);
        forward[0].set_current(1);
        forward[1].set_current(3);
        let mut swapped = forward.clone();
        swapped[0].set_current(3);
        swapped[1].set_current(1);

        assert_ne!(chromosome_hash(&forward), chromosome_hash(&swapped));
        assert_eq!(chromosome_hash(&forward), chromosome_hash(&forward.clone()));
    }

    #[test]
    fn initial_population_is_distinct() {
        let search = search(config(64, 1), 1);
        let hashes: HashSet<u64> = search
            .population()
            .iter()
            .map(|citizen| chromosome_hash(&citizen.chromosome))
            .collect();
        assert_eq!(hashes.len(), 64);
        assert_eq!(search.memo_len(), 64);
    }

    #[test]
    fn phases_cycle_until_finished() {
        let mut search = search(config(16, 2), 2);
        assert_eq!(search.phase(), GenerationPhase::Evaluate);
        assert_eq!(search.advance().unwrap(), GenerationPhase::SelectAndSort);
        assert_eq!(search.advance().unwrap(), GenerationPhase::Log);
        assert_eq!(search.advance().unwrap(), GenerationPhase::Reproduce);
        assert_eq!(search.advance().unwrap(), GenerationPhase::Evaluate);
        assert_eq!(search.iteration(), 1);
        assert_eq!(search.advance().unwrap(), GenerationPhase::SelectAndSort);
        assert_eq!(search.advance().unwrap(), GenerationPhase::Log);
        assert_eq!(search.advance().unwrap(), GenerationPhase::Finished);
        assert_eq!(search.advance().unwrap(), GenerationPhase::Finished);
        assert_eq!(search.iteration(), 2);
    }

    #[test]
    fn population_is_sorted_by_descending_fitness() {
        let mut search = search(config(32, 1), 3);
        search.advance().unwrap();
        search.advance().unwrap();
        let fitness: Vec<f64> = search
            .population()
            .iter()
            .map(|citizen| citizen.result.fitness(10))
            .collect();
        assert!(fitness.windows(2).all(|pair| pair[0] >= pair[1]));
    }

    #[test]
    fn tied_fitness_keeps_population_order() {
        let mut config = config(32, 1);
        // Every chromosome is too thin to rank, so all fitness values tie.
        config.fitness_sort_min_loans = 1_000_000;
        let mut search = search(config, 11);
        let before: Vec<u64> = search
            .population()
            .iter()
            .map(|citizen| chromosome_hash(&citizen.chromosome))
            .collect();

        assert_eq!(search.advance().unwrap(), GenerationPhase::SelectAndSort);
        assert_eq!(search.advance().unwrap(), GenerationPhase::Log);
        let after: Vec<u64> = search
            .population()
            .iter()
            .map(|citizen| chromosome_hash(&citizen.chromosome))
            .collect();
        assert_eq!(before, after);
    }

    #[test]
    fn improving_row_is_on_disk_before_the_run_ends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lc_best.csv");
        let template = template();
        let log = ResultsLog::create(&path, &template).unwrap();
        let mut search = GeneticSearch::new(
            config(20, 3),
            IndexSumEvaluator,
            template,
            log,
            StdRng::seed_from_u64(12),
        )
        .unwrap();

        for _ in 0..3 {
            search.advance().unwrap();
        }
        assert_eq!(search.phase(), GenerationPhase::Reproduce);
        assert!(search.best_net_apy() > 0.0);

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 2);
        assert!(text.lines().nth(1).unwrap().ends_with(&search.best_net_apy().to_string()));
    }

    #[test]
    fn reproduce_keeps_elites_in_order() {
        let mut search = search(config(40, 3), 4);
        for _ in 0..3 {
            search.advance().unwrap();
        }
        assert_eq!(search.phase(), GenerationPhase::Reproduce);
        let elites: Vec<Vec<usize>> = search.population()[..4].iter().map(currents).collect();

        search.advance().unwrap();
        let after: Vec<Vec<usize>> = search.population()[..4].iter().map(currents).collect();
        assert_eq!(elites, after);
        assert_eq!(search.population().len(), 40);
    }

    #[test]
    fn every_accepted_chromosome_is_new() {
        let mut search = search(config(30, 5), 5);
        search.run().unwrap();
        // Initial 30 plus 27 bred chromosomes for each of four reproductions.
        assert_eq!(search.memo_len(), 30 + 4 * 27);

        let hashes: HashSet<u64> = search
            .population()
            .iter()
            .map(|citizen| chromosome_hash(&citizen.chromosome))
            .collect();
        assert_eq!(hashes.len(), 30);
    }

    #[test]
    fn mutation_frequency_matches_rate() {
        let mut config = config(50, 200);
        config.mutation_rate = 4;
        let mut search = search(config, 6);
        search.run().unwrap();

        let (bred, mutated) = search.mutation_counts();
        assert!(bred > 20_000);
        let fraction = mutated as f64 / bred as f64;
        assert!((fraction - 0.25).abs() < 0.02, "fraction was {}", fraction);
    }

    #[test]
    fn rows_are_logged_only_on_improvement() {
        struct Constant;
        impl BacktestEvaluator for Constant {
            fn evaluate(&self, _chromosome: &[VariantFilter]) -> LoanReturn {
                LoanReturn {
                    num_loans: 50,
                    net_apy: 6.5,
                    ..LoanReturn::default()
                }
            }
            fn total_loans(&self) -> usize {
                50
            }
        }

        let template = template();
        let log = ResultsLog::new(Vec::new(), &template).unwrap();
        let mut search = GeneticSearch::new(
            config(20, 4),
            Constant,
            template,
            log,
            StdRng::seed_from_u64(8),
        )
        .unwrap();
        let outcome = search.run().unwrap();
        assert_eq!(outcome.best_net_apy, 6.5);
        assert_eq!(outcome.iterations, 4);

        let text = String::from_utf8(search.into_results_log().into_inner().unwrap()).unwrap();
        assert_eq!(text.lines().count(), 2);
    }

    #[test]
    fn thin_results_are_never_logged() {
        let template = template();
        let log = ResultsLog::new(Vec::new(), &template).unwrap();
        let mut config = config(20, 3);
        config.fitness_sort_min_loans = 1_000_000;
        let mut search = GeneticSearch::new(
            config,
            IndexSumEvaluator,
            template,
            log,
            StdRng::seed_from_u64(9),
        )
        .unwrap();
        let outcome = search.run().unwrap();
        assert_eq!(outcome.best_net_apy, 0.0);

        let text = String::from_utf8(search.into_results_log().into_inner().unwrap()).unwrap();
        assert_eq!(text.lines().count(), 1);
    }

    #[test]
    fn tiny_option_space_is_rejected() {
        let catalog =
            FilterCatalog::new("AB", NaiveDate::from_ymd_opt(2014, 7, 28).unwrap()).unwrap();
        // Six public record thresholds.
        let template = catalog.chromosome(&[Attribute::PubRec]);
        let log = ResultsLog::new(Vec::new(), &template).unwrap();
        let result = GeneticSearch::new(
            config(8, 1),
            IndexSumEvaluator,
            template,
            log,
            StdRng::seed_from_u64(10),
        );
        assert!(matches!(result, Err(LoanBacktestError::Configuration(_))));
    }

    #[test]
    fn reported_result_masks_thin_selections() {
        let thin = LoanReturn {
            num_loans: 3,
            net_apy: 50.0,
            expected_apy: 20.0,
            ..LoanReturn::default()
        };
        let masked = reported_result(&thin, 10);
        assert_eq!(masked.num_loans, 3);
        assert_eq!(masked.net_apy, 0.0);
        assert_eq!(masked.expected_apy, 0.0);
        assert_eq!(reported_result(&thin, 3), thin);
    }
}
