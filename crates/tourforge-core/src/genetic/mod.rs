pub mod crossover;
pub mod mutation;
pub mod population;

use crate::error::{TourError, TourResult};
use fastrand::Rng;
use std::time::{Duration, Instant};
use strum::Display;
use tourforge_protocol::config::GeneticParams;
use tourforge_protocol::{DistanceMatrix, Individual};
use tracing::{debug, warn};
use typed_builder::TypedBuilder;

use self::crossover::{cut_points, order_crossover};
use self::mutation::reverse_segment;
use self::population::{rotate_to_start, Population};

#[derive(Debug, Clone, TypedBuilder)]
pub struct EngineParams {
    #[builder(default = 50)]
    pub population_multiplier: usize,
    #[builder(default = 0.05)]
    pub mutation_probability: f64,
    #[builder(default = 0.8)]
    pub crossover_probability: f64,
    #[builder(default)]
    pub seed: Option<u64>,
}

impl Default for EngineParams {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl From<&GeneticParams> for EngineParams {
    fn from(p: &GeneticParams) -> Self {
        Self {
            population_multiplier: p.population_multiplier,
            mutation_probability: p.mutation_probability,
            crossover_probability: p.crossover_probability,
            seed: p.seed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum EngineState {
    Uninitialized,
    PopulationReady,
    Evolving,
    Converged,
    BudgetExpired,
}

/// Limits of one resumable invocation. Whichever is hit first ends it.
#[derive(Debug, Clone, Copy, Default)]
pub struct SliceBudget {
    pub max_duration: Option<Duration>,
    pub max_generations: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineReport {
    /// Starts and ends at city 0, length N+1.
    pub best_path: Vec<usize>,
    pub cost: i64,
    pub no_improve_runs: usize,
    pub generations: usize,
    pub state: EngineState,
}

pub struct GeneticEngine {
    matrix: DistanceMatrix,
    params: EngineParams,
    rng: Rng,
    population: Option<Population>,
    best_path: Vec<usize>,
    best_cost: i64,
    no_improve: usize,
    generations: usize,
    state: EngineState,
}

impl GeneticEngine {
    pub fn new(matrix: DistanceMatrix, params: EngineParams) -> Self {
        let rng = match params.seed {
            Some(s) => Rng::with_seed(s),
            None => Rng::new(),
        };
        Self {
            matrix,
            params,
            rng,
            population: None,
            best_path: Vec::new(),
            best_cost: i64::MAX,
            no_improve: 0,
            generations: 0,
            state: EngineState::Uninitialized,
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn matrix(&self) -> &DistanceMatrix {
        &self.matrix
    }

    pub fn no_improve(&self) -> usize {
        self.no_improve
    }

    pub fn target_size(&self) -> usize {
        self.matrix.size() * self.params.population_multiplier
    }

    /// Standalone stop rule: more than N/2 generations without improvement.
    pub fn is_converged(&self) -> bool {
        self.no_improve > self.matrix.size() / 2
    }

    /// A random full tour of all cities.
    pub fn random_tour(&mut self) -> Vec<usize> {
        let mut tour: Vec<usize> = (0..self.matrix.size()).collect();
        self.rng.shuffle(&mut tour);
        tour
    }

    /// Builds the initial population from `seed`, or from a random tour when
    /// `seed` is empty.
    pub fn populate(&mut self, seed: &[usize]) -> TourResult<()> {
        if self.params.population_multiplier == 0 {
            return Err(TourError::Validation("population multiplier must be at least 1".into()));
        }

        let seed = if seed.is_empty() {
            self.random_tour()
        } else if self.matrix.is_full_tour(seed) {
            seed.to_vec()
        } else {
            return Err(TourError::Validation(format!(
                "seed is not a tour over {} cities: {:?}",
                self.matrix.size(),
                seed
            )));
        };

        let mut population = Population::seeded(seed, &self.matrix, self.target_size(), &mut self.rng);
        population.select();

        if let Some(first) = population.fittest() {
            self.best_cost = first.cost;
            self.best_path = closed_path(&first.tour);
        }

        self.population = Some(population);
        self.no_improve = 0;
        self.generations = 0;
        self.state = EngineState::PopulationReady;
        Ok(())
    }

    /// Adds foreign individuals. Costs are recomputed locally; tours that do
    /// not cover this matrix are dropped. A migrant cheaper than the running
    /// best becomes the best without touching the NoImprove counter.
    pub fn inject(&mut self, migrants: &[Individual]) -> TourResult<usize> {
        let population = self
            .population
            .as_mut()
            .ok_or_else(|| TourError::Computation("inject before populate".into()))?;

        let mut accepted = 0;
        for m in migrants {
            if !self.matrix.is_full_tour(&m.tour) {
                warn!("⚠️ Dropping migrant with invalid tour ({} genes)", m.tour.len());
                continue;
            }
            population.push(Individual::evaluated(m.tour.clone(), &self.matrix));
            accepted += 1;
        }
        population.select();

        if let Some(first) = population.fittest() {
            if first.cost < self.best_cost {
                self.best_cost = first.cost;
                self.best_path = closed_path(&first.tour);
            }
        }
        Ok(accepted)
    }

    /// One generation: selection, crossover, mutation, best tracking.
    /// Returns true when the running best improved.
    pub fn step(&mut self) -> TourResult<bool> {
        let population = self
            .population
            .as_mut()
            .ok_or_else(|| TourError::Computation("step before populate".into()))?;

        population.select();

        // Crossover
        let pairs = (population.len() as f64 * self.params.crossover_probability) as usize;
        let size = population.len();
        let n = self.matrix.size();
        for i in 0..pairs.min(size) {
            let mut second = self.rng.usize(0..size);
            if size > 1 {
                while second == i {
                    second = self.rng.usize(0..size);
                }
            }
            let (start, end) = cut_points(&mut self.rng, n);
            let (c1, c2) = order_crossover(
                &population.members()[i].tour,
                &population.members()[second].tour,
                start,
                end,
            );
            population.push(Individual::evaluated(c1, &self.matrix));
            population.push(Individual::evaluated(c2, &self.matrix));
        }

        // Mutation
        for individual in population.members_mut() {
            if self.rng.f64() < self.params.mutation_probability {
                reverse_segment(&mut individual.tour, &mut self.rng);
                individual.cost = self.matrix.tour_cost(&individual.tour);
            }
        }

        self.generations += 1;
        self.state = EngineState::Evolving;

        let improved = match population.fittest() {
            Some(best) if best.cost < self.best_cost => {
                self.best_cost = best.cost;
                self.best_path = closed_path(&best.tour);
                true
            }
            _ => false,
        };

        if improved {
            debug!("gen {}: new best {}", self.generations, self.best_cost);
            self.no_improve = 0;
        } else {
            self.no_improve += 1;
        }
        Ok(improved)
    }

    /// Standalone mode: evolve until more than N/2 generations pass without
    /// improvement.
    pub fn run_to_convergence(&mut self) -> TourResult<EngineReport> {
        while !self.is_converged() {
            self.step()?;
        }
        self.state = EngineState::Converged;
        Ok(self.report())
    }

    /// Resumable mode: evolve at least one generation, then stop at
    /// convergence or when the budget runs out.
    pub fn run_slice(&mut self, budget: SliceBudget) -> TourResult<EngineReport> {
        let started = Instant::now();
        let max_generations = budget.max_generations.map(|g| g.max(1));
        let mut generations = 0usize;

        loop {
            self.step()?;
            generations += 1;

            if self.is_converged() {
                self.state = EngineState::Converged;
                break;
            }
            let out_of_generations = max_generations.is_some_and(|max| generations >= max);
            let out_of_time = budget.max_duration.is_some_and(|d| started.elapsed() >= d);
            if out_of_generations || out_of_time {
                self.state = EngineState::BudgetExpired;
                break;
            }
        }

        Ok(self.report())
    }

    /// The `count` best distinct individuals of the current population.
    pub fn elites(&self, count: usize) -> Vec<Individual> {
        self.population
            .as_ref()
            .map(|p| p.elites(count))
            .unwrap_or_default()
    }

    pub fn report(&self) -> EngineReport {
        EngineReport {
            best_path: self.best_path.clone(),
            cost: self.best_cost,
            no_improve_runs: self.no_improve,
            generations: self.generations,
            state: self.state,
        }
    }
}

fn closed_path(tour: &[usize]) -> Vec<usize> {
    let mut path = rotate_to_start(tour);
    if let Some(&first) = path.first() {
        path.push(first);
    }
    path
}
