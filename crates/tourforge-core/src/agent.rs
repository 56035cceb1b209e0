use crate::bruteforce::evaluate_task_range;
use crate::error::{TourError, TourResult};
use crate::genetic::{EngineParams, GeneticEngine, SliceBudget};
use tourforge_protocol::config::{BruteforceParams, GeneticParams};
use tourforge_protocol::protocol::{GeneticSeed, ResultMessage, TaskMessage, TaskPayload};
use tourforge_protocol::Individual;
use tracing::{debug, error, info};
use uuid::Uuid;

/// Algorithm-specific outcome of one task.
#[derive(Debug, Clone, PartialEq)]
pub struct Solution {
    pub best_path: Vec<usize>,
    pub cost: i64,
    pub no_improve_runs: Option<usize>,
    pub migrants: Option<Vec<Individual>>,
}

pub trait Solver: Send {
    fn solve(&mut self, task: &TaskMessage) -> TourResult<Solution>;
}

/// Holds at most one value, keyed. Asking for a different key evicts the
/// current value first.
#[derive(Debug)]
pub struct ResidentSlot<K, V> {
    entry: Option<(K, V)>,
}

impl<K, V> Default for ResidentSlot<K, V> {
    fn default() -> Self {
        Self { entry: None }
    }
}

impl<K: PartialEq, V> ResidentSlot<K, V> {
    pub fn key(&self) -> Option<&K> {
        self.entry.as_ref().map(|(k, _)| k)
    }

    pub fn evict(&mut self) -> Option<V> {
        self.entry.take().map(|(_, v)| v)
    }

    /// Returns the resident value for `key` and whether it was just created.
    pub fn get_or_try_insert_with<F>(&mut self, key: K, init: F) -> TourResult<(&mut V, bool)>
    where
        F: FnOnce() -> TourResult<V>,
    {
        let fresh = self.key() != Some(&key);
        if fresh {
            self.entry = None;
            self.entry = Some((key, init()?));
        }
        match self.entry.as_mut() {
            Some((_, value)) => Ok((value, fresh)),
            None => Err(TourError::Computation("resident slot is empty".into())),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct BruteforceSolver {
    pub params: BruteforceParams,
}

impl Solver for BruteforceSolver {
    fn solve(&mut self, task: &TaskMessage) -> TourResult<Solution> {
        let TaskPayload::Bruteforce(range) = &task.payload else {
            return Err(TourError::Validation("bruteforce solver got a non-bruteforce task".into()));
        };

        let scored = evaluate_task_range(&task.matrix, range, self.params.parallel)?;
        Ok(Solution {
            best_path: scored.path,
            cost: scored.cost,
            no_improve_runs: None,
            migrants: None,
        })
    }
}

/// Keeps one [`GeneticEngine`] alive across the continuation chain of a task.
#[derive(Default)]
pub struct GeneticSolver {
    pub params: GeneticParams,
    slot: ResidentSlot<Uuid, GeneticEngine>,
}

impl GeneticSolver {
    pub fn new(params: GeneticParams) -> Self {
        Self {
            params,
            slot: ResidentSlot::default(),
        }
    }

    pub fn resident_task(&self) -> Option<Uuid> {
        self.slot.key().copied()
    }

    pub fn evict(&mut self) {
        if let Some(engine) = self.slot.evict() {
            debug!("Evicted resident engine in state {}", engine.state());
        }
    }

    fn run(&mut self, task: &TaskMessage, seed: &GeneticSeed) -> TourResult<Solution> {
        let mut engine_params = EngineParams::from(&self.params);
        engine_params.population_multiplier = seed.population_size_multiplier;

        let matrix = task.matrix.clone();
        let (engine, fresh) = self.slot.get_or_try_insert_with(task.task_id, || {
            let mut engine = GeneticEngine::new(matrix, engine_params);
            engine.populate(&seed.individual)?;
            Ok(engine)
        })?;

        if fresh {
            info!(
                "🧬 New resident engine for task {} (population {})",
                task.task_id,
                engine.target_size()
            );
            engine.inject(&seed.migrants)?;
        } else {
            let mut incoming = seed.migrants.clone();
            if !seed.individual.is_empty() {
                incoming.push(Individual::evaluated(seed.individual.clone(), engine.matrix()));
            }
            engine.inject(&incoming)?;
        }

        let budget = SliceBudget {
            max_duration: Some(self.params.slice()),
            max_generations: seed.max_generations.or(self.params.max_generations),
        };
        let report = engine.run_slice(budget)?;

        Ok(Solution {
            best_path: report.best_path,
            cost: report.cost,
            no_improve_runs: Some(report.no_improve_runs),
            migrants: Some(engine.elites(self.params.migrant_count)),
        })
    }
}

impl Solver for GeneticSolver {
    fn solve(&mut self, task: &TaskMessage) -> TourResult<Solution> {
        let TaskPayload::Genetic(seed) = &task.payload else {
            return Err(TourError::Validation("genetic solver got a non-genetic task".into()));
        };

        let outcome = self.run(task, seed);
        if outcome.is_err() {
            // A half-built or failed engine must not leak into the redelivery.
            self.evict();
        }
        outcome
    }
}

/// Turns tasks into results. Exactly one result per task; failures become the
/// error sentinel instead of escaping.
pub struct WorkerAgent {
    worker_id: String,
    last_task: Option<Uuid>,
    bruteforce: BruteforceSolver,
    genetic: GeneticSolver,
}

impl WorkerAgent {
    pub fn new(worker_id: impl Into<String>, bruteforce: BruteforceParams, genetic: GeneticParams) -> Self {
        Self {
            worker_id: worker_id.into(),
            last_task: None,
            bruteforce: BruteforceSolver { params: bruteforce },
            genetic: GeneticSolver::new(genetic),
        }
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    pub fn resident_task(&self) -> Option<Uuid> {
        self.genetic.resident_task()
    }

    pub fn handle(&mut self, task: &TaskMessage) -> ResultMessage {
        if self.last_task != Some(task.task_id) {
            self.genetic.evict();
            self.last_task = Some(task.task_id);
        }

        let solver: &mut dyn Solver = match task.payload {
            TaskPayload::Bruteforce(_) => &mut self.bruteforce,
            TaskPayload::Genetic(_) => &mut self.genetic,
        };

        match solver.solve(task) {
            Ok(solution) => ResultMessage {
                task_id: task.task_id,
                run_id: task.run_id,
                round: task.round,
                worker_id: self.worker_id.clone(),
                best_path: solution.best_path,
                cost: solution.cost,
                no_improve_runs: solution.no_improve_runs,
                migrants: solution.migrants,
            },
            Err(e) => {
                error!("❌ Task {} ({}) failed: {}", task.task_id, task.algorithm(), e);
                ResultMessage::error(task, &self.worker_id)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tourforge_protocol::protocol::BruteforceRange;
    use tourforge_protocol::DistanceMatrix;

    fn matrix() -> DistanceMatrix {
        DistanceMatrix::from_rows(vec![
            vec![0, 2, 9, 10, 7],
            vec![2, 0, 6, 4, 3],
            vec![9, 6, 0, 8, 5],
            vec![10, 4, 8, 0, 6],
            vec![7, 3, 5, 6, 0],
        ])
        .unwrap()
    }

    fn genetic_task(task_id: Uuid, round: u64) -> TaskMessage {
        TaskMessage {
            task_id,
            run_id: Uuid::nil(),
            round,
            matrix: matrix(),
            payload: TaskPayload::Genetic(GeneticSeed {
                individual: vec![],
                population_size_multiplier: 4,
                migrants: vec![],
                max_generations: Some(2),
            }),
        }
    }

    fn agent() -> WorkerAgent {
        let genetic = GeneticParams {
            seed: Some(17),
            ..Default::default()
        };
        WorkerAgent::new("w1", BruteforceParams::default(), genetic)
    }

    #[test]
    fn test_slot_evicts_on_key_change() {
        let mut slot: ResidentSlot<u32, String> = ResidentSlot::default();
        let (_, fresh) = slot.get_or_try_insert_with(1, || Ok("a".into())).unwrap();
        assert!(fresh);
        let (v, fresh) = slot.get_or_try_insert_with(1, || Ok("b".into())).unwrap();
        assert!(!fresh);
        assert_eq!(v, "a");
        let (v, fresh) = slot.get_or_try_insert_with(2, || Ok("c".into())).unwrap();
        assert!(fresh);
        assert_eq!(v, "c");
    }

    #[test]
    fn test_failed_init_leaves_slot_empty() {
        let mut slot: ResidentSlot<u32, String> = ResidentSlot::default();
        slot.get_or_try_insert_with(1, || Ok("a".into())).unwrap();
        assert!(slot
            .get_or_try_insert_with(2, || Err(TourError::Computation("boom".into())))
            .is_err());
        assert!(slot.key().is_none());
    }

    #[test]
    fn test_engine_stays_resident_across_rounds() {
        let mut a = agent();
        let id = Uuid::new_v4();

        let r0 = a.handle(&genetic_task(id, 0));
        assert!(!r0.is_error());
        assert_eq!(a.resident_task(), Some(id));

        let r1 = a.handle(&genetic_task(id, 1));
        assert_eq!(r1.round, 1);
        assert!(r1.cost <= r0.cost);
        assert_eq!(a.resident_task(), Some(id));

        let other = Uuid::new_v4();
        a.handle(&genetic_task(other, 0));
        assert_eq!(a.resident_task(), Some(other));
    }

    #[test]
    fn test_bruteforce_task_evicts_engine() {
        let mut a = agent();
        a.handle(&genetic_task(Uuid::new_v4(), 0));

        let task = TaskMessage {
            task_id: Uuid::new_v4(),
            run_id: Uuid::nil(),
            round: 0,
            matrix: matrix(),
            payload: TaskPayload::Bruteforce(BruteforceRange {
                first_permutation_index: 0,
                last_permutation_index_inclusive: 23,
            }),
        };
        let res = a.handle(&task);
        assert_eq!(a.resident_task(), None);
        assert_eq!(res.best_path.len(), 6);
        assert_eq!(matrix().path_cost(&res.best_path), res.cost);
    }

    #[test]
    fn test_failure_becomes_error_sentinel() {
        let mut a = agent();
        let mut task = genetic_task(Uuid::new_v4(), 0);
        if let TaskPayload::Genetic(seed) = &mut task.payload {
            seed.individual = vec![0, 0, 1];
        }
        let res = a.handle(&task);
        assert!(res.is_error());
        assert_eq!(res.task_id, task.task_id);
        assert_eq!(a.resident_task(), None);
    }
}
