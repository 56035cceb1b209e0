//! Run-level bookkeeping of the coordinator: how work is split, and how
//! results fold into a global best and a stop decision.
//!
//! Everything here is synchronous and transport-free; the async run loop
//! lives in the hive and feeds results into these aggregators.

use crate::error::{TourError, TourResult};
use crate::permutation::factorial;
use std::collections::{HashMap, HashSet};
use tourforge_protocol::protocol::{BruteforceRange, GeneticSeed, ResultMessage, TaskMessage, TaskPayload};
use tourforge_protocol::{DistanceMatrix, Individual};
use tracing::{info, warn};
use uuid::Uuid;

/// Rank ranges covering `[0, (N-1)!)` in `chunk`-sized steps.
#[derive(Debug, Clone)]
pub struct BruteforcePartition {
    next: u64,
    space: u64,
    chunk: u64,
}

impl BruteforcePartition {
    pub fn space(&self) -> u64 {
        self.space
    }

    pub fn task_count(&self) -> u64 {
        self.space.div_ceil(self.chunk)
    }
}

impl Iterator for BruteforcePartition {
    type Item = BruteforceRange;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.space {
            return None;
        }
        let first = self.next;
        let last_inclusive = first.saturating_add(self.chunk).min(self.space) - 1;
        self.next = last_inclusive + 1;
        Some(BruteforceRange {
            first_permutation_index: first,
            last_permutation_index_inclusive: last_inclusive,
        })
    }
}

pub fn partition_bruteforce(matrix: &DistanceMatrix, chunk: u64) -> TourResult<BruteforcePartition> {
    if chunk == 0 {
        return Err(TourError::Validation("chunk size must be positive".into()));
    }
    let space = factorial(matrix.size() - 1)?;
    Ok(BruteforcePartition { next: 0, space, chunk })
}

/// Per-worker share of the population so the total stays roughly constant.
pub fn genetic_multiplier(base: usize, consumers: usize) -> usize {
    (base / consumers.max(1)).max(1)
}

/// True when the reported path is a closed tour over the matrix whose cost
/// matches the reported cost.
pub fn is_consistent(matrix: &DistanceMatrix, result: &ResultMessage) -> bool {
    let n = matrix.size();
    let path = &result.best_path;
    path.len() == n + 1
        && path.first() == path.last()
        && matrix.is_full_tour(&path[..n])
        && matrix.path_cost(path) == result.cost
}

/// What the coordinator should do with a result it just received.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    /// Already counted (redelivery); acknowledge and move on.
    Duplicate,
    /// Counted; keep consuming.
    Accepted,
    /// Counted; publish this continuation to the replying worker.
    Continue(TaskMessage),
    /// Counted; the run is over.
    Finished,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub best_path: Vec<usize>,
    pub best_cost: i64,
    pub results_received: u64,
}

#[derive(Debug)]
pub struct BruteforceAggregator {
    matrix: DistanceMatrix,
    expected: u64,
    seen: HashSet<Uuid>,
    best_path: Vec<usize>,
    best_cost: i64,
    failures: u64,
}

impl BruteforceAggregator {
    pub fn new(matrix: DistanceMatrix, expected: u64) -> Self {
        Self {
            matrix,
            expected,
            seen: HashSet::new(),
            best_path: Vec::new(),
            best_cost: i64::MAX,
            failures: 0,
        }
    }

    pub fn received(&self) -> u64 {
        self.seen.len() as u64
    }

    pub fn failures(&self) -> u64 {
        self.failures
    }

    pub fn is_complete(&self) -> bool {
        self.received() >= self.expected
    }

    /// Counts a result once per task. Failed or inconsistent results complete
    /// their task without competing for the minimum.
    pub fn accept(&mut self, result: &ResultMessage) -> Verdict {
        if !self.seen.insert(result.task_id) {
            return Verdict::Duplicate;
        }

        if result.is_error() || !is_consistent(&self.matrix, result) {
            self.failures += 1;
            warn!(
                "⚠️ Task {} from {} produced no usable tour (cost {})",
                result.task_id, result.worker_id, result.cost
            );
        } else if result.cost < self.best_cost {
            self.best_cost = result.cost;
            self.best_path = result.best_path.clone();
        }

        if self.is_complete() {
            Verdict::Finished
        } else {
            Verdict::Accepted
        }
    }

    pub fn outcome(&self) -> Outcome {
        Outcome {
            best_path: self.best_path.clone(),
            best_cost: if self.best_path.is_empty() { -1 } else { self.best_cost },
            results_received: self.received(),
        }
    }
}

#[derive(Debug)]
pub struct GeneticAggregator {
    matrix: DistanceMatrix,
    run_id: Uuid,
    consumers: usize,
    multiplier: usize,
    max_generations: Option<usize>,
    seen: HashSet<(Uuid, u64)>,
    /// Continuations handed out but not yet confirmed as published.
    pending: HashMap<(Uuid, u64), TaskMessage>,
    best_path: Vec<usize>,
    best_cost: i64,
    elite_pool: Vec<Individual>,
    aggregate_no_improve: usize,
    finished: bool,
}

impl GeneticAggregator {
    pub fn new(
        matrix: DistanceMatrix,
        run_id: Uuid,
        consumers: usize,
        multiplier: usize,
        max_generations: Option<usize>,
    ) -> Self {
        Self {
            matrix,
            run_id,
            consumers: consumers.max(1),
            multiplier,
            max_generations,
            seen: HashSet::new(),
            pending: HashMap::new(),
            best_path: Vec::new(),
            best_cost: i64::MAX,
            elite_pool: Vec::new(),
            aggregate_no_improve: 0,
            finished: false,
        }
    }

    /// `(consumers - 1) * N + N / 2`
    pub fn threshold(&self) -> usize {
        let n = self.matrix.size();
        (self.consumers - 1) * n + n / 2
    }

    pub fn aggregate_no_improve(&self) -> usize {
        self.aggregate_no_improve
    }

    pub fn elite_pool(&self) -> &[Individual] {
        &self.elite_pool
    }

    pub fn received(&self) -> u64 {
        self.seen.len() as u64
    }

    /// Folds a result in. A redelivered result whose continuation was never
    /// confirmed gets the same continuation again, so a failed publish can
    /// be retried without counting the result twice.
    pub fn accept(&mut self, result: &ResultMessage) -> Verdict {
        let key = (result.task_id, result.round);
        if !self.seen.insert(key) {
            if self.finished {
                return Verdict::Duplicate;
            }
            return match self.pending.get(&key) {
                Some(next) => Verdict::Continue(next.clone()),
                None => Verdict::Duplicate,
            };
        }
        if self.finished {
            return Verdict::Finished;
        }

        let usable = !result.is_error() && is_consistent(&self.matrix, result);
        if usable && result.cost < self.best_cost {
            info!(
                "🏆 New best {} from {} (round {})",
                result.cost, result.worker_id, result.round
            );
            self.best_cost = result.cost;
            self.best_path = result.best_path.clone();
            self.merge_migrants(result.migrants.as_deref().unwrap_or_default());
            self.aggregate_no_improve = 0;
        } else {
            // A failed slice counts as a full N generations without progress.
            let reported = if usable {
                result.no_improve_runs.unwrap_or(0)
            } else {
                warn!("⚠️ Unusable genetic result from {}", result.worker_id);
                self.matrix.size()
            };
            if self.consumers == 1 {
                self.aggregate_no_improve = reported;
            } else {
                self.aggregate_no_improve += reported;
            }
        }

        if self.aggregate_no_improve > self.threshold() {
            info!(
                "🏁 Converged: aggregate NoImprove {} > {}",
                self.aggregate_no_improve,
                self.threshold()
            );
            self.finished = true;
            return Verdict::Finished;
        }

        let next = self.continuation(result);
        self.pending.insert(key, next.clone());
        Verdict::Continue(next)
    }

    /// Marks the continuation for `result` as published; later redeliveries
    /// of that result are plain duplicates.
    pub fn continuation_published(&mut self, result: &ResultMessage) {
        self.pending.remove(&(result.task_id, result.round));
    }

    pub fn pending_continuations(&self) -> usize {
        self.pending.len()
    }

    /// Merges migrants into the elite pool: distinct tours, cheapest first,
    /// capped at the size of the incoming batch.
    fn merge_migrants(&mut self, migrants: &[Individual]) {
        if migrants.is_empty() {
            return;
        }
        let cap = migrants.len();

        let mut merged: Vec<Individual> = self.elite_pool.drain(..).collect();
        for m in migrants {
            if self.matrix.is_full_tour(&m.tour) {
                merged.push(Individual::evaluated(m.tour.clone(), &self.matrix));
            }
        }
        merged.sort_by_key(|i| i.cost);

        let mut seen = HashSet::new();
        merged.retain(|i| seen.insert(i.tour.clone()));
        merged.truncate(cap);
        self.elite_pool = merged;
    }

    fn continuation(&self, result: &ResultMessage) -> TaskMessage {
        let n = self.matrix.size();
        let individual = if self.best_path.len() == n + 1 {
            self.best_path[..n].to_vec()
        } else {
            Vec::new()
        };

        TaskMessage {
            task_id: result.task_id,
            run_id: self.run_id,
            round: result.round + 1,
            matrix: self.matrix.clone(),
            payload: TaskPayload::Genetic(GeneticSeed {
                individual,
                population_size_multiplier: self.multiplier,
                migrants: self.elite_pool.clone(),
                max_generations: self.max_generations,
            }),
        }
    }

    pub fn outcome(&self) -> Outcome {
        Outcome {
            best_path: self.best_path.clone(),
            best_cost: if self.best_path.is_empty() { -1 } else { self.best_cost },
            results_received: self.received(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tourforge_protocol::protocol::ERROR_COST;

    fn square() -> DistanceMatrix {
        DistanceMatrix::from_rows(vec![
            vec![0, 1, 1, 1],
            vec![1, 0, 1, 1],
            vec![1, 1, 0, 1],
            vec![1, 1, 1, 0],
        ])
        .unwrap()
    }

    fn result(task_id: Uuid, round: u64, path: Vec<usize>, cost: i64) -> ResultMessage {
        ResultMessage {
            task_id,
            run_id: Uuid::nil(),
            round,
            worker_id: "w1".into(),
            best_path: path,
            cost,
            no_improve_runs: None,
            migrants: None,
        }
    }

    #[test]
    fn test_partition_small_chunks() {
        let m = square();
        let parts: Vec<_> = partition_bruteforce(&m, 4).unwrap().collect();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].first_permutation_index, 0);
        assert_eq!(parts[0].last_permutation_index_inclusive, 3);
        assert_eq!(parts[1].first_permutation_index, 4);
        assert_eq!(parts[1].last_permutation_index_inclusive, 5);
    }

    #[test]
    fn test_partition_overflow() {
        let rows = vec![vec![1i64; 23]; 23];
        let m = DistanceMatrix::from_rows(rows).unwrap();
        assert!(matches!(partition_bruteforce(&m, 10), Err(TourError::Overflow(22))));
    }

    #[test]
    fn test_multiplier_floor() {
        assert_eq!(genetic_multiplier(50, 4), 12);
        assert_eq!(genetic_multiplier(50, 0), 50);
        assert_eq!(genetic_multiplier(3, 10), 1);
    }

    #[test]
    fn test_bruteforce_error_results_complete_the_task() {
        let mut agg = BruteforceAggregator::new(square(), 2);
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert_eq!(agg.accept(&result(a, 0, vec![], ERROR_COST)), Verdict::Accepted);
        assert_eq!(agg.accept(&result(b, 0, vec![0, 1, 2, 3, 0], 4)), Verdict::Finished);
        assert_eq!(agg.failures(), 1);
        assert_eq!(agg.outcome().best_cost, 4);
    }

    #[test]
    fn test_inconsistent_path_is_rejected() {
        let mut agg = BruteforceAggregator::new(square(), 1);
        // Claims cost 1 for a path that costs 4.
        agg.accept(&result(Uuid::new_v4(), 0, vec![0, 1, 2, 3, 0], 1));
        assert_eq!(agg.outcome().best_cost, -1);
    }

    #[test]
    fn test_genetic_duplicate_round_ignored() {
        let m = square();
        let mut agg = GeneticAggregator::new(m, Uuid::nil(), 2, 25, None);
        let t = Uuid::new_v4();
        let mut r = result(t, 0, vec![0, 1, 2, 3, 0], 4);
        r.migrants = Some(vec![Individual { tour: vec![0, 1, 2, 3], cost: 4 }]);

        assert!(matches!(agg.accept(&r), Verdict::Continue(_)));
        agg.continuation_published(&r);
        assert_eq!(agg.accept(&r), Verdict::Duplicate);
        assert_eq!(agg.elite_pool().len(), 1);
    }

    #[test]
    fn test_unpublished_continuation_is_reissued() {
        let mut agg = GeneticAggregator::new(square(), Uuid::nil(), 2, 25, None);
        let t = Uuid::new_v4();
        let mut r = result(t, 3, vec![0, 1, 2, 3, 0], 4);
        r.no_improve_runs = Some(1);

        let Verdict::Continue(first) = agg.accept(&r) else {
            panic!("expected a continuation");
        };
        assert_eq!(first.round, 4);
        assert_eq!(agg.pending_continuations(), 1);

        // Redelivered before the continuation went out: same task again,
        // without counting the result twice.
        let Verdict::Continue(again) = agg.accept(&r) else {
            panic!("expected the continuation to be reissued");
        };
        assert_eq!(again, first);
        assert_eq!(agg.received(), 1);
        assert_eq!(agg.aggregate_no_improve(), 0);

        agg.continuation_published(&r);
        assert_eq!(agg.pending_continuations(), 0);
        assert_eq!(agg.accept(&r), Verdict::Duplicate);
    }
}
